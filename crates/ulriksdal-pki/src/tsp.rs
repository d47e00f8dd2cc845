#![forbid(unsafe_code)]

//! RFC 3161 time-stamp tokens.
//!
//! A token is a CMS `ContentInfo` wrapping `SignedData` whose
//! encapsulated content is a DER `TSTInfo`. [`TimestampToken`] decodes
//! it, exposes the message imprint and generation time, and verifies the
//! TSA's signature.

use chrono::{DateTime, Utc};
use cms::cert::CertificateChoices;
use cms::content_info::ContentInfo;
use cms::signed_data::{SignedData, SignerIdentifier, SignerInfo};
use const_oid::ObjectIdentifier;
use der::asn1::{GeneralizedTime, Int, OctetString};
use der::{Decode, Encode, Sequence};
use spki::AlgorithmIdentifierOwned;
use ulriksdal_core::Error;
use ulriksdal_keys::x509::{serial_to_decimal, verify_signature};
use ulriksdal_keys::X509Certificate;
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::Extensions;

pub const ID_SIGNED_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.2");
pub const ID_CT_TST_INFO: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.16.1.4");
pub const ID_CONTENT_TYPE: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.3");
pub const ID_MESSAGE_DIGEST: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.4");

/// Requests time-stamp tokens from a TSA.
pub trait TimestampClient {
    /// Returns the DER token for `digest`, computed with the digest
    /// algorithm named by `digest_uri`. With `cert_req` the TSA includes
    /// its certificate in the token.
    fn request_timestamp(&self, digest: &[u8], digest_uri: &str, cert_req: bool)
        -> Result<Vec<u8>, Error>;
}

impl<T: TimestampClient + ?Sized> TimestampClient for &T {
    fn request_timestamp(
        &self,
        digest: &[u8],
        digest_uri: &str,
        cert_req: bool,
    ) -> Result<Vec<u8>, Error> {
        (**self).request_timestamp(digest, digest_uri, cert_req)
    }
}

// ── TSTInfo ──────────────────────────────────────────────────────────

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct MessageImprint {
    pub hash_algorithm: AlgorithmIdentifierOwned,
    pub hashed_message: OctetString,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct Accuracy {
    #[asn1(optional = "true")]
    pub seconds: Option<u32>,
    #[asn1(context_specific = "0", tag_mode = "IMPLICIT", optional = "true")]
    pub millis: Option<u16>,
    #[asn1(context_specific = "1", tag_mode = "IMPLICIT", optional = "true")]
    pub micros: Option<u16>,
}

/// `TSTInfo` (RFC 3161 §2.4.2).
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct TstInfo {
    pub version: u8,
    pub policy: ObjectIdentifier,
    pub message_imprint: MessageImprint,
    pub serial_number: Int,
    pub gen_time: GeneralizedTime,
    #[asn1(optional = "true")]
    pub accuracy: Option<Accuracy>,
    #[asn1(default = "Default::default")]
    pub ordering: bool,
    #[asn1(optional = "true")]
    pub nonce: Option<Int>,
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    pub tsa: Option<GeneralName>,
    #[asn1(context_specific = "1", tag_mode = "IMPLICIT", optional = "true")]
    pub extensions: Option<Extensions>,
}

// ── Token ────────────────────────────────────────────────────────────

/// A decoded time-stamp token.
#[derive(Clone, Debug)]
pub struct TimestampToken {
    der: Vec<u8>,
    signed_data: SignedData,
    /// Raw `TSTInfo` DER (the signed content).
    tst_info_der: Vec<u8>,
    tst_info: TstInfo,
    certificates: Vec<X509Certificate>,
}

impl TimestampToken {
    pub fn from_der(der: &[u8]) -> Result<Self, Error> {
        let content_info = ContentInfo::from_der(der)
            .map_err(|e| Error::Timestamp(format!("failed to parse token ContentInfo: {e}")))?;
        if content_info.content_type != ID_SIGNED_DATA {
            return Err(Error::Timestamp(format!(
                "token content type is {}, expected SignedData",
                content_info.content_type
            )));
        }
        let signed_data: SignedData = content_info
            .content
            .decode_as()
            .map_err(|e| Error::Timestamp(format!("failed to parse SignedData: {e}")))?;

        let encap = &signed_data.encap_content_info;
        if encap.econtent_type != ID_CT_TST_INFO {
            return Err(Error::Timestamp(format!(
                "encapsulated content is {}, expected TSTInfo",
                encap.econtent_type
            )));
        }
        let tst_info_der = encap
            .econtent
            .as_ref()
            .ok_or_else(|| Error::Timestamp("token carries no TSTInfo".into()))?
            .value()
            .to_vec();
        let tst_info = TstInfo::from_der(&tst_info_der)
            .map_err(|e| Error::Timestamp(format!("failed to parse TSTInfo: {e}")))?;

        let mut certificates = Vec::new();
        if let Some(set) = &signed_data.certificates {
            for choice in set.0.iter() {
                if let CertificateChoices::Certificate(cert) = choice {
                    let cert_der = cert
                        .to_der()
                        .map_err(|e| Error::Timestamp(format!("failed to encode certificate: {e}")))?;
                    certificates.push(X509Certificate::from_der(&cert_der)?);
                }
            }
        }

        Ok(Self {
            der: der.to_vec(),
            signed_data,
            tst_info_der,
            tst_info,
            certificates,
        })
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn tst_info(&self) -> &TstInfo {
        &self.tst_info
    }

    pub fn gen_time(&self) -> Result<DateTime<Utc>, Error> {
        let secs = i64::try_from(self.tst_info.gen_time.to_unix_duration().as_secs())
            .map_err(|_| Error::Timestamp("genTime out of range".into()))?;
        DateTime::<Utc>::from_timestamp(secs, 0)
            .ok_or_else(|| Error::Timestamp("genTime out of range".into()))
    }

    pub fn serial_decimal(&self) -> String {
        serial_to_decimal(self.tst_info.serial_number.as_bytes())
    }

    /// XML-DSig URI of the imprint's digest algorithm.
    pub fn imprint_algorithm(&self) -> Result<&'static str, Error> {
        ulriksdal_crypto::digest::uri_for_oid(&self.tst_info.message_imprint.hash_algorithm.oid)
    }

    pub fn imprint(&self) -> &[u8] {
        self.tst_info.message_imprint.hashed_message.as_bytes()
    }

    /// Certificates shipped in the token.
    pub fn certificates(&self) -> &[X509Certificate] {
        &self.certificates
    }

    fn signer_info(&self) -> Result<&SignerInfo, Error> {
        self.signed_data
            .signer_infos
            .0
            .iter()
            .next()
            .ok_or_else(|| Error::Timestamp("token has no SignerInfo".into()))
    }

    /// The TSA certificate, looked up among the token's certificates and
    /// then `extra`.
    pub fn signer_certificate(&self, extra: &[X509Certificate]) -> Result<X509Certificate, Error> {
        let SignerIdentifier::IssuerAndSerialNumber(sid) = &self.signer_info()?.sid else {
            return Err(Error::Timestamp(
                "token signer identified by key identifier only".into(),
            ));
        };
        let issuer = sid
            .issuer
            .to_der()
            .map_err(|e| Error::Timestamp(format!("failed to encode signer issuer: {e}")))?;
        self.certificates
            .iter()
            .chain(extra.iter())
            .find(|c| c.issuer_der() == issuer && c.serial_bytes() == sid.serial_number.as_bytes())
            .cloned()
            .ok_or_else(|| Error::Timestamp("TSA certificate not found".into()))
    }

    /// Check that the token stamps `digest` and that the TSA's signature
    /// over it is valid.
    pub fn verify(&self, digest: &[u8], extra: &[X509Certificate]) -> Result<(), Error> {
        if self.imprint() != digest {
            return Err(Error::Timestamp("message imprint does not match".into()));
        }
        let signer = self.signer_certificate(extra)?;
        let info = self.signer_info()?;
        let content_digest = ulriksdal_crypto::digest::digest(
            ulriksdal_crypto::digest::uri_for_oid(&info.digest_alg.oid)?,
            &self.tst_info_der,
        )?;

        let signed = match &info.signed_attrs {
            Some(attrs) => {
                let message_digest = attrs
                    .iter()
                    .find(|a| a.oid == ID_MESSAGE_DIGEST)
                    .and_then(|a| a.values.iter().next())
                    .ok_or_else(|| Error::Timestamp("signed attributes lack message-digest".into()))?;
                if message_digest.value() != content_digest.as_slice() {
                    return Err(Error::Timestamp("message-digest attribute does not match TSTInfo".into()));
                }
                attrs
                    .to_der()
                    .map_err(|e| Error::Timestamp(format!("failed to encode signed attributes: {e}")))?
            }
            None => self.tst_info_der.clone(),
        };

        verify_signature(
            signer.spki(),
            &info.signature_algorithm.oid,
            Some(&info.digest_alg.oid),
            &signed,
            info.signature.as_bytes(),
        )
        .map_err(|e| Error::Timestamp(format!("TSA signature invalid: {e}")))
    }
}
