#![forbid(unsafe_code)]

//! An in-process time-stamping authority.
//!
//! Issues RFC 3161 tokens signed with a local key and certificate. Useful
//! for closed deployments and for exercising the upgrade pipeline without
//! a network TSA.

use crate::tsp::{
    MessageImprint, TimestampClient, TstInfo, ID_CONTENT_TYPE, ID_CT_TST_INFO, ID_MESSAGE_DIGEST,
    ID_SIGNED_DATA,
};
use chrono::{DateTime, Utc};
use cms::cert::{CertificateChoices, IssuerAndSerialNumber};
use cms::content_info::{CmsVersion, ContentInfo};
use cms::signed_data::{
    CertificateSet, EncapsulatedContentInfo, SignedAttributes, SignedData, SignerIdentifier,
    SignerInfo, SignerInfos,
};
use const_oid::ObjectIdentifier;
use der::asn1::{Any, GeneralizedTime, Int, OctetString, SetOfVec};
use der::{Decode, Encode, Tag};
use spki::AlgorithmIdentifierOwned;
use std::sync::atomic::{AtomicU64, Ordering};
use ulriksdal_core::{algorithm, Error};
use ulriksdal_keys::{Key, KeyData, X509Certificate};
use x509_cert::attr::Attribute;

const SHA256_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");
const ECDSA_WITH_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");
const DEFAULT_POLICY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.4.1.4146.2.3");

fn asn1_err(what: &str) -> impl Fn(der::Error) -> Error + '_ {
    move |e| Error::Timestamp(format!("{what}: {e}"))
}

/// Issues tokens with a local TSA key.
pub struct LocalTimestampAuthority {
    key: Key,
    certificate: X509Certificate,
    /// Certificates added to the token after the TSA certificate.
    chain: Vec<X509Certificate>,
    policy: ObjectIdentifier,
    /// Fixed generation time; the current time when unset.
    time: Option<DateTime<Utc>>,
    serial: AtomicU64,
}

impl LocalTimestampAuthority {
    /// `key` must hold the TSA private key and its certificate.
    pub fn new(key: Key) -> Result<Self, Error> {
        let certificate = key
            .certificate()
            .cloned()
            .ok_or_else(|| Error::Key("TSA key has no certificate".into()))?;
        if !key.has_private() {
            return Err(Error::Key("TSA key has no private part".into()));
        }
        Ok(Self {
            key,
            certificate,
            chain: Vec::new(),
            policy: DEFAULT_POLICY,
            time: None,
            serial: AtomicU64::new(1),
        })
    }

    pub fn with_chain(mut self, chain: Vec<X509Certificate>) -> Self {
        self.chain = chain;
        self
    }

    pub fn with_time(mut self, time: DateTime<Utc>) -> Self {
        self.time = Some(time);
        self
    }

    pub fn certificate(&self) -> &X509Certificate {
        &self.certificate
    }

    fn tst_info(&self, digest: &[u8], digest_uri: &str) -> Result<Vec<u8>, Error> {
        let at = self.time.unwrap_or_else(Utc::now);
        let secs = u64::try_from(at.timestamp())
            .map_err(|_| Error::Timestamp("generation time before 1970".into()))?;
        let serial = self.serial.fetch_add(1, Ordering::Relaxed);
        let info = TstInfo {
            version: 1,
            policy: self.policy,
            message_imprint: MessageImprint {
                hash_algorithm: AlgorithmIdentifierOwned {
                    oid: ulriksdal_crypto::digest::oid_for_uri(digest_uri)?,
                    parameters: None,
                },
                hashed_message: OctetString::new(digest).map_err(asn1_err("imprint"))?,
            },
            serial_number: Int::from_der(&serial.to_der().map_err(asn1_err("serial"))?)
                .map_err(asn1_err("serial"))?,
            gen_time: GeneralizedTime::from_unix_duration(std::time::Duration::from_secs(secs))
                .map_err(asn1_err("genTime"))?,
            accuracy: None,
            ordering: false,
            nonce: None,
            tsa: None,
            extensions: None,
        };
        info.to_der().map_err(asn1_err("TSTInfo"))
    }

    fn sign(&self, data: &[u8]) -> Result<(ObjectIdentifier, Vec<u8>), Error> {
        let signing_key = self.key.to_signing_key();
        match &self.key.data {
            KeyData::Rsa { .. } => {
                let alg = ulriksdal_crypto::sign::from_uri(algorithm::RSA_SHA256)?;
                Ok((SHA256_WITH_RSA, alg.sign(&signing_key, data)?))
            }
            KeyData::EcP256 { .. } => {
                let alg = ulriksdal_crypto::sign::from_uri(algorithm::ECDSA_SHA256)?;
                let raw = alg.sign(&signing_key, data)?;
                let sig = p256::ecdsa::Signature::from_slice(&raw)
                    .map_err(|e| Error::Crypto(format!("invalid ECDSA signature: {e}")))?;
                Ok((ECDSA_WITH_SHA256, sig.to_der().as_bytes().to_vec()))
            }
            KeyData::EcP384 { .. } => Err(Error::UnsupportedAlgorithm(
                "P-384 TSA keys are not supported".into(),
            )),
        }
    }

    /// Build a complete token over `digest`.
    pub fn issue(&self, digest: &[u8], digest_uri: &str, cert_req: bool) -> Result<Vec<u8>, Error> {
        let tst_info = self.tst_info(digest, digest_uri)?;
        let sha256 = AlgorithmIdentifierOwned {
            oid: ulriksdal_crypto::digest::oid_for_uri(algorithm::SHA256)?,
            parameters: None,
        };
        let content_digest = ulriksdal_crypto::digest::digest(algorithm::SHA256, &tst_info)?;

        let signed_attrs: SignedAttributes = SetOfVec::try_from(vec![
            Attribute {
                oid: ID_CONTENT_TYPE,
                values: SetOfVec::try_from(vec![
                    Any::encode_from(&ID_CT_TST_INFO).map_err(asn1_err("content-type"))?
                ])
                .map_err(asn1_err("content-type"))?,
            },
            Attribute {
                oid: ID_MESSAGE_DIGEST,
                values: SetOfVec::try_from(vec![
                    Any::new(Tag::OctetString, content_digest).map_err(asn1_err("message-digest"))?
                ])
                .map_err(asn1_err("message-digest"))?,
            },
        ])
        .map_err(asn1_err("signed attributes"))?;
        let to_sign = signed_attrs.to_der().map_err(asn1_err("signed attributes"))?;
        let (signature_oid, signature) = self.sign(&to_sign)?;

        let tbs = &self.certificate.certificate().tbs_certificate;
        let signer_info = SignerInfo {
            version: CmsVersion::V1,
            sid: SignerIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
                issuer: tbs.issuer.clone(),
                serial_number: tbs.serial_number.clone(),
            }),
            digest_alg: sha256.clone(),
            signed_attrs: Some(signed_attrs),
            signature_algorithm: AlgorithmIdentifierOwned {
                oid: signature_oid,
                parameters: None,
            },
            signature: OctetString::new(signature).map_err(asn1_err("signature"))?,
            unsigned_attrs: None,
        };

        let certificates = if cert_req {
            let mut choices = Vec::new();
            for cert in std::iter::once(&self.certificate).chain(self.chain.iter()) {
                let parsed = x509_cert::Certificate::from_der(cert.der())
                    .map_err(asn1_err("certificate"))?;
                choices.push(CertificateChoices::Certificate(parsed));
            }
            Some(CertificateSet(
                SetOfVec::try_from(choices).map_err(asn1_err("certificates"))?,
            ))
        } else {
            None
        };

        let signed_data = SignedData {
            version: CmsVersion::V3,
            digest_algorithms: SetOfVec::try_from(vec![sha256]).map_err(asn1_err("digest algorithms"))?,
            encap_content_info: EncapsulatedContentInfo {
                econtent_type: ID_CT_TST_INFO,
                econtent: Some(Any::new(Tag::OctetString, tst_info).map_err(asn1_err("eContent"))?),
            },
            certificates,
            crls: None,
            signer_infos: SignerInfos(
                SetOfVec::try_from(vec![signer_info]).map_err(asn1_err("signer infos"))?,
            ),
        };

        let content_info = ContentInfo {
            content_type: ID_SIGNED_DATA,
            content: Any::encode_from(&signed_data).map_err(asn1_err("SignedData"))?,
        };
        let token = content_info.to_der().map_err(asn1_err("ContentInfo"))?;
        tracing::debug!(bytes = token.len(), "issued local timestamp token");
        Ok(token)
    }
}

impl TimestampClient for LocalTimestampAuthority {
    fn request_timestamp(
        &self,
        digest: &[u8],
        digest_uri: &str,
        cert_req: bool,
    ) -> Result<Vec<u8>, Error> {
        self.issue(digest, digest_uri, cert_req)
    }
}
