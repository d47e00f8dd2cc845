#![forbid(unsafe_code)]

//! X.509 certificate wrapper and signature verification.
//!
//! Certificate, CRL and CMS signatures all go through [`verify_signature`],
//! which dispatches on the signature algorithm OID and the issuer's key
//! type.

use chrono::{DateTime, Utc};
use const_oid::db::rfc5280::{ID_AD_OCSP, ID_PE_AUTHORITY_INFO_ACCESS};
use const_oid::ObjectIdentifier;
use der::{Decode, DecodePem, Encode};
use spki::{DecodePublicKey, SubjectPublicKeyInfoOwned};
use ulriksdal_core::Error;
use ulriksdal_crypto::SigningKey;
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::AuthorityInfoAccessSyntax;
use x509_cert::time::Time;
use x509_cert::Certificate;

/// A parsed certificate together with its DER encoding.
#[derive(Clone)]
pub struct X509Certificate {
    der: Vec<u8>,
    cert: Certificate,
}

impl std::fmt::Debug for X509Certificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("X509Certificate")
            .field("subject", &self.subject())
            .field("serial", &self.serial_decimal())
            .finish()
    }
}

impl PartialEq for X509Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl Eq for X509Certificate {}

impl X509Certificate {
    pub fn from_der(der: &[u8]) -> Result<Self, Error> {
        let cert = Certificate::from_der(der)
            .map_err(|e| Error::Certificate(format!("failed to parse X.509 certificate: {e}")))?;
        Ok(Self {
            der: der.to_vec(),
            cert,
        })
    }

    pub fn from_pem(pem: &[u8]) -> Result<Self, Error> {
        let cert = Certificate::from_pem(pem)
            .map_err(|e| Error::Certificate(format!("failed to parse certificate PEM: {e}")))?;
        let der = cert
            .to_der()
            .map_err(|e| Error::Certificate(format!("failed to encode certificate: {e}")))?;
        Ok(Self { der, cert })
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn certificate(&self) -> &Certificate {
        &self.cert
    }

    /// Subject distinguished name in RFC 4514 form.
    pub fn subject(&self) -> String {
        self.cert.tbs_certificate.subject.to_string()
    }

    /// Issuer distinguished name in RFC 4514 form, as written into
    /// `ds:X509IssuerName`.
    pub fn issuer(&self) -> String {
        self.cert.tbs_certificate.issuer.to_string()
    }

    pub fn subject_der(&self) -> Vec<u8> {
        self.cert.tbs_certificate.subject.to_der().unwrap_or_default()
    }

    pub fn issuer_der(&self) -> Vec<u8> {
        self.cert.tbs_certificate.issuer.to_der().unwrap_or_default()
    }

    /// Serial number as an unsigned decimal string (`ds:X509SerialNumber`).
    pub fn serial_decimal(&self) -> String {
        serial_to_decimal(self.cert.tbs_certificate.serial_number.as_bytes())
    }

    pub fn serial_bytes(&self) -> &[u8] {
        self.cert.tbs_certificate.serial_number.as_bytes()
    }

    /// Digest of the DER encoding under the given XML-DSig digest URI.
    pub fn digest(&self, digest_uri: &str) -> Result<Vec<u8>, Error> {
        ulriksdal_crypto::digest::digest(digest_uri, &self.der)
    }

    pub fn is_self_issued(&self) -> bool {
        self.subject_der() == self.issuer_der()
    }

    /// Whether `issuer` carries the name this certificate lists as issuer
    /// and its key verifies this certificate's signature.
    pub fn is_issued_by(&self, issuer: &X509Certificate) -> bool {
        self.issuer_der() == issuer.subject_der() && self.verify_signed_by(issuer).is_ok()
    }

    /// Verify this certificate's signature with the issuer's public key.
    pub fn verify_signed_by(&self, issuer: &X509Certificate) -> Result<(), Error> {
        let tbs = self
            .cert
            .tbs_certificate
            .to_der()
            .map_err(|e| Error::Certificate(format!("failed to encode TBS: {e}")))?;
        let sig = self
            .cert
            .signature
            .as_bytes()
            .ok_or_else(|| Error::Certificate("no signature bytes".into()))?;
        verify_signature(issuer.spki(), &self.cert.signature_algorithm.oid, None, &tbs, sig)
    }

    pub fn spki(&self) -> &SubjectPublicKeyInfoOwned {
        &self.cert.tbs_certificate.subject_public_key_info
    }

    /// The certificate's public key in the form the signature algorithms use.
    pub fn public_key(&self) -> Result<SigningKey, Error> {
        let spki_der = self
            .spki()
            .to_der()
            .map_err(|e| Error::Certificate(format!("failed to encode SPKI: {e}")))?;
        public_key_from_spki_der(&spki_der)
    }

    pub fn not_before(&self) -> Result<DateTime<Utc>, Error> {
        time_to_chrono(&self.cert.tbs_certificate.validity.not_before)
    }

    pub fn not_after(&self) -> Result<DateTime<Utc>, Error> {
        time_to_chrono(&self.cert.tbs_certificate.validity.not_after)
    }

    /// Check that `at` lies within the validity period.
    pub fn check_validity(&self, at: DateTime<Utc>) -> Result<(), Error> {
        let not_before = self.not_before()?;
        if at < not_before {
            return Err(Error::Certificate(format!(
                "certificate {} is not yet valid (notBefore: {not_before})",
                self.subject()
            )));
        }
        let not_after = self.not_after()?;
        if at > not_after {
            return Err(Error::Certificate(format!(
                "certificate {} has expired (notAfter: {not_after})",
                self.subject()
            )));
        }
        Ok(())
    }

    /// OCSP responder URLs from the Authority Information Access extension.
    pub fn ocsp_urls(&self) -> Vec<String> {
        let Some(exts) = &self.cert.tbs_certificate.extensions else {
            return Vec::new();
        };
        let mut urls = Vec::new();
        for ext in exts.iter().filter(|e| e.extn_id == ID_PE_AUTHORITY_INFO_ACCESS) {
            let Ok(aia) = AuthorityInfoAccessSyntax::from_der(ext.extn_value.as_bytes()) else {
                tracing::warn!(subject = %self.subject(), "malformed AuthorityInfoAccess extension");
                continue;
            };
            for desc in aia.0.iter().filter(|d| d.access_method == ID_AD_OCSP) {
                if let GeneralName::UniformResourceIdentifier(uri) = &desc.access_location {
                    urls.push(uri.to_string());
                }
            }
        }
        urls
    }
}

/// Convert an ASN.1 INTEGER (big-endian, possibly with a leading sign byte)
/// to an unsigned decimal string.
pub fn serial_to_decimal(bytes: &[u8]) -> String {
    rsa::BigUint::from_bytes_be(bytes).to_string()
}

/// Convert an X.509 `Time` to a UTC timestamp.
pub fn time_to_chrono(t: &Time) -> Result<DateTime<Utc>, Error> {
    let secs = i64::try_from(t.to_unix_duration().as_secs())
        .map_err(|_| Error::Certificate("time out of range".into()))?;
    DateTime::<Utc>::from_timestamp(secs, 0)
        .ok_or_else(|| Error::Certificate("time out of range".into()))
}

/// Build a public [`SigningKey`] from SubjectPublicKeyInfo DER.
pub fn public_key_from_spki_der(spki_der: &[u8]) -> Result<SigningKey, Error> {
    if let Ok(pk) = rsa::RsaPublicKey::from_public_key_der(spki_der) {
        return Ok(SigningKey::RsaPublic(pk));
    }
    if let Ok(vk) = p256::ecdsa::VerifyingKey::from_public_key_der(spki_der) {
        return Ok(SigningKey::EcP256Public(vk));
    }
    if let Ok(vk) = p384::ecdsa::VerifyingKey::from_public_key_der(spki_der) {
        return Ok(SigningKey::EcP384Public(vk));
    }
    Err(Error::Key("unsupported public key algorithm in SPKI".into()))
}

// ── Signature verification ───────────────────────────────────────────

const RSA_ENCRYPTION: &str = "1.2.840.113549.1.1.1";
const SHA1_RSA: &str = "1.2.840.113549.1.1.5";
const SHA224_RSA: &str = "1.2.840.113549.1.1.14";
const SHA256_RSA: &str = "1.2.840.113549.1.1.11";
const SHA384_RSA: &str = "1.2.840.113549.1.1.12";
const SHA512_RSA: &str = "1.2.840.113549.1.1.13";
const ECDSA_SHA256: &str = "1.2.840.10045.4.3.2";
const ECDSA_SHA384: &str = "1.2.840.10045.4.3.3";

const CURVE_P256: &str = "1.2.840.10045.3.1.7";
const CURVE_P384: &str = "1.3.132.0.34";

/// Map a digest OID to the matching `sha*WithRSAEncryption` OID.
fn rsa_alg_for_digest(digest_oid: &str) -> Option<&'static str> {
    Some(match digest_oid {
        "1.3.14.3.2.26" => SHA1_RSA,
        "2.16.840.1.101.3.4.2.4" => SHA224_RSA,
        "2.16.840.1.101.3.4.2.1" => SHA256_RSA,
        "2.16.840.1.101.3.4.2.2" => SHA384_RSA,
        "2.16.840.1.101.3.4.2.3" => SHA512_RSA,
        _ => return None,
    })
}

/// Verify a DER-world signature (certificate, CRL, CMS SignerInfo).
///
/// `digest_oid` is only consulted when the signature algorithm is plain
/// `rsaEncryption`, as CMS signer infos commonly carry it.
pub fn verify_signature(
    issuer_spki: &SubjectPublicKeyInfoOwned,
    sig_alg: &ObjectIdentifier,
    digest_oid: Option<&ObjectIdentifier>,
    data: &[u8],
    signature: &[u8],
) -> Result<(), Error> {
    let spki_der = issuer_spki
        .to_der()
        .map_err(|e| Error::Certificate(format!("failed to encode issuer SPKI: {e}")))?;

    let mut oid = sig_alg.to_string();
    if oid == RSA_ENCRYPTION {
        oid = digest_oid
            .and_then(|d| rsa_alg_for_digest(&d.to_string()))
            .ok_or_else(|| {
                Error::Certificate("rsaEncryption signature without a supported digest".into())
            })?
            .to_string();
    }

    match oid.as_str() {
        SHA1_RSA => verify_rsa::<sha1::Sha1>(&spki_der, data, signature),
        SHA224_RSA => verify_rsa::<sha2::Sha224>(&spki_der, data, signature),
        SHA256_RSA => verify_rsa::<sha2::Sha256>(&spki_der, data, signature),
        SHA384_RSA => verify_rsa::<sha2::Sha384>(&spki_der, data, signature),
        SHA512_RSA => verify_rsa::<sha2::Sha512>(&spki_der, data, signature),
        ECDSA_SHA256 | ECDSA_SHA384 => verify_ecdsa(issuer_spki, &spki_der, data, signature),
        other => Err(Error::Certificate(format!(
            "unsupported signature algorithm: {other}"
        ))),
    }
}

fn verify_rsa<D>(spki_der: &[u8], data: &[u8], signature: &[u8]) -> Result<(), Error>
where
    D: digest::Digest + const_oid::AssociatedOid,
    rsa::pkcs1v15::VerifyingKey<D>: signature::Verifier<rsa::pkcs1v15::Signature>,
{
    use signature::Verifier;

    let public_key = rsa::RsaPublicKey::from_public_key_der(spki_der)
        .map_err(|e| Error::Certificate(format!("invalid RSA public key: {e}")))?;
    let sig = rsa::pkcs1v15::Signature::try_from(signature)
        .map_err(|e| Error::Certificate(format!("invalid RSA signature: {e}")))?;
    rsa::pkcs1v15::VerifyingKey::<D>::new(public_key)
        .verify(data, &sig)
        .map_err(|e| Error::SignatureInvalid(format!("RSA signature check failed: {e}")))
}

fn verify_ecdsa(
    spki: &SubjectPublicKeyInfoOwned,
    spki_der: &[u8],
    data: &[u8],
    signature: &[u8],
) -> Result<(), Error> {
    use signature::Verifier;

    let curve = spki
        .algorithm
        .parameters
        .as_ref()
        .and_then(|p| p.decode_as::<ObjectIdentifier>().ok())
        .map(|oid| oid.to_string())
        .unwrap_or_default();

    match curve.as_str() {
        CURVE_P256 => {
            let vk = p256::ecdsa::VerifyingKey::from_public_key_der(spki_der)
                .map_err(|e| Error::Certificate(format!("invalid EC P-256 key: {e}")))?;
            let sig = p256::ecdsa::DerSignature::from_bytes(signature)
                .map_err(|e| Error::Certificate(format!("invalid ECDSA signature: {e}")))?;
            vk.verify(data, &sig)
                .map_err(|e| Error::SignatureInvalid(format!("ECDSA signature check failed: {e}")))
        }
        CURVE_P384 => {
            let vk = p384::ecdsa::VerifyingKey::from_public_key_der(spki_der)
                .map_err(|e| Error::Certificate(format!("invalid EC P-384 key: {e}")))?;
            let sig = p384::ecdsa::DerSignature::from_bytes(signature)
                .map_err(|e| Error::Certificate(format!("invalid ECDSA signature: {e}")))?;
            vk.verify(data, &sig)
                .map_err(|e| Error::SignatureInvalid(format!("ECDSA signature check failed: {e}")))
        }
        other => Err(Error::Certificate(format!("unsupported EC curve: {other}"))),
    }
}
