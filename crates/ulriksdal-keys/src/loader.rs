#![forbid(unsafe_code)]

//! Key loading from PEM and DER (PKCS#1, PKCS#8, SPKI, X.509).

use crate::key::{Key, KeyData};
use crate::x509::X509Certificate;
use ulriksdal_core::Error;

/// Load an RSA private key from PEM data (PKCS#8 or PKCS#1).
pub fn load_rsa_private_pem(pem_data: &[u8]) -> Result<Key, Error> {
    use pkcs8::DecodePrivateKey;
    let pem_str = pem_str(pem_data)?;

    if let Ok(pk) = rsa::RsaPrivateKey::from_pkcs8_pem(pem_str) {
        return Ok(rsa_key(pk));
    }

    use pkcs1::DecodeRsaPrivateKey;
    let pk = rsa::RsaPrivateKey::from_pkcs1_pem(pem_str)
        .map_err(|e| Error::Key(format!("failed to parse RSA private key PEM: {e}")))?;
    Ok(rsa_key(pk))
}

/// Load an EC P-256 private key from PKCS#8 PEM data.
pub fn load_ec_p256_private_pem(pem_data: &[u8]) -> Result<Key, Error> {
    use pkcs8::DecodePrivateKey;
    let sk = p256::ecdsa::SigningKey::from_pkcs8_pem(pem_str(pem_data)?)
        .map_err(|e| Error::Key(format!("failed to parse EC P-256 private key: {e}")))?;
    let public = *sk.verifying_key();
    Ok(Key::new(KeyData::EcP256 {
        private: Some(sk),
        public,
    }))
}

/// Load an EC P-384 private key from PKCS#8 PEM data.
pub fn load_ec_p384_private_pem(pem_data: &[u8]) -> Result<Key, Error> {
    use pkcs8::DecodePrivateKey;
    let sk = p384::ecdsa::SigningKey::from_pkcs8_pem(pem_str(pem_data)?)
        .map_err(|e| Error::Key(format!("failed to parse EC P-384 private key: {e}")))?;
    let public = *sk.verifying_key();
    Ok(Key::new(KeyData::EcP384 {
        private: Some(sk),
        public,
    }))
}

/// Load a private key from PKCS#8 DER bytes. Tries RSA, then P-256, then P-384.
pub fn load_private_key_pkcs8_der(der: &[u8]) -> Result<Key, Error> {
    use pkcs8::DecodePrivateKey;

    if let Ok(pk) = rsa::RsaPrivateKey::from_pkcs8_der(der) {
        return Ok(rsa_key(pk));
    }
    if let Ok(sk) = p256::ecdsa::SigningKey::from_pkcs8_der(der) {
        let public = *sk.verifying_key();
        return Ok(Key::new(KeyData::EcP256 {
            private: Some(sk),
            public,
        }));
    }
    if let Ok(sk) = p384::ecdsa::SigningKey::from_pkcs8_der(der) {
        let public = *sk.verifying_key();
        return Ok(Key::new(KeyData::EcP384 {
            private: Some(sk),
            public,
        }));
    }
    Err(Error::Key(
        "unable to parse PKCS#8 DER private key (tried RSA, P-256, P-384)".into(),
    ))
}

/// Auto-detect the key type of PEM private key data.
pub fn load_private_key_pem(pem_data: &[u8]) -> Result<Key, Error> {
    let (label, der) = pem_rfc7468::decode_vec(pem_str(pem_data)?.trim().as_bytes())
        .map_err(|e| Error::Key(format!("failed to decode PEM: {e}")))?;
    match label {
        "PRIVATE KEY" => load_private_key_pkcs8_der(&der),
        "RSA PRIVATE KEY" => load_rsa_private_pem(pem_data),
        other => Err(Error::Key(format!("unsupported PEM label: {other}"))),
    }
}

/// Load a public key from raw SubjectPublicKeyInfo DER bytes.
pub fn load_spki_der(spki_der: &[u8]) -> Result<Key, Error> {
    use spki::DecodePublicKey;

    if let Ok(public) = rsa::RsaPublicKey::from_public_key_der(spki_der) {
        return Ok(Key::new(KeyData::Rsa {
            private: None,
            public,
        }));
    }
    if let Ok(public) = p256::ecdsa::VerifyingKey::from_public_key_der(spki_der) {
        return Ok(Key::new(KeyData::EcP256 {
            private: None,
            public,
        }));
    }
    if let Ok(public) = p384::ecdsa::VerifyingKey::from_public_key_der(spki_der) {
        return Ok(Key::new(KeyData::EcP384 {
            private: None,
            public,
        }));
    }
    Err(Error::Key("unsupported public key algorithm in SPKI DER".into()))
}

/// Load a verification key from a DER-encoded X.509 certificate.
pub fn load_x509_cert_der(data: &[u8]) -> Result<Key, Error> {
    let cert = X509Certificate::from_der(data)?;
    public_key_of(cert)
}

/// Load a verification key from a PEM-encoded X.509 certificate.
pub fn load_x509_cert_pem(pem_data: &[u8]) -> Result<Key, Error> {
    let cert = X509Certificate::from_pem(pem_str(pem_data)?.trim().as_bytes())?;
    public_key_of(cert)
}

/// Load a signer: a PEM private key bound to its PEM certificate.
///
/// Fails when the certificate does not carry the private key's public half.
pub fn load_signing_identity(key_pem: &[u8], cert_pem: &[u8]) -> Result<Key, Error> {
    let key = load_private_key_pem(key_pem)?;
    let cert = X509Certificate::from_pem(cert_pem)?;
    let cert_key = public_key_of(cert.clone())?;
    let matches = match (&key.data, &cert_key.data) {
        (KeyData::Rsa { public: a, .. }, KeyData::Rsa { public: b, .. }) => a == b,
        (KeyData::EcP256 { public: a, .. }, KeyData::EcP256 { public: b, .. }) => a == b,
        (KeyData::EcP384 { public: a, .. }, KeyData::EcP384 { public: b, .. }) => a == b,
        _ => false,
    };
    if !matches {
        return Err(Error::Key(format!(
            "private key does not match certificate {}",
            cert.subject()
        )));
    }
    Ok(key.with_certificate(cert))
}

fn public_key_of(cert: X509Certificate) -> Result<Key, Error> {
    use der::Encode;
    let spki_der = cert
        .spki()
        .to_der()
        .map_err(|e| Error::Key(format!("failed to encode SPKI: {e}")))?;
    Ok(load_spki_der(&spki_der)?.with_certificate(cert))
}

fn rsa_key(pk: rsa::RsaPrivateKey) -> Key {
    let public = pk.to_public_key();
    Key::new(KeyData::Rsa {
        private: Some(pk),
        public,
    })
}

fn pem_str(pem_data: &[u8]) -> Result<&str, Error> {
    std::str::from_utf8(pem_data).map_err(|e| Error::Key(format!("invalid PEM encoding: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(name: &str) -> Vec<u8> {
        let path = format!("{}/../../test-data/pki/{name}", env!("CARGO_MANIFEST_DIR"));
        std::fs::read(path).unwrap()
    }

    #[test]
    fn test_load_rsa_identity() {
        let key =
            load_signing_identity(&fixture("signer-a.key.pem"), &fixture("signer-a.pem")).unwrap();
        assert!(key.has_private());
        assert!(matches!(key.data, KeyData::Rsa { .. }));
        assert_eq!(key.certificate().unwrap().serial_decimal(), "4096");
    }

    #[test]
    fn test_load_ec_identity() {
        let key =
            load_signing_identity(&fixture("signer-ec.key.pem"), &fixture("signer-ec.pem")).unwrap();
        assert!(matches!(key.data, KeyData::EcP256 { .. }));
        assert_eq!(
            key.default_signature_method(),
            ulriksdal_core::algorithm::ECDSA_SHA256
        );
    }

    #[test]
    fn test_mismatched_identity_rejected() {
        let err = load_signing_identity(&fixture("signer-a.key.pem"), &fixture("signer-b.pem"))
            .unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }

    #[test]
    fn test_certificate_key_is_public_only() {
        let key = load_x509_cert_der(&fixture("signer-a.der")).unwrap();
        assert!(!key.has_private());
        assert!(!key.to_signing_key().is_private());
        let pem_key = load_x509_cert_pem(&fixture("signer-a.pem")).unwrap();
        assert_eq!(key.certificate(), pem_key.certificate());
    }
}
