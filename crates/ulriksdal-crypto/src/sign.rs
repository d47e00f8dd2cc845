#![forbid(unsafe_code)]

//! Signature algorithm implementations (RSA PKCS#1 v1.5, RSA-PSS, ECDSA).
//!
//! ECDSA values use the XML-DSig `r || s` encoding, not DER.

use const_oid::AssociatedOid;
use digest::{Digest, FixedOutputReset};
use signature::SignatureEncoding;
use ulriksdal_core::{algorithm, Error};

/// Key material for signature operations.
#[derive(Clone)]
pub enum SigningKey {
    Rsa(rsa::RsaPrivateKey),
    RsaPublic(rsa::RsaPublicKey),
    EcP256(p256::ecdsa::SigningKey),
    EcP256Public(p256::ecdsa::VerifyingKey),
    EcP384(p384::ecdsa::SigningKey),
    EcP384Public(p384::ecdsa::VerifyingKey),
}

impl SigningKey {
    /// Whether the key can produce signatures.
    pub fn is_private(&self) -> bool {
        matches!(self, Self::Rsa(_) | Self::EcP256(_) | Self::EcP384(_))
    }

    /// The public half of this key.
    pub fn to_public(&self) -> SigningKey {
        match self {
            Self::Rsa(k) => Self::RsaPublic(k.to_public_key()),
            Self::EcP256(k) => Self::EcP256Public(*k.verifying_key()),
            Self::EcP384(k) => Self::EcP384Public(*k.verifying_key()),
            other => other.clone(),
        }
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Rsa(_) => "RSA private key",
            Self::RsaPublic(_) => "RSA public key",
            Self::EcP256(_) => "EC P-256 private key",
            Self::EcP256Public(_) => "EC P-256 public key",
            Self::EcP384(_) => "EC P-384 private key",
            Self::EcP384Public(_) => "EC P-384 public key",
        };
        f.write_str(name)
    }
}

/// Trait for signature algorithms.
pub trait SignatureAlgorithm: Send {
    fn uri(&self) -> &'static str;
    fn sign(&self, key: &SigningKey, data: &[u8]) -> Result<Vec<u8>, Error>;
    fn verify(&self, key: &SigningKey, data: &[u8], signature: &[u8]) -> Result<bool, Error>;
}

/// Create a signature algorithm from its URI.
pub fn from_uri(uri: &str) -> Result<Box<dyn SignatureAlgorithm>, Error> {
    use HashType::*;
    let alg: Box<dyn SignatureAlgorithm> = match uri {
        algorithm::RSA_SHA1 => Box::new(RsaPkcs1v15 { uri: algorithm::RSA_SHA1, hash: Sha1 }),
        algorithm::RSA_SHA256 => Box::new(RsaPkcs1v15 { uri: algorithm::RSA_SHA256, hash: Sha256 }),
        algorithm::RSA_SHA384 => Box::new(RsaPkcs1v15 { uri: algorithm::RSA_SHA384, hash: Sha384 }),
        algorithm::RSA_SHA512 => Box::new(RsaPkcs1v15 { uri: algorithm::RSA_SHA512, hash: Sha512 }),

        algorithm::RSA_PSS_SHA256 => Box::new(RsaPss { uri: algorithm::RSA_PSS_SHA256, hash: Sha256 }),
        algorithm::RSA_PSS_SHA384 => Box::new(RsaPss { uri: algorithm::RSA_PSS_SHA384, hash: Sha384 }),
        algorithm::RSA_PSS_SHA512 => Box::new(RsaPss { uri: algorithm::RSA_PSS_SHA512, hash: Sha512 }),

        algorithm::ECDSA_SHA256 => Box::new(EcdsaP256),
        algorithm::ECDSA_SHA384 => Box::new(EcdsaP384),

        _ => return Err(Error::UnsupportedAlgorithm(format!("signature algorithm: {uri}"))),
    };
    Ok(alg)
}

#[derive(Debug, Clone, Copy)]
enum HashType {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

// ── RSA PKCS#1 v1.5 ─────────────────────────────────────────────────

struct RsaPkcs1v15 {
    uri: &'static str,
    hash: HashType,
}

fn pkcs1v15_sign<D: Digest + AssociatedOid>(key: &rsa::RsaPrivateKey, data: &[u8]) -> Vec<u8> {
    use signature::Signer;
    rsa::pkcs1v15::SigningKey::<D>::new(key.clone()).sign(data).to_vec()
}

fn pkcs1v15_verify<D: Digest + AssociatedOid>(
    key: &rsa::RsaPublicKey,
    data: &[u8],
    sig: &rsa::pkcs1v15::Signature,
) -> bool {
    use signature::Verifier;
    rsa::pkcs1v15::VerifyingKey::<D>::new(key.clone())
        .verify(data, sig)
        .is_ok()
}

impl SignatureAlgorithm for RsaPkcs1v15 {
    fn uri(&self) -> &'static str {
        self.uri
    }

    fn sign(&self, key: &SigningKey, data: &[u8]) -> Result<Vec<u8>, Error> {
        let SigningKey::Rsa(pk) = key else {
            return Err(Error::Key("RSA private key required".into()));
        };
        Ok(match self.hash {
            HashType::Sha1 => pkcs1v15_sign::<sha1::Sha1>(pk, data),
            HashType::Sha256 => pkcs1v15_sign::<sha2::Sha256>(pk, data),
            HashType::Sha384 => pkcs1v15_sign::<sha2::Sha384>(pk, data),
            HashType::Sha512 => pkcs1v15_sign::<sha2::Sha512>(pk, data),
        })
    }

    fn verify(&self, key: &SigningKey, data: &[u8], sig_bytes: &[u8]) -> Result<bool, Error> {
        let pubk = match key {
            SigningKey::Rsa(pk) => pk.to_public_key(),
            SigningKey::RsaPublic(pk) => pk.clone(),
            _ => return Err(Error::Key("RSA key required".into())),
        };
        let sig = rsa::pkcs1v15::Signature::try_from(sig_bytes)
            .map_err(|e| Error::Crypto(format!("invalid RSA signature: {e}")))?;
        Ok(match self.hash {
            HashType::Sha1 => pkcs1v15_verify::<sha1::Sha1>(&pubk, data, &sig),
            HashType::Sha256 => pkcs1v15_verify::<sha2::Sha256>(&pubk, data, &sig),
            HashType::Sha384 => pkcs1v15_verify::<sha2::Sha384>(&pubk, data, &sig),
            HashType::Sha512 => pkcs1v15_verify::<sha2::Sha512>(&pubk, data, &sig),
        })
    }
}

// ── RSA-PSS ──────────────────────────────────────────────────────────

struct RsaPss {
    uri: &'static str,
    hash: HashType,
}

fn pss_sign<D: Digest + FixedOutputReset>(key: &rsa::RsaPrivateKey, data: &[u8]) -> Vec<u8> {
    use signature::RandomizedSigner;
    let mut rng = rand::thread_rng();
    rsa::pss::SigningKey::<D>::new(key.clone())
        .sign_with_rng(&mut rng, data)
        .to_vec()
}

fn pss_verify<D: Digest + FixedOutputReset>(
    key: &rsa::RsaPublicKey,
    data: &[u8],
    sig: &rsa::pss::Signature,
) -> bool {
    use signature::Verifier;
    rsa::pss::VerifyingKey::<D>::new(key.clone())
        .verify(data, sig)
        .is_ok()
}

impl SignatureAlgorithm for RsaPss {
    fn uri(&self) -> &'static str {
        self.uri
    }

    fn sign(&self, key: &SigningKey, data: &[u8]) -> Result<Vec<u8>, Error> {
        let SigningKey::Rsa(pk) = key else {
            return Err(Error::Key("RSA private key required for PSS".into()));
        };
        Ok(match self.hash {
            HashType::Sha1 => pss_sign::<sha1::Sha1>(pk, data),
            HashType::Sha256 => pss_sign::<sha2::Sha256>(pk, data),
            HashType::Sha384 => pss_sign::<sha2::Sha384>(pk, data),
            HashType::Sha512 => pss_sign::<sha2::Sha512>(pk, data),
        })
    }

    fn verify(&self, key: &SigningKey, data: &[u8], sig_bytes: &[u8]) -> Result<bool, Error> {
        let pubk = match key {
            SigningKey::Rsa(pk) => pk.to_public_key(),
            SigningKey::RsaPublic(pk) => pk.clone(),
            _ => return Err(Error::Key("RSA key required for PSS".into())),
        };
        let sig = rsa::pss::Signature::try_from(sig_bytes)
            .map_err(|e| Error::Crypto(format!("invalid RSA-PSS signature: {e}")))?;
        Ok(match self.hash {
            HashType::Sha1 => pss_verify::<sha1::Sha1>(&pubk, data, &sig),
            HashType::Sha256 => pss_verify::<sha2::Sha256>(&pubk, data, &sig),
            HashType::Sha384 => pss_verify::<sha2::Sha384>(&pubk, data, &sig),
            HashType::Sha512 => pss_verify::<sha2::Sha512>(&pubk, data, &sig),
        })
    }
}

// ── ECDSA P-256 ──────────────────────────────────────────────────────

struct EcdsaP256;

/// Convert XML-DSig ECDSA r||s to a typed Signature for P-256.
pub fn xmldsig_to_p256(rs: &[u8]) -> Result<p256::ecdsa::Signature, Error> {
    if rs.len() != 64 {
        return Err(Error::Crypto(format!(
            "P-256 signature must be 64 bytes, got {}",
            rs.len()
        )));
    }
    p256::ecdsa::Signature::from_slice(rs)
        .map_err(|e| Error::Crypto(format!("invalid P-256 signature: {e}")))
}

impl SignatureAlgorithm for EcdsaP256 {
    fn uri(&self) -> &'static str {
        algorithm::ECDSA_SHA256
    }

    fn sign(&self, key: &SigningKey, data: &[u8]) -> Result<Vec<u8>, Error> {
        use signature::Signer;
        let SigningKey::EcP256(sk) = key else {
            return Err(Error::Key("P-256 signing key required".into()));
        };
        let sig: p256::ecdsa::Signature = sk.sign(data);
        Ok(sig.to_bytes().to_vec())
    }

    fn verify(&self, key: &SigningKey, data: &[u8], sig_bytes: &[u8]) -> Result<bool, Error> {
        use signature::Verifier;
        let vk = match key {
            SigningKey::EcP256(sk) => *sk.verifying_key(),
            SigningKey::EcP256Public(vk) => *vk,
            _ => return Err(Error::Key("P-256 key required".into())),
        };
        let sig = xmldsig_to_p256(sig_bytes)?;
        Ok(vk.verify(data, &sig).is_ok())
    }
}

// ── ECDSA P-384 ──────────────────────────────────────────────────────

struct EcdsaP384;

/// Convert XML-DSig ECDSA r||s to a typed Signature for P-384.
pub fn xmldsig_to_p384(rs: &[u8]) -> Result<p384::ecdsa::Signature, Error> {
    if rs.len() != 96 {
        return Err(Error::Crypto(format!(
            "P-384 signature must be 96 bytes, got {}",
            rs.len()
        )));
    }
    p384::ecdsa::Signature::from_slice(rs)
        .map_err(|e| Error::Crypto(format!("invalid P-384 signature: {e}")))
}

impl SignatureAlgorithm for EcdsaP384 {
    fn uri(&self) -> &'static str {
        algorithm::ECDSA_SHA384
    }

    fn sign(&self, key: &SigningKey, data: &[u8]) -> Result<Vec<u8>, Error> {
        use signature::Signer;
        let SigningKey::EcP384(sk) = key else {
            return Err(Error::Key("P-384 signing key required".into()));
        };
        let sig: p384::ecdsa::Signature = sk.sign(data);
        Ok(sig.to_bytes().to_vec())
    }

    fn verify(&self, key: &SigningKey, data: &[u8], sig_bytes: &[u8]) -> Result<bool, Error> {
        use signature::Verifier;
        let vk = match key {
            SigningKey::EcP384(sk) => *sk.verifying_key(),
            SigningKey::EcP384Public(vk) => *vk,
            _ => return Err(Error::Key("P-384 key required".into())),
        };
        let sig = xmldsig_to_p384(sig_bytes)?;
        Ok(vk.verify(data, &sig).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ecdsa_p256_round_trip() {
        let sk = p256::ecdsa::SigningKey::random(&mut rand::thread_rng());
        let key = SigningKey::EcP256(sk);
        let alg = from_uri(algorithm::ECDSA_SHA256).unwrap();
        let sig = alg.sign(&key, b"signed info").unwrap();
        assert_eq!(sig.len(), 64);
        let public = key.to_public();
        assert!(!public.is_private());
        assert!(alg.verify(&public, b"signed info", &sig).unwrap());
        assert!(!alg.verify(&public, b"signed inf0", &sig).unwrap());
    }

    #[test]
    fn test_key_type_mismatch() {
        let sk = p384::ecdsa::SigningKey::random(&mut rand::thread_rng());
        let alg = from_uri(algorithm::RSA_SHA256).unwrap();
        assert!(matches!(
            alg.sign(&SigningKey::EcP384(sk), b"x"),
            Err(Error::Key(_))
        ));
    }

    #[test]
    fn test_unknown_uri() {
        assert!(matches!(
            from_uri("http://www.w3.org/2000/09/xmldsig#dsa-sha1"),
            Err(Error::UnsupportedAlgorithm(_))
        ));
    }
}
