#![forbid(unsafe_code)]

//! Key types and data structures.

use crate::x509::X509Certificate;
use ulriksdal_crypto::SigningKey;

/// The underlying asymmetric key data.
pub enum KeyData {
    Rsa {
        private: Option<rsa::RsaPrivateKey>,
        public: rsa::RsaPublicKey,
    },
    EcP256 {
        private: Option<p256::ecdsa::SigningKey>,
        public: p256::ecdsa::VerifyingKey,
    },
    EcP384 {
        private: Option<p384::ecdsa::SigningKey>,
        public: p384::ecdsa::VerifyingKey,
    },
}

impl std::fmt::Debug for KeyData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (kind, private) = match self {
            Self::Rsa { private, .. } => ("RSA", private.is_some()),
            Self::EcP256 { private, .. } => ("EC P-256", private.is_some()),
            Self::EcP384 { private, .. } => ("EC P-384", private.is_some()),
        };
        if private {
            write!(f, "{kind} private+public key")
        } else {
            write!(f, "{kind} public key")
        }
    }
}

/// A signer's key, optionally bound to its certificate and chain.
#[derive(Debug)]
pub struct Key {
    /// Optional name for diagnostics.
    pub name: Option<String>,
    pub data: KeyData,
    /// Leaf certificate followed by any intermediates shipped with it.
    pub x509_chain: Vec<X509Certificate>,
}

impl Key {
    pub fn new(data: KeyData) -> Self {
        Self {
            name: None,
            data,
            x509_chain: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attach the signing certificate (placed first in the chain).
    pub fn with_certificate(mut self, cert: X509Certificate) -> Self {
        self.x509_chain.insert(0, cert);
        self
    }

    /// The signing certificate, if one is attached.
    pub fn certificate(&self) -> Option<&X509Certificate> {
        self.x509_chain.first()
    }

    pub fn has_private(&self) -> bool {
        match &self.data {
            KeyData::Rsa { private, .. } => private.is_some(),
            KeyData::EcP256 { private, .. } => private.is_some(),
            KeyData::EcP384 { private, .. } => private.is_some(),
        }
    }

    /// Convert to a `SigningKey` for use with the signature algorithms.
    /// Prefers the private half when present.
    pub fn to_signing_key(&self) -> SigningKey {
        match &self.data {
            KeyData::Rsa { private: Some(pk), .. } => SigningKey::Rsa(pk.clone()),
            KeyData::Rsa { public, .. } => SigningKey::RsaPublic(public.clone()),
            KeyData::EcP256 { private: Some(sk), .. } => SigningKey::EcP256(sk.clone()),
            KeyData::EcP256 { public, .. } => SigningKey::EcP256Public(*public),
            KeyData::EcP384 { private: Some(sk), .. } => SigningKey::EcP384(sk.clone()),
            KeyData::EcP384 { public, .. } => SigningKey::EcP384Public(*public),
        }
    }

    /// Default XML-DSig signature method for this key type.
    pub fn default_signature_method(&self) -> &'static str {
        use ulriksdal_core::algorithm;
        match &self.data {
            KeyData::Rsa { .. } => algorithm::RSA_SHA256,
            KeyData::EcP256 { .. } => algorithm::ECDSA_SHA256,
            KeyData::EcP384 { .. } => algorithm::ECDSA_SHA384,
        }
    }
}
