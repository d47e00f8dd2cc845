#![forbid(unsafe_code)]

//! Digest (hash) algorithm implementations.

use const_oid::db::rfc5912;
use const_oid::ObjectIdentifier;
use digest::Digest;
use ulriksdal_core::{algorithm, Error};

/// Trait for digest algorithms.
pub trait DigestAlgorithm: Send {
    /// Feed data into the hash.
    fn update(&mut self, data: &[u8]);
    /// Finalize and return the hash value.
    fn finalize(self: Box<Self>) -> Vec<u8>;
    /// Algorithm URI.
    fn uri(&self) -> &'static str;
}

/// Create a digest algorithm from its URI.
pub fn from_uri(uri: &str) -> Result<Box<dyn DigestAlgorithm>, Error> {
    match uri {
        algorithm::SHA1 => Ok(Box::new(Sha1Digest::new())),
        algorithm::SHA224 => Ok(Box::new(Sha224Digest::new())),
        algorithm::SHA256 => Ok(Box::new(Sha256Digest::new())),
        algorithm::SHA384 => Ok(Box::new(Sha384Digest::new())),
        algorithm::SHA512 => Ok(Box::new(Sha512Digest::new())),
        algorithm::SHA3_256 => Ok(Box::new(Sha3_256Digest::new())),
        algorithm::SHA3_384 => Ok(Box::new(Sha3_384Digest::new())),
        algorithm::SHA3_512 => Ok(Box::new(Sha3_512Digest::new())),
        _ => Err(Error::UnsupportedAlgorithm(format!("digest algorithm: {uri}"))),
    }
}

/// Compute a digest in one shot.
pub fn digest(uri: &str, data: &[u8]) -> Result<Vec<u8>, Error> {
    let mut hasher = from_uri(uri)?;
    hasher.update(data);
    Ok(hasher.finalize())
}

/// Digest a sequence of byte slices as if concatenated.
pub fn digest_parts<'a>(uri: &str, parts: impl IntoIterator<Item = &'a [u8]>) -> Result<Vec<u8>, Error> {
    let mut hasher = from_uri(uri)?;
    for part in parts {
        hasher.update(part);
    }
    Ok(hasher.finalize())
}

// SHA3 arcs are not in const-oid's rfc5912 module
const ID_SHA3_256: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.8");
const ID_SHA3_384: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.9");
const ID_SHA3_512: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.10");

const OID_TABLE: [(&str, ObjectIdentifier); 8] = [
    (algorithm::SHA1, rfc5912::ID_SHA_1),
    (algorithm::SHA224, rfc5912::ID_SHA_224),
    (algorithm::SHA256, rfc5912::ID_SHA_256),
    (algorithm::SHA384, rfc5912::ID_SHA_384),
    (algorithm::SHA512, rfc5912::ID_SHA_512),
    (algorithm::SHA3_256, ID_SHA3_256),
    (algorithm::SHA3_384, ID_SHA3_384),
    (algorithm::SHA3_512, ID_SHA3_512),
];

/// The ASN.1 algorithm identifier for a digest URI.
pub fn oid_for_uri(uri: &str) -> Result<ObjectIdentifier, Error> {
    OID_TABLE
        .iter()
        .find(|(u, _)| *u == uri)
        .map(|(_, oid)| *oid)
        .ok_or_else(|| Error::UnsupportedAlgorithm(format!("digest algorithm: {uri}")))
}

/// The digest URI for an ASN.1 algorithm identifier.
pub fn uri_for_oid(oid: &ObjectIdentifier) -> Result<&'static str, Error> {
    OID_TABLE
        .iter()
        .find(|(_, o)| o == oid)
        .map(|(u, _)| *u)
        .ok_or_else(|| Error::UnsupportedAlgorithm(format!("digest OID: {oid}")))
}

// ── Concrete implementations ─────────────────────────────────────────

macro_rules! impl_digest {
    ($name:ident, $hasher:ty, $uri:expr) => {
        struct $name {
            inner: $hasher,
        }

        impl $name {
            fn new() -> Self {
                Self {
                    inner: <$hasher>::new(),
                }
            }
        }

        impl DigestAlgorithm for $name {
            fn update(&mut self, data: &[u8]) {
                Digest::update(&mut self.inner, data);
            }

            fn finalize(self: Box<Self>) -> Vec<u8> {
                Digest::finalize(self.inner).to_vec()
            }

            fn uri(&self) -> &'static str {
                $uri
            }
        }
    };
}

impl_digest!(Sha1Digest, sha1::Sha1, algorithm::SHA1);
impl_digest!(Sha224Digest, sha2::Sha224, algorithm::SHA224);
impl_digest!(Sha256Digest, sha2::Sha256, algorithm::SHA256);
impl_digest!(Sha384Digest, sha2::Sha384, algorithm::SHA384);
impl_digest!(Sha512Digest, sha2::Sha512, algorithm::SHA512);
impl_digest!(Sha3_256Digest, sha3::Sha3_256, algorithm::SHA3_256);
impl_digest!(Sha3_384Digest, sha3::Sha3_384, algorithm::SHA3_384);
impl_digest!(Sha3_512Digest, sha3::Sha3_512, algorithm::SHA3_512);

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    #[test]
    fn test_sha256() {
        let result = digest(algorithm::SHA256, b"hello").unwrap();
        assert_eq!(
            hex(&result),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_parts_equal_concatenation() {
        let whole = digest(algorithm::SHA384, b"hello world").unwrap();
        let parts = digest_parts(algorithm::SHA384, [&b"hello "[..], &b"world"[..]]).unwrap();
        assert_eq!(whole, parts);
    }

    #[test]
    fn test_output_lengths() {
        assert_eq!(digest(algorithm::SHA1, b"x").unwrap().len(), 20);
        assert_eq!(digest(algorithm::SHA512, b"x").unwrap().len(), 64);
        assert_eq!(digest(algorithm::SHA3_256, b"x").unwrap().len(), 32);
    }

    #[test]
    fn test_oid_mapping() {
        let oid = oid_for_uri(algorithm::SHA256).unwrap();
        assert_eq!(oid.to_string(), "2.16.840.1.101.3.4.2.1");
        assert_eq!(uri_for_oid(&oid).unwrap(), algorithm::SHA256);
        assert!(oid_for_uri("urn:md5").is_err());
    }
}
