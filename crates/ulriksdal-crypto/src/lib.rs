#![forbid(unsafe_code)]

//! Cryptographic algorithms for the ulriksdal XAdES library.
//!
//! Digests and signature algorithms are looked up by the URI that appears
//! in `DigestMethod` / `SignatureMethod`. Digest URIs also map to the
//! ASN.1 object identifiers used inside RFC 3161 message imprints and
//! certificate identifiers.

pub mod digest;
pub mod sign;

pub use digest::DigestAlgorithm;
pub use sign::{SignatureAlgorithm, SigningKey};
