#![forbid(unsafe_code)]

//! Key material and certificates for the ulriksdal XAdES library.
//!
//! Loads RSA and EC keys from PEM/DER, wraps X.509 certificates with the
//! accessors signature properties need (digest, issuer/serial, AIA OCSP
//! locations) and builds issuer chains from a certificate pool.

pub mod chain;
pub mod key;
pub mod loader;
pub mod x509;

pub use chain::{ChainBuilder, IssuerChainBuilder};
pub use key::{Key, KeyData};
pub use x509::X509Certificate;
