#![forbid(unsafe_code)]

//! Revocation and time-stamping collaborators.
//!
//! The upgrade pipeline talks to the outside world through the traits
//! defined here: [`OcspClient`] for certificate status queries and
//! [`TimestampClient`] for RFC 3161 tokens. CRLs are supplied up front as
//! an in-memory [`CrlList`]. [`TimestampToken`] parses and verifies the
//! tokens a time-stamping authority returns.

pub mod authority;
pub mod crl;
pub mod ocsp;
pub mod tsp;

pub use authority::LocalTimestampAuthority;
pub use crl::{Crl, CrlList, RevocationReason, RevokedEntry};
pub use ocsp::{CertStatus, OcspClient, OcspResponse};
pub use tsp::{TimestampClient, TimestampToken};
