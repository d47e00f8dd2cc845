#![forbid(unsafe_code)]

//! XAdES signatures for XML documents.
//!
//! Re-exports the member crates; the everyday types are available at
//! the top level.

pub use ulriksdal_core as core;
pub use ulriksdal_xml as xml;
pub use ulriksdal_c14n as c14n;
pub use ulriksdal_crypto as crypto;
pub use ulriksdal_keys as keys;
pub use ulriksdal_transforms as transforms;
pub use ulriksdal_dsig as dsig;
pub use ulriksdal_pki as pki;
pub use ulriksdal_xades as xades;

pub use ulriksdal_core::{Error, Result};
pub use ulriksdal_dsig::DsigContext;
pub use ulriksdal_keys::{ChainBuilder, IssuerChainBuilder, Key, X509Certificate};
pub use ulriksdal_pki::{CertStatus, CrlList, LocalTimestampAuthority, OcspClient, OcspResponse, TimestampClient};
pub use ulriksdal_xades::{
    PendingSignature, Prefixes, SignatureContent, SignatureEngine, SignatureLevel, SignaturePackaging,
    SignatureParameters, SignedDocument, SigningCertificateVersion, SigningMode, UpgradeParameters, Upgrader,
    ValidationFlags, ValidationOptions, ValidationResult,
};
