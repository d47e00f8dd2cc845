#![forbid(unsafe_code)]

//! XAdES (ETSI TS 101 903) signatures over XML-DSig.
//!
//! [`SignatureEngine`] builds signatures in five packagings, co-signs and
//! counter-signs. [`SignedDocument`] holds the signed XML, keeps an
//! index of every signature in it and runs the validation rule battery.
//! [`Upgrader`] raises a signature from XAdES-BES to -T, -XL and -A by
//! appending timestamps and revocation evidence.
//!
//! The document text is the source of truth. Every mutation splices new
//! elements into the text and re-indexes, so bytes covered by existing
//! digests never change.

pub mod document;
pub mod engine;
pub mod ids;
pub mod level;
pub mod packaging;
pub mod params;
pub mod properties;
pub mod signature;
pub mod timestamp;
pub mod upgrade;
pub mod validation;

pub use document::SignedDocument;
pub use engine::{PendingSignature, SignatureContent, SignatureEngine, SigningMode};
pub use level::SignatureLevel;
pub use params::{Prefixes, SignaturePackaging, SignatureParameters, SigningCertificateVersion};
pub use signature::Signature;
pub use upgrade::{UpgradeParameters, Upgrader};
pub use validation::{ValidationFlags, ValidationOptions, ValidationResult};
