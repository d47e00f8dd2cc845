#![forbid(unsafe_code)]

//! XML Digital Signature (XML-DSig) building blocks.
//!
//! Models `ds:Reference` and `ds:SignedInfo`, dereferences and digests
//! references, canonicalizes `SignedInfo` with the namespaces in scope at
//! the signature, fills signature templates and verifies plain XML-DSig
//! signatures.

pub mod context;
pub mod keyinfo;
pub mod reference;
pub mod sign;
pub mod signed_info;
pub mod verify;

pub use context::DsigContext;
pub use reference::Reference;
pub use signed_info::SignedInfo;
pub use verify::VerifyResult;

/// Standard base64, as used by `DigestValue` and `SignatureValue`.
pub fn encode_base64(data: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(data)
}

/// Decode base64 element content, ignoring embedded whitespace.
pub fn decode_base64(text: &str, what: &str) -> Result<Vec<u8>, ulriksdal_core::Error> {
    use base64::Engine;
    let clean: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(clean)
        .map_err(|e| ulriksdal_core::Error::Base64(format!("{what}: {e}")))
}
