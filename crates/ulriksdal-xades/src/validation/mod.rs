#![forbid(unsafe_code)]

//! The validation rule battery.
//!
//! Each bit of [`ValidationFlags`] gates one independent rule over a
//! loaded signature. Rules run in ascending bit order and the first
//! failure stops the run with [`Error::Validation`] naming the rule.
//! A signature without qualifying properties is plain XML-DSig and only
//! gets the cryptographic check.

mod flags;
mod rules;
mod schema;

pub use flags::ValidationFlags;

use crate::document::SignedDocument;
use roxmltree::Document;
use ulriksdal_core::Error;
use ulriksdal_dsig::DsigContext;

/// What to check and with which dereferencing context.
#[derive(Debug, Clone, Default)]
pub struct ValidationOptions {
    pub flags: ValidationFlags,
    /// Overrides the context the document was loaded with.
    pub context: Option<DsigContext>,
}

/// Outcome of [`SignedDocument::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub message: String,
    /// Name of the failing rule, when a rule failed.
    pub rule: Option<&'static str>,
    /// The underlying error, when the failure wraps one.
    pub cause: Option<String>,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            message: "signature is valid".to_owned(),
            rule: None,
            cause: None,
        }
    }

    pub fn from_error(error: &Error) -> Self {
        let (rule, cause) = match error {
            Error::Validation { rule, message } => (Some(*rule), Some(message.clone())),
            other => (None, std::error::Error::source(other).map(ToString::to_string)),
        };
        Self {
            is_valid: false,
            message: error.to_string(),
            rule,
            cause,
        }
    }
}

/// The parsed document shared by every rule of one run.
pub(crate) struct Input<'a, 'i> {
    pub doc: &'a Document<'i>,
    pub document: &'a SignedDocument,
    pub ctx: &'a DsigContext,
}

/// Run the rules selected by `flags` against signature `key`.
pub(crate) fn check(
    document: &SignedDocument,
    key: &str,
    flags: ValidationFlags,
    ctx: &DsigContext,
) -> Result<(), Error> {
    let doc = ulriksdal_xml::parse(document.xml())?;
    let input = Input {
        doc: &doc,
        document,
        ctx,
    };
    check_at(&input, key, flags)
}

/// One signature of an already parsed document. Counter-signatures
/// come back through here.
pub(crate) fn check_at(input: &Input<'_, '_>, key: &str, flags: ValidationFlags) -> Result<(), Error> {
    let signature = &input.document.entry(key)?.signature;
    let node = input.document.signature_node(input.doc, key)?;
    let flags = if signature.is_xades() {
        flags
    } else {
        flags & ValidationFlags::CHECK_XMLDSIG_SIGNATURE
    };

    let scope = rules::Scope {
        input,
        node,
        signature,
        key,
        flags,
    };
    for rule in rules::RULES.iter().filter(|r| flags.contains(r.flag)) {
        tracing::debug!(rule = rule.name, signature = key, "running rule");
        (rule.check)(&scope).map_err(|e| match e {
            Error::Validation { .. } => e,
            other => Error::Validation {
                rule: rule.name,
                message: other.to_string(),
            },
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_from_validation_error() {
        let e = Error::Validation {
            rule: "CheckSameCertificate",
            message: "certificate differs".into(),
        };
        let r = ValidationResult::from_error(&e);
        assert!(!r.is_valid);
        assert_eq!(r.rule, Some("CheckSameCertificate"));
        assert_eq!(r.cause.as_deref(), Some("certificate differs"));
        assert!(r.message.contains("CheckSameCertificate"));
    }

    #[test]
    fn test_result_keeps_wrapped_cause() {
        let e = Error::Timestamp("no token".into()).in_upgrade("while inserting the timestamp");
        let r = ValidationResult::from_error(&e);
        assert_eq!(r.rule, None);
        assert_eq!(r.cause.as_deref(), Some("timestamp error: no token"));
        assert!(ValidationResult::valid().is_valid);
    }

    #[test]
    fn test_every_flag_has_one_rule() {
        let mut seen = ValidationFlags::NONE;
        for rule in rules::RULES.iter() {
            assert!((seen & rule.flag).is_empty(), "{} registered twice", rule.name);
            seen |= rule.flag;
        }
        assert_eq!(seen, ValidationFlags::ALL_CHECKS);
        let bits: Vec<u32> = rules::RULES.iter().map(|r| r.flag.bits()).collect();
        let mut sorted = bits.clone();
        sorted.sort_unstable();
        assert_eq!(bits, sorted);
    }
}
