#![forbid(unsafe_code)]

/// Errors produced by the ulriksdal XAdES library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("XML parsing error: {0}")]
    XmlParse(String),

    #[error("invalid XML structure: {0}")]
    XmlStructure(String),

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("cryptographic error: {0}")]
    Crypto(String),

    #[error("key error: {0}")]
    Key(String),

    #[error("signature verification failed: {0}")]
    SignatureInvalid(String),

    #[error("digest mismatch for reference: {0}")]
    DigestMismatch(String),

    #[error("canonicalization error: {0}")]
    Canonicalization(String),

    #[error("transform error: {0}")]
    Transform(String),

    #[error("base64 decode error: {0}")]
    Base64(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("missing required element: {0}")]
    MissingElement(String),

    #[error("missing required attribute: {0}")]
    MissingAttribute(String),

    #[error("invalid URI reference: {0}")]
    InvalidUri(String),

    #[error("certificate error: {0}")]
    Certificate(String),

    /// A signature value was supplied before the signature was built.
    #[error("missing reference: {0}")]
    MissingReference(String),

    #[error("the signature is already timestamped")]
    AlreadyTimestamped,

    /// A certificate in the signer or TSA chain is revoked.
    #[error("certificate revoked: {subject} (serial {serial}) at {revoked_at}")]
    RevokedCertificate {
        subject: String,
        serial: String,
        revoked_at: String,
    },

    #[error("revocation check failed: {0}")]
    Revocation(String),

    #[error("timestamp error: {0}")]
    Timestamp(String),

    /// A named validation rule rejected the signature.
    #[error("validation rule {rule} failed: {message}")]
    Validation { rule: &'static str, message: String },

    /// Failure inside an upgrade step. `context` names the step.
    #[error("{source} {context}")]
    Upgrade {
        context: &'static str,
        #[source]
        source: Box<Error>,
    },

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Wraps `self` with the name of the upgrade step it happened in.
    pub fn in_upgrade(self, context: &'static str) -> Self {
        Error::Upgrade {
            context,
            source: Box::new(self),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upgrade_context_is_appended() {
        let e = Error::Timestamp("no token".into()).in_upgrade("while inserting the timestamp");
        assert_eq!(
            e.to_string(),
            "timestamp error: no token while inserting the timestamp"
        );
        assert!(std::error::Error::source(&e).is_some());
    }

    #[test]
    fn validation_message_names_rule() {
        let e = Error::Validation {
            rule: "ReferenceDigests",
            message: "digest of #test differs".into(),
        };
        assert!(e.to_string().contains("ReferenceDigests"));
    }
}
