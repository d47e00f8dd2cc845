#![forbid(unsafe_code)]

//! Signing configuration.

use crate::properties::{CommitmentTypeIndication, ProductionPlace, SignaturePolicy, SignerRole};
use chrono::{DateTime, Utc};
use roxmltree::Node;
use ulriksdal_c14n::C14nMode;
use ulriksdal_core::{algorithm, ns};
use ulriksdal_xml::qname;

/// Where the signed content lives relative to the signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignaturePackaging {
    /// The signature is placed inside the signed document.
    #[default]
    Enveloped,
    /// The content is placed inside the signature, in a `ds:Object`.
    Enveloping,
    /// Signature and content are siblings in one document.
    InternallyDetached,
    /// Like [`InternallyDetached`](Self::InternallyDetached), but only a
    /// SHA-256 hash of the content is embedded.
    InternallyDetachedHash,
    /// The content is outside the document, referenced by URI.
    ExternallyDetached,
}

/// Which form of the signing-certificate property to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SigningCertificateVersion {
    /// `SigningCertificate` with `IssuerSerial`.
    #[default]
    V1,
    /// `SigningCertificateV2` with DER `IssuerSerialV2`.
    V2,
}

/// Namespace prefixes used when writing.
///
/// A fresh signature uses the values configured on the engine. When an
/// existing document is extended they are read back from the signature
/// being extended with [`Prefixes::from_signature`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prefixes {
    pub ds: String,
    pub xades: String,
    pub xades141: String,
}

impl Default for Prefixes {
    fn default() -> Self {
        Self {
            ds: ns::DEFAULT_DSIG_PREFIX.to_owned(),
            xades: ns::DEFAULT_XADES_PREFIX.to_owned(),
            xades141: ns::DEFAULT_XADES141_PREFIX.to_owned(),
        }
    }
}

impl Prefixes {
    /// The prefixes a loaded signature uses. Namespaces not bound at or
    /// below `signature` keep their defaults.
    pub fn from_signature(signature: Node<'_, '_>) -> Self {
        let mut prefixes = Self::default();
        if let Some(ds) = qname::element_prefix(signature) {
            prefixes.ds = ds.to_owned();
        } else if qname::prefix_for_uri(signature, ns::DSIG).as_deref() == Some("") {
            prefixes.ds = String::new();
        }
        let qp = signature
            .descendants()
            .find(|n| ulriksdal_xml::document::is_element(*n, ns::XADES, ns::node::QUALIFYING_PROPERTIES));
        if let Some(qp) = qp {
            prefixes.xades = qname::element_prefix(qp).unwrap_or("").to_owned();
        }
        prefixes
    }

    /// `prefix:local`, or `local` for the default namespace.
    pub fn ds(&self, local: &str) -> String {
        qualify(&self.ds, local)
    }

    pub fn xades(&self, local: &str) -> String {
        qualify(&self.xades, local)
    }

    pub fn xades141(&self, local: &str) -> String {
        qualify(&self.xades141, local)
    }

    /// `xmlns:prefix` (or `xmlns`) attribute name.
    pub fn xmlns(prefix: &str) -> String {
        if prefix.is_empty() {
            "xmlns".to_owned()
        } else {
            format!("xmlns:{prefix}")
        }
    }
}

fn qualify(prefix: &str, local: &str) -> String {
    if prefix.is_empty() {
        local.to_owned()
    } else {
        format!("{prefix}:{local}")
    }
}

/// Everything that shapes one new signature.
#[derive(Debug, Clone)]
pub struct SignatureParameters {
    pub packaging: SignaturePackaging,
    pub signature_method: String,
    pub digest_method: String,
    /// Canonicalization of `SignedInfo` and of the reference transforms.
    pub c14n_mode: C14nMode,
    /// Defaults to the current time.
    pub signing_time: Option<DateTime<Utc>>,
    pub signing_certificate_version: SigningCertificateVersion,
    pub policy: Option<SignaturePolicy>,
    pub production_place: Option<ProductionPlace>,
    pub signer_role: Option<SignerRole>,
    /// Commitments; an indication without object references applies to
    /// all signed data objects.
    pub commitments: Vec<CommitmentTypeIndication>,
    pub mime_type: String,
    pub encoding: Option<String>,
    pub description: Option<String>,
    /// Internally detached: sign this existing element instead of
    /// wrapping the content.
    pub target_element_id: Option<String>,
    /// Externally detached: the URI of the content.
    pub external_uri: Option<String>,
    /// Add a reference over `ds:KeyInfo`.
    pub reference_key_info: bool,
    /// Enveloped: also exclude every other `ds:Signature` from the digest
    /// so later co-signatures leave this one valid.
    pub exclude_other_signatures: bool,
    /// Timestamp the content references at signing time (requires a
    /// timestamp client on the engine).
    pub all_data_objects_timestamp: bool,
}

impl Default for SignatureParameters {
    fn default() -> Self {
        Self {
            packaging: SignaturePackaging::Enveloped,
            signature_method: algorithm::RSA_SHA256.to_owned(),
            digest_method: algorithm::SHA256.to_owned(),
            c14n_mode: C14nMode::Inclusive,
            signing_time: None,
            signing_certificate_version: SigningCertificateVersion::V1,
            policy: None,
            production_place: None,
            signer_role: None,
            commitments: Vec::new(),
            mime_type: "text/xml".to_owned(),
            encoding: None,
            description: None,
            target_element_id: None,
            external_uri: None,
            reference_key_info: false,
            exclude_other_signatures: true,
            all_data_objects_timestamp: false,
        }
    }
}

impl SignatureParameters {
    pub fn new(packaging: SignaturePackaging) -> Self {
        Self {
            packaging,
            ..Self::default()
        }
    }

    /// Whether the content MIME type is an XML type.
    pub fn is_xml_content(&self) -> bool {
        let m = self.mime_type.as_str();
        m == "text/xml" || m == "application/xml" || m.ends_with("+xml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixes_read_from_signature() {
        let xml = concat!(
            r#"<dsig:Signature xmlns:dsig="http://www.w3.org/2000/09/xmldsig#"><dsig:Object>"#,
            r##"<xa:QualifyingProperties xmlns:xa="http://uri.etsi.org/01903/v1.3.2#" Target="#s"/>"##,
            r#"</dsig:Object></dsig:Signature>"#
        );
        let doc = ulriksdal_xml::parse(xml).unwrap();
        let p = Prefixes::from_signature(doc.root_element());
        assert_eq!(p.ds("SignedInfo"), "dsig:SignedInfo");
        assert_eq!(p.xades("SigningTime"), "xa:SigningTime");
        assert_eq!(p.xades141, "xades141");
    }

    #[test]
    fn test_default_namespace_signature() {
        let xml = r#"<Signature xmlns="http://www.w3.org/2000/09/xmldsig#"/>"#;
        let doc = ulriksdal_xml::parse(xml).unwrap();
        let p = Prefixes::from_signature(doc.root_element());
        assert_eq!(p.ds("Object"), "Object");
        assert_eq!(Prefixes::xmlns(&p.ds), "xmlns");
    }

    #[test]
    fn test_xml_mime_types() {
        let mut params = SignatureParameters::default();
        assert!(params.is_xml_content());
        params.mime_type = "application/pdf".into();
        assert!(!params.is_xml_content());
        params.mime_type = "application/atom+xml".into();
        assert!(params.is_xml_content());
    }
}
