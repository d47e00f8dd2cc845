#![forbid(unsafe_code)]

//! Transform pipeline and trait definitions.

use crate::base64_transform::Base64DecodeTransform;
use crate::enveloped::EnvelopedSignatureTransform;
use crate::xpath_filter::XPathSignatureFilter;
use ulriksdal_c14n::C14nMode;
use ulriksdal_core::{algorithm, ns, Error};
use ulriksdal_xml::{document, qname, NodeSet};

/// Data flowing through the transform pipeline.
#[derive(Debug, Clone)]
pub enum TransformData {
    /// XML node set (for XML-aware transforms like C14N).
    Xml {
        xml_text: String,
        node_set: Option<NodeSet>,
    },
    /// Raw octets.
    Binary(Vec<u8>),
}

impl TransformData {
    /// Convert to octets, applying inclusive C14N to a node set.
    pub fn into_binary(self) -> Result<Vec<u8>, Error> {
        match self {
            TransformData::Binary(data) => Ok(data),
            TransformData::Xml { xml_text, node_set } => {
                ulriksdal_c14n::canonicalize(&xml_text, C14nMode::Inclusive, node_set.as_ref(), &[])
            }
        }
    }
}

/// Trait for individual transforms.
pub trait Transform: Send {
    /// The algorithm URI for this transform.
    fn uri(&self) -> &str;

    /// Execute the transform on the given data.
    fn execute(&self, input: TransformData) -> Result<TransformData, Error>;
}

/// A pipeline of transforms executed in sequence.
#[derive(Default)]
pub struct TransformPipeline {
    transforms: Vec<Box<dyn Transform>>,
}

impl TransformPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the pipeline for a reference's transform list.
    ///
    /// `signature_index` is the node index of the `ds:Signature` holding the
    /// reference; the enveloped-signature transform removes that subtree.
    pub fn from_kinds(kinds: &[TransformKind], signature_index: Option<usize>) -> Result<Self, Error> {
        let mut pipeline = Self::new();
        for kind in kinds {
            let transform: Box<dyn Transform> = match kind {
                TransformKind::C14n { mode, prefixes } => {
                    Box::new(C14nTransform::new(*mode, prefixes.clone()))
                }
                TransformKind::EnvelopedSignature => {
                    let index = signature_index.ok_or_else(|| {
                        Error::Transform("enveloped-signature transform outside a signature".into())
                    })?;
                    Box::new(EnvelopedSignatureTransform::new(index))
                }
                TransformKind::XPathFilter { expression, namespaces } => {
                    Box::new(XPathSignatureFilter::parse(expression, namespaces)?)
                }
                TransformKind::Base64 => Box::new(Base64DecodeTransform),
            };
            pipeline.push(transform);
        }
        Ok(pipeline)
    }

    pub fn push(&mut self, transform: Box<dyn Transform>) {
        self.transforms.push(transform);
    }

    /// Execute all transforms in order.
    pub fn execute(&self, input: TransformData) -> Result<TransformData, Error> {
        let mut data = input;
        for transform in &self.transforms {
            tracing::trace!(transform = transform.uri(), "applying transform");
            data = transform.execute(data)?;
        }
        Ok(data)
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}

// ── Transform descriptions ───────────────────────────────────────────

/// The transforms a `ds:Reference` can name, as written in its
/// `ds:Transforms` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformKind {
    C14n {
        mode: C14nMode,
        /// InclusiveNamespaces PrefixList for exclusive modes.
        prefixes: Vec<String>,
    },
    EnvelopedSignature,
    /// XPath filter with the namespace bindings in scope at `ds:XPath`.
    XPathFilter {
        expression: String,
        namespaces: Vec<(String, String)>,
    },
    Base64,
}

impl TransformKind {
    pub fn c14n(mode: C14nMode) -> Self {
        Self::C14n {
            mode,
            prefixes: Vec::new(),
        }
    }

    /// The filter that drops every `ds:Signature` subtree, with the
    /// XML-DSig namespace bound to `dsig_prefix`.
    pub fn exclude_signatures(dsig_prefix: &str) -> Self {
        Self::XPathFilter {
            expression: format!("not(ancestor-or-self::{dsig_prefix}:Signature)"),
            namespaces: vec![(dsig_prefix.to_owned(), ns::DSIG.to_owned())],
        }
    }

    pub fn uri(&self) -> &'static str {
        match self {
            Self::C14n { mode, .. } => mode.uri(),
            Self::EnvelopedSignature => algorithm::ENVELOPED_SIGNATURE,
            Self::XPathFilter { .. } => algorithm::XPATH,
            Self::Base64 => algorithm::BASE64,
        }
    }

    /// Read a `ds:Transform` element.
    pub fn from_node(node: roxmltree::Node<'_, '_>) -> Result<Self, Error> {
        let alg = document::required_attr(node, ns::attr::ALGORITHM)?;
        if let Some(mode) = C14nMode::from_uri(alg) {
            let prefixes = document::find_child(node, ns::EXC_C14N, ns::node::INCLUSIVE_NAMESPACES)
                .and_then(|n| n.attribute(ns::attr::PREFIX_LIST))
                .map(|list| list.split_whitespace().map(str::to_owned).collect())
                .unwrap_or_default();
            return Ok(Self::C14n { mode, prefixes });
        }
        match alg {
            algorithm::ENVELOPED_SIGNATURE => Ok(Self::EnvelopedSignature),
            algorithm::BASE64 => Ok(Self::Base64),
            algorithm::XPATH => {
                let xpath = document::find_child(node, ns::DSIG, ns::node::XPATH)
                    .ok_or_else(|| Error::MissingElement("XPath".into()))?;
                Ok(Self::XPathFilter {
                    expression: document::text_content(xpath),
                    namespaces: qname::in_scope_namespaces(xpath),
                })
            }
            other => Err(Error::UnsupportedAlgorithm(format!("transform: {other}"))),
        }
    }

    pub fn is_c14n(&self) -> bool {
        matches!(self, Self::C14n { .. })
    }
}

// ── C14N Transform ───────────────────────────────────────────────────

/// A canonicalization transform.
pub struct C14nTransform {
    mode: C14nMode,
    inclusive_prefixes: Vec<String>,
}

impl C14nTransform {
    pub fn new(mode: C14nMode, inclusive_prefixes: Vec<String>) -> Self {
        Self {
            mode,
            inclusive_prefixes,
        }
    }
}

impl Transform for C14nTransform {
    fn uri(&self) -> &str {
        self.mode.uri()
    }

    fn execute(&self, input: TransformData) -> Result<TransformData, Error> {
        let bytes = match input {
            TransformData::Xml { xml_text, node_set } => ulriksdal_c14n::canonicalize(
                &xml_text,
                self.mode,
                node_set.as_ref(),
                &self.inclusive_prefixes,
            )?,
            TransformData::Binary(data) => ulriksdal_c14n::canonicalize(
                std::str::from_utf8(&data)
                    .map_err(|e| Error::Transform(format!("invalid UTF-8: {e}")))?,
                self.mode,
                None,
                &self.inclusive_prefixes,
            )?,
        };
        Ok(TransformData::Binary(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_kind_from_node() {
        let xml = r#"<ds:Transforms xmlns:ds="http://www.w3.org/2000/09/xmldsig#">
            <ds:Transform Algorithm="http://www.w3.org/2000/09/xmldsig#enveloped-signature"/>
            <ds:Transform Algorithm="http://www.w3.org/TR/1999/REC-xpath-19991116"><ds:XPath>not(ancestor-or-self::ds:Signature)</ds:XPath></ds:Transform>
            <ds:Transform Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"><ec:InclusiveNamespaces xmlns:ec="http://www.w3.org/2001/10/xml-exc-c14n#" PrefixList="a #default"/></ds:Transform>
        </ds:Transforms>"#;
        let doc = ulriksdal_xml::parse(xml).unwrap();
        let kinds: Vec<_> = doc
            .root_element()
            .children()
            .filter(|n| n.is_element())
            .map(|n| TransformKind::from_node(n).unwrap())
            .collect();
        assert_eq!(kinds[0], TransformKind::EnvelopedSignature);
        assert_eq!(kinds[1], TransformKind::exclude_signatures("ds"));
        assert_eq!(
            kinds[2],
            TransformKind::C14n {
                mode: C14nMode::Exclusive,
                prefixes: vec!["a".into(), "#default".into()],
            }
        );
    }

    #[test]
    fn test_unknown_transform_rejected() {
        let xml = r#"<Transform Algorithm="urn:nope"/>"#;
        let doc = ulriksdal_xml::parse(xml).unwrap();
        assert!(matches!(
            TransformKind::from_node(doc.root_element()),
            Err(Error::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_pipeline_canonicalizes() {
        let pipeline =
            TransformPipeline::from_kinds(&[TransformKind::c14n(C14nMode::Inclusive)], None).unwrap();
        let out = pipeline
            .execute(TransformData::Binary(b"<a  b='1'/>".to_vec()))
            .unwrap()
            .into_binary()
            .unwrap();
        assert_eq!(out, br#"<a b="1"></a>"#);
    }

    #[test]
    fn test_enveloped_needs_signature() {
        assert!(TransformPipeline::from_kinds(&[TransformKind::EnvelopedSignature], None).is_err());
    }
}
