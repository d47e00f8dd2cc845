#![forbid(unsafe_code)]

//! `ds:Reference`: model, serialization and digesting.

use crate::context::DsigContext;
use roxmltree::{Document, Node, NodeId};
use std::collections::HashMap;
use ulriksdal_c14n::C14nMode;
use ulriksdal_core::{ns, Error};
use ulriksdal_transforms::{uri, TransformKind, TransformPipeline};
use ulriksdal_xml::nodeset::node_index;
use ulriksdal_xml::{document, xpath, XmlWriter};

/// One signed reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub id: Option<String>,
    pub uri: String,
    pub type_uri: Option<String>,
    pub transforms: Vec<TransformKind>,
    pub digest_method: String,
    /// Empty until the reference has been digested.
    pub digest_value: Vec<u8>,
}

impl Reference {
    pub fn new(uri: impl Into<String>, digest_method: &str) -> Self {
        Self {
            id: None,
            uri: uri.into(),
            type_uri: None,
            transforms: Vec::new(),
            digest_method: digest_method.to_owned(),
            digest_value: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_type(mut self, type_uri: &str) -> Self {
        self.type_uri = Some(type_uri.to_owned());
        self
    }

    pub fn with_transform(mut self, transform: TransformKind) -> Self {
        self.transforms.push(transform);
        self
    }

    pub fn is_digested(&self) -> bool {
        !self.digest_value.is_empty()
    }

    /// The id a same-document URI points at (`#id` or `#xpointer(id('id'))`).
    pub fn target_id(&self) -> Option<&str> {
        if xpath::is_whole_document(&self.uri) {
            return None;
        }
        xpath::parse_same_document_ref(&self.uri)
    }

    /// Read a `ds:Reference` element.
    pub fn from_node(node: Node<'_, '_>) -> Result<Self, Error> {
        let transforms = match document::find_child(node, ns::DSIG, ns::node::TRANSFORMS) {
            Some(t) => document::find_children(t, ns::DSIG, ns::node::TRANSFORM)
                .into_iter()
                .map(TransformKind::from_node)
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };
        let digest_method = document::find_child(node, ns::DSIG, ns::node::DIGEST_METHOD)
            .ok_or_else(|| Error::MissingElement("DigestMethod".into()))?;
        let digest_value = document::find_child(node, ns::DSIG, ns::node::DIGEST_VALUE)
            .ok_or_else(|| Error::MissingElement("DigestValue".into()))?;

        Ok(Self {
            id: node.attribute(ns::attr::ID).map(str::to_owned),
            uri: node.attribute(ns::attr::URI).unwrap_or("").to_owned(),
            type_uri: node.attribute(ns::attr::TYPE).map(str::to_owned),
            transforms,
            digest_method: document::required_attr(digest_method, ns::attr::ALGORITHM)?.to_owned(),
            digest_value: crate::decode_base64(&document::text_content(digest_value), "DigestValue")?,
        })
    }

    /// Write the element with the XML-DSig prefix `ds`.
    pub fn write(&self, w: &mut XmlWriter, ds: &str) -> Result<(), Error> {
        let name = |local: &str| qualified(ds, local);
        let mut attrs: Vec<(&str, &str)> = Vec::new();
        if let Some(id) = &self.id {
            attrs.push((ns::attr::ID, id));
        }
        attrs.push((ns::attr::URI, &self.uri));
        if let Some(t) = &self.type_uri {
            attrs.push((ns::attr::TYPE, t));
        }
        w.start_element(&name(ns::node::REFERENCE), &attrs)?;

        if !self.transforms.is_empty() {
            w.start_element(&name(ns::node::TRANSFORMS), &[])?;
            for t in &self.transforms {
                write_transform(w, ds, t)?;
            }
            w.end_element(&name(ns::node::TRANSFORMS))?;
        }

        w.empty_element(
            &name(ns::node::DIGEST_METHOD),
            &[(ns::attr::ALGORITHM, &self.digest_method)],
        )?;
        let value = if self.is_digested() {
            crate::encode_base64(&self.digest_value)
        } else {
            String::new()
        };
        w.text_element(&name(ns::node::DIGEST_VALUE), &[], &value)?;
        w.end_element(&name(ns::node::REFERENCE))
    }

    /// Dereference and transform the target, returning the octets that
    /// are digested.
    ///
    /// `signature` is the `ds:Signature` holding this reference (needed by
    /// the enveloped-signature transform).
    pub fn transformed_octets(
        &self,
        doc: &Document<'_>,
        id_map: &HashMap<String, NodeId>,
        signature: Option<Node<'_, '_>>,
        ctx: &DsigContext,
    ) -> Result<Vec<u8>, Error> {
        // Standalone fragment under a single canonicalization: propagate
        // the in-scope namespaces onto it and canonicalize it on its own.
        if let Some((id, mode, prefixes)) = self.fragment_c14n() {
            let node = xpath::resolve_id(doc, id_map, id)?;
            return ulriksdal_c14n::canonicalize_fragment(node, mode, prefixes);
        }

        let input = uri::resolve_uri(&self.uri, doc.input_text(), doc, id_map, ctx.detached())?;
        let pipeline = TransformPipeline::from_kinds(&self.transforms, signature.map(node_index))?;
        pipeline.execute(input)?.into_binary()
    }

    /// Digest of [`transformed_octets`](Self::transformed_octets) under
    /// the reference's digest method.
    pub fn compute_digest(
        &self,
        doc: &Document<'_>,
        id_map: &HashMap<String, NodeId>,
        signature: Option<Node<'_, '_>>,
        ctx: &DsigContext,
    ) -> Result<Vec<u8>, Error> {
        let octets = self.transformed_octets(doc, id_map, signature, ctx)?;
        let digest = ulriksdal_crypto::digest::digest(&self.digest_method, &octets)?;
        tracing::debug!(uri = %self.uri, octets = octets.len(), "reference digested");
        Ok(digest)
    }

    fn fragment_c14n(&self) -> Option<(&str, C14nMode, &[String])> {
        if self.uri.starts_with("#xpointer(") {
            return None;
        }
        let id = self.target_id()?;
        match self.transforms.as_slice() {
            [] => Some((id, C14nMode::Inclusive, &[])),
            [TransformKind::C14n { mode, prefixes }] if !mode.with_comments() => {
                Some((id, *mode, prefixes.as_slice()))
            }
            _ => None,
        }
    }
}

pub(crate) fn qualified(prefix: &str, local: &str) -> String {
    if prefix.is_empty() {
        local.to_owned()
    } else {
        format!("{prefix}:{local}")
    }
}

/// Write a `ds:Transform` element.
pub fn write_transform(w: &mut XmlWriter, ds: &str, t: &TransformKind) -> Result<(), Error> {
    let transform = qualified(ds, ns::node::TRANSFORM);
    let alg = [(ns::attr::ALGORITHM, t.uri())];
    match t {
        TransformKind::C14n { prefixes, .. } if !prefixes.is_empty() => {
            w.start_element(&transform, &alg)?;
            let list = prefixes.join(" ");
            w.empty_element(
                "ec:InclusiveNamespaces",
                &[("xmlns:ec", ns::EXC_C14N), (ns::attr::PREFIX_LIST, &list)],
            )?;
            w.end_element(&transform)
        }
        TransformKind::XPathFilter {
            expression,
            namespaces,
        } => {
            w.start_element(&transform, &alg)?;
            let decls: Vec<(String, &str)> = namespaces
                .iter()
                .filter(|(p, _)| p != ds)
                .map(|(p, u)| (format!("xmlns:{p}"), u.as_str()))
                .collect();
            let attrs: Vec<(&str, &str)> = decls.iter().map(|(n, u)| (n.as_str(), *u)).collect();
            w.text_element(&qualified(ds, ns::node::XPATH), &attrs, expression)?;
            w.end_element(&transform)
        }
        _ => w.empty_element(&transform, &alg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use ulriksdal_core::algorithm;

    #[test]
    fn test_write_and_read_back() {
        let mut r = Reference::new("#test", algorithm::SHA256)
            .with_id("Reference-1")
            .with_transform(TransformKind::EnvelopedSignature)
            .with_transform(TransformKind::exclude_signatures("ds"))
            .with_transform(TransformKind::c14n(C14nMode::Exclusive));
        let mut w = XmlWriter::new();
        r.write(&mut w, "ds").unwrap();
        let xml = w.into_string().unwrap();
        assert_eq!(
            xml,
            concat!(
                r##"<ds:Reference Id="Reference-1" URI="#test"><ds:Transforms>"##,
                r#"<ds:Transform Algorithm="http://www.w3.org/2000/09/xmldsig#enveloped-signature"/>"#,
                r#"<ds:Transform Algorithm="http://www.w3.org/TR/1999/REC-xpath-19991116"><ds:XPath>not(ancestor-or-self::ds:Signature)</ds:XPath></ds:Transform>"#,
                r#"<ds:Transform Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"/>"#,
                r#"</ds:Transforms><ds:DigestMethod Algorithm="http://www.w3.org/2001/04/xmlenc#sha256"/>"#,
                r#"<ds:DigestValue></ds:DigestValue></ds:Reference>"#
            )
        );

        r.digest_value = vec![1, 2, 3];
        let mut w = XmlWriter::new();
        w.start_element("ds:Signature", &[("xmlns:ds", ns::DSIG)]).unwrap();
        r.write(&mut w, "ds").unwrap();
        w.end_element("ds:Signature").unwrap();
        let xml = w.into_string().unwrap();
        let doc = ulriksdal_xml::parse(&xml).unwrap();
        let node = document::find_element(&doc, ns::DSIG, ns::node::REFERENCE).unwrap();
        assert_eq!(Reference::from_node(node).unwrap(), r);
    }

    #[test]
    fn test_fragment_digest_matches_subset() {
        let xml = r#"<r xmlns="urn:r" xmlns:p="urn:p"><p:a Id="x"><b/></p:a></r>"#;
        let doc = ulriksdal_xml::parse(xml).unwrap();
        let ids = document::build_id_map(&doc, &[]);
        let ctx = DsigContext::new();
        let r = Reference::new("#x", algorithm::SHA256);
        let octets = r.transformed_octets(&doc, &ids, None, &ctx).unwrap();
        assert_eq!(
            String::from_utf8(octets).unwrap(),
            r#"<p:a xmlns="urn:r" xmlns:p="urn:p" Id="x"><b></b></p:a>"#
        );
    }

    #[test]
    fn test_detached_reference() {
        let doc = ulriksdal_xml::parse("<r/>").unwrap();
        let ids = document::build_id_map(&doc, &[]);
        let mut ctx = DsigContext::new();
        ctx.add_detached_content("https://example.test/x.bin", vec![0, 1, 2]);
        let r = Reference::new("https://example.test/x.bin", algorithm::SHA256);
        let digest = r.compute_digest(&doc, &ids, None, &ctx).unwrap();
        assert_eq!(digest, ulriksdal_crypto::digest::digest(algorithm::SHA256, &[0, 1, 2]).unwrap());
    }
}
