#![forbid(unsafe_code)]

//! Inclusive Canonical XML 1.0 (C14N 1.0).
//!
//! Algorithm URI: `http://www.w3.org/TR/2001/REC-xml-c14n-20010315`
//! With comments: `http://www.w3.org/TR/2001/REC-xml-c14n-20010315#WithComments`
//!
//! The canonical form:
//! - Outputs namespace declarations sorted by prefix (default first)
//! - Outputs attributes sorted by (namespace-URI, local-name)
//! - Escapes text and attribute values per C14N rules
//! - Optionally preserves or strips comments
//! - Supports document-subset canonicalization via NodeSet

use crate::render::{self, Attr, NsDecl};
use std::collections::BTreeMap;
use ulriksdal_core::{ns, Error};
use ulriksdal_xml::{qname, NodeSet};

/// Canonicalize a document using Inclusive C14N 1.0.
pub fn canonicalize(
    doc: &roxmltree::Document<'_>,
    with_comments: bool,
    node_set: Option<&NodeSet>,
) -> Result<Vec<u8>, Error> {
    let mut output = Vec::new();
    let ctx = C14nContext {
        with_comments,
        node_set,
    };
    ctx.process_node(doc.root(), &mut output, &BTreeMap::new());
    Ok(output)
}

struct C14nContext<'a> {
    with_comments: bool,
    node_set: Option<&'a NodeSet>,
}

impl C14nContext<'_> {
    fn is_visible(&self, node: roxmltree::Node<'_, '_>) -> bool {
        self.node_set.map_or(true, |ns| ns.contains(node))
    }

    fn process_node(
        &self,
        node: roxmltree::Node<'_, '_>,
        output: &mut Vec<u8>,
        inherited_ns: &BTreeMap<String, String>,
    ) {
        match node.node_type() {
            roxmltree::NodeType::Root => {
                for child in node.children() {
                    self.process_node(child, output, inherited_ns);
                }
            }
            roxmltree::NodeType::Element => self.process_element(node, output, inherited_ns),
            roxmltree::NodeType::Text => {
                if self.is_visible(node) {
                    render::text(node, output);
                }
            }
            roxmltree::NodeType::Comment => {
                if self.with_comments && self.is_visible(node) {
                    render::comment(node, output);
                }
            }
            roxmltree::NodeType::PI => {
                if self.is_visible(node) {
                    render::pi(node, output);
                }
            }
        }
    }

    fn process_element(
        &self,
        node: roxmltree::Node<'_, '_>,
        output: &mut Vec<u8>,
        inherited_ns: &BTreeMap<String, String>,
    ) {
        if !self.is_visible(node) {
            // Invisible elements contribute nothing, but their visible
            // descendants still compare against the nearest visible ancestor.
            for child in node.children() {
                self.process_node(child, output, inherited_ns);
            }
            return;
        }

        let current_ns: BTreeMap<String, String> =
            qname::in_scope_namespaces(node).into_iter().collect();

        let mut ns_decls: Vec<NsDecl> = current_ns
            .iter()
            .filter(|(prefix, uri)| inherited_ns.get(*prefix) != Some(*uri))
            .map(|(prefix, uri)| NsDecl {
                prefix: prefix.clone(),
                uri: uri.clone(),
            })
            .collect();

        // A non-empty default on the nearest rendered ancestor that is no
        // longer in scope must be undeclared.
        if inherited_ns.get("").is_some_and(|d| !d.is_empty()) && !current_ns.contains_key("") {
            ns_decls.push(NsDecl {
                prefix: String::new(),
                uri: String::new(),
            });
        }
        ns_decls.sort();

        let mut attrs = render::element_attrs(node);

        // xml:* attributes are inherited onto the apex of a subset whose
        // parent element is outside the node set.
        if self.node_set.is_some() {
            let parent_not_visible = node
                .parent()
                .map_or(true, |p| !p.is_element() || !self.is_visible(p));
            if parent_not_visible {
                let extra = collect_inherited_xml_attrs(node, &attrs);
                attrs.extend(extra);
            }
        }
        attrs.sort();

        let elem_name = qname::element_qname(node);
        render::start_tag(elem_name, &ns_decls, &attrs, output);

        for child in node.children() {
            self.process_node(child, output, &current_ns);
        }

        render::end_tag(elem_name, output);
    }
}

/// Collect xml:* attributes from all ancestors, nearest value first,
/// leaving out those already present on the element.
fn collect_inherited_xml_attrs(node: roxmltree::Node<'_, '_>, existing: &[Attr]) -> Vec<Attr> {
    let mut inherited: BTreeMap<String, String> = BTreeMap::new();
    for ancestor in node.ancestors().skip(1).filter(|a| a.is_element()) {
        for attr in ancestor.attributes() {
            if attr.namespace() == Some(ns::XML) {
                inherited
                    .entry(attr.name().to_owned())
                    .or_insert_with(|| attr.value().to_owned());
            }
        }
    }

    inherited
        .into_iter()
        .filter(|(name, _)| {
            !existing
                .iter()
                .any(|a| a.ns_uri == ns::XML && a.local_name == *name)
        })
        .map(|(name, value)| Attr {
            ns_uri: ns::XML.to_owned(),
            qualified_name: format!("xml:{name}"),
            local_name: name,
            value,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c14n(xml: &str) -> String {
        let doc = ulriksdal_xml::parse(xml).unwrap();
        String::from_utf8(canonicalize(&doc, false, None).unwrap()).unwrap()
    }

    #[test]
    fn test_simple_c14n() {
        assert_eq!(
            c14n(r#"<root><a b="1" a="2"/></root>"#),
            r#"<root><a a="2" b="1"></a></root>"#
        );
    }

    #[test]
    fn test_namespace_rendering() {
        let out = c14n(r#"<root xmlns:b="http://b" xmlns:a="http://a"><a:child/></root>"#);
        assert_eq!(
            out,
            r#"<root xmlns:a="http://a" xmlns:b="http://b"><a:child></a:child></root>"#
        );
    }

    #[test]
    fn test_default_namespace_undeclared() {
        let out = c14n(r#"<a xmlns="urn:d"><b xmlns=""><c/></b></a>"#);
        assert_eq!(out, r#"<a xmlns="urn:d"><b xmlns=""><c></c></b></a>"#);
    }

    #[test]
    fn test_text_escaping_and_comments() {
        assert_eq!(
            c14n("<root>a &amp; b &lt; c<!-- gone --></root>"),
            "<root>a &amp; b &lt; c</root>"
        );
        let doc = ulriksdal_xml::parse("<r><!--kept--></r>").unwrap();
        let out = canonicalize(&doc, true, None).unwrap();
        assert_eq!(out, b"<r><!--kept--></r>");
    }

    #[test]
    fn test_subset_apex_gets_namespaces_and_xml_attrs() {
        let xml = r#"<a xmlns:p="urn:p" xml:lang="sv"><p:b Id="x">t</p:b></a>"#;
        let doc = ulriksdal_xml::parse(xml).unwrap();
        let b = doc.descendants().find(|n| n.has_tag_name(("urn:p", "b"))).unwrap();
        let set = NodeSet::tree_without_comments(b);
        let out = canonicalize(&doc, false, Some(&set)).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            r#"<p:b xmlns:p="urn:p" Id="x" xml:lang="sv">t</p:b>"#
        );
    }
}
