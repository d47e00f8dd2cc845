#![forbid(unsafe_code)]

//! Shared rendering utilities for C14N output.

use crate::escape;
use std::cmp::Ordering;
use ulriksdal_xml::qname;

/// A namespace declaration to be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NsDecl {
    /// The prefix ("" for default namespace).
    pub prefix: String,
    /// The namespace URI.
    pub uri: String,
}

impl NsDecl {
    /// Render this namespace declaration to a string.
    pub fn render(&self) -> String {
        if self.prefix.is_empty() {
            format!(" xmlns=\"{}\"", escape::escape_attr(&self.uri))
        } else {
            format!(" xmlns:{}=\"{}\"", self.prefix, escape::escape_attr(&self.uri))
        }
    }
}

impl Ord for NsDecl {
    fn cmp(&self, other: &Self) -> Ordering {
        // default namespace first, then by prefix
        match (self.prefix.is_empty(), other.prefix.is_empty()) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => self.prefix.cmp(&other.prefix),
        }
    }
}

impl PartialOrd for NsDecl {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// An attribute to be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    /// The namespace URI of the attribute ("" for no namespace).
    pub ns_uri: String,
    pub local_name: String,
    /// The qualified name as written in the source.
    pub qualified_name: String,
    pub value: String,
}

impl Attr {
    /// Render this attribute to a string.
    pub fn render(&self) -> String {
        format!(" {}=\"{}\"", self.qualified_name, escape::escape_attr(&self.value))
    }
}

impl Ord for Attr {
    fn cmp(&self, other: &Self) -> Ordering {
        // Unqualified attributes first (by local name), then by
        // (namespace URI, local name).
        match (self.ns_uri.is_empty(), other.ns_uri.is_empty()) {
            (true, true) => self.local_name.cmp(&other.local_name),
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => self
                .ns_uri
                .cmp(&other.ns_uri)
                .then(self.local_name.cmp(&other.local_name)),
        }
    }
}

impl PartialOrd for Attr {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The element's own attributes (namespace declarations excluded).
pub fn element_attrs(node: roxmltree::Node<'_, '_>) -> Vec<Attr> {
    node.attributes()
        .map(|attr| Attr {
            ns_uri: attr.namespace().unwrap_or("").to_owned(),
            local_name: attr.name().to_owned(),
            qualified_name: qname::attr_qname(node, &attr).to_owned(),
            value: attr.value().to_owned(),
        })
        .collect()
}

pub fn start_tag(name: &str, ns_decls: &[NsDecl], attrs: &[Attr], output: &mut Vec<u8>) {
    output.push(b'<');
    output.extend_from_slice(name.as_bytes());
    for decl in ns_decls {
        output.extend_from_slice(decl.render().as_bytes());
    }
    for attr in attrs {
        output.extend_from_slice(attr.render().as_bytes());
    }
    output.push(b'>');
}

pub fn end_tag(name: &str, output: &mut Vec<u8>) {
    output.extend_from_slice(b"</");
    output.extend_from_slice(name.as_bytes());
    output.push(b'>');
}

pub fn text(node: roxmltree::Node<'_, '_>, output: &mut Vec<u8>) {
    let text = node.text().unwrap_or("");
    output.extend_from_slice(escape::escape_text(text).as_bytes());
}

/// Comments and PIs outside the document element are separated from it
/// by a line feed.
pub fn comment(node: roxmltree::Node<'_, '_>, output: &mut Vec<u8>) {
    let top_level = is_top_level(node);
    if top_level && node.prev_siblings().skip(1).any(|s| s.is_element()) {
        output.push(b'\n');
    }
    output.extend_from_slice(b"<!--");
    output.extend_from_slice(node.text().unwrap_or("").as_bytes());
    output.extend_from_slice(b"-->");
    if top_level && node.next_siblings().skip(1).any(|s| s.is_element()) {
        output.push(b'\n');
    }
}

pub fn pi(node: roxmltree::Node<'_, '_>, output: &mut Vec<u8>) {
    let Some(pi) = node.pi() else { return };
    let top_level = is_top_level(node);
    if top_level && node.prev_siblings().skip(1).any(|s| s.is_element()) {
        output.push(b'\n');
    }
    output.extend_from_slice(b"<?");
    output.extend_from_slice(pi.target.as_bytes());
    if let Some(value) = pi.value.filter(|v| !v.is_empty()) {
        output.push(b' ');
        output.extend_from_slice(escape::escape_pi(value).as_bytes());
    }
    output.extend_from_slice(b"?>");
    if top_level && node.next_siblings().skip(1).any(|s| s.is_element()) {
        output.push(b'\n');
    }
}

fn is_top_level(node: roxmltree::Node<'_, '_>) -> bool {
    node.parent()
        .is_some_and(|p| p.node_type() == roxmltree::NodeType::Root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ns_decl_order() {
        let mut decls = vec![
            NsDecl { prefix: "b".into(), uri: "u".into() },
            NsDecl { prefix: "".into(), uri: "d".into() },
            NsDecl { prefix: "a".into(), uri: "u".into() },
        ];
        decls.sort();
        let order: Vec<_> = decls.iter().map(|d| d.prefix.as_str()).collect();
        assert_eq!(order, ["", "a", "b"]);
    }

    #[test]
    fn test_attr_order_namespace_uri_first() {
        let a = Attr {
            ns_uri: "urn:z".into(),
            local_name: "a".into(),
            qualified_name: "p:a".into(),
            value: String::new(),
        };
        let b = Attr {
            ns_uri: "urn:a".into(),
            local_name: "b".into(),
            qualified_name: "q:b".into(),
            value: String::new(),
        };
        let plain = Attr {
            ns_uri: String::new(),
            local_name: "z".into(),
            qualified_name: "z".into(),
            value: String::new(),
        };
        let mut attrs = vec![a.clone(), plain.clone(), b.clone()];
        attrs.sort();
        assert_eq!(attrs, vec![plain, b, a]);
    }

    #[test]
    fn test_top_level_comment_newlines() {
        let doc = ulriksdal_xml::parse("<!--a--><r/><!--b-->").unwrap();
        let mut out = Vec::new();
        for child in doc.root().children() {
            match child.node_type() {
                roxmltree::NodeType::Comment => comment(child, &mut out),
                _ => out.extend_from_slice(b"<r></r>"),
            }
        }
        assert_eq!(out, b"<!--a-->\n<r></r>\n<!--b-->");
    }
}
