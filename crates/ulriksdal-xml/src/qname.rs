#![forbid(unsafe_code)]

//! Qualified names and namespace declarations read from source text.
//!
//! `roxmltree` resolves every name to `(namespace, local)` and drops the
//! prefix. Canonical XML needs the prefix as written, and the namespace
//! propagator needs to know which declarations sit literally on a start
//! tag, so both are recovered here from the node's byte range.

use roxmltree::{Attribute, Node};

/// The start tag of an element, from `<` through the closing `>`.
pub fn start_tag<'i>(node: Node<'_, 'i>) -> &'i str {
    let input = node.document().input_text();
    let start = node.range().start;
    let end = start_tag_end(input, start);
    &input[start..end]
}

/// Byte offset just past the `>` of the start tag beginning at `start`.
pub(crate) fn start_tag_end(input: &str, start: usize) -> usize {
    let bytes = input.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = start;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b == b'>' => return i + 1,
            None => {}
        }
        i += 1;
    }
    bytes.len()
}

/// Whether the element was written as `<a/>`.
pub fn is_self_closing(node: Node<'_, '_>) -> bool {
    start_tag(node).ends_with("/>")
}

/// The element's qualified name as written (`ds:Signature`).
pub fn element_qname<'i>(node: Node<'_, 'i>) -> &'i str {
    let tag = start_tag(node);
    let body = tag.strip_prefix('<').unwrap_or(tag);
    let end = body
        .find(|c: char| c.is_whitespace() || c == '/' || c == '>')
        .unwrap_or(body.len());
    &body[..end]
}

/// The attribute's qualified name as written.
pub fn attr_qname<'i>(node: Node<'_, 'i>, attr: &Attribute<'_, 'i>) -> &'i str {
    &node.document().input_text()[attr.range_qname()]
}

/// The prefix part of a qualified name, if any.
pub fn prefix(qname: &str) -> Option<&str> {
    qname.split_once(':').map(|(p, _)| p)
}

/// The element's prefix as written, `None` for unprefixed names.
pub fn element_prefix<'i>(node: Node<'_, 'i>) -> Option<&'i str> {
    prefix(element_qname(node))
}

/// Prefixes declared by `xmlns` / `xmlns:p` attributes on the start tag.
///
/// The default namespace is reported as `""`.
pub fn declared_prefixes(node: Node<'_, '_>) -> Vec<String> {
    raw_attributes(start_tag(node))
        .into_iter()
        .filter_map(|(name, _)| {
            if name == "xmlns" {
                Some(String::new())
            } else {
                name.strip_prefix("xmlns:").map(str::to_owned)
            }
        })
        .collect()
}

/// All `(prefix, uri)` pairs in scope at `node`, excluding `xml`.
///
/// An undeclared default namespace (`xmlns=""`) is left out.
pub fn in_scope_namespaces(node: Node<'_, '_>) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = Vec::new();
    for ns in node.namespaces() {
        let prefix = ns.name().unwrap_or("");
        if prefix == "xml" || (prefix.is_empty() && ns.uri().is_empty()) {
            continue;
        }
        if out.iter().any(|(p, _)| p == prefix) {
            continue;
        }
        out.push((prefix.to_owned(), ns.uri().to_owned()));
    }
    out.sort();
    out
}

/// Find a prefix in scope at `node` bound to `uri`.
pub fn prefix_for_uri(node: Node<'_, '_>, uri: &str) -> Option<String> {
    in_scope_namespaces(node)
        .into_iter()
        .find(|(_, u)| u == uri)
        .map(|(p, _)| p)
}

/// Split a start tag into `(qname, raw value)` attribute pairs.
fn raw_attributes(tag: &str) -> Vec<(&str, &str)> {
    let bytes = tag.as_bytes();
    let mut out = Vec::new();
    // skip `<` and the element name
    let mut i = 1;
    while i < bytes.len() && !is_space(bytes[i]) && bytes[i] != b'/' && bytes[i] != b'>' {
        i += 1;
    }
    loop {
        while i < bytes.len() && is_space(bytes[i]) {
            i += 1;
        }
        if i >= bytes.len() || bytes[i] == b'/' || bytes[i] == b'>' {
            break;
        }
        let name_start = i;
        while i < bytes.len() && bytes[i] != b'=' && !is_space(bytes[i]) {
            i += 1;
        }
        let name = &tag[name_start..i];
        while i < bytes.len() && (is_space(bytes[i]) || bytes[i] == b'=') {
            i += 1;
        }
        if i >= bytes.len() {
            break;
        }
        let quote = bytes[i];
        i += 1;
        let value_start = i;
        while i < bytes.len() && bytes[i] != quote {
            i += 1;
        }
        out.push((name, &tag[value_start..i.min(tag.len())]));
        i += 1;
    }
    out
}

fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n')
}
