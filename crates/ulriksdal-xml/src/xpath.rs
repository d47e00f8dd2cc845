#![forbid(unsafe_code)]

//! Same-document URI references and ancestor tests.
//!
//! Only the patterns XML-DSig references actually use are supported:
//! `#id`, `#xpointer(id('id'))`, `#xpointer(/)` and the empty URI.

use roxmltree::{Document, Node, NodeId};
use std::collections::HashMap;
use ulriksdal_core::Error;

/// Parse a same-document reference (e.g., `#foo` → `foo`).
///
/// `#xpointer(id('foo'))` is unwrapped to `foo` as well.
pub fn parse_same_document_ref(uri: &str) -> Option<&str> {
    let frag = uri.strip_prefix('#')?;
    Some(parse_xpointer_id(frag).unwrap_or(frag))
}

/// Parse an `xpointer(id('...'))` expression and return the ID value.
pub fn parse_xpointer_id(expr: &str) -> Option<&str> {
    let inner = expr.strip_prefix("xpointer(id(")?.strip_suffix("))")?;
    inner
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .or_else(|| inner.strip_prefix('"').and_then(|s| s.strip_suffix('"')))
}

/// Whether `uri` selects the whole document (`""` or `#xpointer(/)`).
pub fn is_whole_document(uri: &str) -> bool {
    uri.is_empty() || uri == "#xpointer(/)"
}

/// Resolve an ID value in a parsed document using a pre-built ID map.
pub fn resolve_id<'a, 'i>(
    doc: &'a Document<'i>,
    id_map: &HashMap<String, NodeId>,
    id: &str,
) -> Result<Node<'a, 'i>, Error> {
    id_map
        .get(id)
        .and_then(|nid| doc.get_node(*nid))
        .ok_or_else(|| Error::InvalidUri(format!("ID not found: {id}")))
}

/// Check if `ancestor` is an ancestor-or-self of `node`.
pub fn is_ancestor_or_self(ancestor: Node<'_, '_>, node: Node<'_, '_>) -> bool {
    node.ancestors().any(|n| n.id() == ancestor.id())
}
