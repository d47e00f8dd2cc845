#![forbid(unsafe_code)]

//! URI resolution for XML-DSig references.
//!
//! Handles:
//! - `""`: the whole document minus comments
//! - `#xpointer(/)`: the whole document with comments
//! - `#id`: the identified subtree minus comments
//! - `#xpointer(id('id'))`: the identified subtree with comments
//! - anything else: detached content supplied by the caller

use crate::pipeline::TransformData;
use roxmltree::{Document, NodeId};
use std::collections::HashMap;
use ulriksdal_core::Error;
use ulriksdal_xml::{xpath, NodeSet};

/// Resolve a reference URI against `doc` (parsed from `xml_text`).
///
/// `external` maps non-fragment URIs to their octets.
pub fn resolve_uri(
    uri: &str,
    xml_text: &str,
    doc: &Document<'_>,
    id_map: &HashMap<String, NodeId>,
    external: &HashMap<String, Vec<u8>>,
) -> Result<TransformData, Error> {
    if xpath::is_whole_document(uri) {
        let ns = if uri.is_empty() {
            NodeSet::all_without_comments(doc)
        } else {
            NodeSet::all(doc)
        };
        return Ok(TransformData::Xml {
            xml_text: xml_text.to_owned(),
            node_set: Some(ns),
        });
    }

    if let Some(id) = xpath::parse_same_document_ref(uri) {
        let node = xpath::resolve_id(doc, id_map, id)?;
        let ns = if uri.starts_with("#xpointer(") {
            NodeSet::tree_with_comments(node)
        } else {
            NodeSet::tree_without_comments(node)
        };
        return Ok(TransformData::Xml {
            xml_text: xml_text.to_owned(),
            node_set: Some(ns),
        });
    }

    external
        .get(uri)
        .map(|data| TransformData::Binary(data.clone()))
        .ok_or_else(|| Error::InvalidUri(format!("no content registered for external URI: {uri}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const XML: &str = "<r><!--c--><a Id=\"x\"><!--d--><b/></a></r>";

    fn resolve(uri: &str, external: &HashMap<String, Vec<u8>>) -> Result<Vec<u8>, Error> {
        let doc = ulriksdal_xml::parse(XML).unwrap();
        let ids = ulriksdal_xml::document::build_id_map(&doc, &[]);
        resolve_uri(uri, XML, &doc, &ids, external)?.into_binary()
    }

    #[test]
    fn test_fragment_references() {
        let none = HashMap::new();
        assert_eq!(resolve("#x", &none).unwrap(), br#"<a Id="x"><b></b></a>"#);
        assert_eq!(
            resolve("#xpointer(id('x'))", &none).unwrap(),
            br#"<a Id="x"><!--d--><b></b></a>"#
        );
        assert!(matches!(resolve("#missing", &none), Err(Error::InvalidUri(_))));
    }

    #[test]
    fn test_whole_document() {
        let none = HashMap::new();
        assert_eq!(resolve("", &none).unwrap(), br#"<r><a Id="x"><b></b></a></r>"#);
    }

    #[test]
    fn test_external_content() {
        let mut ext = HashMap::new();
        ext.insert("https://example.test/doc.txt".to_owned(), b"hello".to_vec());
        assert_eq!(resolve("https://example.test/doc.txt", &ext).unwrap(), b"hello");
        assert!(resolve("https://example.test/other", &ext).is_err());
    }
}
