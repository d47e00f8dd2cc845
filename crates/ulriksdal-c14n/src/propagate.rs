#![forbid(unsafe_code)]

//! Namespace propagation onto standalone fragments.
//!
//! A fragment cut out of a document (SignedInfo, SignedProperties,
//! KeyInfo, an enveloping Object) loses the namespace declarations of its
//! ancestors. Before such a fragment is canonicalized on its own, every
//! namespace in scope at its root is declared on the root start tag, so
//! prefixes used inside it resolve exactly as they did in the document.
//!
//! [`canonicalize_fragment`] canonicalizes the fragment as a document
//! subset of the parse it came from, so inclusive modes also carry the
//! `xml:*` attributes inherited from ancestors onto the fragment root.

use crate::{canonicalize_doc, escape, C14nMode};
use ulriksdal_core::Error;
use ulriksdal_xml::{qname, NodeSet};

/// Source text of `node` with every in-scope namespace declared on its root.
///
/// Declarations already written on the start tag are kept as they are.
pub fn propagate_namespaces(node: roxmltree::Node<'_, '_>) -> String {
    let input = node.document().input_text();
    let range = node.range();
    let declared = qname::declared_prefixes(node);

    let mut decls = String::new();
    for (prefix, uri) in qname::in_scope_namespaces(node) {
        if declared.contains(&prefix) {
            continue;
        }
        if prefix.is_empty() {
            decls.push_str(&format!(" xmlns=\"{}\"", escape::escape_attr(&uri)));
        } else {
            decls.push_str(&format!(" xmlns:{prefix}=\"{}\"", escape::escape_attr(&uri)));
        }
    }

    let name_end = range.start + 1 + qname::element_qname(node).len();
    let mut out = String::with_capacity(range.len() + decls.len());
    out.push_str(&input[range.start..name_end]);
    out.push_str(&decls);
    out.push_str(&input[name_end..range.end]);
    out
}

/// Canonicalize the subtree at `node` the way a verifier canonicalizes a
/// same-document reference to it: in-scope namespaces are rendered on the
/// root and, for inclusive modes, so are inherited `xml:*` attributes.
pub fn canonicalize_fragment(
    node: roxmltree::Node<'_, '_>,
    mode: C14nMode,
    inclusive_prefixes: &[String],
) -> Result<Vec<u8>, Error> {
    let subset = if mode.with_comments() {
        NodeSet::tree_with_comments(node)
    } else {
        NodeSet::tree_without_comments(node)
    };
    canonicalize_doc(node.document(), mode, Some(&subset), inclusive_prefixes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonicalize;
    use pretty_assertions::assert_eq;

    const DOC: &str = concat!(
        r#"<root xmlns="urn:default" xmlns:x="urn:x" xmlns:ds="http://www.w3.org/2000/09/xmldsig#" xml:lang="en">"#,
        r#"<x:wrap><ds:SignedInfo Id="si"><ds:Transform><ds:XPath>x:item</ds:XPath></ds:Transform>"#,
        r#"<plain/></ds:SignedInfo></x:wrap></root>"#
    );

    #[test]
    fn test_propagated_fragment_declares_ancestors() {
        let doc = ulriksdal_xml::parse(DOC).unwrap();
        let si = doc.descendants().find(|n| n.attribute("Id") == Some("si")).unwrap();
        let text = propagate_namespaces(si);
        assert!(text.starts_with(concat!(
            r#"<ds:SignedInfo xmlns="urn:default" "#,
            r#"xmlns:ds="http://www.w3.org/2000/09/xmldsig#" xmlns:x="urn:x" Id="si">"#
        )));
        ulriksdal_xml::parse(&text).unwrap();
    }

    #[test]
    fn test_propagated_equals_document_subset() {
        let doc = ulriksdal_xml::parse(DOC).unwrap();
        let si = doc.descendants().find(|n| n.attribute("Id") == Some("si")).unwrap();
        let set = NodeSet::tree_without_comments(si);
        for mode in [C14nMode::Inclusive, C14nMode::Exclusive] {
            let subset = crate::canonicalize_doc(&doc, mode, Some(&set), &[]).unwrap();
            let fragment = canonicalize_fragment(si, mode, &[]).unwrap();
            assert_eq!(String::from_utf8(subset).unwrap(), String::from_utf8(fragment).unwrap());
        }
    }

    #[test]
    fn test_inherited_xml_lang_only_in_inclusive_modes() {
        let doc = ulriksdal_xml::parse(DOC).unwrap();
        let si = doc.descendants().find(|n| n.attribute("Id") == Some("si")).unwrap();
        let inclusive = String::from_utf8(canonicalize_fragment(si, C14nMode::Inclusive, &[]).unwrap()).unwrap();
        assert!(inclusive.starts_with(concat!(
            r#"<ds:SignedInfo xmlns="urn:default" "#,
            r#"xmlns:ds="http://www.w3.org/2000/09/xmldsig#" xmlns:x="urn:x" Id="si" xml:lang="en">"#
        )));
        let exclusive = String::from_utf8(canonicalize_fragment(si, C14nMode::Exclusive, &[]).unwrap()).unwrap();
        assert!(!exclusive.contains("xml:lang"));
    }

    #[test]
    fn test_own_xml_lang_wins_over_ancestor() {
        let xml = r#"<a xml:lang="en"><b xml:lang="sv" Id="b"><c/></b></a>"#;
        let doc = ulriksdal_xml::parse(xml).unwrap();
        let b = doc.descendants().find(|n| n.attribute("Id") == Some("b")).unwrap();
        let out = canonicalize_fragment(b, C14nMode::Inclusive, &[]).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), r#"<b Id="b" xml:lang="sv"><c></c></b>"#);
    }

    #[test]
    fn test_unpropagated_fragment_does_not_parse() {
        let doc = ulriksdal_xml::parse(DOC).unwrap();
        let si = doc.descendants().find(|n| n.attribute("Id") == Some("si")).unwrap();
        let raw = &DOC[si.range()];
        assert!(canonicalize(raw, C14nMode::Inclusive, None, &[]).is_err());
        assert!(canonicalize(&propagate_namespaces(si), C14nMode::Inclusive, None, &[]).is_ok());
    }
}
