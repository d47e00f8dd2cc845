#![forbid(unsafe_code)]

//! Text-splice editing of parsed documents.
//!
//! An edit replaces a byte range of the source with new text. Edits are
//! computed against one parse of the document and applied together;
//! afterwards the caller re-parses. Bytes outside the edited ranges are
//! preserved exactly, which keeps already-computed digests valid.

use crate::qname::{element_qname, is_self_closing, start_tag_end};
use roxmltree::Node;
use std::ops::Range;
use ulriksdal_core::Error;

/// Replace `range` of the source text with `replacement`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEdit {
    pub range: Range<usize>,
    pub replacement: String,
}

impl TextEdit {
    pub fn insert(at: usize, text: impl Into<String>) -> Self {
        Self {
            range: at..at,
            replacement: text.into(),
        }
    }

    pub fn replace(range: Range<usize>, text: impl Into<String>) -> Self {
        Self {
            range,
            replacement: text.into(),
        }
    }
}

/// Apply a batch of non-overlapping edits to `text`.
///
/// Edits are applied from the end of the text backwards so earlier
/// offsets stay valid. Two insertions at the same offset keep the order
/// in which they were given.
pub fn apply_edits(text: &str, mut edits: Vec<TextEdit>) -> Result<String, Error> {
    // stable sort keeps same-offset inserts in order; reversed below
    edits.sort_by_key(|e| (e.range.start, e.range.end));
    for pair in edits.windows(2) {
        if pair[0].range.end > pair[1].range.start {
            return Err(Error::XmlStructure(format!(
                "overlapping edits at {:?} and {:?}",
                pair[0].range, pair[1].range
            )));
        }
    }
    let mut out = text.to_owned();
    for edit in edits.iter().rev() {
        if edit.range.end > out.len() || edit.range.start > edit.range.end {
            return Err(Error::XmlStructure(format!(
                "edit range {:?} out of bounds",
                edit.range
            )));
        }
        out.replace_range(edit.range.clone(), &edit.replacement);
    }
    Ok(out)
}

/// Byte range of the element's content (between start and end tag).
///
/// Empty range located before `/>` for self-closing elements.
pub fn content_range(node: Node<'_, '_>) -> Range<usize> {
    let input = node.document().input_text();
    let range = node.range();
    if is_self_closing(node) {
        let at = range.end - 2;
        return at..at;
    }
    let start = start_tag_end(input, range.start);
    let end = input[..range.end].rfind("</").unwrap_or(range.end);
    start..end.max(start)
}

/// Append `fragment` as the last child of `node`.
pub fn insert_last_child(node: Node<'_, '_>, fragment: &str) -> TextEdit {
    if is_self_closing(node) {
        let end = node.range().end;
        let qname = element_qname(node);
        return TextEdit::replace(end - 2..end, format!(">{fragment}</{qname}>"));
    }
    TextEdit::insert(content_range(node).end, fragment)
}

/// Insert `fragment` as the first child of `node`.
pub fn insert_first_child(node: Node<'_, '_>, fragment: &str) -> TextEdit {
    if is_self_closing(node) {
        return insert_last_child(node, fragment);
    }
    TextEdit::insert(content_range(node).start, fragment)
}

/// Insert `fragment` right after `node`.
pub fn insert_after(node: Node<'_, '_>, fragment: &str) -> TextEdit {
    TextEdit::insert(node.range().end, fragment)
}

/// Insert `fragment` right before `node`.
pub fn insert_before(node: Node<'_, '_>, fragment: &str) -> TextEdit {
    TextEdit::insert(node.range().start, fragment)
}

/// Replace the whole element.
pub fn replace_node(node: Node<'_, '_>, fragment: &str) -> TextEdit {
    TextEdit::replace(node.range(), fragment)
}

/// Replace the element's content with escaped `text`.
pub fn replace_text_content(node: Node<'_, '_>, text: &str) -> TextEdit {
    let escaped = crate::writer::escape_text(text);
    if is_self_closing(node) {
        let end = node.range().end;
        let qname = element_qname(node);
        return TextEdit::replace(end - 2..end, format!(">{escaped}</{qname}>"));
    }
    TextEdit::replace(content_range(node), escaped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find<'a, 'i>(doc: &'a roxmltree::Document<'i>, name: &str) -> Node<'a, 'i> {
        doc.descendants().find(|n| n.has_tag_name(name)).unwrap()
    }

    #[test]
    fn test_insert_last_child() {
        let xml = r#"<a><b x="1">t</b><p:c xmlns:p="urn:p"/></a>"#;
        let doc = crate::parse(xml).unwrap();
        let edits = vec![
            insert_last_child(find(&doc, "b"), "<n/>"),
            insert_last_child(find(&doc, "c"), "<m/>"),
        ];
        let out = apply_edits(xml, edits).unwrap();
        assert_eq!(
            out,
            r#"<a><b x="1">t<n/></b><p:c xmlns:p="urn:p"><m/></p:c></a>"#
        );
    }

    #[test]
    fn test_same_offset_keeps_order() {
        let xml = "<a><b/></a>";
        let doc = crate::parse(xml).unwrap();
        let b = find(&doc, "b");
        let out = apply_edits(xml, vec![insert_after(b, "<x/>"), insert_after(b, "<y/>")]).unwrap();
        assert_eq!(out, "<a><b/><x/><y/></a>");
    }

    #[test]
    fn test_replace_text_content() {
        let xml = "<a><v>old</v><w/></a>";
        let doc = crate::parse(xml).unwrap();
        let out = apply_edits(
            xml,
            vec![
                replace_text_content(find(&doc, "v"), "n&w"),
                replace_text_content(find(&doc, "w"), "z"),
            ],
        )
        .unwrap();
        assert_eq!(out, "<a><v>n&amp;w</v><w>z</w></a>");
    }

    #[test]
    fn test_overlap_rejected() {
        let edits = vec![TextEdit::replace(0..4, "x"), TextEdit::replace(2..6, "y")];
        assert!(apply_edits("0123456789", edits).is_err());
    }
}
