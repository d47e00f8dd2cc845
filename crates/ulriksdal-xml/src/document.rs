#![forbid(unsafe_code)]

//! XML document wrapper over roxmltree with ID attribute registration.

use roxmltree::{Document, Node, NodeId};
use std::collections::HashMap;
use ulriksdal_core::Error;

/// Attribute names treated as identifiers on every element.
pub const DEFAULT_ID_ATTRS: [&str; 3] = ["Id", "ID", "id"];

/// An owned XML document.  Stores the text and pre-computed metadata.
///
/// To work with the parsed tree, call [`XmlDocument::parse_doc`] which
/// returns a temporary `roxmltree::Document` borrowing from the text.
#[derive(Debug, Clone)]
pub struct XmlDocument {
    text: String,
    /// Additional ID attribute names to register (beyond `Id`, `ID`, `id`).
    extra_id_attrs: Vec<String>,
}

impl XmlDocument {
    /// Parse and validate XML from a string, taking ownership.
    pub fn parse(text: String) -> Result<Self, Error> {
        crate::parse(&text)?;
        Ok(Self {
            text,
            extra_id_attrs: Vec::new(),
        })
    }

    /// Parse and validate XML from bytes.
    pub fn parse_bytes(data: &[u8]) -> Result<Self, Error> {
        let text = std::str::from_utf8(data)
            .map_err(|e| Error::XmlParse(format!("invalid UTF-8: {e}")))?
            .to_owned();
        Self::parse(text)
    }

    /// Get the raw XML text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Consume the document, returning its text.
    pub fn into_text(self) -> String {
        self.text
    }

    /// Register an additional ID attribute name.
    pub fn add_id_attr(&mut self, name: &str) {
        self.extra_id_attrs.push(name.to_owned());
    }

    pub fn id_attrs(&self) -> &[String] {
        &self.extra_id_attrs
    }

    /// Parse the document and return a temporary `roxmltree::Document`.
    ///
    /// Parse once at the top of a processing step and pass the resulting
    /// document down through the call chain.
    pub fn parse_doc(&self) -> Result<Document<'_>, Error> {
        crate::parse(&self.text)
    }

    /// Replace the text, re-validating it.
    pub fn replace_text(&mut self, text: String) -> Result<(), Error> {
        crate::parse(&text)?;
        self.text = text;
        Ok(())
    }

    /// Build the ID → NodeId mapping for a parsed document.
    pub fn build_id_map(&self, doc: &Document<'_>) -> HashMap<String, NodeId> {
        build_id_map(doc, &self.extra_id_attrs)
    }
}

/// Build the ID → NodeId map over `doc`, honouring `extra` attribute names.
///
/// When two elements carry the same id the first one in document order
/// wins.
pub fn build_id_map(doc: &Document<'_>, extra: &[String]) -> HashMap<String, NodeId> {
    let mut map = HashMap::new();
    for node in doc.descendants().filter(|n| n.is_element()) {
        let names = DEFAULT_ID_ATTRS
            .iter()
            .copied()
            .chain(extra.iter().map(String::as_str));
        for attr_name in names {
            if let Some(val) = node.attribute(attr_name) {
                map.entry(val.to_owned()).or_insert(node.id());
            }
        }
    }
    map
}

/// Value of the first identifier attribute present on `node`.
pub fn element_id<'a>(node: Node<'a, '_>) -> Option<&'a str> {
    DEFAULT_ID_ATTRS.iter().find_map(|a| node.attribute(*a))
}

/// Whether `node` is an element with the given namespace and local name.
pub fn is_element(node: Node<'_, '_>, ns: &str, local_name: &str) -> bool {
    node.is_element()
        && node.tag_name().name() == local_name
        && node.tag_name().namespace().unwrap_or("") == ns
}

/// Find the first descendant element with the given local name and namespace.
pub fn find_element<'a, 'i>(
    doc: &'a Document<'i>,
    ns: &str,
    local_name: &str,
) -> Option<Node<'a, 'i>> {
    doc.descendants().find(|n| is_element(*n, ns, local_name))
}

/// Find all descendant elements with the given local name and namespace.
pub fn find_elements<'a, 'i>(
    doc: &'a Document<'i>,
    ns: &str,
    local_name: &str,
) -> Vec<Node<'a, 'i>> {
    doc.descendants()
        .filter(|n| is_element(*n, ns, local_name))
        .collect()
}

/// First child element of `parent` with the given name.
pub fn find_child<'a, 'i>(parent: Node<'a, 'i>, ns: &str, local_name: &str) -> Option<Node<'a, 'i>> {
    parent.children().find(|n| is_element(*n, ns, local_name))
}

/// All child elements of `parent` with the given name, in document order.
pub fn find_children<'a, 'i>(parent: Node<'a, 'i>, ns: &str, local_name: &str) -> Vec<Node<'a, 'i>> {
    parent
        .children()
        .filter(|n| is_element(*n, ns, local_name))
        .collect()
}

/// Child elements of `parent`, skipping text, comments and PIs.
pub fn element_children<'a, 'i>(parent: Node<'a, 'i>) -> impl Iterator<Item = Node<'a, 'i>> {
    parent.children().filter(|n| n.is_element())
}

/// Concatenated text content of `node`, trimmed.
pub fn text_content(node: Node<'_, '_>) -> String {
    let mut s = String::new();
    for d in node.descendants().filter(|d| d.is_text()) {
        if let Some(t) = d.text() {
            s.push_str(t);
        }
    }
    s.trim().to_owned()
}

/// Look up a required attribute, naming the element in the error.
pub fn required_attr<'a>(node: Node<'a, '_>, name: &str) -> Result<&'a str, Error> {
    node.attribute(name).ok_or_else(|| {
        Error::MissingAttribute(format!("{} on <{}>", name, node.tag_name().name()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_map_first_wins() {
        let xml = r#"<a Id="x"><b id="y"/><c ID="x"/></a>"#;
        let doc = crate::parse(xml).unwrap();
        let map = build_id_map(&doc, &[]);
        let x = doc.get_node(map["x"]).unwrap();
        assert_eq!(x.tag_name().name(), "a");
        assert!(map.contains_key("y"));
    }

    #[test]
    fn test_extra_id_attr() {
        let mut d = XmlDocument::parse(r#"<a><b key="k1"/></a>"#.into()).unwrap();
        d.add_id_attr("key");
        let doc = d.parse_doc().unwrap();
        assert!(d.build_id_map(&doc).contains_key("k1"));
    }

    #[test]
    fn test_text_content_and_children() {
        let xml = r#"<r xmlns:p="urn:p"><p:a> one </p:a><p:a>two</p:a><b/></r>"#;
        let doc = crate::parse(xml).unwrap();
        let kids = find_children(doc.root_element(), "urn:p", "a");
        assert_eq!(kids.len(), 2);
        assert_eq!(text_content(kids[0]), "one");
        assert!(find_child(doc.root_element(), "", "b").is_some());
        assert!(required_attr(kids[1], "Id").is_err());
    }
}
