#![forbid(unsafe_code)]

//! Exclusive Canonical XML 1.0 (exc-C14N).
//!
//! Algorithm URI: `http://www.w3.org/2001/10/xml-exc-c14n#`
//! With comments: `http://www.w3.org/2001/10/xml-exc-c14n#WithComments`
//!
//! Only "visibly utilized" namespace declarations are output.  A namespace
//! is visibly utilized if its prefix is used by the element's tag name or
//! by one of its attributes, or if it appears in the InclusiveNamespaces
//! PrefixList (`#default` naming the default namespace).

use crate::render::{self, NsDecl};
use std::collections::{BTreeMap, BTreeSet};
use ulriksdal_core::Error;
use ulriksdal_xml::{qname, NodeSet};

/// Canonicalize using Exclusive C14N 1.0.
pub fn canonicalize(
    doc: &roxmltree::Document<'_>,
    with_comments: bool,
    node_set: Option<&NodeSet>,
    inclusive_prefixes: &[String],
) -> Result<Vec<u8>, Error> {
    let mut output = Vec::new();
    let ctx = ExcC14nContext {
        with_comments,
        node_set,
        inclusive_prefixes: inclusive_prefixes
            .iter()
            .map(|p| if p == "#default" { String::new() } else { p.clone() })
            .collect(),
    };
    ctx.process_node(doc.root(), &mut output, &BTreeMap::new());
    Ok(output)
}

struct ExcC14nContext<'a> {
    with_comments: bool,
    node_set: Option<&'a NodeSet>,
    inclusive_prefixes: BTreeSet<String>,
}

impl ExcC14nContext<'_> {
    fn is_visible(&self, node: roxmltree::Node<'_, '_>) -> bool {
        self.node_set.map_or(true, |ns| ns.contains(node))
    }

    fn process_node(
        &self,
        node: roxmltree::Node<'_, '_>,
        output: &mut Vec<u8>,
        rendered_ns: &BTreeMap<String, String>,
    ) {
        match node.node_type() {
            roxmltree::NodeType::Root => {
                for child in node.children() {
                    self.process_node(child, output, rendered_ns);
                }
            }
            roxmltree::NodeType::Element => self.process_element(node, output, rendered_ns),
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
        rendered_ns: &BTreeMap<String, String>,
    ) {
        if !self.is_visible(node) {
            for child in node.children() {
                self.process_node(child, output, rendered_ns);
            }
            return;
        }

        let elem_name = qname::element_qname(node);
        let mut utilized: BTreeSet<String> = self.inclusive_prefixes.clone();
        utilized.insert(qname::prefix(elem_name).unwrap_or("").to_owned());
        for attr in node.attributes() {
            if let Some(p) = qname::prefix(qname::attr_qname(node, &attr)) {
                utilized.insert(p.to_owned());
            }
        }

        let in_scope: BTreeMap<String, String> =
            qname::in_scope_namespaces(node).into_iter().collect();

        let mut ns_decls: Vec<NsDecl> = Vec::new();
        for prefix in utilized.iter().filter(|p| p.as_str() != "xml") {
            match in_scope.get(prefix) {
                Some(uri) if rendered_ns.get(prefix) != Some(uri) => ns_decls.push(NsDecl {
                    prefix: prefix.clone(),
                    uri: uri.clone(),
                }),
                Some(_) => {}
                None if prefix.is_empty() => {
                    // default namespace went out of scope after being rendered
                    if rendered_ns.get("").is_some_and(|d| !d.is_empty()) {
                        ns_decls.push(NsDecl {
                            prefix: String::new(),
                            uri: String::new(),
                        });
                    }
                }
                None => {}
            }
        }
        ns_decls.sort();

        let mut attrs = render::element_attrs(node);
        attrs.sort();

        render::start_tag(elem_name, &ns_decls, &attrs, output);

        let mut child_rendered = rendered_ns.clone();
        for decl in &ns_decls {
            child_rendered.insert(decl.prefix.clone(), decl.uri.clone());
        }
        for child in node.children() {
            self.process_node(child, output, &child_rendered);
        }

        render::end_tag(elem_name, output);
    }
}
