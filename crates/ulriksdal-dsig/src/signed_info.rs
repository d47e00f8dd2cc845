#![forbid(unsafe_code)]

//! `ds:SignedInfo`: model, serialization and canonicalization.

use crate::reference::{qualified, Reference};
use roxmltree::Node;
use ulriksdal_c14n::C14nMode;
use ulriksdal_core::{ns, Error};
use ulriksdal_xml::{document, XmlWriter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedInfo {
    pub id: Option<String>,
    pub c14n_mode: C14nMode,
    /// InclusiveNamespaces PrefixList of the canonicalization method.
    pub c14n_prefixes: Vec<String>,
    pub signature_method: String,
    pub references: Vec<Reference>,
}

impl SignedInfo {
    pub fn new(c14n_mode: C14nMode, signature_method: &str) -> Self {
        Self {
            id: None,
            c14n_mode,
            c14n_prefixes: Vec::new(),
            signature_method: signature_method.to_owned(),
            references: Vec::new(),
        }
    }

    /// Read a `ds:SignedInfo` element.
    pub fn from_node(node: Node<'_, '_>) -> Result<Self, Error> {
        let c14n = document::find_child(node, ns::DSIG, ns::node::CANONICALIZATION_METHOD)
            .ok_or_else(|| Error::MissingElement("CanonicalizationMethod".into()))?;
        let c14n_mode = C14nMode::require(document::required_attr(c14n, ns::attr::ALGORITHM)?)?;
        let c14n_prefixes = document::find_child(c14n, ns::EXC_C14N, ns::node::INCLUSIVE_NAMESPACES)
            .and_then(|n| n.attribute(ns::attr::PREFIX_LIST))
            .map(|l| l.split_whitespace().map(str::to_owned).collect())
            .unwrap_or_default();
        let method = document::find_child(node, ns::DSIG, ns::node::SIGNATURE_METHOD)
            .ok_or_else(|| Error::MissingElement("SignatureMethod".into()))?;
        let references = document::find_children(node, ns::DSIG, ns::node::REFERENCE)
            .into_iter()
            .map(Reference::from_node)
            .collect::<Result<Vec<_>, _>>()?;
        if references.is_empty() {
            return Err(Error::MissingElement("Reference".into()));
        }
        Ok(Self {
            id: node.attribute(ns::attr::ID).map(str::to_owned),
            c14n_mode,
            c14n_prefixes,
            signature_method: document::required_attr(method, ns::attr::ALGORITHM)?.to_owned(),
            references,
        })
    }

    pub fn write(&self, w: &mut XmlWriter, ds: &str) -> Result<(), Error> {
        let name = |local: &str| qualified(ds, local);
        let id_attr: Vec<(&str, &str)> = self
            .id
            .as_deref()
            .map(|id| vec![(ns::attr::ID, id)])
            .unwrap_or_default();
        w.start_element(&name(ns::node::SIGNED_INFO), &id_attr)?;

        let c14n_alg = [(ns::attr::ALGORITHM, self.c14n_mode.uri())];
        if self.c14n_prefixes.is_empty() {
            w.empty_element(&name(ns::node::CANONICALIZATION_METHOD), &c14n_alg)?;
        } else {
            w.start_element(&name(ns::node::CANONICALIZATION_METHOD), &c14n_alg)?;
            let list = self.c14n_prefixes.join(" ");
            w.empty_element(
                "ec:InclusiveNamespaces",
                &[("xmlns:ec", ns::EXC_C14N), (ns::attr::PREFIX_LIST, &list)],
            )?;
            w.end_element(&name(ns::node::CANONICALIZATION_METHOD))?;
        }
        w.empty_element(
            &name(ns::node::SIGNATURE_METHOD),
            &[(ns::attr::ALGORITHM, &self.signature_method)],
        )?;
        for r in &self.references {
            r.write(w, ds)?;
        }
        w.end_element(&name(ns::node::SIGNED_INFO))
    }

    /// First reference whose `Type` is `type_uri`.
    pub fn reference_by_type(&self, type_uri: &str) -> Option<&Reference> {
        self.references
            .iter()
            .find(|r| r.type_uri.as_deref() == Some(type_uri))
    }

    pub fn reference_by_id(&self, id: &str) -> Option<&Reference> {
        self.references.iter().find(|r| r.id.as_deref() == Some(id))
    }
}

/// Canonical form of a `ds:SignedInfo` element.
///
/// The namespaces in scope at the element (declared on any ancestor, not
/// just the document root) are propagated onto it first, so the octets
/// are the same whether the signature sits at the root or deep inside
/// another document.
pub fn canonicalize_signed_info(node: Node<'_, '_>) -> Result<Vec<u8>, Error> {
    let info = SignedInfo::from_node(node)?;
    ulriksdal_c14n::canonicalize_fragment(node, info.c14n_mode, &info.c14n_prefixes)
}
