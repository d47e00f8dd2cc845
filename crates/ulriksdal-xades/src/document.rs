#![forbid(unsafe_code)]

//! A signed XML document and the signatures inside it.
//!
//! The XML text is the only mutable state. Every `ds:Signature` in it is
//! indexed in an arena keyed by signature id, with an explicit parent
//! link for counter-signatures. The arena is rebuilt from the text after
//! each mutation, so a reload of [`SignedDocument::xml`] always yields an
//! identical document.

use crate::level::SignatureLevel;
use crate::params::Prefixes;
use crate::signature::Signature;
use crate::validation::{self, ValidationFlags, ValidationOptions, ValidationResult};
use roxmltree::{Document, Node};
use std::collections::BTreeMap;
use ulriksdal_core::{ns, Error};
use ulriksdal_dsig::DsigContext;
use ulriksdal_xml::{document, edit};

/// One indexed signature.
#[derive(Debug, Clone)]
pub(crate) struct SignatureEntry {
    pub signature: Signature,
    /// Key of the signature this one counter-signs.
    pub parent: Option<String>,
    /// Position among all `ds:Signature` elements in document order.
    pub ordinal: usize,
}

#[derive(Debug, Clone)]
pub struct SignedDocument {
    xml: String,
    ctx: DsigContext,
    principal: String,
    arena: BTreeMap<String, SignatureEntry>,
}

impl SignedDocument {
    /// Load a document and select its first top-level signature.
    pub fn load(xml: impl Into<String>) -> Result<Self, Error> {
        Self::load_with_context(xml, DsigContext::new())
    }

    pub fn load_with_context(xml: impl Into<String>, ctx: DsigContext) -> Result<Self, Error> {
        let xml = xml.into();
        let arena = index(&xml)?;
        let principal = top_level_keys(&arena)
            .into_iter()
            .next()
            .ok_or_else(|| Error::MissingElement("Signature".into()))?;
        tracing::debug!(signature = %principal, signatures = arena.len(), "document loaded");
        Ok(Self {
            xml,
            ctx,
            principal,
            arena,
        })
    }

    /// One document per top-level signature (co-signatures), all sharing
    /// the same text.
    pub fn load_all(xml: impl Into<String>, ctx: DsigContext) -> Result<Vec<Self>, Error> {
        let xml = xml.into();
        let arena = index(&xml)?;
        let keys = top_level_keys(&arena);
        if keys.is_empty() {
            return Err(Error::MissingElement("Signature".into()));
        }
        Ok(keys
            .into_iter()
            .map(|principal| Self {
                xml: xml.clone(),
                ctx: ctx.clone(),
                principal,
                arena: arena.clone(),
            })
            .collect())
    }

    /// The same text, with `signature_id` as the principal signature.
    pub fn select(&self, signature_id: &str) -> Result<Self, Error> {
        if !self.arena.contains_key(signature_id) {
            return Err(Error::MissingElement(format!("Signature with Id {signature_id}")));
        }
        Ok(Self {
            principal: signature_id.to_owned(),
            ..self.clone()
        })
    }

    pub fn xml(&self) -> &str {
        &self.xml
    }

    pub fn into_xml(self) -> String {
        self.xml
    }

    pub fn context(&self) -> &DsigContext {
        &self.ctx
    }

    /// The principal signature.
    pub fn signature(&self) -> &Signature {
        // the principal key is always present: every constructor and
        // every reindex checks it
        &self.arena[&self.principal].signature
    }

    /// Arena key of the principal signature (its `Id`).
    pub fn signature_id(&self) -> &str {
        &self.principal
    }

    pub fn signature_by_id(&self, id: &str) -> Option<&Signature> {
        self.arena.get(id).map(|e| &e.signature)
    }

    /// Every signature in the document, keyed by id.
    pub fn signatures(&self) -> impl Iterator<Item = (&str, &Signature)> {
        self.arena.iter().map(|(k, e)| (k.as_str(), &e.signature))
    }

    /// Keys of the signatures that counter-sign `id`.
    pub fn counter_signatures_of(&self, id: &str) -> Vec<&str> {
        self.arena
            .iter()
            .filter(|(_, e)| e.parent.as_deref() == Some(id))
            .map(|(k, _)| k.as_str())
            .collect()
    }

    pub fn parent_of(&self, id: &str) -> Option<&str> {
        self.arena.get(id)?.parent.as_deref()
    }

    pub fn level(&self) -> SignatureLevel {
        self.signature().level()
    }

    /// Run the full rule battery; errors become an invalid result.
    pub fn validate(&self) -> ValidationResult {
        self.validate_with(&ValidationOptions::default())
    }

    #[tracing::instrument(level = "info", skip(self, options), fields(signature = %self.principal))]
    pub fn validate_with(&self, options: &ValidationOptions) -> ValidationResult {
        match self.check_with(options) {
            Ok(_) => ValidationResult::valid(),
            Err(e) => {
                tracing::info!(error = %e, "signature invalid");
                ValidationResult::from_error(&e)
            }
        }
    }

    /// Fail-fast check of the rules selected by `flags`: `Ok(true)` or
    /// the first failing rule as [`Error::Validation`].
    pub fn check_signature(&self, flags: ValidationFlags) -> Result<bool, Error> {
        self.check_with(&ValidationOptions {
            flags,
            ..ValidationOptions::default()
        })
    }

    fn check_with(&self, options: &ValidationOptions) -> Result<bool, Error> {
        let ctx = options.context.as_ref().unwrap_or(&self.ctx);
        validation::check(self, &self.principal, options.flags, ctx)?;
        Ok(true)
    }

    // ── Crate-internal access and mutation ──────────────────────────

    pub(crate) fn from_parts(xml: String, ctx: DsigContext, principal: &str) -> Result<Self, Error> {
        let arena = index(&xml)?;
        if !arena.contains_key(principal) {
            return Err(Error::MissingElement(format!("Signature with Id {principal}")));
        }
        Ok(Self {
            xml,
            ctx,
            principal: principal.to_owned(),
            arena,
        })
    }

    pub(crate) fn entry(&self, key: &str) -> Result<&SignatureEntry, Error> {
        self.arena
            .get(key)
            .ok_or_else(|| Error::MissingElement(format!("Signature with Id {key}")))
    }

    /// Locate a signature's element in a parse of [`xml`](Self::xml).
    pub(crate) fn signature_node<'a, 'i>(&self, doc: &'a Document<'i>, key: &str) -> Result<Node<'a, 'i>, Error> {
        let ordinal = self.entry(key)?.ordinal;
        document::find_elements(doc, ns::DSIG, ns::node::SIGNATURE)
            .into_iter()
            .nth(ordinal)
            .ok_or_else(|| Error::XmlStructure(format!("signature {key} not found in document")))
    }

    /// Replace the text and rebuild the arena, keeping the principal.
    pub(crate) fn replace_xml(&mut self, xml: String) -> Result<(), Error> {
        let arena = index(&xml)?;
        if !arena.contains_key(&self.principal) {
            return Err(Error::XmlStructure(format!(
                "signature {} disappeared after edit",
                self.principal
            )));
        }
        self.xml = xml;
        self.arena = arena;
        Ok(())
    }

    /// Prefixes in use at signature `key`.
    pub(crate) fn prefixes(&self, key: &str) -> Result<Prefixes, Error> {
        let doc = ulriksdal_xml::parse(&self.xml)?;
        Ok(Prefixes::from_signature(self.signature_node(&doc, key)?))
    }

    /// Append serialized elements to the `UnsignedSignatureProperties` of
    /// signature `key`, creating the containers when missing.
    pub(crate) fn append_unsigned_properties(&mut self, key: &str, fragment: &str) -> Result<(), Error> {
        let doc = ulriksdal_xml::parse(&self.xml)?;
        let sig = self.signature_node(&doc, key)?;
        let p = Prefixes::from_signature(sig);
        let qp = qualifying_properties_node(sig)
            .ok_or_else(|| Error::MissingElement("QualifyingProperties".into()))?;

        let text_edit = match document::find_child(qp, ns::XADES, ns::node::UNSIGNED_PROPERTIES) {
            Some(up) => match document::find_child(up, ns::XADES, ns::node::UNSIGNED_SIGNATURE_PROPERTIES) {
                Some(usp) => edit::insert_last_child(usp, fragment),
                None => edit::insert_first_child(up, &wrap(&p, ns::node::UNSIGNED_SIGNATURE_PROPERTIES, fragment)),
            },
            None => {
                let usp = wrap(&p, ns::node::UNSIGNED_SIGNATURE_PROPERTIES, fragment);
                edit::insert_last_child(qp, &wrap(&p, ns::node::UNSIGNED_PROPERTIES, &usp))
            }
        };
        let xml = edit::apply_edits(&self.xml, vec![text_edit])?;
        drop(doc);
        self.replace_xml(xml)
    }
}

fn wrap(p: &Prefixes, local: &str, inner: &str) -> String {
    let name = p.xades(local);
    format!("<{name}>{inner}</{name}>")
}

/// The `QualifyingProperties` element of a signature.
pub(crate) fn qualifying_properties_node<'a, 'i>(sig: Node<'a, 'i>) -> Option<Node<'a, 'i>> {
    document::find_children(sig, ns::DSIG, ns::node::OBJECT)
        .into_iter()
        .find_map(|o| document::find_child(o, ns::XADES, ns::node::QUALIFYING_PROPERTIES))
}

/// Index every `ds:Signature` of `xml`.
fn index(xml: &str) -> Result<BTreeMap<String, SignatureEntry>, Error> {
    let doc = ulriksdal_xml::parse(xml)?;
    let nodes = document::find_elements(&doc, ns::DSIG, ns::node::SIGNATURE);
    let key_of = |ordinal: usize, node: Node<'_, '_>| {
        node.attribute(ns::attr::ID)
            .map(str::to_owned)
            .unwrap_or_else(|| format!("#{ordinal}"))
    };

    let mut arena = BTreeMap::new();
    for (ordinal, node) in nodes.iter().enumerate() {
        let key = key_of(ordinal, *node);
        let parent = counter_signed_parent(*node).map(|p| {
            let pos = nodes.iter().position(|n| *n == p).unwrap_or(ordinal);
            key_of(pos, p)
        });
        let entry = SignatureEntry {
            signature: Signature::from_node(*node)?,
            parent,
            ordinal,
        };
        if arena.insert(key.clone(), entry).is_some() {
            return Err(Error::XmlStructure(format!("duplicate signature id {key}")));
        }
    }
    Ok(arena)
}

/// The signature a `xades:CounterSignature` wrapping `node` belongs to.
fn counter_signed_parent<'a, 'i>(node: Node<'a, 'i>) -> Option<Node<'a, 'i>> {
    let wrapper = node.parent_element()?;
    if !document::is_element(wrapper, ns::XADES, ns::node::COUNTER_SIGNATURE) {
        return None;
    }
    wrapper
        .ancestors()
        .skip(1)
        .find(|a| document::is_element(*a, ns::DSIG, ns::node::SIGNATURE))
}

fn top_level_keys(arena: &BTreeMap<String, SignatureEntry>) -> Vec<String> {
    let mut top: Vec<(&String, usize)> = arena
        .iter()
        .filter(|(_, e)| e.parent.is_none())
        .map(|(k, e)| (k, e.ordinal))
        .collect();
    top.sort_by_key(|(_, ordinal)| *ordinal);
    top.into_iter().map(|(k, _)| k.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(id: &str, inner: &str) -> String {
        format!(
            concat!(
                r#"<ds:Signature Id="{id}"><ds:SignedInfo>"#,
                r#"<ds:CanonicalizationMethod Algorithm="http://www.w3.org/TR/2001/REC-xml-c14n-20010315"/>"#,
                r#"<ds:SignatureMethod Algorithm="http://www.w3.org/2001/04/xmldsig-more#rsa-sha256"/>"#,
                r#"<ds:Reference URI=""><ds:DigestMethod Algorithm="http://www.w3.org/2001/04/xmlenc#sha256"/>"#,
                r#"<ds:DigestValue>AA==</ds:DigestValue></ds:Reference></ds:SignedInfo>"#,
                r#"<ds:SignatureValue Id="{id}-value">AA==</ds:SignatureValue>{inner}</ds:Signature>"#
            ),
            id = id,
            inner = inner
        )
    }

    fn xades_object(target: &str, unsigned: &str) -> String {
        format!(
            r##"<ds:Object><xades:QualifyingProperties xmlns:xades="http://uri.etsi.org/01903/v1.3.2#" Target="#{target}"><xades:SignedProperties Id="sp-{target}"/>{unsigned}</xades:QualifyingProperties></ds:Object>"##
        )
    }

    fn wrap_doc(body: &str) -> String {
        format!(r#"<doc xmlns:ds="http://www.w3.org/2000/09/xmldsig#">{body}</doc>"#)
    }

    #[test]
    fn test_arena_links_counter_signatures() {
        let counter = format!(
            "<xades:UnsignedProperties><xades:UnsignedSignatureProperties><xades:CounterSignature>{}</xades:CounterSignature></xades:UnsignedSignatureProperties></xades:UnsignedProperties>",
            sig("b", "")
        );
        let xml = wrap_doc(&format!("{}{}", sig("a", &xades_object("a", &counter)), sig("c", "")));
        let doc = SignedDocument::load(xml.clone()).unwrap();
        assert_eq!(doc.signature_id(), "a");
        assert_eq!(doc.counter_signatures_of("a"), vec!["b"]);
        assert_eq!(doc.parent_of("b"), Some("a"));
        assert_eq!(
            doc.signature().unsigned_properties().unwrap().counter_signature_ids(),
            vec!["b"]
        );

        let all = SignedDocument::load_all(xml, DsigContext::new()).unwrap();
        let principals: Vec<_> = all.iter().map(|d| d.signature_id().to_owned()).collect();
        assert_eq!(principals, vec!["a".to_string(), "c".to_string()]);
        assert!(doc.select("b").is_ok());
        assert!(doc.select("zz").is_err());
    }

    #[test]
    fn test_append_creates_containers_then_reuses_them() {
        let xml = wrap_doc(&sig("a", &xades_object("a", "")));
        let mut doc = SignedDocument::load(xml).unwrap();
        doc.append_unsigned_properties("a", r#"<xades:CertificateValues Id="cv1"/>"#)
            .unwrap();
        doc.append_unsigned_properties("a", r#"<xades:CertificateValues Id="cv2"/>"#)
            .unwrap();
        assert!(doc.xml().contains(concat!(
            r#"<xades:UnsignedProperties><xades:UnsignedSignatureProperties>"#,
            r#"<xades:CertificateValues Id="cv1"/><xades:CertificateValues Id="cv2"/>"#,
            r#"</xades:UnsignedSignatureProperties></xades:UnsignedProperties>"#
        )));
        let ids: Vec<_> = doc
            .signature()
            .unsigned_properties()
            .unwrap()
            .signature_properties
            .iter()
            .filter_map(|p| p.id())
            .collect();
        assert_eq!(ids, vec!["cv1", "cv2"]);
        let reloaded = SignedDocument::load(doc.xml().to_owned()).unwrap();
        assert_eq!(reloaded.signature(), doc.signature());
    }

    #[test]
    fn test_signature_without_id_gets_positional_key() {
        let xml = wrap_doc(&sig("x", "").replace(r#" Id="x""#, ""));
        let doc = SignedDocument::load(xml).unwrap();
        assert_eq!(doc.signature_id(), "#0");
        assert!(doc.signature().id.is_none());
    }

    #[test]
    fn test_no_signature() {
        assert!(matches!(
            SignedDocument::load("<doc/>"),
            Err(Error::MissingElement(_))
        ));
    }
}
