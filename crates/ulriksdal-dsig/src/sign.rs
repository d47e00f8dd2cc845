#![forbid(unsafe_code)]

//! XML-DSig signature creation over templates.
//!
//! A template is a `ds:Signature` already placed in its document with
//! empty `DigestValue` and `SignatureValue` elements. Filling happens in
//! two steps so the signature value can also come from a remote signer:
//! [`fill_reference_digests`] then either [`sign_template`] or
//! [`signed_info_digest`] + [`fill_signature_value`].

use crate::context::DsigContext;
use crate::reference::Reference;
use crate::signed_info;
use roxmltree::{Document, Node};
use ulriksdal_core::{algorithm, ns, Error};
use ulriksdal_crypto::SigningKey;
use ulriksdal_xml::{document, edit, TextEdit};

/// Find the `ds:Signature` element carrying `Id="signature_id"`.
pub fn find_signature<'a, 'i>(
    doc: &'a Document<'i>,
    signature_id: &str,
) -> Result<Node<'a, 'i>, Error> {
    document::find_elements(doc, ns::DSIG, ns::node::SIGNATURE)
        .into_iter()
        .find(|n| n.attribute(ns::attr::ID) == Some(signature_id))
        .ok_or_else(|| Error::MissingElement(format!("Signature with Id {signature_id}")))
}

fn signed_info_of<'a, 'i>(signature: Node<'a, 'i>) -> Result<Node<'a, 'i>, Error> {
    document::find_child(signature, ns::DSIG, ns::node::SIGNED_INFO)
        .ok_or_else(|| Error::MissingElement("SignedInfo".into()))
}

/// Compute the digest of every reference in the signature and write it
/// into its `DigestValue`. Returns the updated document text.
pub fn fill_reference_digests(
    ctx: &DsigContext,
    xml: &str,
    signature_id: &str,
) -> Result<String, Error> {
    let doc = ulriksdal_xml::parse(xml)?;
    let id_map = document::build_id_map(&doc, &ctx.id_attrs);
    let signature = find_signature(&doc, signature_id)?;

    let mut edits = Vec::new();
    for node in document::find_children(signed_info_of(signature)?, ns::DSIG, ns::node::REFERENCE) {
        let reference = Reference::from_node(node)?;
        let digest = reference.compute_digest(&doc, &id_map, Some(signature), ctx)?;
        let value = document::find_child(node, ns::DSIG, ns::node::DIGEST_VALUE)
            .ok_or_else(|| Error::MissingElement("DigestValue".into()))?;
        edits.push(edit::replace_text_content(value, &crate::encode_base64(&digest)));
    }
    edit::apply_edits(xml, edits)
}

/// Canonical `SignedInfo` octets of the signature.
pub fn signed_info_octets(xml: &str, signature_id: &str) -> Result<Vec<u8>, Error> {
    let doc = ulriksdal_xml::parse(xml)?;
    let signature = find_signature(&doc, signature_id)?;
    signed_info::canonicalize_signed_info(signed_info_of(signature)?)
}

/// The hash a remote signer has to sign: the canonical `SignedInfo`
/// digested with the hash of the signature method.
pub fn signed_info_digest(xml: &str, signature_id: &str, signature_method: &str) -> Result<Vec<u8>, Error> {
    let digest_uri = algorithm::digest_for_signature(signature_method).ok_or_else(|| {
        Error::UnsupportedAlgorithm(format!("signature algorithm: {signature_method}"))
    })?;
    let octets = signed_info_octets(xml, signature_id)?;
    ulriksdal_crypto::digest::digest(digest_uri, &octets)
}

/// Write `value` into the signature's `SignatureValue`.
pub fn fill_signature_value(xml: &str, signature_id: &str, value: &[u8]) -> Result<String, Error> {
    let doc = ulriksdal_xml::parse(xml)?;
    let signature = find_signature(&doc, signature_id)?;
    let node = document::find_child(signature, ns::DSIG, ns::node::SIGNATURE_VALUE)
        .ok_or_else(|| Error::MissingElement("SignatureValue".into()))?;
    let edits: Vec<TextEdit> = vec![edit::replace_text_content(node, &crate::encode_base64(value))];
    edit::apply_edits(xml, edits)
}

/// Sign the canonical `SignedInfo` locally and fill `SignatureValue`.
/// Returns the updated text and the raw signature value.
pub fn sign_template(
    xml: &str,
    signature_id: &str,
    signature_method: &str,
    key: &SigningKey,
) -> Result<(String, Vec<u8>), Error> {
    let octets = signed_info_octets(xml, signature_id)?;
    let alg = ulriksdal_crypto::sign::from_uri(signature_method)?;
    let value = alg.sign(key, &octets)?;
    Ok((fill_signature_value(xml, signature_id, &value)?, value))
}
