#![forbid(unsafe_code)]

//! XML-DSig signature verification.
//!
//! Core validation in two halves: every `ds:Reference` is dereferenced,
//! transformed and its digest compared, then the canonical `SignedInfo`
//! is checked against `SignatureValue` with the key of the first
//! `X509Certificate` in `KeyInfo`.

use crate::context::DsigContext;
use crate::keyinfo::KeyInfo;
use crate::reference::Reference;
use crate::signed_info::{self, SignedInfo};
use roxmltree::{Document, Node, NodeId};
use std::collections::HashMap;
use ulriksdal_core::{ns, Error};
use ulriksdal_crypto::SigningKey;
use ulriksdal_xml::document;

/// Result of signature verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    /// Signature is valid.
    Valid,
    /// Signature is invalid.
    Invalid { reason: String },
}

impl VerifyResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, VerifyResult::Valid)
    }

    fn invalid(reason: impl Into<String>) -> Self {
        VerifyResult::Invalid {
            reason: reason.into(),
        }
    }
}

/// Verify the first `ds:Signature` of a document.
#[tracing::instrument(level = "info", skip(ctx, xml))]
pub fn verify(ctx: &DsigContext, xml: &str) -> Result<VerifyResult, Error> {
    let doc = ulriksdal_xml::parse(xml)?;
    let signature = document::find_element(&doc, ns::DSIG, ns::node::SIGNATURE)
        .ok_or_else(|| Error::MissingElement("Signature".into()))?;
    verify_signature(ctx, &doc, signature)
}

/// Verify one `ds:Signature` element with the key from its `KeyInfo`.
pub fn verify_signature(
    ctx: &DsigContext,
    doc: &Document<'_>,
    signature: Node<'_, '_>,
) -> Result<VerifyResult, Error> {
    let references = verify_references(ctx, doc, signature)?;
    if !references.is_valid() {
        return Ok(references);
    }
    let key_info = document::find_child(signature, ns::DSIG, ns::node::KEY_INFO)
        .ok_or_else(|| Error::MissingElement("KeyInfo".into()))?;
    let key_info = KeyInfo::from_node(key_info)?;
    let cert = key_info
        .signing_certificate()
        .ok_or_else(|| Error::Key("KeyInfo carries no X509Certificate".into()))?;
    verify_signature_value(signature, &cert.public_key()?)
}

/// Recompute every reference digest of `signature` and compare it with
/// the stored `DigestValue`.
pub fn verify_references(
    ctx: &DsigContext,
    doc: &Document<'_>,
    signature: Node<'_, '_>,
) -> Result<VerifyResult, Error> {
    let id_map = document::build_id_map(doc, &ctx.id_attrs);
    let info = signed_info_of(signature)?;
    for reference in &info.references {
        if !verify_reference(ctx, doc, &id_map, signature, reference)? {
            tracing::warn!(uri = %reference.uri, "reference digest mismatch");
            return Ok(VerifyResult::invalid(format!(
                "digest mismatch for reference {:?}",
                reference.uri
            )));
        }
    }
    Ok(VerifyResult::Valid)
}

/// Whether a single reference's stored digest matches its target.
pub fn verify_reference(
    ctx: &DsigContext,
    doc: &Document<'_>,
    id_map: &HashMap<String, NodeId>,
    signature: Node<'_, '_>,
    reference: &Reference,
) -> Result<bool, Error> {
    let computed = reference.compute_digest(doc, id_map, Some(signature), ctx)?;
    Ok(computed == reference.digest_value)
}

/// Check `SignatureValue` over the canonical `SignedInfo` with `key`.
pub fn verify_signature_value(
    signature: Node<'_, '_>,
    key: &SigningKey,
) -> Result<VerifyResult, Error> {
    let info_node = document::find_child(signature, ns::DSIG, ns::node::SIGNED_INFO)
        .ok_or_else(|| Error::MissingElement("SignedInfo".into()))?;
    let info = SignedInfo::from_node(info_node)?;
    let value_node = document::find_child(signature, ns::DSIG, ns::node::SIGNATURE_VALUE)
        .ok_or_else(|| Error::MissingElement("SignatureValue".into()))?;
    let value = crate::decode_base64(&document::text_content(value_node), "SignatureValue")?;
    if value.is_empty() {
        return Ok(VerifyResult::invalid("SignatureValue is empty"));
    }

    let octets = signed_info::canonicalize_signed_info(info_node)?;
    let alg = ulriksdal_crypto::sign::from_uri(&info.signature_method)?;
    if alg.verify(key, &octets, &value)? {
        Ok(VerifyResult::Valid)
    } else {
        Ok(VerifyResult::invalid("signature value does not verify"))
    }
}

fn signed_info_of(signature: Node<'_, '_>) -> Result<SignedInfo, Error> {
    let node = document::find_child(signature, ns::DSIG, ns::node::SIGNED_INFO)
        .ok_or_else(|| Error::MissingElement("SignedInfo".into()))?;
    SignedInfo::from_node(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sign;
    use ulriksdal_keys::{loader, X509Certificate};

    fn fixture(name: &str) -> Vec<u8> {
        let path = format!("{}/../../test-data/pki/{name}", env!("CARGO_MANIFEST_DIR"));
        std::fs::read(path).unwrap()
    }

    /// Enveloped template with a KeyInfo holding `cert`.
    fn template(cert: &X509Certificate, method: &str) -> String {
        let mut w = ulriksdal_xml::XmlWriter::new();
        KeyInfo::new(None, vec![cert.clone()]).write(&mut w, "ds").unwrap();
        let key_info = w.into_string().unwrap();
        format!(
            concat!(
                r#"<doc Id="d"><item>one</item>"#,
                r#"<ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#" Id="sig"><ds:SignedInfo>"#,
                r#"<ds:CanonicalizationMethod Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"/>"#,
                r#"<ds:SignatureMethod Algorithm="{method}"/>"#,
                r#"<ds:Reference URI=""><ds:Transforms>"#,
                r#"<ds:Transform Algorithm="http://www.w3.org/2000/09/xmldsig#enveloped-signature"/>"#,
                r#"</ds:Transforms><ds:DigestMethod Algorithm="http://www.w3.org/2001/04/xmlenc#sha256"/>"#,
                r#"<ds:DigestValue></ds:DigestValue></ds:Reference></ds:SignedInfo>"#,
                r#"<ds:SignatureValue></ds:SignatureValue>{key_info}</ds:Signature></doc>"#
            ),
            method = method,
            key_info = key_info,
        )
    }

    fn signed(key_file: &str, cert_file: &str) -> String {
        let key = loader::load_signing_identity(&fixture(key_file), &fixture(cert_file)).unwrap();
        let cert = key.certificate().unwrap().clone();
        let method = key.default_signature_method();
        let ctx = DsigContext::new();
        let xml = sign::fill_reference_digests(&ctx, &template(&cert, method), "sig").unwrap();
        sign::sign_template(&xml, "sig", method, &key.to_signing_key())
            .unwrap()
            .0
    }

    #[test]
    fn test_verify_rsa() {
        let xml = signed("signer-a.key.pem", "signer-a.pem");
        assert_eq!(verify(&DsigContext::new(), &xml).unwrap(), VerifyResult::Valid);
    }

    #[test]
    fn test_verify_ecdsa() {
        let xml = signed("signer-ec.key.pem", "signer-ec.pem");
        assert!(verify(&DsigContext::new(), &xml).unwrap().is_valid());
    }

    #[test]
    fn test_tampered_content_fails_reference() {
        let xml = signed("signer-a.key.pem", "signer-a.pem").replace(">one<", ">two<");
        let result = verify(&DsigContext::new(), &xml).unwrap();
        assert!(matches!(result, VerifyResult::Invalid { reason } if reason.contains("digest mismatch")));
    }

    #[test]
    fn test_wrong_key_fails_signature_value() {
        let xml = signed("signer-a.key.pem", "signer-a.pem");
        let doc = ulriksdal_xml::parse(&xml).unwrap();
        let sig = document::find_element(&doc, ns::DSIG, ns::node::SIGNATURE).unwrap();
        let other = X509Certificate::from_pem(&fixture("signer-b.pem")).unwrap();
        let result = verify_signature_value(sig, &other.public_key().unwrap()).unwrap();
        assert!(!result.is_valid());
    }
}
