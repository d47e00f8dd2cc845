#![forbid(unsafe_code)]

//! Timestamp inputs.
//!
//! Every timestamp names the elements it covers with `xades:Include`.
//! The message imprint is the digest of their canonical forms
//! concatenated in include order; an include that points at a
//! `ds:Reference` contributes the reference's transformed data instead.

use crate::ids;
use crate::properties::{Include, TimeStampKind, UnsignedSignatureProperty, XadesTimeStamp};
use crate::signature::Signature;
use roxmltree::{Document, Node, NodeId};
use std::collections::HashMap;
use ulriksdal_c14n::C14nMode;
use ulriksdal_core::{algorithm, ns, Error};
use ulriksdal_dsig::{DsigContext, Reference};
use ulriksdal_pki::{TimestampClient, TimestampToken};
use ulriksdal_xml::{document, xpath};

/// Ids a timestamp of `kind` must include when it sits at `position`
/// among the unsigned signature properties. `None` for kinds whose
/// coverage is chosen by the signer (individual data objects).
pub(crate) fn expected_includes(
    sig: &Signature,
    kind: TimeStampKind,
    position: usize,
) -> Result<Option<Vec<String>>, Error> {
    let preceding: &[UnsignedSignatureProperty] = sig
        .unsigned_properties()
        .map(|u| &u.signature_properties[..position.min(u.signature_properties.len())])
        .unwrap_or(&[]);
    let signature_value = || {
        sig.signature_value_id
            .clone()
            .ok_or_else(|| Error::MissingAttribute("Id on <SignatureValue>".into()))
    };

    let ids = match kind {
        TimeStampKind::IndividualDataObjects => return Ok(None),
        TimeStampKind::AllDataObjects => sig
            .signed_info
            .references
            .iter()
            .filter(|r| r.type_uri.as_deref() != Some(algorithm::TYPE_SIGNED_PROPERTIES))
            .map(reference_id)
            .collect::<Result<Vec<_>, _>>()?,
        TimeStampKind::Signature => vec![signature_value()?],
        TimeStampKind::SigAndRefs => {
            let mut ids = vec![signature_value()?];
            ids.extend(property_ids(preceding, |p| {
                matches!(p, UnsignedSignatureProperty::TimeStamp(ts) if ts.kind == TimeStampKind::Signature)
                    || is_refs(p)
            })?);
            ids
        }
        TimeStampKind::RefsOnly => property_ids(preceding, is_refs)?,
        TimeStampKind::Archive => {
            let mut ids = sig
                .signed_info
                .references
                .iter()
                .map(reference_id)
                .collect::<Result<Vec<_>, _>>()?;
            ids.push(
                sig.signed_info
                    .id
                    .clone()
                    .ok_or_else(|| Error::MissingAttribute("Id on <SignedInfo>".into()))?,
            );
            ids.push(signature_value()?);
            let key_info_id = sig.key_info.as_ref().and_then(|k| k.id.as_deref());
            if let Some(ki) = key_info_id {
                if sig.signed_info.references.iter().any(|r| r.target_id() == Some(ki)) {
                    ids.push(ki.to_owned());
                }
            }
            ids.extend(property_ids(preceding, |p| {
                !matches!(
                    p,
                    UnsignedSignatureProperty::CounterSignature { .. } | UnsignedSignatureProperty::Other(..)
                )
            })?);
            ids
        }
    };
    Ok(Some(ids))
}

fn is_refs(p: &UnsignedSignatureProperty) -> bool {
    matches!(
        p,
        UnsignedSignatureProperty::CompleteCertificateRefs(_) | UnsignedSignatureProperty::CompleteRevocationRefs(_)
    )
}

fn reference_id(r: &Reference) -> Result<String, Error> {
    r.id.clone()
        .ok_or_else(|| Error::MissingAttribute(format!("Id on <Reference URI={:?}>", r.uri)))
}

fn property_ids(
    props: &[UnsignedSignatureProperty],
    wanted: impl Fn(&UnsignedSignatureProperty) -> bool,
) -> Result<Vec<String>, Error> {
    props
        .iter()
        .filter(|p| wanted(p))
        .map(|p| {
            p.id()
                .map(str::to_owned)
                .ok_or_else(|| Error::MissingAttribute("Id on an unsigned signature property".into()))
        })
        .collect()
}

/// Octets covered by a timestamp, before hashing.
pub(crate) fn imprint_octets(
    doc: &Document<'_>,
    id_map: &HashMap<String, NodeId>,
    ctx: &DsigContext,
    include_ids: &[&str],
    c14n: C14nMode,
) -> Result<Vec<u8>, Error> {
    let mut octets = Vec::new();
    for id in include_ids {
        let node = xpath::resolve_id(doc, id_map, id)?;
        if let Some(owner) = reference_owner(node) {
            let reference = Reference::from_node(node)?;
            octets.extend(reference.transformed_octets(doc, id_map, Some(owner), ctx)?);
        } else {
            octets.extend(ulriksdal_c14n::canonicalize_fragment(node, c14n, &[])?);
        }
    }
    Ok(octets)
}

/// The signature a `ds:Reference` belongs to.
fn reference_owner<'a, 'i>(node: Node<'a, 'i>) -> Option<Node<'a, 'i>> {
    if !document::is_element(node, ns::DSIG, ns::node::REFERENCE) {
        return None;
    }
    let info = node.parent_element()?;
    if !document::is_element(info, ns::DSIG, ns::node::SIGNED_INFO) {
        return None;
    }
    info.parent_element()
        .filter(|s| document::is_element(*s, ns::DSIG, ns::node::SIGNATURE))
}

/// Digest of [`imprint_octets`] under `digest_uri`.
pub(crate) fn compute_imprint(
    doc: &Document<'_>,
    ctx: &DsigContext,
    include_ids: &[&str],
    c14n: C14nMode,
    digest_uri: &str,
) -> Result<Vec<u8>, Error> {
    let id_map = document::build_id_map(doc, &ctx.id_attrs);
    let octets = imprint_octets(doc, &id_map, ctx, include_ids, c14n)?;
    ulriksdal_crypto::digest::digest(digest_uri, &octets)
}

/// Check a stored timestamp: its token must be well formed, signed, and
/// carry the imprint of what it includes.
pub(crate) fn verify_timestamp(doc: &Document<'_>, ctx: &DsigContext, ts: &XadesTimeStamp) -> Result<(), Error> {
    let token = TimestampToken::from_der(&ts.token)?;
    let digest_uri = token.imprint_algorithm()?;
    let c14n = ts.c14n.unwrap_or(C14nMode::Inclusive);
    let digest = compute_imprint(doc, ctx, &ts.included_ids(), c14n, digest_uri)?;
    token.verify(&digest, &[])
}

/// Parameters shared by every timestamp request.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TimestampRequest<'a> {
    pub digest_method: &'a str,
    pub c14n: C14nMode,
}

/// Request a token over `include_ids` and wrap it as a property.
pub(crate) fn create_timestamp(
    client: &dyn TimestampClient,
    doc: &Document<'_>,
    ctx: &DsigContext,
    kind: TimeStampKind,
    include_ids: Vec<String>,
    request: TimestampRequest<'_>,
) -> Result<XadesTimeStamp, Error> {
    let refs: Vec<&str> = include_ids.iter().map(String::as_str).collect();
    let digest = compute_imprint(doc, ctx, &refs, request.c14n, request.digest_method)?;
    let token = client.request_timestamp(&digest, request.digest_method, true)?;
    let parsed = TimestampToken::from_der(&token)?;
    if parsed.imprint() != digest.as_slice() {
        return Err(Error::Timestamp("token imprint does not match the request".into()));
    }
    tracing::debug!(
        kind = kind.local_name(),
        serial = %parsed.serial_decimal(),
        includes = include_ids.len(),
        "timestamp obtained"
    );
    Ok(XadesTimeStamp {
        kind,
        id: Some(ids::property_id(kind.local_name())),
        includes: include_ids.iter().map(|id| Include::to_id(id)).collect(),
        c14n: Some(request.c14n),
        token,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_imprint_concatenates_canonical_includes() {
        let xml = r#"<r xmlns:p="urn:p"><p:a Id="a">1</p:a><b Id="b"  x='y'/></r>"#;
        let doc = ulriksdal_xml::parse(xml).unwrap();
        let ctx = DsigContext::new();
        let ids = document::build_id_map(&doc, &[]);
        let octets = imprint_octets(&doc, &ids, &ctx, &["a", "b"], C14nMode::Inclusive).unwrap();
        assert_eq!(
            String::from_utf8(octets).unwrap(),
            r#"<p:a xmlns:p="urn:p" Id="a">1</p:a><b xmlns:p="urn:p" Id="b" x="y"></b>"#
        );
        assert!(imprint_octets(&doc, &ids, &ctx, &["missing"], C14nMode::Inclusive).is_err());
    }

    #[test]
    fn test_reference_include_uses_transformed_data() {
        let xml = concat!(
            r#"<r><data Id="d">text</data><ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#">"#,
            r##"<ds:SignedInfo><ds:Reference Id="ref" URI="#d">"##,
            r#"<ds:DigestMethod Algorithm="http://www.w3.org/2001/04/xmlenc#sha256"/><ds:DigestValue/>"#,
            r#"</ds:Reference></ds:SignedInfo></ds:Signature></r>"#
        );
        let doc = ulriksdal_xml::parse(xml).unwrap();
        let ids = document::build_id_map(&doc, &[]);
        let octets = imprint_octets(&doc, &ids, &DsigContext::new(), &["ref"], C14nMode::Inclusive).unwrap();
        assert_eq!(octets, br#"<data Id="d">text</data>"#);
    }
}
