#![forbid(unsafe_code)]

//! Reference building for the five packagings.
//!
//! A packaging decides what the content references point at and where
//! the new `ds:Signature` goes: inside the signed document, around the
//! content, beside it in a wrapper document, or alone with the content
//! elsewhere. Every content reference gets an `Id` of the form
//! `Reference-<guid>` and a matching `DataObjectFormat`.

use crate::ids;
use crate::params::{Prefixes, SignaturePackaging, SignatureParameters};
use crate::properties::DataObjectFormat;
use ulriksdal_core::{algorithm, ns, Error};
use ulriksdal_dsig::Reference;
use ulriksdal_transforms::TransformKind;
use ulriksdal_xml::{document, XmlWriter};

/// What a new signature covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureContent {
    /// An XML document.
    Xml(String),
    /// Arbitrary octets: embedded base64 (enveloping) or hashed
    /// (internally detached hash).
    Bytes(Vec<u8>),
    /// Nothing is embedded; the reference URI is resolved through the
    /// engine's context (externally detached).
    External,
}

impl SignatureContent {
    fn octets(&self) -> Result<&[u8], Error> {
        match self {
            Self::Xml(xml) => Ok(xml.as_bytes()),
            Self::Bytes(b) => Ok(b),
            Self::External => Err(Error::Other("no content to embed for an external reference".into())),
        }
    }
}

/// Where the signature element is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Placement {
    /// The signature is the whole document.
    Standalone,
    /// The signature is appended to the root element of this text.
    LastChildOfRoot(String),
}

/// The content side of a new signature.
#[derive(Debug, Clone)]
pub(crate) struct Packaged {
    pub placement: Placement,
    pub references: Vec<Reference>,
    pub formats: Vec<DataObjectFormat>,
    /// Serialized `ds:Object` elements carried inside the signature.
    pub objects: Vec<String>,
}

/// Lay out `content` for `params.packaging`.
pub(crate) fn package(
    content: &SignatureContent,
    params: &SignatureParameters,
    p: &Prefixes,
) -> Result<Packaged, Error> {
    let packaged = match params.packaging {
        SignaturePackaging::Enveloped => enveloped(content, params, p)?,
        SignaturePackaging::Enveloping => enveloping(content, params, p)?,
        SignaturePackaging::InternallyDetached => internally_detached(content, params)?,
        SignaturePackaging::InternallyDetachedHash => internally_detached_hash(content, params)?,
        SignaturePackaging::ExternallyDetached => externally_detached(params)?,
    };
    tracing::debug!(
        packaging = ?params.packaging,
        references = packaged.references.len(),
        "content packaged"
    );
    Ok(packaged)
}

/// A content reference with a fresh id, and its format record.
pub(crate) fn content_reference(uri: impl Into<String>, params: &SignatureParameters) -> (Reference, DataObjectFormat) {
    let id = ids::property_id("Reference");
    let format = data_object_format(&id, params);
    (Reference::new(uri, &params.digest_method).with_id(id), format)
}

pub(crate) fn data_object_format(reference_id: &str, params: &SignatureParameters) -> DataObjectFormat {
    DataObjectFormat {
        object_reference: format!("#{reference_id}"),
        description: params.description.clone(),
        mime_type: Some(params.mime_type.clone()),
        encoding: params.encoding.clone(),
    }
}

fn xml_content<'c>(content: &'c SignatureContent, packaging: &str) -> Result<&'c str, Error> {
    match content {
        SignatureContent::Xml(xml) => Ok(xml),
        _ => Err(Error::Other(format!("{packaging} signatures need XML content"))),
    }
}

// ── Enveloped ────────────────────────────────────────────────────────

fn enveloped(content: &SignatureContent, params: &SignatureParameters, p: &Prefixes) -> Result<Packaged, Error> {
    let xml = xml_content(content, "enveloped")?;
    let doc = ulriksdal_xml::parse(xml)?;
    let root = doc.root_element();
    if document::is_element(root, ns::DSIG, ns::node::SIGNATURE) {
        return Err(Error::XmlStructure("cannot envelope a signature in itself".into()));
    }
    let uri = document::element_id(root)
        .map(|id| format!("#{id}"))
        .unwrap_or_default();

    let (mut reference, format) = content_reference(uri, params);
    reference = reference.with_transform(TransformKind::EnvelopedSignature);
    if params.exclude_other_signatures {
        reference = reference.with_transform(TransformKind::exclude_signatures(&p.ds));
    }
    reference = reference.with_transform(TransformKind::c14n(params.c14n_mode));

    Ok(Packaged {
        placement: Placement::LastChildOfRoot(xml.to_owned()),
        references: vec![reference],
        formats: vec![format],
        objects: Vec::new(),
    })
}

// ── Enveloping ───────────────────────────────────────────────────────

fn enveloping(content: &SignatureContent, params: &SignatureParameters, p: &Prefixes) -> Result<Packaged, Error> {
    let object_id = ids::property_id("DataObject");
    let (reference, format) = content_reference(format!("#{object_id}"), params);
    let reference = reference.with_type(algorithm::TYPE_OBJECT);

    let object_name = p.ds(ns::node::OBJECT);
    let mut w = XmlWriter::new();
    let (reference, body) = match content {
        SignatureContent::Xml(xml) => {
            let doc = ulriksdal_xml::parse(xml)?;
            let root = doc.root_element();
            w.start_element(&object_name, &[(ns::attr::ID, &object_id), (ns::attr::MIME_TYPE, &params.mime_type)])?;
            (
                reference.with_transform(TransformKind::c14n(params.c14n_mode)),
                xml[root.range()].to_owned(),
            )
        }
        SignatureContent::Bytes(bytes) => {
            w.start_element(
                &object_name,
                &[
                    (ns::attr::ID, &object_id),
                    (ns::attr::MIME_TYPE, &params.mime_type),
                    (ns::attr::ENCODING, algorithm::BASE64),
                ],
            )?;
            (
                reference.with_transform(TransformKind::Base64),
                ulriksdal_dsig::encode_base64(bytes),
            )
        }
        SignatureContent::External => {
            return Err(Error::Other("enveloping signatures need embedded content".into()))
        }
    };
    match content {
        SignatureContent::Xml(_) => w.write_raw(&body)?,
        _ => w.write_text(&body)?,
    }
    w.end_element(&object_name)?;

    Ok(Packaged {
        placement: Placement::Standalone,
        references: vec![reference],
        formats: vec![format],
        objects: vec![w.into_string()?],
    })
}

// ── Internally detached ──────────────────────────────────────────────

/// `<DOCUMENT><CONTENT Id="...">inner</CONTENT></DOCUMENT>`; the
/// signature is appended after `CONTENT`.
fn wrapper_document(content_id: &str, attrs: &[(&str, &str)], inner: &str, raw: bool) -> Result<String, Error> {
    let mut all = vec![(ns::attr::ID, content_id)];
    all.extend_from_slice(attrs);
    let mut w = XmlWriter::new();
    w.start_element("DOCUMENT", &[])?;
    w.start_element("CONTENT", &all)?;
    if raw {
        w.write_raw(inner)?;
    } else {
        w.write_text(inner)?;
    }
    w.end_element("CONTENT")?;
    w.end_element("DOCUMENT")?;
    w.into_string()
}

fn internally_detached(content: &SignatureContent, params: &SignatureParameters) -> Result<Packaged, Error> {
    let xml = xml_content(content, "internally detached")?;

    let (host, target) = match &params.target_element_id {
        Some(target) => {
            let doc = ulriksdal_xml::parse(xml)?;
            if document::element_id(doc.root_element()) == Some(target.as_str()) {
                return Err(Error::XmlStructure(format!(
                    "detached target #{target} is the document root; the signature would land inside it"
                )));
            }
            (xml.to_owned(), target.clone())
        }
        None => {
            let doc = ulriksdal_xml::parse(xml)?;
            let root = doc.root_element();
            let content_id = ids::property_id("CONTENT");
            (wrapper_document(&content_id, &[], &xml[root.range()], true)?, content_id)
        }
    };

    let (reference, format) = content_reference(format!("#{target}"), params);
    Ok(Packaged {
        placement: Placement::LastChildOfRoot(host),
        references: vec![reference.with_transform(TransformKind::c14n(params.c14n_mode))],
        formats: vec![format],
        objects: Vec::new(),
    })
}

fn internally_detached_hash(content: &SignatureContent, params: &SignatureParameters) -> Result<Packaged, Error> {
    let hash = ulriksdal_crypto::digest::digest(algorithm::SHA256, content.octets()?)?;
    let content_id = ids::property_id("CONTENT");
    let host = wrapper_document(
        &content_id,
        &[(ns::attr::ENCODING, algorithm::BASE64)],
        &ulriksdal_dsig::encode_base64(&hash),
        false,
    )?;

    let (reference, format) = content_reference(format!("#{content_id}"), params);
    Ok(Packaged {
        placement: Placement::LastChildOfRoot(host),
        references: vec![reference.with_transform(TransformKind::Base64)],
        formats: vec![format],
        objects: Vec::new(),
    })
}

// ── Externally detached ──────────────────────────────────────────────

fn externally_detached(params: &SignatureParameters) -> Result<Packaged, Error> {
    let uri = params
        .external_uri
        .as_deref()
        .ok_or_else(|| Error::Other("externally detached signatures need an external URI".into()))?;
    if uri.starts_with('#') || uri.is_empty() {
        return Err(Error::InvalidUri(format!("{uri:?} is not an external URI")));
    }
    let (mut reference, format) = content_reference(uri, params);
    if params.is_xml_content() {
        reference = reference.with_transform(TransformKind::c14n(params.c14n_mode));
    }
    Ok(Packaged {
        placement: Placement::Standalone,
        references: vec![reference],
        formats: vec![format],
        objects: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(packaging: SignaturePackaging) -> SignatureParameters {
        SignatureParameters::new(packaging)
    }

    #[test]
    fn test_enveloped_targets_root_id() {
        let content = SignatureContent::Xml(r#"<doc id="test"><a/></doc>"#.into());
        let out = package(&content, &params(SignaturePackaging::Enveloped), &Prefixes::default()).unwrap();
        let r = &out.references[0];
        assert_eq!(r.uri, "#test");
        assert_eq!(r.transforms[0], TransformKind::EnvelopedSignature);
        assert_eq!(r.transforms[1], TransformKind::exclude_signatures("ds"));
        assert!(r.transforms[2].is_c14n());
        assert_eq!(out.formats[0].object_reference, format!("#{}", r.id.as_deref().unwrap()));
        assert!(matches!(out.placement, Placement::LastChildOfRoot(_)));
    }

    #[test]
    fn test_enveloped_without_id_uses_whole_document() {
        let content = SignatureContent::Xml("<doc/>".into());
        let mut p = params(SignaturePackaging::Enveloped);
        p.exclude_other_signatures = false;
        let out = package(&content, &p, &Prefixes::default()).unwrap();
        assert_eq!(out.references[0].uri, "");
        assert_eq!(out.references[0].transforms.len(), 2);
    }

    #[test]
    fn test_enveloping_embeds_root_element() {
        let content = SignatureContent::Xml(r#"<?xml version="1.0"?><doc xmlns="urn:d">x</doc>"#.into());
        let out = package(&content, &params(SignaturePackaging::Enveloping), &Prefixes::default()).unwrap();
        assert_eq!(out.placement, Placement::Standalone);
        assert_eq!(out.references[0].type_uri.as_deref(), Some(algorithm::TYPE_OBJECT));
        let object = &out.objects[0];
        assert!(object.starts_with(r#"<ds:Object Id="DataObject-"#));
        assert!(object.contains(r#"<doc xmlns="urn:d">x</doc></ds:Object>"#));
        assert!(!object.contains("<?xml"));
    }

    #[test]
    fn test_enveloping_bytes_are_base64() {
        let out = package(
            &SignatureContent::Bytes(b"hello".to_vec()),
            &params(SignaturePackaging::Enveloping),
            &Prefixes::default(),
        )
        .unwrap();
        assert_eq!(out.references[0].transforms, vec![TransformKind::Base64]);
        assert!(out.objects[0].contains(">aGVsbG8=</ds:Object>"));
    }

    #[test]
    fn test_detached_wrapper_and_target() {
        let content = SignatureContent::Xml(r#"<doc><part Id="p1"/></doc>"#.into());
        let out = package(&content, &params(SignaturePackaging::InternallyDetached), &Prefixes::default()).unwrap();
        let Placement::LastChildOfRoot(host) = &out.placement else { panic!() };
        assert!(host.starts_with(r#"<DOCUMENT><CONTENT Id="CONTENT-"#));
        assert!(out.references[0].uri.starts_with("#CONTENT-"));

        let mut p = params(SignaturePackaging::InternallyDetached);
        p.target_element_id = Some("p1".into());
        let out = package(&content, &p, &Prefixes::default()).unwrap();
        assert_eq!(out.references[0].uri, "#p1");

        p.target_element_id = Some("root".into());
        let rooted = SignatureContent::Xml(r#"<doc Id="root"/>"#.into());
        assert!(package(&rooted, &p, &Prefixes::default()).is_err());
    }

    #[test]
    fn test_detached_hash_embeds_sha256() {
        let out = package(
            &SignatureContent::Bytes(b"abc".to_vec()),
            &params(SignaturePackaging::InternallyDetachedHash),
            &Prefixes::default(),
        )
        .unwrap();
        let Placement::LastChildOfRoot(host) = &out.placement else { panic!() };
        // SHA-256("abc")
        assert!(host.contains("ungWv48Bz+pBQUDeXa4iI7ADYaOWF3qctBD/YfIAFa0="));
        assert_eq!(out.references[0].transforms, vec![TransformKind::Base64]);
    }

    #[test]
    fn test_external_reference() {
        let mut p = params(SignaturePackaging::ExternallyDetached);
        assert!(package(&SignatureContent::External, &p, &Prefixes::default()).is_err());
        p.external_uri = Some("https://example.test/doc.pdf".into());
        p.mime_type = "application/pdf".into();
        let out = package(&SignatureContent::External, &p, &Prefixes::default()).unwrap();
        assert_eq!(out.references[0].uri, "https://example.test/doc.pdf");
        assert!(out.references[0].transforms.is_empty());
        assert_eq!(out.formats[0].mime_type.as_deref(), Some("application/pdf"));
    }
}
