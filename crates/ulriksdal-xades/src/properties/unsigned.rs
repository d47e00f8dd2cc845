#![forbid(unsafe_code)]

//! Unsigned qualifying properties: counter-signatures, timestamps and
//! validation evidence.
//!
//! These are only ever appended to a signed document. Each type can
//! produce a standalone fragment for splicing.

use super::{child_text, format_time, id_attr, parse_time, CertId, DigestAlgAndValue};
use super::timestamp::{TimeStampKind, XadesTimeStamp};
use crate::params::Prefixes;
use chrono::{DateTime, Utc};
use roxmltree::Node;
use ulriksdal_core::{ns, Error};
use ulriksdal_xml::{document, XmlWriter};

/// `xades:UnsignedProperties`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnsignedProperties {
    pub id: Option<String>,
    /// Children of `UnsignedSignatureProperties`, in document order.
    pub signature_properties: Vec<UnsignedSignatureProperty>,
}

/// One child of `xades:UnsignedSignatureProperties`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnsignedSignatureProperty {
    /// A nested `ds:Signature`, identified by its `Id`.
    CounterSignature { id: Option<String>, signature_id: Option<String> },
    TimeStamp(XadesTimeStamp),
    CompleteCertificateRefs(CompleteCertificateRefs),
    CompleteRevocationRefs(CompleteRevocationRefs),
    CertificateValues(CertificateValues),
    RevocationValues(RevocationValues),
    /// An element this model does not interpret (namespace, local name).
    Other(String, String),
}

impl UnsignedProperties {
    pub fn from_node(node: Node<'_, '_>) -> Result<Self, Error> {
        let mut signature_properties = Vec::new();
        if let Some(usp) = document::find_child(node, ns::XADES, ns::node::UNSIGNED_SIGNATURE_PROPERTIES) {
            for child in document::element_children(usp) {
                signature_properties.push(UnsignedSignatureProperty::from_node(child)?);
            }
        }
        Ok(Self {
            id: node.attribute(ns::attr::ID).map(str::to_owned),
            signature_properties,
        })
    }

    pub fn timestamps(&self, kind: TimeStampKind) -> impl Iterator<Item = &XadesTimeStamp> {
        self.signature_properties.iter().filter_map(move |p| match p {
            UnsignedSignatureProperty::TimeStamp(ts) if ts.kind == kind => Some(ts),
            _ => None,
        })
    }

    pub fn has_timestamp(&self, kind: TimeStampKind) -> bool {
        self.timestamps(kind).next().is_some()
    }

    pub fn certificate_refs(&self) -> Option<&CompleteCertificateRefs> {
        self.signature_properties.iter().find_map(|p| match p {
            UnsignedSignatureProperty::CompleteCertificateRefs(r) => Some(r),
            _ => None,
        })
    }

    pub fn revocation_refs(&self) -> Option<&CompleteRevocationRefs> {
        self.signature_properties.iter().find_map(|p| match p {
            UnsignedSignatureProperty::CompleteRevocationRefs(r) => Some(r),
            _ => None,
        })
    }

    pub fn certificate_values(&self) -> Option<&CertificateValues> {
        self.signature_properties.iter().find_map(|p| match p {
            UnsignedSignatureProperty::CertificateValues(v) => Some(v),
            _ => None,
        })
    }

    pub fn revocation_values(&self) -> Option<&RevocationValues> {
        self.signature_properties.iter().find_map(|p| match p {
            UnsignedSignatureProperty::RevocationValues(v) => Some(v),
            _ => None,
        })
    }

    /// `Id`s of the nested counter-signatures.
    pub fn counter_signature_ids(&self) -> Vec<&str> {
        self.signature_properties
            .iter()
            .filter_map(|p| match p {
                UnsignedSignatureProperty::CounterSignature { signature_id, .. } => signature_id.as_deref(),
                _ => None,
            })
            .collect()
    }
}

impl UnsignedSignatureProperty {
    pub fn from_node(node: Node<'_, '_>) -> Result<Self, Error> {
        if let Some(kind) = TimeStampKind::of_node(node) {
            return Ok(Self::TimeStamp(XadesTimeStamp::from_node(node, kind)?));
        }
        let name = node.tag_name();
        let uri = name.namespace().unwrap_or("");
        if uri != ns::XADES {
            return Ok(Self::Other(uri.to_owned(), name.name().to_owned()));
        }
        Ok(match name.name() {
            ns::node::COUNTER_SIGNATURE => Self::CounterSignature {
                id: node.attribute(ns::attr::ID).map(str::to_owned),
                signature_id: document::find_child(node, ns::DSIG, ns::node::SIGNATURE)
                    .and_then(|s| s.attribute(ns::attr::ID))
                    .map(str::to_owned),
            },
            ns::node::COMPLETE_CERTIFICATE_REFS => {
                Self::CompleteCertificateRefs(CompleteCertificateRefs::from_node(node)?)
            }
            ns::node::COMPLETE_REVOCATION_REFS => {
                Self::CompleteRevocationRefs(CompleteRevocationRefs::from_node(node)?)
            }
            ns::node::CERTIFICATE_VALUES => Self::CertificateValues(CertificateValues::from_node(node)?),
            ns::node::REVOCATION_VALUES => Self::RevocationValues(RevocationValues::from_node(node)?),
            other => Self::Other(uri.to_owned(), other.to_owned()),
        })
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            Self::CounterSignature { id, .. } => id.as_deref(),
            Self::TimeStamp(ts) => ts.id.as_deref(),
            Self::CompleteCertificateRefs(r) => r.id.as_deref(),
            Self::CompleteRevocationRefs(r) => r.id.as_deref(),
            Self::CertificateValues(v) => v.id.as_deref(),
            Self::RevocationValues(v) => v.id.as_deref(),
            Self::Other(..) => None,
        }
    }
}

// ── References to evidence ───────────────────────────────────────────

/// `xades:CompleteCertificateRefs`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompleteCertificateRefs {
    pub id: Option<String>,
    pub certs: Vec<CertId>,
}

impl CompleteCertificateRefs {
    fn from_node(node: Node<'_, '_>) -> Result<Self, Error> {
        let certs = match document::find_child(node, ns::XADES, ns::node::CERT_REFS) {
            Some(refs) => document::find_children(refs, ns::XADES, ns::node::CERT)
                .into_iter()
                .map(CertId::from_node)
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };
        Ok(Self {
            id: node.attribute(ns::attr::ID).map(str::to_owned),
            certs,
        })
    }

    pub fn write(&self, w: &mut XmlWriter, p: &Prefixes) -> Result<(), Error> {
        let name = p.xades(ns::node::COMPLETE_CERTIFICATE_REFS);
        let refs = p.xades(ns::node::CERT_REFS);
        w.start_element(&name, &id_attr(&self.id))?;
        w.start_element(&refs, &[])?;
        for cert in &self.certs {
            cert.write(w, p)?;
        }
        w.end_element(&refs)?;
        w.end_element(&name)
    }
}

/// `xades:CRLRef`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrlRef {
    pub digest: DigestAlgAndValue,
    pub issuer: Option<String>,
    pub issue_time: Option<DateTime<Utc>>,
    /// Decimal `cRLNumber`.
    pub number: Option<String>,
}

/// `xades:OCSPRef`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcspRef {
    /// `ResponderID/ByName`.
    pub responder: String,
    pub produced_at: DateTime<Utc>,
    pub digest: Option<DigestAlgAndValue>,
}

/// `xades:CompleteRevocationRefs`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompleteRevocationRefs {
    pub id: Option<String>,
    pub crl_refs: Vec<CrlRef>,
    pub ocsp_refs: Vec<OcspRef>,
}

impl CompleteRevocationRefs {
    fn from_node(node: Node<'_, '_>) -> Result<Self, Error> {
        let mut crl_refs = Vec::new();
        if let Some(refs) = document::find_child(node, ns::XADES, ns::node::CRL_REFS) {
            for r in document::find_children(refs, ns::XADES, ns::node::CRL_REF) {
                let digest = document::find_child(r, ns::XADES, ns::node::DIGEST_ALG_AND_VALUE)
                    .ok_or_else(|| Error::MissingElement("DigestAlgAndValue".into()))?;
                let ident = document::find_child(r, ns::XADES, ns::node::CRL_IDENTIFIER);
                crl_refs.push(CrlRef {
                    digest: DigestAlgAndValue::from_container(digest)?,
                    issuer: ident.and_then(|i| child_text(i, ns::XADES, ns::node::ISSUER)),
                    issue_time: ident
                        .and_then(|i| child_text(i, ns::XADES, ns::node::ISSUE_TIME))
                        .map(|t| parse_time(&t))
                        .transpose()?,
                    number: ident.and_then(|i| child_text(i, ns::XADES, ns::node::NUMBER)),
                });
            }
        }
        let mut ocsp_refs = Vec::new();
        if let Some(refs) = document::find_child(node, ns::XADES, ns::node::OCSP_REFS) {
            for r in document::find_children(refs, ns::XADES, ns::node::OCSP_REF) {
                let ident = document::find_child(r, ns::XADES, ns::node::OCSP_IDENTIFIER)
                    .ok_or_else(|| Error::MissingElement("OCSPIdentifier".into()))?;
                let responder = document::find_child(ident, ns::XADES, ns::node::RESPONDER_ID)
                    .and_then(|id| child_text(id, ns::XADES, ns::node::BY_NAME))
                    .unwrap_or_default();
                let produced_at = child_text(ident, ns::XADES, ns::node::PRODUCED_AT)
                    .ok_or_else(|| Error::MissingElement("ProducedAt".into()))?;
                ocsp_refs.push(OcspRef {
                    responder,
                    produced_at: parse_time(&produced_at)?,
                    digest: document::find_child(r, ns::XADES, ns::node::DIGEST_ALG_AND_VALUE)
                        .map(DigestAlgAndValue::from_container)
                        .transpose()?,
                });
            }
        }
        Ok(Self {
            id: node.attribute(ns::attr::ID).map(str::to_owned),
            crl_refs,
            ocsp_refs,
        })
    }

    pub fn write(&self, w: &mut XmlWriter, p: &Prefixes) -> Result<(), Error> {
        let name = p.xades(ns::node::COMPLETE_REVOCATION_REFS);
        w.start_element(&name, &id_attr(&self.id))?;
        if !self.crl_refs.is_empty() {
            let refs = p.xades(ns::node::CRL_REFS);
            let r_name = p.xades(ns::node::CRL_REF);
            w.start_element(&refs, &[])?;
            for r in &self.crl_refs {
                w.start_element(&r_name, &[])?;
                r.digest.write_in(w, p, &p.xades(ns::node::DIGEST_ALG_AND_VALUE))?;
                let ident = p.xades(ns::node::CRL_IDENTIFIER);
                w.start_element(&ident, &[])?;
                if let Some(issuer) = &r.issuer {
                    w.text_element(&p.xades(ns::node::ISSUER), &[], issuer)?;
                }
                if let Some(t) = &r.issue_time {
                    w.text_element(&p.xades(ns::node::ISSUE_TIME), &[], &format_time(t))?;
                }
                if let Some(n) = &r.number {
                    w.text_element(&p.xades(ns::node::NUMBER), &[], n)?;
                }
                w.end_element(&ident)?;
                w.end_element(&r_name)?;
            }
            w.end_element(&refs)?;
        }
        if !self.ocsp_refs.is_empty() {
            let refs = p.xades(ns::node::OCSP_REFS);
            let r_name = p.xades(ns::node::OCSP_REF);
            w.start_element(&refs, &[])?;
            for r in &self.ocsp_refs {
                w.start_element(&r_name, &[])?;
                let ident = p.xades(ns::node::OCSP_IDENTIFIER);
                let responder = p.xades(ns::node::RESPONDER_ID);
                w.start_element(&ident, &[])?;
                w.start_element(&responder, &[])?;
                w.text_element(&p.xades(ns::node::BY_NAME), &[], &r.responder)?;
                w.end_element(&responder)?;
                w.text_element(&p.xades(ns::node::PRODUCED_AT), &[], &format_time(&r.produced_at))?;
                w.end_element(&ident)?;
                if let Some(d) = &r.digest {
                    d.write_in(w, p, &p.xades(ns::node::DIGEST_ALG_AND_VALUE))?;
                }
                w.end_element(&r_name)?;
            }
            w.end_element(&refs)?;
        }
        w.end_element(&name)
    }
}

// ── Evidence values ──────────────────────────────────────────────────

/// `xades:CertificateValues`: DER certificates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateValues {
    pub id: Option<String>,
    pub certificates: Vec<Vec<u8>>,
}

impl CertificateValues {
    fn from_node(node: Node<'_, '_>) -> Result<Self, Error> {
        Ok(Self {
            id: node.attribute(ns::attr::ID).map(str::to_owned),
            certificates: encapsulated(node, ns::node::ENCAPSULATED_X509_CERTIFICATE)?,
        })
    }

    pub fn write(&self, w: &mut XmlWriter, p: &Prefixes) -> Result<(), Error> {
        let name = p.xades(ns::node::CERTIFICATE_VALUES);
        w.start_element(&name, &id_attr(&self.id))?;
        write_encapsulated(w, p, ns::node::ENCAPSULATED_X509_CERTIFICATE, &self.certificates)?;
        w.end_element(&name)
    }
}

/// `xades:RevocationValues`: DER CRLs and OCSP responses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevocationValues {
    pub id: Option<String>,
    pub crls: Vec<Vec<u8>>,
    pub ocsp_responses: Vec<Vec<u8>>,
}

impl RevocationValues {
    fn from_node(node: Node<'_, '_>) -> Result<Self, Error> {
        let crls = match document::find_child(node, ns::XADES, ns::node::CRL_VALUES) {
            Some(v) => encapsulated(v, ns::node::ENCAPSULATED_CRL_VALUE)?,
            None => Vec::new(),
        };
        let ocsp_responses = match document::find_child(node, ns::XADES, ns::node::OCSP_VALUES) {
            Some(v) => encapsulated(v, ns::node::ENCAPSULATED_OCSP_VALUE)?,
            None => Vec::new(),
        };
        Ok(Self {
            id: node.attribute(ns::attr::ID).map(str::to_owned),
            crls,
            ocsp_responses,
        })
    }

    pub fn write(&self, w: &mut XmlWriter, p: &Prefixes) -> Result<(), Error> {
        let name = p.xades(ns::node::REVOCATION_VALUES);
        w.start_element(&name, &id_attr(&self.id))?;
        for (container, leaf, values) in [
            (ns::node::CRL_VALUES, ns::node::ENCAPSULATED_CRL_VALUE, &self.crls),
            (ns::node::OCSP_VALUES, ns::node::ENCAPSULATED_OCSP_VALUE, &self.ocsp_responses),
        ] {
            if values.is_empty() {
                continue;
            }
            let c = p.xades(container);
            w.start_element(&c, &[])?;
            write_encapsulated(w, p, leaf, values)?;
            w.end_element(&c)?;
        }
        w.end_element(&name)
    }
}

fn encapsulated(node: Node<'_, '_>, local: &str) -> Result<Vec<Vec<u8>>, Error> {
    document::find_children(node, ns::XADES, local)
        .into_iter()
        .map(|n| ulriksdal_dsig::decode_base64(&document::text_content(n), local))
        .collect()
}

fn write_encapsulated(w: &mut XmlWriter, p: &Prefixes, local: &str, values: &[Vec<u8>]) -> Result<(), Error> {
    for v in values {
        w.text_element(&p.xades(local), &[], &ulriksdal_dsig::encode_base64(v))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ulriksdal_core::algorithm;

    fn parse_usp(children: &str) -> UnsignedProperties {
        let xml = format!(
            r#"<xades:UnsignedProperties xmlns:ds="{}" xmlns:xades="{}"><xades:UnsignedSignatureProperties>{children}</xades:UnsignedSignatureProperties></xades:UnsignedProperties>"#,
            ns::DSIG,
            ns::XADES
        );
        let doc = ulriksdal_xml::parse(&xml).unwrap();
        UnsignedProperties::from_node(doc.root_element()).unwrap()
    }

    #[test]
    fn test_revocation_refs_round_trip() {
        let refs = CompleteRevocationRefs {
            id: Some("CompleteRevocationRefs-1".into()),
            crl_refs: vec![CrlRef {
                digest: DigestAlgAndValue::compute(algorithm::SHA256, b"crl").unwrap(),
                issuer: Some("CN=Ulriksdal Test Issuing CA,O=Ulriksdal Test,C=SE".into()),
                issue_time: Some(Utc.with_ymd_and_hms(2026, 10, 16, 10, 15, 19).unwrap()),
                number: Some("2".into()),
            }],
            ocsp_refs: vec![OcspRef {
                responder: "http://ocsp.ulriksdal.test/intermediate".into(),
                produced_at: Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap(),
                digest: Some(DigestAlgAndValue::compute(algorithm::SHA256, b"ocsp").unwrap()),
            }],
        };
        let mut w = XmlWriter::new();
        refs.write(&mut w, &Prefixes::default()).unwrap();
        let usp = parse_usp(&w.into_string().unwrap());
        assert_eq!(usp.revocation_refs(), Some(&refs));
    }

    #[test]
    fn test_values_and_counter_signature_are_indexed() {
        let values = RevocationValues {
            id: Some("RevocationValues-1".into()),
            crls: vec![vec![1, 2, 3]],
            ocsp_responses: vec![],
        };
        let certs = CertificateValues {
            id: None,
            certificates: vec![vec![9]],
        };
        let mut w = XmlWriter::new();
        certs.write(&mut w, &Prefixes::default()).unwrap();
        values.write(&mut w, &Prefixes::default()).unwrap();
        let fragment = w.into_string().unwrap();
        let counter = r#"<xades:CounterSignature><ds:Signature Id="Signature-2"/></xades:CounterSignature><x:Extra xmlns:x="urn:x"/>"#;
        let usp = parse_usp(&format!("{fragment}{counter}"));
        assert_eq!(usp.certificate_values(), Some(&certs));
        assert_eq!(usp.revocation_values(), Some(&values));
        assert_eq!(usp.counter_signature_ids(), vec!["Signature-2"]);
        assert_eq!(
            usp.signature_properties.last(),
            Some(&UnsignedSignatureProperty::Other("urn:x".into(), "Extra".into()))
        );
        assert!(!usp.has_timestamp(TimeStampKind::Signature));
    }
}
