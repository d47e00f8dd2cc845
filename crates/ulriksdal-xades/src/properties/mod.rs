#![forbid(unsafe_code)]

//! The qualifying-property tree.
//!
//! Each property is a plain struct that reads itself from an element
//! (`from_node`) and writes itself with a [`Prefixes`] set (`write`).
//! Optional properties are `Option`s; repeated ones are `Vec`s.

mod signed;
mod timestamp;
mod unsigned;

pub use signed::{
    CertId, CommitmentTypeIndication, DataObjectFormat, IssuerSerial, ProductionPlace,
    SignaturePolicy, SignedDataObjectProperties, SignedProperties, SignedSignatureProperties,
    SignerRole, SigningCertificate,
};
pub use timestamp::{Include, TimeStampKind, XadesTimeStamp};
pub use unsigned::{
    CertificateValues, CompleteCertificateRefs, CompleteRevocationRefs, CrlRef, OcspRef,
    RevocationValues, UnsignedProperties, UnsignedSignatureProperty,
};

use crate::params::Prefixes;
use chrono::{DateTime, SecondsFormat, Utc};
use roxmltree::Node;
use ulriksdal_core::{ns, Error};
use ulriksdal_xml::{document, XmlWriter};

// ── QualifyingProperties ─────────────────────────────────────────────

/// `xades:QualifyingProperties`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifyingProperties {
    pub id: Option<String>,
    /// `#<signature id>`.
    pub target: String,
    pub signed: Option<SignedProperties>,
    pub unsigned: Option<UnsignedProperties>,
}

impl QualifyingProperties {
    pub fn from_node(node: Node<'_, '_>) -> Result<Self, Error> {
        let signed = document::find_child(node, ns::XADES, ns::node::SIGNED_PROPERTIES)
            .map(SignedProperties::from_node)
            .transpose()?;
        let unsigned = document::find_child(node, ns::XADES, ns::node::UNSIGNED_PROPERTIES)
            .map(UnsignedProperties::from_node)
            .transpose()?;
        Ok(Self {
            id: node.attribute(ns::attr::ID).map(str::to_owned),
            target: document::required_attr(node, ns::attr::TARGET)?.to_owned(),
            signed,
            unsigned,
        })
    }

    /// Write the element with its `xmlns` declaration. Unsigned
    /// properties are never written here; they are appended to a signed
    /// document one element at a time.
    pub fn write(&self, w: &mut XmlWriter, p: &Prefixes) -> Result<(), Error> {
        let name = p.xades(ns::node::QUALIFYING_PROPERTIES);
        let xmlns = Prefixes::xmlns(&p.xades);
        let mut attrs: Vec<(&str, &str)> = vec![(xmlns.as_str(), ns::XADES)];
        if let Some(id) = &self.id {
            attrs.push((ns::attr::ID, id));
        }
        attrs.push((ns::attr::TARGET, &self.target));
        w.start_element(&name, &attrs)?;
        if let Some(signed) = &self.signed {
            signed.write(w, p)?;
        }
        w.end_element(&name)
    }

    pub fn unsigned_signature_properties(&self) -> &[UnsignedSignatureProperty] {
        self.unsigned
            .as_ref()
            .map(|u| u.signature_properties.as_slice())
            .unwrap_or(&[])
    }
}

// ── Shared leaves ────────────────────────────────────────────────────

/// `ds:DigestMethod` + `ds:DigestValue` pair under some container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestAlgAndValue {
    pub method: String,
    pub value: Vec<u8>,
}

impl DigestAlgAndValue {
    pub fn compute(method: &str, data: &[u8]) -> Result<Self, Error> {
        Ok(Self {
            method: method.to_owned(),
            value: ulriksdal_crypto::digest::digest(method, data)?,
        })
    }

    /// Whether `data` hashes to the stored value.
    pub fn matches(&self, data: &[u8]) -> Result<bool, Error> {
        Ok(ulriksdal_crypto::digest::digest(&self.method, data)? == self.value)
    }

    pub fn from_container(node: Node<'_, '_>) -> Result<Self, Error> {
        let method = document::find_child(node, ns::DSIG, ns::node::DIGEST_METHOD)
            .ok_or_else(|| Error::MissingElement("DigestMethod".into()))?;
        let value = document::find_child(node, ns::DSIG, ns::node::DIGEST_VALUE)
            .ok_or_else(|| Error::MissingElement("DigestValue".into()))?;
        Ok(Self {
            method: document::required_attr(method, ns::attr::ALGORITHM)?.to_owned(),
            value: ulriksdal_dsig::decode_base64(&document::text_content(value), "DigestValue")?,
        })
    }

    /// Write the two `ds:` children (the container is the caller's).
    pub fn write_children(&self, w: &mut XmlWriter, p: &Prefixes) -> Result<(), Error> {
        w.empty_element(
            &p.ds(ns::node::DIGEST_METHOD),
            &[(ns::attr::ALGORITHM, &self.method)],
        )?;
        w.text_element(
            &p.ds(ns::node::DIGEST_VALUE),
            &[],
            &ulriksdal_dsig::encode_base64(&self.value),
        )
    }

    pub fn write_in(&self, w: &mut XmlWriter, p: &Prefixes, container: &str) -> Result<(), Error> {
        w.start_element(container, &[])?;
        self.write_children(w, p)?;
        w.end_element(container)
    }
}

/// `xsd:dateTime` in UTC with a `Z` suffix.
pub fn format_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn parse_time(text: &str) -> Result<DateTime<Utc>, Error> {
    DateTime::parse_from_rfc3339(text.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::XmlStructure(format!("invalid dateTime {text:?}: {e}")))
}

/// Text of an optional child element.
pub(crate) fn child_text(node: Node<'_, '_>, ns_uri: &str, local: &str) -> Option<String> {
    document::find_child(node, ns_uri, local).map(document::text_content)
}

/// `Id` attribute list for the writer.
pub(crate) fn id_attr(id: &Option<String>) -> Vec<(&str, &str)> {
    id.as_deref()
        .map(|id| vec![(ns::attr::ID, id)])
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_time_format_round_trip() {
        let t = Utc.with_ymd_and_hms(2027, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(format_time(&t), "2027-03-04T05:06:07Z");
        assert_eq!(parse_time("2027-03-04T06:06:07+01:00").unwrap(), t);
        assert!(parse_time("yesterday").is_err());
    }

    #[test]
    fn test_qualifying_properties_round_trip() {
        let qp = QualifyingProperties {
            id: Some("QualifyingProperties-1".into()),
            target: "#Signature-1".into(),
            signed: Some(SignedProperties {
                id: Some("SignedProperties-Signature-1".into()),
                ..SignedProperties::default()
            }),
            unsigned: None,
        };
        let mut w = XmlWriter::new();
        qp.write(&mut w, &Prefixes::default()).unwrap();
        let xml = w.into_string().unwrap();
        assert_eq!(
            xml,
            concat!(
                r##"<xades:QualifyingProperties xmlns:xades="http://uri.etsi.org/01903/v1.3.2#" Id="QualifyingProperties-1" Target="#Signature-1">"##,
                r#"<xades:SignedProperties Id="SignedProperties-Signature-1"></xades:SignedProperties>"#,
                r#"</xades:QualifyingProperties>"#
            )
        );
        let doc = ulriksdal_xml::parse(&xml).unwrap();
        assert_eq!(QualifyingProperties::from_node(doc.root_element()).unwrap(), qp);
    }
}
