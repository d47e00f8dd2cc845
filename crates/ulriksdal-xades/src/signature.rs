#![forbid(unsafe_code)]

//! Read-only model of one loaded `ds:Signature`.

use crate::level::SignatureLevel;
use crate::properties::{QualifyingProperties, SignedProperties, UnsignedProperties};
use roxmltree::Node;
use ulriksdal_core::{ns, Error};
use ulriksdal_dsig::keyinfo::KeyInfo;
use ulriksdal_dsig::SignedInfo;
use ulriksdal_keys::X509Certificate;
use ulriksdal_xml::document;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub id: Option<String>,
    pub signed_info: SignedInfo,
    /// Empty until a value has been attached.
    pub signature_value: Vec<u8>,
    pub signature_value_id: Option<String>,
    pub key_info: Option<KeyInfo>,
    pub qualifying_properties: Option<QualifyingProperties>,
    /// `Id`s of the `ds:Object` children.
    pub object_ids: Vec<String>,
}

impl Signature {
    pub fn from_node(node: Node<'_, '_>) -> Result<Self, Error> {
        if !document::is_element(node, ns::DSIG, ns::node::SIGNATURE) {
            return Err(Error::XmlStructure(format!(
                "expected ds:Signature, found {}",
                node.tag_name().name()
            )));
        }
        let signed_info = document::find_child(node, ns::DSIG, ns::node::SIGNED_INFO)
            .ok_or_else(|| Error::MissingElement("SignedInfo".into()))?;
        let value = document::find_child(node, ns::DSIG, ns::node::SIGNATURE_VALUE)
            .ok_or_else(|| Error::MissingElement("SignatureValue".into()))?;

        let objects = document::find_children(node, ns::DSIG, ns::node::OBJECT);
        let qualifying_properties = objects
            .iter()
            .find_map(|o| document::find_child(*o, ns::XADES, ns::node::QUALIFYING_PROPERTIES))
            .map(QualifyingProperties::from_node)
            .transpose()?;

        Ok(Self {
            id: node.attribute(ns::attr::ID).map(str::to_owned),
            signed_info: SignedInfo::from_node(signed_info)?,
            signature_value: ulriksdal_dsig::decode_base64(&document::text_content(value), "SignatureValue")?,
            signature_value_id: value.attribute(ns::attr::ID).map(str::to_owned),
            key_info: document::find_child(node, ns::DSIG, ns::node::KEY_INFO)
                .map(KeyInfo::from_node)
                .transpose()?,
            qualifying_properties,
            object_ids: objects
                .iter()
                .filter_map(|o| o.attribute(ns::attr::ID))
                .map(str::to_owned)
                .collect(),
        })
    }

    pub fn signing_certificate(&self) -> Option<&X509Certificate> {
        self.key_info.as_ref()?.signing_certificate()
    }

    pub fn signed_properties(&self) -> Option<&SignedProperties> {
        self.qualifying_properties.as_ref()?.signed.as_ref()
    }

    pub fn unsigned_properties(&self) -> Option<&UnsignedProperties> {
        self.qualifying_properties.as_ref()?.unsigned.as_ref()
    }

    /// Whether the signature carries XAdES qualifying properties at all.
    pub fn is_xades(&self) -> bool {
        self.qualifying_properties.is_some()
    }

    pub fn level(&self) -> SignatureLevel {
        SignatureLevel::of(self.unsigned_properties())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAIN: &str = concat!(
        r#"<ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#" Id="s"><ds:SignedInfo>"#,
        r#"<ds:CanonicalizationMethod Algorithm="http://www.w3.org/TR/2001/REC-xml-c14n-20010315"/>"#,
        r#"<ds:SignatureMethod Algorithm="http://www.w3.org/2001/04/xmldsig-more#rsa-sha256"/>"#,
        r##"<ds:Reference URI="#o"><ds:DigestMethod Algorithm="http://www.w3.org/2001/04/xmlenc#sha256"/>"##,
        r#"<ds:DigestValue>AA==</ds:DigestValue></ds:Reference></ds:SignedInfo>"#,
        r#"<ds:SignatureValue Id="sv">AQI=</ds:SignatureValue><ds:Object Id="o">x</ds:Object></ds:Signature>"#
    );

    #[test]
    fn test_plain_signature_model() {
        let doc = ulriksdal_xml::parse(PLAIN).unwrap();
        let sig = Signature::from_node(doc.root_element()).unwrap();
        assert_eq!(sig.id.as_deref(), Some("s"));
        assert_eq!(sig.signature_value, vec![1, 2]);
        assert_eq!(sig.signature_value_id.as_deref(), Some("sv"));
        assert_eq!(sig.object_ids, vec!["o".to_string()]);
        assert!(!sig.is_xades());
        assert!(sig.signing_certificate().is_none());
        assert_eq!(sig.level(), SignatureLevel::Bes);
    }

    #[test]
    fn test_rejects_other_elements() {
        let doc = ulriksdal_xml::parse("<a/>").unwrap();
        assert!(Signature::from_node(doc.root_element()).is_err());
    }
}
