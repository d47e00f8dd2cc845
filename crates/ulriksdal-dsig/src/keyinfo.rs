#![forbid(unsafe_code)]

//! `ds:KeyInfo` carrying the signer's X.509 certificates.

use crate::reference::qualified;
use roxmltree::Node;
use ulriksdal_core::{ns, Error};
use ulriksdal_keys::X509Certificate;
use ulriksdal_xml::{document, XmlWriter};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyInfo {
    pub id: Option<String>,
    /// Signing certificate first, then any chain certificates.
    pub certificates: Vec<X509Certificate>,
}

impl KeyInfo {
    pub fn new(id: Option<String>, certificates: Vec<X509Certificate>) -> Self {
        Self { id, certificates }
    }

    /// The certificate whose key produced the signature.
    pub fn signing_certificate(&self) -> Option<&X509Certificate> {
        self.certificates.first()
    }

    pub fn from_node(node: Node<'_, '_>) -> Result<Self, Error> {
        let mut certificates = Vec::new();
        for data in document::find_children(node, ns::DSIG, ns::node::X509_DATA) {
            for cert in document::find_children(data, ns::DSIG, ns::node::X509_CERTIFICATE) {
                let der = crate::decode_base64(&document::text_content(cert), "X509Certificate")?;
                certificates.push(X509Certificate::from_der(&der)?);
            }
        }
        Ok(Self {
            id: node.attribute(ns::attr::ID).map(str::to_owned),
            certificates,
        })
    }

    pub fn write(&self, w: &mut XmlWriter, ds: &str) -> Result<(), Error> {
        let name = |local: &str| qualified(ds, local);
        let id_attr: Vec<(&str, &str)> = self
            .id
            .as_deref()
            .map(|id| vec![(ns::attr::ID, id)])
            .unwrap_or_default();
        w.start_element(&name(ns::node::KEY_INFO), &id_attr)?;
        w.start_element(&name(ns::node::X509_DATA), &[])?;
        for cert in &self.certificates {
            w.text_element(
                &name(ns::node::X509_CERTIFICATE),
                &[],
                &crate::encode_base64(cert.der()),
            )?;
        }
        w.end_element(&name(ns::node::X509_DATA))?;
        w.end_element(&name(ns::node::KEY_INFO))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_info_round_trip() {
        let path = format!("{}/../../test-data/pki/signer-a.der", env!("CARGO_MANIFEST_DIR"));
        let cert = X509Certificate::from_der(&std::fs::read(path).unwrap()).unwrap();
        let ki = KeyInfo::new(Some("KeyInfoId-1".into()), vec![cert.clone()]);
        let mut w = XmlWriter::new();
        w.start_element("ds:Signature", &[("xmlns:ds", ns::DSIG)]).unwrap();
        ki.write(&mut w, "ds").unwrap();
        w.end_element("ds:Signature").unwrap();
        let xml = w.into_string().unwrap();
        let doc = ulriksdal_xml::parse(&xml).unwrap();
        let node = document::find_element(&doc, ns::DSIG, ns::node::KEY_INFO).unwrap();
        let back = KeyInfo::from_node(node).unwrap();
        assert_eq!(back, ki);
        assert_eq!(back.signing_certificate(), Some(&cert));
    }
}
