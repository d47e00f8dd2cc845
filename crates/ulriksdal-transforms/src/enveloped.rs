#![forbid(unsafe_code)]

//! Enveloped signature transform.
//!
//! Removes the `<Signature>` element holding the reference from the node set.

use crate::pipeline::{Transform, TransformData};
use roxmltree::NodeId;
use ulriksdal_core::{algorithm, Error};
use ulriksdal_xml::NodeSet;

/// The enveloped signature transform. Removes the `<Signature>` element
/// and its descendants from the node set.
pub struct EnvelopedSignatureTransform {
    /// Node index of the `<Signature>` element to remove.
    signature_node_index: usize,
}

impl EnvelopedSignatureTransform {
    pub fn new(signature_node_index: usize) -> Self {
        Self {
            signature_node_index,
        }
    }
}

impl Transform for EnvelopedSignatureTransform {
    fn uri(&self) -> &str {
        algorithm::ENVELOPED_SIGNATURE
    }

    fn execute(&self, input: TransformData) -> Result<TransformData, Error> {
        let TransformData::Xml { xml_text, node_set } = input else {
            return Err(Error::Transform(
                "enveloped-signature transform requires XML input".into(),
            ));
        };
        let node_set = {
            let doc = ulriksdal_xml::parse(&xml_text)?;
            let id = u32::try_from(self.signature_node_index)
                .map(NodeId::new)
                .map_err(|_| Error::Transform("signature node index out of range".into()))?;
            let signature = doc
                .get_node(id)
                .ok_or_else(|| Error::Transform("enveloping signature not found".into()))?;
            let mut ns = node_set.unwrap_or_else(|| NodeSet::all_without_comments(&doc));
            ns.remove_subtree(signature);
            ns
        };
        Ok(TransformData::Xml {
            xml_text,
            node_set: Some(node_set),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulriksdal_xml::nodeset::node_index;

    #[test]
    fn test_signature_subtree_removed() {
        let xml = r#"<doc><a>x</a><ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><ds:SignatureValue>v</ds:SignatureValue></ds:Signature></doc>"#;
        let doc = ulriksdal_xml::parse(xml).unwrap();
        let sig = doc.descendants().find(|n| n.has_tag_name("Signature")).unwrap();
        let t = EnvelopedSignatureTransform::new(node_index(sig));
        let out = t
            .execute(TransformData::Xml {
                xml_text: xml.to_owned(),
                node_set: None,
            })
            .unwrap()
            .into_binary()
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "<doc><a>x</a></doc>");
    }

    #[test]
    fn test_binary_input_rejected() {
        let t = EnvelopedSignatureTransform::new(1);
        assert!(t.execute(TransformData::Binary(vec![])).is_err());
    }
}
