#![forbid(unsafe_code)]

//! Base64 decode transform.

use crate::pipeline::{Transform, TransformData};
use ulriksdal_core::{algorithm, Error};
use ulriksdal_xml::NodeSet;

/// Base64 decode transform. Node-set input contributes the string value
/// of its text nodes.
pub struct Base64DecodeTransform;

impl Transform for Base64DecodeTransform {
    fn uri(&self) -> &str {
        algorithm::BASE64
    }

    fn execute(&self, input: TransformData) -> Result<TransformData, Error> {
        use base64::Engine;

        let text = match input {
            TransformData::Binary(data) => String::from_utf8(data)
                .map_err(|e| Error::Transform(format!("base64 input not UTF-8: {e}")))?,
            TransformData::Xml { xml_text, node_set } => {
                let doc = ulriksdal_xml::parse(&xml_text)?;
                let set = node_set.unwrap_or_else(|| NodeSet::all(&doc));
                doc.descendants()
                    .filter(|n| n.is_text() && set.contains(*n))
                    .filter_map(|n| n.text())
                    .collect()
            }
        };

        let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(&cleaned)
            .map_err(|e| Error::Base64(format!("decode error: {e}")))?;

        Ok(TransformData::Binary(decoded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decodes_element_text() {
        let xml = "<CONTENT Id=\"c\">aGVs\n bG8=</CONTENT>";
        let out = Base64DecodeTransform
            .execute(TransformData::Xml {
                xml_text: xml.to_owned(),
                node_set: None,
            })
            .unwrap();
        assert!(matches!(out, TransformData::Binary(b) if b == b"hello"));
    }

    #[test]
    fn test_invalid_base64() {
        let out = Base64DecodeTransform.execute(TransformData::Binary(b"!!".to_vec()));
        assert!(matches!(out, Err(Error::Base64(_))));
    }
}
