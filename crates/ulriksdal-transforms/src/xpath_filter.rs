#![forbid(unsafe_code)]

//! XPath signature filter.
//!
//! Only the filter XAdES signers emit to keep sibling signatures out of
//! an enveloped reference is evaluated:
//! `not(ancestor-or-self::P:Signature)` with `P` bound to the XML-DSig
//! namespace. Any other expression is rejected as unsupported.

use crate::pipeline::{Transform, TransformData};
use ulriksdal_core::{algorithm, ns, Error};
use ulriksdal_xml::{document, NodeSet};

pub struct XPathSignatureFilter;

impl XPathSignatureFilter {
    /// Check `expression` against the supported form.
    pub fn parse(expression: &str, namespaces: &[(String, String)]) -> Result<Self, Error> {
        let compact: String = expression.chars().filter(|c| !c.is_whitespace()).collect();
        let unsupported = || Error::UnsupportedAlgorithm(format!("XPath expression: {expression}"));

        let qname = compact
            .strip_prefix("not(ancestor-or-self::")
            .and_then(|s| s.strip_suffix(')'))
            .ok_or_else(unsupported)?;
        let (prefix, local) = qname.split_once(':').ok_or_else(unsupported)?;
        if local != ns::node::SIGNATURE {
            return Err(unsupported());
        }
        let bound = namespaces
            .iter()
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.as_str());
        if bound != Some(ns::DSIG) {
            return Err(Error::Transform(format!(
                "XPath prefix '{prefix}' is not bound to the XML-DSig namespace"
            )));
        }
        Ok(Self)
    }
}

impl Transform for XPathSignatureFilter {
    fn uri(&self) -> &str {
        algorithm::XPATH
    }

    fn execute(&self, input: TransformData) -> Result<TransformData, Error> {
        let TransformData::Xml { xml_text, node_set } = input else {
            return Err(Error::Transform("XPath filter requires XML input".into()));
        };
        let node_set = {
            let doc = ulriksdal_xml::parse(&xml_text)?;
            let mut ns = node_set.unwrap_or_else(|| NodeSet::all_without_comments(&doc));
            for sig in document::find_elements(&doc, ns::DSIG, ns::node::SIGNATURE) {
                ns.remove_subtree(sig);
            }
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

    fn dsig(prefix: &str) -> Vec<(String, String)> {
        vec![(prefix.to_owned(), ns::DSIG.to_owned())]
    }

    #[test]
    fn test_accepts_signature_filter() {
        assert!(XPathSignatureFilter::parse("not(ancestor-or-self::ds:Signature)", &dsig("ds")).is_ok());
        assert!(
            XPathSignatureFilter::parse(" not( ancestor-or-self::x:Signature ) ", &dsig("x")).is_ok()
        );
    }

    #[test]
    fn test_rejects_other_expressions() {
        assert!(XPathSignatureFilter::parse("count(//a)", &dsig("ds")).is_err());
        assert!(XPathSignatureFilter::parse("not(ancestor-or-self::ds:Object)", &dsig("ds")).is_err());
        assert!(XPathSignatureFilter::parse("not(ancestor-or-self::ds:Signature)", &dsig("x")).is_err());
    }

    #[test]
    fn test_removes_every_signature() {
        let xml = concat!(
            r#"<doc xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><a/>"#,
            r#"<ds:Signature Id="s1"><ds:SignatureValue/></ds:Signature>"#,
            r#"<ds:Signature Id="s2"/></doc>"#
        );
        let out = XPathSignatureFilter
            .execute(TransformData::Xml {
                xml_text: xml.to_owned(),
                node_set: None,
            })
            .unwrap()
            .into_binary()
            .unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            r#"<doc xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><a></a></doc>"#
        );
    }
}
