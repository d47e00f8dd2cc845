#![forbid(unsafe_code)]

//! XAdES timestamp containers (`xades:XAdESTimeStampType`).

use super::id_attr;
use crate::params::Prefixes;
use roxmltree::Node;
use ulriksdal_c14n::C14nMode;
use ulriksdal_core::{ns, Error};
use ulriksdal_xml::{document, XmlWriter};

/// Which property a timestamp container is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeStampKind {
    AllDataObjects,
    IndividualDataObjects,
    Signature,
    SigAndRefs,
    RefsOnly,
    Archive,
}

impl TimeStampKind {
    pub const ALL: [TimeStampKind; 6] = [
        Self::AllDataObjects,
        Self::IndividualDataObjects,
        Self::Signature,
        Self::SigAndRefs,
        Self::RefsOnly,
        Self::Archive,
    ];

    pub fn local_name(&self) -> &'static str {
        match self {
            Self::AllDataObjects => ns::node::ALL_DATA_OBJECTS_TIME_STAMP,
            Self::IndividualDataObjects => ns::node::INDIVIDUAL_DATA_OBJECTS_TIME_STAMP,
            Self::Signature => ns::node::SIGNATURE_TIME_STAMP,
            Self::SigAndRefs => ns::node::SIG_AND_REFS_TIME_STAMP,
            Self::RefsOnly => ns::node::REFS_ONLY_TIME_STAMP,
            Self::Archive => ns::node::ARCHIVE_TIME_STAMP,
        }
    }

    /// `ArchiveTimeStamp` lives in the 1.4.1 namespace; everything else
    /// in 1.3.2.
    pub fn namespace(&self) -> &'static str {
        match self {
            Self::Archive => ns::XADES141,
            _ => ns::XADES,
        }
    }

    /// Recognize a timestamp element. Archive timestamps written in the
    /// 1.3.2 namespace by older producers are accepted too.
    pub fn of_node(node: Node<'_, '_>) -> Option<Self> {
        let name = node.tag_name();
        let uri = name.namespace()?;
        Self::ALL.into_iter().find(|k| {
            k.local_name() == name.name()
                && (uri == k.namespace() || (*k == Self::Archive && uri == ns::XADES))
        })
    }
}

/// `xades:Include`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Include {
    /// `#<id>` of a covered element.
    pub uri: String,
    pub referenced_data: Option<bool>,
}

impl Include {
    pub fn to_id(id: &str) -> Self {
        Self {
            uri: format!("#{id}"),
            referenced_data: None,
        }
    }

    /// Target id without the leading `#`.
    pub fn target_id(&self) -> Option<&str> {
        self.uri.strip_prefix('#')
    }
}

/// One timestamp property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XadesTimeStamp {
    pub kind: TimeStampKind,
    pub id: Option<String>,
    pub includes: Vec<Include>,
    pub c14n: Option<C14nMode>,
    /// DER RFC 3161 token (`ContentInfo`).
    pub token: Vec<u8>,
}

impl XadesTimeStamp {
    pub fn from_node(node: Node<'_, '_>, kind: TimeStampKind) -> Result<Self, Error> {
        let includes = document::find_children(node, ns::XADES, ns::node::INCLUDE)
            .into_iter()
            .map(|n| {
                Ok(Include {
                    uri: document::required_attr(n, ns::attr::URI)?.to_owned(),
                    referenced_data: n
                        .attribute(ns::attr::REFERENCED_DATA)
                        .map(|v| v == "true" || v == "1"),
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;
        let c14n = document::find_child(node, ns::DSIG, ns::node::CANONICALIZATION_METHOD)
            .map(|n| C14nMode::require(document::required_attr(n, ns::attr::ALGORITHM)?))
            .transpose()?;
        let token = document::find_child(node, ns::XADES, ns::node::ENCAPSULATED_TIME_STAMP)
            .ok_or_else(|| Error::MissingElement("EncapsulatedTimeStamp".into()))?;
        Ok(Self {
            kind,
            id: node.attribute(ns::attr::ID).map(str::to_owned),
            includes,
            c14n,
            token: ulriksdal_dsig::decode_base64(&document::text_content(token), "EncapsulatedTimeStamp")?,
        })
    }

    /// The ids named by the `Include` children, in order.
    pub fn included_ids(&self) -> Vec<&str> {
        self.includes.iter().filter_map(Include::target_id).collect()
    }

    pub fn write(&self, w: &mut XmlWriter, p: &Prefixes) -> Result<(), Error> {
        let mut attrs = Vec::new();
        let (name, xmlns) = match self.kind {
            TimeStampKind::Archive => (
                p.xades141(self.kind.local_name()),
                Some(Prefixes::xmlns(&p.xades141)),
            ),
            _ => (p.xades(self.kind.local_name()), None),
        };
        if let Some(xmlns) = &xmlns {
            attrs.push((xmlns.as_str(), ns::XADES141));
        }
        attrs.extend(id_attr(&self.id));
        w.start_element(&name, &attrs)?;
        for inc in &self.includes {
            let mut inc_attrs = vec![(ns::attr::URI, inc.uri.as_str())];
            if let Some(rd) = inc.referenced_data {
                inc_attrs.push((ns::attr::REFERENCED_DATA, if rd { "true" } else { "false" }));
            }
            w.empty_element(&p.xades(ns::node::INCLUDE), &inc_attrs)?;
        }
        if let Some(mode) = self.c14n {
            w.empty_element(
                &p.ds(ns::node::CANONICALIZATION_METHOD),
                &[(ns::attr::ALGORITHM, mode.uri())],
            )?;
        }
        w.text_element(
            &p.xades(ns::node::ENCAPSULATED_TIME_STAMP),
            &[],
            &ulriksdal_dsig::encode_base64(&self.token),
        )?;
        w.end_element(&name)
    }

    /// Serialized element, ready to splice into a document where the
    /// `ds` and `xades` prefixes are in scope.
    pub fn to_fragment(&self, p: &Prefixes) -> Result<String, Error> {
        let mut w = XmlWriter::new();
        self.write(&mut w, p)?;
        w.into_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrap(fragment: &str) -> String {
        format!(
            r#"<r xmlns:ds="{}" xmlns:xades="{}">{fragment}</r>"#,
            ns::DSIG,
            ns::XADES
        )
    }

    #[test]
    fn test_signature_timestamp_round_trip() {
        let ts = XadesTimeStamp {
            kind: TimeStampKind::Signature,
            id: Some("SignatureTimeStamp-1".into()),
            includes: vec![Include::to_id("SignatureValue-1")],
            c14n: Some(C14nMode::Inclusive),
            token: vec![0x30, 0x03, 0x02, 0x01, 0x01],
        };
        let xml = wrap(&ts.to_fragment(&Prefixes::default()).unwrap());
        let doc = ulriksdal_xml::parse(&xml).unwrap();
        let node = doc.root_element().first_element_child().unwrap();
        assert_eq!(TimeStampKind::of_node(node), Some(TimeStampKind::Signature));
        let back = XadesTimeStamp::from_node(node, TimeStampKind::Signature).unwrap();
        assert_eq!(back, ts);
        assert_eq!(back.included_ids(), vec!["SignatureValue-1"]);
    }

    #[test]
    fn test_archive_timestamp_declares_its_namespace() {
        let ts = XadesTimeStamp {
            kind: TimeStampKind::Archive,
            id: None,
            includes: vec![],
            c14n: None,
            token: vec![1],
        };
        let fragment = ts.to_fragment(&Prefixes::default()).unwrap();
        assert!(fragment.starts_with(
            r#"<xades141:ArchiveTimeStamp xmlns:xades141="http://uri.etsi.org/01903/v1.4.1#">"#
        ));
        let xml = wrap(&fragment);
        let doc = ulriksdal_xml::parse(&xml).unwrap();
        let node = doc.root_element().first_element_child().unwrap();
        assert_eq!(TimeStampKind::of_node(node), Some(TimeStampKind::Archive));
    }

    #[test]
    fn test_legacy_archive_namespace_recognized() {
        let xml = wrap("<xades:ArchiveTimeStamp><xades:EncapsulatedTimeStamp>AQ==</xades:EncapsulatedTimeStamp></xades:ArchiveTimeStamp>");
        let doc = ulriksdal_xml::parse(&xml).unwrap();
        let node = doc.root_element().first_element_child().unwrap();
        assert_eq!(TimeStampKind::of_node(node), Some(TimeStampKind::Archive));
    }
}
