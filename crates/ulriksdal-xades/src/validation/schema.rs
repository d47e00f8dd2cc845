#![forbid(unsafe_code)]

//! Built-in content model of the XAdES 1.3.2 qualifying properties.
//!
//! Covers element order and cardinality, required attributes and the
//! lexical form of typed leaves. XAdES elements without a declaration
//! here are rejected; elements from foreign namespaces are accepted
//! where the XAdES schema has a wildcard.

use crate::properties::parse_time;
use roxmltree::Node;
use ulriksdal_core::{ns, Error};
use ulriksdal_xml::document;

const X: &str = ns::XADES;
const X141: &str = ns::XADES141;
const D: &str = ns::DSIG;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Occurs {
    One,
    Optional,
    OneOrMore,
    Many,
}

impl Occurs {
    fn min(self) -> usize {
        match self {
            Occurs::One | Occurs::OneOrMore => 1,
            Occurs::Optional | Occurs::Many => 0,
        }
    }

    fn max(self) -> Option<usize> {
        match self {
            Occurs::One | Occurs::Optional => Some(1),
            Occurs::OneOrMore | Occurs::Many => None,
        }
    }
}

use Occurs::{Many, One, OneOrMore, Optional};

#[derive(Debug, Clone, Copy)]
struct Particle(&'static str, &'static str, Occurs);

#[derive(Debug, Clone, Copy)]
enum Leaf {
    String,
    DateTime,
    Integer,
    Base64,
}

#[derive(Debug, Clone, Copy)]
enum Content {
    Sequence(&'static [Particle]),
    /// Exactly one of the alternatives.
    Choice(&'static [Particle]),
    /// Any number of the listed elements in any order, plus elements of
    /// foreign namespaces.
    Unordered(&'static [(&'static str, &'static str)]),
    Text(Leaf),
    Empty,
    /// Not checked below this element.
    Open,
}

struct Decl {
    ns: &'static str,
    local: &'static str,
    required_attrs: &'static [&'static str],
    content: Content,
}

const fn decl(ns: &'static str, local: &'static str, content: Content) -> Decl {
    Decl {
        ns,
        local,
        required_attrs: &[],
        content,
    }
}

const fn decl_attrs(
    ns: &'static str,
    local: &'static str,
    required_attrs: &'static [&'static str],
    content: Content,
) -> Decl {
    Decl {
        ns,
        local,
        required_attrs,
        content,
    }
}

const TIME_STAMP: Content = Content::Sequence(&[
    Particle(X, "Include", Many),
    Particle(X, "ReferenceInfo", Many),
    Particle(D, "CanonicalizationMethod", Optional),
    Particle(X, "EncapsulatedTimeStamp", OneOrMore),
]);

const DIGEST_PAIR: Content = Content::Sequence(&[
    Particle(D, "DigestMethod", One),
    Particle(D, "DigestValue", One),
]);

static DECLS: &[Decl] = &[
    // containers
    decl_attrs(X, "QualifyingProperties", &["Target"], Content::Sequence(&[
        Particle(X, "SignedProperties", Optional),
        Particle(X, "UnsignedProperties", Optional),
    ])),
    decl(X, "SignedProperties", Content::Sequence(&[
        Particle(X, "SignedSignatureProperties", Optional),
        Particle(X, "SignedDataObjectProperties", Optional),
    ])),
    decl(X, "SignedSignatureProperties", Content::Sequence(&[
        Particle(X, "SigningTime", Optional),
        Particle(X, "SigningCertificate", Optional),
        Particle(X, "SigningCertificateV2", Optional),
        Particle(X, "SignaturePolicyIdentifier", Optional),
        Particle(X, "SignatureProductionPlace", Optional),
        Particle(X, "SignatureProductionPlaceV2", Optional),
        Particle(X, "SignerRole", Optional),
        Particle(X, "SignerRoleV2", Optional),
    ])),
    decl(X, "SignedDataObjectProperties", Content::Sequence(&[
        Particle(X, "DataObjectFormat", Many),
        Particle(X, "CommitmentTypeIndication", Many),
        Particle(X, "AllDataObjectsTimeStamp", Many),
        Particle(X, "IndividualDataObjectsTimeStamp", Many),
    ])),
    decl(X, "UnsignedProperties", Content::Sequence(&[
        Particle(X, "UnsignedSignatureProperties", Optional),
        Particle(X, "UnsignedDataObjectProperties", Optional),
    ])),
    decl(X, "UnsignedSignatureProperties", Content::Unordered(&[
        (X, "CounterSignature"),
        (X, "SignatureTimeStamp"),
        (X, "CompleteCertificateRefs"),
        (X, "CompleteRevocationRefs"),
        (X, "AttributeCertificateRefs"),
        (X, "AttributeRevocationRefs"),
        (X, "SigAndRefsTimeStamp"),
        (X, "RefsOnlyTimeStamp"),
        (X, "CertificateValues"),
        (X, "RevocationValues"),
        (X, "AttrAuthoritiesCertValues"),
        (X, "AttributeRevocationValues"),
        (X, "ArchiveTimeStamp"),
        (X141, "ArchiveTimeStamp"),
        (X141, "TimeStampValidationData"),
    ])),
    decl(X, "UnsignedDataObjectProperties", Content::Open),
    // signed signature properties
    decl(X, "SigningTime", Content::Text(Leaf::DateTime)),
    decl(X, "SigningCertificate", Content::Sequence(&[Particle(X, "Cert", OneOrMore)])),
    decl(X, "SigningCertificateV2", Content::Sequence(&[Particle(X, "Cert", OneOrMore)])),
    decl(X, "Cert", Content::Sequence(&[
        Particle(X, "CertDigest", One),
        Particle(X, "IssuerSerial", Optional),
        Particle(X, "IssuerSerialV2", Optional),
    ])),
    decl(X, "CertDigest", DIGEST_PAIR),
    decl(X, "IssuerSerial", Content::Sequence(&[
        Particle(D, "X509IssuerName", One),
        Particle(D, "X509SerialNumber", One),
    ])),
    decl(X, "IssuerSerialV2", Content::Text(Leaf::Base64)),
    decl(X, "SignaturePolicyIdentifier", Content::Choice(&[
        Particle(X, "SignaturePolicyId", One),
        Particle(X, "SignaturePolicyImplied", One),
    ])),
    decl(X, "SignaturePolicyId", Content::Sequence(&[
        Particle(X, "SigPolicyId", One),
        Particle(D, "Transforms", Optional),
        Particle(X, "SigPolicyHash", One),
        Particle(X, "SigPolicyQualifiers", Optional),
    ])),
    decl(X, "SignaturePolicyImplied", Content::Empty),
    decl(X, "SigPolicyId", Content::Sequence(&[
        Particle(X, "Identifier", One),
        Particle(X, "Description", Optional),
        Particle(X, "DocumentationReferences", Optional),
    ])),
    decl(X, "SigPolicyHash", DIGEST_PAIR),
    decl(X, "SigPolicyQualifiers", Content::Open),
    decl(X, "DocumentationReferences", Content::Open),
    decl(X, "Identifier", Content::Text(Leaf::String)),
    decl(X, "Description", Content::Text(Leaf::String)),
    decl(X, "SignatureProductionPlace", Content::Sequence(&[
        Particle(X, "City", Optional),
        Particle(X, "StateOrProvince", Optional),
        Particle(X, "PostalCode", Optional),
        Particle(X, "CountryName", Optional),
    ])),
    decl(X, "SignatureProductionPlaceV2", Content::Open),
    decl(X, "City", Content::Text(Leaf::String)),
    decl(X, "StateOrProvince", Content::Text(Leaf::String)),
    decl(X, "PostalCode", Content::Text(Leaf::String)),
    decl(X, "CountryName", Content::Text(Leaf::String)),
    decl(X, "SignerRole", Content::Sequence(&[
        Particle(X, "ClaimedRoles", Optional),
        Particle(X, "CertifiedRoles", Optional),
    ])),
    decl(X, "SignerRoleV2", Content::Open),
    decl(X, "ClaimedRoles", Content::Sequence(&[Particle(X, "ClaimedRole", OneOrMore)])),
    decl(X, "ClaimedRole", Content::Open),
    decl(X, "CertifiedRoles", Content::Sequence(&[Particle(X, "CertifiedRole", OneOrMore)])),
    decl(X, "CertifiedRole", Content::Text(Leaf::Base64)),
    // signed data object properties
    decl_attrs(X, "DataObjectFormat", &["ObjectReference"], Content::Sequence(&[
        Particle(X, "Description", Optional),
        Particle(X, "ObjectIdentifier", Optional),
        Particle(X, "MimeType", Optional),
        Particle(X, "Encoding", Optional),
    ])),
    decl(X, "ObjectIdentifier", Content::Open),
    decl(X, "MimeType", Content::Text(Leaf::String)),
    decl(X, "Encoding", Content::Text(Leaf::String)),
    decl(X, "CommitmentTypeIndication", Content::Sequence(&[
        Particle(X, "CommitmentTypeId", One),
        Particle(X, "ObjectReference", Many),
        Particle(X, "AllSignedDataObjects", Optional),
        Particle(X, "CommitmentTypeQualifiers", Optional),
    ])),
    decl(X, "CommitmentTypeId", Content::Sequence(&[
        Particle(X, "Identifier", One),
        Particle(X, "Description", Optional),
        Particle(X, "DocumentationReferences", Optional),
    ])),
    decl(X, "ObjectReference", Content::Text(Leaf::String)),
    decl(X, "AllSignedDataObjects", Content::Empty),
    decl(X, "CommitmentTypeQualifiers", Content::Open),
    decl(X, "AllDataObjectsTimeStamp", TIME_STAMP),
    decl(X, "IndividualDataObjectsTimeStamp", TIME_STAMP),
    // timestamps
    decl(X, "SignatureTimeStamp", TIME_STAMP),
    decl(X, "SigAndRefsTimeStamp", TIME_STAMP),
    decl(X, "RefsOnlyTimeStamp", TIME_STAMP),
    decl(X, "ArchiveTimeStamp", TIME_STAMP),
    decl(X141, "ArchiveTimeStamp", TIME_STAMP),
    decl(X141, "TimeStampValidationData", Content::Open),
    decl_attrs(X, "Include", &["URI"], Content::Empty),
    decl(X, "ReferenceInfo", Content::Open),
    decl(X, "EncapsulatedTimeStamp", Content::Text(Leaf::Base64)),
    // unsigned signature properties
    decl(X, "CounterSignature", Content::Sequence(&[Particle(D, "Signature", One)])),
    decl(X, "CompleteCertificateRefs", Content::Sequence(&[Particle(X, "CertRefs", One)])),
    decl(X, "CertRefs", Content::Sequence(&[Particle(X, "Cert", OneOrMore)])),
    decl(X, "CompleteRevocationRefs", Content::Sequence(&[
        Particle(X, "CRLRefs", Optional),
        Particle(X, "OCSPRefs", Optional),
        Particle(X, "OtherRefs", Optional),
    ])),
    decl(X, "CRLRefs", Content::Sequence(&[Particle(X, "CRLRef", OneOrMore)])),
    decl(X, "CRLRef", Content::Sequence(&[
        Particle(X, "DigestAlgAndValue", One),
        Particle(X, "CRLIdentifier", Optional),
    ])),
    decl(X, "DigestAlgAndValue", DIGEST_PAIR),
    decl(X, "CRLIdentifier", Content::Sequence(&[
        Particle(X, "Issuer", One),
        Particle(X, "IssueTime", One),
        Particle(X, "Number", Optional),
    ])),
    decl(X, "Issuer", Content::Text(Leaf::String)),
    decl(X, "IssueTime", Content::Text(Leaf::DateTime)),
    decl(X, "Number", Content::Text(Leaf::Integer)),
    decl(X, "OCSPRefs", Content::Sequence(&[Particle(X, "OCSPRef", OneOrMore)])),
    decl(X, "OCSPRef", Content::Sequence(&[
        Particle(X, "OCSPIdentifier", One),
        Particle(X, "DigestAlgAndValue", Optional),
    ])),
    decl(X, "OCSPIdentifier", Content::Sequence(&[
        Particle(X, "ResponderID", One),
        Particle(X, "ProducedAt", One),
    ])),
    decl(X, "ResponderID", Content::Choice(&[
        Particle(X, "ByName", One),
        Particle(X, "ByKey", One),
    ])),
    decl(X, "ByName", Content::Text(Leaf::String)),
    decl(X, "ByKey", Content::Text(Leaf::Base64)),
    decl(X, "ProducedAt", Content::Text(Leaf::DateTime)),
    decl(X, "OtherRefs", Content::Open),
    decl(X, "AttributeCertificateRefs", Content::Open),
    decl(X, "AttributeRevocationRefs", Content::Open),
    decl(X, "CertificateValues", Content::Sequence(&[
        Particle(X, "EncapsulatedX509Certificate", Many),
        Particle(X, "OtherCertificate", Many),
    ])),
    decl(X, "EncapsulatedX509Certificate", Content::Text(Leaf::Base64)),
    decl(X, "OtherCertificate", Content::Open),
    decl(X, "RevocationValues", Content::Sequence(&[
        Particle(X, "CRLValues", Optional),
        Particle(X, "OCSPValues", Optional),
        Particle(X, "OtherValues", Optional),
    ])),
    decl(X, "CRLValues", Content::Sequence(&[Particle(X, "EncapsulatedCRLValue", OneOrMore)])),
    decl(X, "EncapsulatedCRLValue", Content::Text(Leaf::Base64)),
    decl(X, "OCSPValues", Content::Sequence(&[Particle(X, "EncapsulatedOCSPValue", OneOrMore)])),
    decl(X, "EncapsulatedOCSPValue", Content::Text(Leaf::Base64)),
    decl(X, "OtherValues", Content::Open),
    decl(X, "AttrAuthoritiesCertValues", Content::Open),
    decl(X, "AttributeRevocationValues", Content::Open),
    // XML-DSig leaves used inside the properties
    decl_attrs(D, "DigestMethod", &["Algorithm"], Content::Open),
    decl(D, "DigestValue", Content::Text(Leaf::Base64)),
    decl(D, "X509IssuerName", Content::Text(Leaf::String)),
    decl(D, "X509SerialNumber", Content::Text(Leaf::Integer)),
    decl_attrs(D, "CanonicalizationMethod", &["Algorithm"], Content::Open),
    decl(D, "Transforms", Content::Open),
    // counter-signatures are validated as signatures in their own right
    decl(D, "Signature", Content::Open),
];

fn lookup(ns_uri: &str, local: &str) -> Option<&'static Decl> {
    DECLS.iter().find(|d| d.ns == ns_uri && d.local == local)
}

fn name_of<'a, 'i>(node: Node<'a, 'i>) -> (&'a str, &'a str) {
    (node.tag_name().namespace().unwrap_or(""), node.tag_name().name())
}

fn violation(path: &str, message: impl std::fmt::Display) -> Error {
    Error::XmlStructure(format!("{path}: {message}"))
}

/// Check a `QualifyingProperties` subtree against the content model.
pub(crate) fn validate_qualifying_properties(node: Node<'_, '_>) -> Result<(), Error> {
    validate_element(node, "")?;
    exclusive_children(node)
}

fn validate_element(node: Node<'_, '_>, parent_path: &str) -> Result<(), Error> {
    let (uri, local) = name_of(node);
    let path = format!("{parent_path}/{local}");
    let decl = lookup(uri, local).ok_or_else(|| violation(&path, "element not allowed by the XAdES schema"))?;

    for attr in decl.required_attrs {
        if node.attribute(*attr).is_none() {
            return Err(violation(&path, format_args!("missing attribute {attr}")));
        }
    }

    let children: Vec<Node<'_, '_>> = document::element_children(node).collect();
    match decl.content {
        Content::Open => return Ok(()),
        Content::Empty => {
            if !children.is_empty() || !document::text_content(node).trim().is_empty() {
                return Err(violation(&path, "must be empty"));
            }
        }
        Content::Text(leaf) => {
            if !children.is_empty() {
                return Err(violation(&path, "must contain only text"));
            }
            check_leaf(&path, leaf, document::text_content(node).trim())?;
        }
        Content::Sequence(particles) => match_sequence(&path, particles, &children)?,
        Content::Choice(options) => {
            let [only] = children.as_slice() else {
                return Err(violation(&path, "must contain exactly one alternative"));
            };
            if !options.iter().any(|p| (p.0, p.1) == name_of(*only)) {
                return Err(violation(&path, format_args!("unexpected {}", only.tag_name().name())));
            }
        }
        Content::Unordered(allowed) => {
            for child in &children {
                let (cns, clocal) = name_of(*child);
                let known = allowed.iter().any(|(n, l)| *n == cns && *l == clocal);
                if !known && (cns == X || cns == X141) {
                    return Err(violation(&path, format_args!("unexpected {clocal}")));
                }
            }
            for child in children.iter().filter(|c| lookup(name_of(**c).0, name_of(**c).1).is_some()) {
                validate_element(*child, &path)?;
            }
            return Ok(());
        }
    }

    for child in children {
        validate_element(child, &path)?;
    }
    Ok(())
}

fn match_sequence(path: &str, particles: &[Particle], children: &[Node<'_, '_>]) -> Result<(), Error> {
    let mut i = 0;
    let mut count = 0;
    for child in children {
        let name = name_of(*child);
        loop {
            let Some(p) = particles.get(i) else {
                return Err(violation(path, format_args!("unexpected {}", name.1)));
            };
            if (p.0, p.1) == name && p.2.max().map_or(true, |max| count < max) {
                count += 1;
                break;
            }
            if count < p.2.min() {
                return Err(violation(path, format_args!("missing {} before {}", p.1, name.1)));
            }
            i += 1;
            count = 0;
        }
    }
    // the rest of the particles must be optional
    for (offset, p) in particles.iter().enumerate().skip(i) {
        let seen = if offset == i { count } else { 0 };
        if seen < p.2.min() {
            return Err(violation(path, format_args!("missing {}", p.1)));
        }
    }
    Ok(())
}

fn check_leaf(path: &str, leaf: Leaf, text: &str) -> Result<(), Error> {
    let ok = match leaf {
        Leaf::String => true,
        Leaf::DateTime => parse_time(text).is_ok(),
        Leaf::Integer => {
            let digits = text.strip_prefix('-').unwrap_or(text);
            !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
        }
        Leaf::Base64 => ulriksdal_dsig::decode_base64(text, "leaf").is_ok(),
    };
    if ok {
        Ok(())
    } else {
        Err(violation(path, format_args!("invalid {leaf:?} value {text:?}")))
    }
}

/// Pairs the schema expresses with `xsd:choice` that the flat sequence
/// table above cannot.
fn exclusive_children(qp: Node<'_, '_>) -> Result<(), Error> {
    for ssp in qp
        .descendants()
        .filter(|n| document::is_element(*n, X, "SignedSignatureProperties"))
    {
        if document::find_child(ssp, X, "SigningCertificate").is_some()
            && document::find_child(ssp, X, "SigningCertificateV2").is_some()
        {
            return Err(violation(
                "SignedSignatureProperties",
                "SigningCertificate and SigningCertificateV2 are mutually exclusive",
            ));
        }
    }
    for cti in qp
        .descendants()
        .filter(|n| document::is_element(*n, X, "CommitmentTypeIndication"))
    {
        let refs = document::find_children(cti, X, "ObjectReference").len();
        let all = document::find_child(cti, X, "AllSignedDataObjects").is_some();
        if (refs > 0) == all {
            return Err(violation(
                "CommitmentTypeIndication",
                "needs either ObjectReference elements or AllSignedDataObjects",
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(body: &str) -> Result<(), Error> {
        let xml = format!(
            r##"<xades:QualifyingProperties xmlns:xades="{}" xmlns:ds="{}" Target="#s">{body}</xades:QualifyingProperties>"##,
            ns::XADES,
            ns::DSIG
        );
        let doc = ulriksdal_xml::parse(&xml).unwrap();
        validate_qualifying_properties(doc.root_element())
    }

    const CERT: &str = concat!(
        r#"<xades:Cert><xades:CertDigest><ds:DigestMethod Algorithm="http://www.w3.org/2001/04/xmlenc#sha256"/>"#,
        r#"<ds:DigestValue>AAAA</ds:DigestValue></xades:CertDigest><xades:IssuerSerial>"#,
        r#"<ds:X509IssuerName>CN=CA</ds:X509IssuerName><ds:X509SerialNumber>4096</ds:X509SerialNumber>"#,
        r#"</xades:IssuerSerial></xades:Cert>"#
    );

    #[test]
    fn test_well_formed_properties_pass() {
        let body = format!(
            concat!(
                r#"<xades:SignedProperties Id="sp"><xades:SignedSignatureProperties>"#,
                r#"<xades:SigningTime>2027-01-01T00:00:00Z</xades:SigningTime>"#,
                r#"<xades:SigningCertificate>{}</xades:SigningCertificate>"#,
                r#"</xades:SignedSignatureProperties><xades:SignedDataObjectProperties>"#,
                r##"<xades:DataObjectFormat ObjectReference="#r"><xades:MimeType>text/xml</xades:MimeType></xades:DataObjectFormat>"##,
                r#"</xades:SignedDataObjectProperties></xades:SignedProperties>"#,
                r#"<xades:UnsignedProperties><xades:UnsignedSignatureProperties>"#,
                r##"<xades:SignatureTimeStamp Id="t"><xades:Include URI="#sv"/>"##,
                r#"<xades:EncapsulatedTimeStamp>AQ==</xades:EncapsulatedTimeStamp></xades:SignatureTimeStamp>"#,
                r#"<x:Vendor xmlns:x="urn:x"/>"#,
                r#"</xades:UnsignedSignatureProperties></xades:UnsignedProperties>"#
            ),
            CERT
        );
        check(&body).unwrap();
    }

    #[test]
    fn test_order_violation() {
        let body = concat!(
            r#"<xades:SignedProperties><xades:SignedSignatureProperties>"#,
            r#"<xades:SignerRole><xades:ClaimedRoles><xades:ClaimedRole>a</xades:ClaimedRole></xades:ClaimedRoles></xades:SignerRole>"#,
            r#"<xades:SigningTime>2027-01-01T00:00:00Z</xades:SigningTime>"#,
            r#"</xades:SignedSignatureProperties></xades:SignedProperties>"#
        );
        assert!(check(body).is_err());
    }

    #[test]
    fn test_unknown_xades_element_and_bad_leaf() {
        assert!(check("<xades:SignedProperties><xades:Bogus/></xades:SignedProperties>").is_err());
        let bad_time = concat!(
            r#"<xades:SignedProperties><xades:SignedSignatureProperties>"#,
            r#"<xades:SigningTime>tomorrow</xades:SigningTime>"#,
            r#"</xades:SignedSignatureProperties></xades:SignedProperties>"#
        );
        assert!(check(bad_time).is_err());
    }

    #[test]
    fn test_missing_required_child_and_attribute() {
        assert!(check("<xades:SignedProperties><xades:SignedSignatureProperties><xades:SigningCertificate/></xades:SignedSignatureProperties></xades:SignedProperties>").is_err());
        let no_ref = concat!(
            r#"<xades:SignedProperties><xades:SignedDataObjectProperties>"#,
            r#"<xades:DataObjectFormat/></xades:SignedDataObjectProperties></xades:SignedProperties>"#
        );
        assert!(check(no_ref).is_err());
    }

    #[test]
    fn test_commitment_needs_exactly_one_scope() {
        let both = concat!(
            r#"<xades:SignedProperties><xades:SignedDataObjectProperties><xades:CommitmentTypeIndication>"#,
            r#"<xades:CommitmentTypeId><xades:Identifier>urn:c</xades:Identifier></xades:CommitmentTypeId>"#,
            r##"<xades:ObjectReference>#r</xades:ObjectReference><xades:AllSignedDataObjects/>"##,
            r#"</xades:CommitmentTypeIndication></xades:SignedDataObjectProperties></xades:SignedProperties>"#
        );
        assert!(check(both).is_err());
    }
}
