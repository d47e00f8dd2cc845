#![forbid(unsafe_code)]

//! Signed qualifying properties.

use super::{child_text, format_time, id_attr, parse_time, DigestAlgAndValue, XadesTimeStamp};
use super::timestamp::TimeStampKind;
use crate::params::{Prefixes, SigningCertificateVersion};
use chrono::{DateTime, Utc};
use der::{Decode, Encode, Sequence};
use roxmltree::Node;
use ulriksdal_core::{ns, Error};
use ulriksdal_keys::X509Certificate;
use ulriksdal_xml::{document, XmlWriter};
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::serial_number::SerialNumber;

/// `xades:SignedProperties`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignedProperties {
    pub id: Option<String>,
    pub signature: Option<SignedSignatureProperties>,
    pub data_objects: Option<SignedDataObjectProperties>,
}

impl SignedProperties {
    pub fn from_node(node: Node<'_, '_>) -> Result<Self, Error> {
        Ok(Self {
            id: node.attribute(ns::attr::ID).map(str::to_owned),
            signature: document::find_child(node, ns::XADES, ns::node::SIGNED_SIGNATURE_PROPERTIES)
                .map(SignedSignatureProperties::from_node)
                .transpose()?,
            data_objects: document::find_child(node, ns::XADES, ns::node::SIGNED_DATA_OBJECT_PROPERTIES)
                .map(SignedDataObjectProperties::from_node)
                .transpose()?,
        })
    }

    pub fn write(&self, w: &mut XmlWriter, p: &Prefixes) -> Result<(), Error> {
        let name = p.xades(ns::node::SIGNED_PROPERTIES);
        w.start_element(&name, &id_attr(&self.id))?;
        if let Some(s) = &self.signature {
            s.write(w, p)?;
        }
        if let Some(d) = &self.data_objects {
            d.write(w, p)?;
        }
        w.end_element(&name)
    }

    pub fn signing_certificate(&self) -> Option<&SigningCertificate> {
        self.signature.as_ref()?.signing_certificate.as_ref()
    }

    pub fn signer_role(&self) -> Option<&SignerRole> {
        self.signature.as_ref()?.signer_role.as_ref()
    }

    pub fn commitments(&self) -> &[CommitmentTypeIndication] {
        self.data_objects
            .as_ref()
            .map(|d| d.commitments.as_slice())
            .unwrap_or(&[])
    }
}

// ── SignedSignatureProperties ────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignedSignatureProperties {
    pub signing_time: Option<DateTime<Utc>>,
    pub signing_certificate: Option<SigningCertificate>,
    pub policy: Option<SignaturePolicy>,
    pub production_place: Option<ProductionPlace>,
    pub signer_role: Option<SignerRole>,
}

impl SignedSignatureProperties {
    pub fn from_node(node: Node<'_, '_>) -> Result<Self, Error> {
        let signing_certificate = match document::find_child(node, ns::XADES, ns::node::SIGNING_CERTIFICATE) {
            Some(n) => Some(SigningCertificate::from_node(n, SigningCertificateVersion::V1)?),
            None => document::find_child(node, ns::XADES, ns::node::SIGNING_CERTIFICATE_V2)
                .map(|n| SigningCertificate::from_node(n, SigningCertificateVersion::V2))
                .transpose()?,
        };
        Ok(Self {
            signing_time: child_text(node, ns::XADES, ns::node::SIGNING_TIME)
                .map(|t| parse_time(&t))
                .transpose()?,
            signing_certificate,
            policy: document::find_child(node, ns::XADES, ns::node::SIGNATURE_POLICY_IDENTIFIER)
                .map(SignaturePolicy::from_node)
                .transpose()?,
            production_place: document::find_child(node, ns::XADES, ns::node::SIGNATURE_PRODUCTION_PLACE)
                .map(ProductionPlace::from_node),
            signer_role: document::find_child(node, ns::XADES, ns::node::SIGNER_ROLE)
                .map(SignerRole::from_node)
                .transpose()?,
        })
    }

    pub fn write(&self, w: &mut XmlWriter, p: &Prefixes) -> Result<(), Error> {
        let name = p.xades(ns::node::SIGNED_SIGNATURE_PROPERTIES);
        w.start_element(&name, &[])?;
        if let Some(t) = &self.signing_time {
            w.text_element(&p.xades(ns::node::SIGNING_TIME), &[], &format_time(t))?;
        }
        if let Some(sc) = &self.signing_certificate {
            sc.write(w, p)?;
        }
        if let Some(policy) = &self.policy {
            policy.write(w, p)?;
        }
        if let Some(place) = &self.production_place {
            place.write(w, p)?;
        }
        if let Some(role) = &self.signer_role {
            role.write(w, p)?;
        }
        w.end_element(&name)
    }
}

// ── SigningCertificate ───────────────────────────────────────────────

/// `SigningCertificate` or `SigningCertificateV2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningCertificate {
    pub version: SigningCertificateVersion,
    pub certs: Vec<CertId>,
}

impl SigningCertificate {
    pub fn for_certificate(
        cert: &X509Certificate,
        digest_method: &str,
        version: SigningCertificateVersion,
    ) -> Result<Self, Error> {
        Ok(Self {
            version,
            certs: vec![CertId::for_certificate(cert, digest_method, version)?],
        })
    }

    fn from_node(node: Node<'_, '_>, version: SigningCertificateVersion) -> Result<Self, Error> {
        let certs = document::find_children(node, ns::XADES, ns::node::CERT)
            .into_iter()
            .map(CertId::from_node)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { version, certs })
    }

    pub fn write(&self, w: &mut XmlWriter, p: &Prefixes) -> Result<(), Error> {
        let name = match self.version {
            SigningCertificateVersion::V1 => p.xades(ns::node::SIGNING_CERTIFICATE),
            SigningCertificateVersion::V2 => p.xades(ns::node::SIGNING_CERTIFICATE_V2),
        };
        w.start_element(&name, &[])?;
        for cert in &self.certs {
            cert.write(w, p)?;
        }
        w.end_element(&name)
    }
}

/// One `xades:Cert`: certificate digest plus issuer and serial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertId {
    pub digest: DigestAlgAndValue,
    pub issuer_serial: Option<IssuerSerial>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssuerSerial {
    /// `ds:X509IssuerName` and decimal `ds:X509SerialNumber`.
    V1 { issuer_name: String, serial: String },
    /// DER `IssuerSerial` (RFC 5035) as carried by `IssuerSerialV2`.
    V2 { der: Vec<u8> },
}

/// `IssuerSerial ::= SEQUENCE { issuer GeneralNames, serialNumber CertificateSerialNumber }`
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct IssuerSerialDer {
    issuer: Vec<GeneralName>,
    serial_number: SerialNumber,
}

impl IssuerSerial {
    pub fn for_certificate(cert: &X509Certificate, version: SigningCertificateVersion) -> Result<Self, Error> {
        match version {
            SigningCertificateVersion::V1 => Ok(Self::V1 {
                issuer_name: cert.issuer(),
                serial: cert.serial_decimal(),
            }),
            SigningCertificateVersion::V2 => {
                let tbs = &cert.certificate().tbs_certificate;
                let value = IssuerSerialDer {
                    issuer: vec![GeneralName::DirectoryName(tbs.issuer.clone())],
                    serial_number: tbs.serial_number.clone(),
                };
                let der = value
                    .to_der()
                    .map_err(|e| Error::Certificate(format!("failed to encode IssuerSerial: {e}")))?;
                Ok(Self::V2 { der })
            }
        }
    }

    /// Whether this names `cert`'s issuer and serial number.
    pub fn matches(&self, cert: &X509Certificate) -> bool {
        match self {
            Self::V1 { issuer_name, serial } => {
                *serial == cert.serial_decimal()
                    && normalize_dn(issuer_name) == normalize_dn(&cert.issuer())
            }
            Self::V2 { der } => {
                let Ok(decoded) = IssuerSerialDer::from_der(der) else {
                    return false;
                };
                let tbs = &cert.certificate().tbs_certificate;
                decoded.serial_number == tbs.serial_number
                    && decoded
                        .issuer
                        .iter()
                        .any(|g| matches!(g, GeneralName::DirectoryName(n) if *n == tbs.issuer))
            }
        }
    }
}

/// Drop insignificant whitespace around RDN separators.
fn normalize_dn(dn: &str) -> String {
    dn.split(',')
        .map(|rdn| {
            rdn.split('=')
                .map(str::trim)
                .collect::<Vec<_>>()
                .join("=")
        })
        .collect::<Vec<_>>()
        .join(",")
}

impl CertId {
    pub fn for_certificate(
        cert: &X509Certificate,
        digest_method: &str,
        version: SigningCertificateVersion,
    ) -> Result<Self, Error> {
        Ok(Self {
            digest: DigestAlgAndValue::compute(digest_method, cert.der())?,
            issuer_serial: Some(IssuerSerial::for_certificate(cert, version)?),
        })
    }

    /// Digest and (when present) issuer/serial both match `cert`.
    pub fn matches(&self, cert: &X509Certificate) -> Result<bool, Error> {
        if !self.digest.matches(cert.der())? {
            return Ok(false);
        }
        Ok(self.issuer_serial.as_ref().map_or(true, |is| is.matches(cert)))
    }

    pub fn from_node(node: Node<'_, '_>) -> Result<Self, Error> {
        let digest = document::find_child(node, ns::XADES, ns::node::CERT_DIGEST)
            .ok_or_else(|| Error::MissingElement("CertDigest".into()))?;
        let issuer_serial = if let Some(is) = document::find_child(node, ns::XADES, ns::node::ISSUER_SERIAL) {
            Some(IssuerSerial::V1 {
                issuer_name: child_text(is, ns::DSIG, ns::node::X509_ISSUER_NAME)
                    .ok_or_else(|| Error::MissingElement("X509IssuerName".into()))?,
                serial: child_text(is, ns::DSIG, ns::node::X509_SERIAL_NUMBER)
                    .ok_or_else(|| Error::MissingElement("X509SerialNumber".into()))?,
            })
        } else {
            document::find_child(node, ns::XADES, ns::node::ISSUER_SERIAL_V2)
                .map(|n| {
                    ulriksdal_dsig::decode_base64(&document::text_content(n), "IssuerSerialV2")
                        .map(|der| IssuerSerial::V2 { der })
                })
                .transpose()?
        };
        Ok(Self {
            digest: DigestAlgAndValue::from_container(digest)?,
            issuer_serial,
        })
    }

    pub fn write(&self, w: &mut XmlWriter, p: &Prefixes) -> Result<(), Error> {
        let name = p.xades(ns::node::CERT);
        w.start_element(&name, &[])?;
        self.digest.write_in(w, p, &p.xades(ns::node::CERT_DIGEST))?;
        match &self.issuer_serial {
            Some(IssuerSerial::V1 { issuer_name, serial }) => {
                let is = p.xades(ns::node::ISSUER_SERIAL);
                w.start_element(&is, &[])?;
                w.text_element(&p.ds(ns::node::X509_ISSUER_NAME), &[], issuer_name)?;
                w.text_element(&p.ds(ns::node::X509_SERIAL_NUMBER), &[], serial)?;
                w.end_element(&is)?;
            }
            Some(IssuerSerial::V2 { der }) => {
                w.text_element(
                    &p.xades(ns::node::ISSUER_SERIAL_V2),
                    &[],
                    &ulriksdal_dsig::encode_base64(der),
                )?;
            }
            None => {}
        }
        w.end_element(&name)
    }
}

// ── Policy, place, role ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignaturePolicy {
    Implied,
    Identifier {
        identifier: String,
        description: Option<String>,
        digest: DigestAlgAndValue,
    },
}

impl SignaturePolicy {
    fn from_node(node: Node<'_, '_>) -> Result<Self, Error> {
        if document::find_child(node, ns::XADES, ns::node::SIGNATURE_POLICY_IMPLIED).is_some() {
            return Ok(Self::Implied);
        }
        let id = document::find_child(node, ns::XADES, ns::node::SIGNATURE_POLICY_ID)
            .ok_or_else(|| Error::MissingElement("SignaturePolicyId".into()))?;
        let sig_policy_id = document::find_child(id, ns::XADES, ns::node::SIG_POLICY_ID)
            .ok_or_else(|| Error::MissingElement("SigPolicyId".into()))?;
        let hash = document::find_child(id, ns::XADES, ns::node::SIG_POLICY_HASH)
            .ok_or_else(|| Error::MissingElement("SigPolicyHash".into()))?;
        Ok(Self::Identifier {
            identifier: child_text(sig_policy_id, ns::XADES, ns::node::IDENTIFIER)
                .ok_or_else(|| Error::MissingElement("Identifier".into()))?,
            description: child_text(sig_policy_id, ns::XADES, ns::node::DESCRIPTION),
            digest: DigestAlgAndValue::from_container(hash)?,
        })
    }

    fn write(&self, w: &mut XmlWriter, p: &Prefixes) -> Result<(), Error> {
        let name = p.xades(ns::node::SIGNATURE_POLICY_IDENTIFIER);
        w.start_element(&name, &[])?;
        match self {
            Self::Implied => w.empty_element(&p.xades(ns::node::SIGNATURE_POLICY_IMPLIED), &[])?,
            Self::Identifier {
                identifier,
                description,
                digest,
            } => {
                let id = p.xades(ns::node::SIGNATURE_POLICY_ID);
                let spid = p.xades(ns::node::SIG_POLICY_ID);
                w.start_element(&id, &[])?;
                w.start_element(&spid, &[])?;
                w.text_element(&p.xades(ns::node::IDENTIFIER), &[], identifier)?;
                if let Some(d) = description {
                    w.text_element(&p.xades(ns::node::DESCRIPTION), &[], d)?;
                }
                w.end_element(&spid)?;
                digest.write_in(w, p, &p.xades(ns::node::SIG_POLICY_HASH))?;
                w.end_element(&id)?;
            }
        }
        w.end_element(&name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductionPlace {
    pub city: Option<String>,
    pub state_or_province: Option<String>,
    pub postal_code: Option<String>,
    pub country_name: Option<String>,
}

impl ProductionPlace {
    fn fields(&self) -> [(&'static str, &Option<String>); 4] {
        [
            (ns::node::CITY, &self.city),
            (ns::node::STATE_OR_PROVINCE, &self.state_or_province),
            (ns::node::POSTAL_CODE, &self.postal_code),
            (ns::node::COUNTRY_NAME, &self.country_name),
        ]
    }

    fn from_node(node: Node<'_, '_>) -> Self {
        Self {
            city: child_text(node, ns::XADES, ns::node::CITY),
            state_or_province: child_text(node, ns::XADES, ns::node::STATE_OR_PROVINCE),
            postal_code: child_text(node, ns::XADES, ns::node::POSTAL_CODE),
            country_name: child_text(node, ns::XADES, ns::node::COUNTRY_NAME),
        }
    }

    fn write(&self, w: &mut XmlWriter, p: &Prefixes) -> Result<(), Error> {
        let name = p.xades(ns::node::SIGNATURE_PRODUCTION_PLACE);
        w.start_element(&name, &[])?;
        for (local, value) in self.fields() {
            if let Some(v) = value {
                w.text_element(&p.xades(local), &[], v)?;
            }
        }
        w.end_element(&name)
    }
}

/// `xades:SignerRole`. Certified roles are DER attribute certificates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignerRole {
    pub claimed: Vec<String>,
    pub certified: Vec<Vec<u8>>,
}

impl SignerRole {
    pub fn claimed(roles: &[&str]) -> Self {
        Self {
            claimed: roles.iter().map(|r| (*r).to_owned()).collect(),
            certified: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.claimed.is_empty() && self.certified.is_empty()
    }

    fn from_node(node: Node<'_, '_>) -> Result<Self, Error> {
        let claimed = document::find_child(node, ns::XADES, ns::node::CLAIMED_ROLES)
            .map(|c| {
                document::find_children(c, ns::XADES, ns::node::CLAIMED_ROLE)
                    .into_iter()
                    .map(document::text_content)
                    .collect()
            })
            .unwrap_or_default();
        let certified = match document::find_child(node, ns::XADES, ns::node::CERTIFIED_ROLES) {
            Some(c) => document::find_children(c, ns::XADES, ns::node::CERTIFIED_ROLE)
                .into_iter()
                .map(|r| ulriksdal_dsig::decode_base64(&document::text_content(r), "CertifiedRole"))
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };
        Ok(Self { claimed, certified })
    }

    fn write(&self, w: &mut XmlWriter, p: &Prefixes) -> Result<(), Error> {
        let name = p.xades(ns::node::SIGNER_ROLE);
        w.start_element(&name, &[])?;
        if !self.claimed.is_empty() {
            let roles = p.xades(ns::node::CLAIMED_ROLES);
            w.start_element(&roles, &[])?;
            for role in &self.claimed {
                w.text_element(&p.xades(ns::node::CLAIMED_ROLE), &[], role)?;
            }
            w.end_element(&roles)?;
        }
        if !self.certified.is_empty() {
            let roles = p.xades(ns::node::CERTIFIED_ROLES);
            w.start_element(&roles, &[])?;
            for role in &self.certified {
                w.text_element(
                    &p.xades(ns::node::CERTIFIED_ROLE),
                    &[],
                    &ulriksdal_dsig::encode_base64(role),
                )?;
            }
            w.end_element(&roles)?;
        }
        w.end_element(&name)
    }
}

// ── SignedDataObjectProperties ───────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignedDataObjectProperties {
    pub formats: Vec<DataObjectFormat>,
    pub commitments: Vec<CommitmentTypeIndication>,
    pub all_data_objects_timestamps: Vec<XadesTimeStamp>,
    pub individual_data_objects_timestamps: Vec<XadesTimeStamp>,
}

impl SignedDataObjectProperties {
    fn from_node(node: Node<'_, '_>) -> Result<Self, Error> {
        let timestamps = |kind: TimeStampKind| {
            document::find_children(node, ns::XADES, kind.local_name())
                .into_iter()
                .map(|n| XadesTimeStamp::from_node(n, kind))
                .collect::<Result<Vec<_>, _>>()
        };
        Ok(Self {
            formats: document::find_children(node, ns::XADES, ns::node::DATA_OBJECT_FORMAT)
                .into_iter()
                .map(DataObjectFormat::from_node)
                .collect::<Result<Vec<_>, _>>()?,
            commitments: document::find_children(node, ns::XADES, ns::node::COMMITMENT_TYPE_INDICATION)
                .into_iter()
                .map(CommitmentTypeIndication::from_node)
                .collect::<Result<Vec<_>, _>>()?,
            all_data_objects_timestamps: timestamps(TimeStampKind::AllDataObjects)?,
            individual_data_objects_timestamps: timestamps(TimeStampKind::IndividualDataObjects)?,
        })
    }

    fn write(&self, w: &mut XmlWriter, p: &Prefixes) -> Result<(), Error> {
        let name = p.xades(ns::node::SIGNED_DATA_OBJECT_PROPERTIES);
        w.start_element(&name, &[])?;
        for f in &self.formats {
            f.write(w, p)?;
        }
        for c in &self.commitments {
            c.write(w, p)?;
        }
        for ts in self
            .all_data_objects_timestamps
            .iter()
            .chain(&self.individual_data_objects_timestamps)
        {
            ts.write(w, p)?;
        }
        w.end_element(&name)
    }
}

/// Format of one signed data object, linked by reference id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataObjectFormat {
    /// `#<Reference Id>`.
    pub object_reference: String,
    pub description: Option<String>,
    pub mime_type: Option<String>,
    pub encoding: Option<String>,
}

impl DataObjectFormat {
    fn from_node(node: Node<'_, '_>) -> Result<Self, Error> {
        Ok(Self {
            object_reference: document::required_attr(node, ns::attr::OBJECT_REFERENCE)?.to_owned(),
            description: child_text(node, ns::XADES, ns::node::DESCRIPTION),
            mime_type: child_text(node, ns::XADES, ns::node::MIME_TYPE),
            encoding: child_text(node, ns::XADES, ns::node::ENCODING),
        })
    }

    fn write(&self, w: &mut XmlWriter, p: &Prefixes) -> Result<(), Error> {
        let name = p.xades(ns::node::DATA_OBJECT_FORMAT);
        w.start_element(&name, &[(ns::attr::OBJECT_REFERENCE, &self.object_reference)])?;
        for (local, value) in [
            (ns::node::DESCRIPTION, &self.description),
            (ns::node::MIME_TYPE, &self.mime_type),
            (ns::node::ENCODING, &self.encoding),
        ] {
            if let Some(v) = value {
                w.text_element(&p.xades(local), &[], v)?;
            }
        }
        w.end_element(&name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitmentTypeIndication {
    /// Commitment type URI, e.g. `http://uri.etsi.org/01903/v1.2.2#ProofOfOrigin`.
    pub identifier: String,
    /// `#<Reference Id>` values; empty means all signed data objects.
    pub object_references: Vec<String>,
}

impl CommitmentTypeIndication {
    pub fn all_objects(identifier: &str) -> Self {
        Self {
            identifier: identifier.to_owned(),
            object_references: Vec::new(),
        }
    }

    fn from_node(node: Node<'_, '_>) -> Result<Self, Error> {
        let type_id = document::find_child(node, ns::XADES, ns::node::COMMITMENT_TYPE_ID)
            .ok_or_else(|| Error::MissingElement("CommitmentTypeId".into()))?;
        Ok(Self {
            identifier: child_text(type_id, ns::XADES, ns::node::IDENTIFIER)
                .ok_or_else(|| Error::MissingElement("Identifier".into()))?,
            object_references: document::find_children(node, ns::XADES, ns::node::OBJECT_REFERENCE)
                .into_iter()
                .map(document::text_content)
                .collect(),
        })
    }

    fn write(&self, w: &mut XmlWriter, p: &Prefixes) -> Result<(), Error> {
        let name = p.xades(ns::node::COMMITMENT_TYPE_INDICATION);
        let type_id = p.xades(ns::node::COMMITMENT_TYPE_ID);
        w.start_element(&name, &[])?;
        w.start_element(&type_id, &[])?;
        w.text_element(&p.xades(ns::node::IDENTIFIER), &[], &self.identifier)?;
        w.end_element(&type_id)?;
        if self.object_references.is_empty() {
            w.empty_element(&p.xades(ns::node::ALL_SIGNED_DATA_OBJECTS), &[])?;
        }
        for r in &self.object_references {
            w.text_element(&p.xades(ns::node::OBJECT_REFERENCE), &[], r)?;
        }
        w.end_element(&name)
    }
}
