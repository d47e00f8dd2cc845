#![forbid(unsafe_code)]

//! XAdES signature levels.

use crate::properties::{TimeStampKind, UnsignedProperties};
use std::fmt;

/// Form of a XAdES signature, from the properties it carries.
///
/// An EPES signature (BES plus a policy identifier) reports as `Bes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SignatureLevel {
    Bes,
    /// A `SignatureTimeStamp`.
    T,
    /// Complete certificate and revocation references.
    C,
    /// A timestamp over the references.
    X,
    /// The referenced evidence values themselves.
    XL,
    /// An `ArchiveTimeStamp`.
    A,
}

impl SignatureLevel {
    pub fn of(unsigned: Option<&UnsignedProperties>) -> Self {
        let Some(u) = unsigned else {
            return Self::Bes;
        };
        let has_refs = u.certificate_refs().is_some() && u.revocation_refs().is_some();
        let has_x = u.has_timestamp(TimeStampKind::SigAndRefs) || u.has_timestamp(TimeStampKind::RefsOnly);
        let has_values = u.certificate_values().is_some() && u.revocation_values().is_some();

        if u.has_timestamp(TimeStampKind::Archive) {
            Self::A
        } else if has_x && has_values {
            Self::XL
        } else if has_x {
            Self::X
        } else if has_refs {
            Self::C
        } else if u.has_timestamp(TimeStampKind::Signature) {
            Self::T
        } else {
            Self::Bes
        }
    }
}

impl fmt::Display for SignatureLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bes => "XAdES-BES",
            Self::T => "XAdES-T",
            Self::C => "XAdES-C",
            Self::X => "XAdES-X",
            Self::XL => "XAdES-XL",
            Self::A => "XAdES-A",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::{
        CertificateValues, CompleteCertificateRefs, CompleteRevocationRefs, RevocationValues,
        UnsignedSignatureProperty, XadesTimeStamp,
    };

    fn ts(kind: TimeStampKind) -> UnsignedSignatureProperty {
        UnsignedSignatureProperty::TimeStamp(XadesTimeStamp {
            kind,
            id: None,
            includes: vec![],
            c14n: None,
            token: vec![],
        })
    }

    #[test]
    fn test_levels_accumulate() {
        assert_eq!(SignatureLevel::of(None), SignatureLevel::Bes);
        let mut u = UnsignedProperties::default();
        assert_eq!(SignatureLevel::of(Some(&u)), SignatureLevel::Bes);
        u.signature_properties.push(ts(TimeStampKind::Signature));
        assert_eq!(SignatureLevel::of(Some(&u)), SignatureLevel::T);
        u.signature_properties.push(UnsignedSignatureProperty::CompleteCertificateRefs(
            CompleteCertificateRefs::default(),
        ));
        u.signature_properties.push(UnsignedSignatureProperty::CompleteRevocationRefs(
            CompleteRevocationRefs::default(),
        ));
        assert_eq!(SignatureLevel::of(Some(&u)), SignatureLevel::C);
        u.signature_properties.push(UnsignedSignatureProperty::CertificateValues(
            CertificateValues::default(),
        ));
        u.signature_properties.push(UnsignedSignatureProperty::RevocationValues(
            RevocationValues::default(),
        ));
        assert_eq!(SignatureLevel::of(Some(&u)), SignatureLevel::C);
        u.signature_properties.push(ts(TimeStampKind::SigAndRefs));
        assert_eq!(SignatureLevel::of(Some(&u)), SignatureLevel::XL);
        u.signature_properties.push(ts(TimeStampKind::Archive));
        assert_eq!(SignatureLevel::of(Some(&u)), SignatureLevel::A);
        assert!(SignatureLevel::A > SignatureLevel::XL);
        assert_eq!(SignatureLevel::XL.to_string(), "XAdES-XL");
    }
}
