#![forbid(unsafe_code)]

//! One function per validation flag.
//!
//! Rules report a failure as any [`Error`]; the dispatcher in the parent
//! module turns it into [`Error::Validation`] carrying the rule name.

use super::{check_at, schema, Input, ValidationFlags};
use crate::document::qualifying_properties_node;
use crate::properties::{DigestAlgAndValue, TimeStampKind, UnsignedProperties, UnsignedSignatureProperty, XadesTimeStamp};
use crate::signature::Signature;
use crate::timestamp::{expected_includes, verify_timestamp};
use roxmltree::Node;
use ulriksdal_core::{algorithm, ns, Error};
use ulriksdal_dsig::verify::verify_signature;
use ulriksdal_dsig::VerifyResult;
use ulriksdal_xml::document;

/// The signature a rule looks at.
pub(super) struct Scope<'s, 'a, 'i> {
    pub input: &'s Input<'a, 'i>,
    pub node: Node<'a, 'i>,
    pub signature: &'a Signature,
    pub key: &'s str,
    pub flags: ValidationFlags,
}

type Check = fn(&Scope<'_, '_, '_>) -> Result<(), Error>;

pub(super) struct Rule {
    pub flag: ValidationFlags,
    pub name: &'static str,
    pub check: Check,
}

const fn rule(flag: ValidationFlags, name: &'static str, check: Check) -> Rule {
    Rule { flag, name, check }
}

/// Every rule, in ascending flag order.
pub(super) static RULES: [Rule; 20] = [
    rule(ValidationFlags::CHECK_XMLDSIG_SIGNATURE, "CheckXmldsigSignature", xmldsig_signature),
    rule(ValidationFlags::VALIDATE_AGAINST_SCHEMA, "ValidateAgainstSchema", against_schema),
    rule(ValidationFlags::CHECK_SAME_CERTIFICATE, "CheckSameCertificate", same_certificate),
    rule(
        ValidationFlags::CHECK_ALL_REFERENCES_EXIST_IN_ALL_DATA_OBJECTS_TIME_STAMP,
        "CheckAllReferencesExistInAllDataObjectsTimeStamp",
        all_data_objects_includes,
    ),
    rule(
        ValidationFlags::CHECK_ALL_HASH_DATA_INFOS_IN_INDIVIDUAL_DATA_OBJECTS_TIME_STAMP,
        "CheckAllHashDataInfosInIndividualDataObjectsTimeStamp",
        individual_data_objects_includes,
    ),
    rule(ValidationFlags::CHECK_COUNTER_SIGNATURES, "CheckCounterSignatures", counter_signatures),
    rule(
        ValidationFlags::CHECK_COUNTER_SIGNATURES_REFERENCE,
        "CheckCounterSignaturesReference",
        counter_signatures_reference,
    ),
    rule(
        ValidationFlags::CHECK_OBJECT_REFERENCES_IN_COMMITMENT_TYPE_INDICATION,
        "CheckObjectReferencesInCommitmentTypeIndication",
        commitment_object_references,
    ),
    rule(
        ValidationFlags::CHECK_IF_CLAIMED_ROLES_OR_CERTIFIED_ROLES_PRESENT_IN_SIGNER_ROLE,
        "CheckIfClaimedRolesOrCertifiedRolesPresentInSignerRole",
        signer_role_present,
    ),
    rule(
        ValidationFlags::CHECK_HASH_DATA_INFO_OF_SIGNATURE_TIME_STAMP_POINTS_TO_SIGNATURE_VALUE,
        "CheckHashDataInfoOfSignatureTimeStampPointsToSignatureValue",
        signature_timestamp_includes,
    ),
    rule(
        ValidationFlags::CHECK_QUALIFYING_PROPERTIES_TARGET,
        "CheckQualifyingPropertiesTarget",
        qualifying_properties_target,
    ),
    rule(ValidationFlags::CHECK_QUALIFYING_PROPERTIES, "CheckQualifyingProperties", qualifying_properties),
    rule(
        ValidationFlags::CHECK_SIG_AND_REFS_TIME_STAMP_HASH_DATA_INFOS,
        "CheckSigAndRefsTimeStampHashDataInfos",
        sig_and_refs_timestamp_includes,
    ),
    rule(
        ValidationFlags::CHECK_REFS_ONLY_TIME_STAMP_HASH_DATA_INFOS,
        "CheckRefsOnlyTimeStampHashDataInfos",
        refs_only_timestamp_includes,
    ),
    rule(
        ValidationFlags::CHECK_ARCHIVE_TIME_STAMP_HASH_DATA_INFOS,
        "CheckArchiveTimeStampHashDataInfos",
        archive_timestamp_includes,
    ),
    rule(ValidationFlags::CHECK_XADES_C_IS_XADES_T, "CheckXadesCIsXadesT", c_is_t),
    rule(ValidationFlags::CHECK_XADES_XL_IS_XADES_X, "CheckXadesXLIsXadesX", xl_is_x),
    rule(
        ValidationFlags::CHECK_CERTIFICATE_VALUES_MATCH_CERTIFICATE_REFS,
        "CheckCertificateValuesMatchCertificateRefs",
        certificate_values_match_refs,
    ),
    rule(
        ValidationFlags::CHECK_REVOCATION_VALUES_MATCH_REVOCATION_REFS,
        "CheckRevocationValuesMatchRevocationRefs",
        revocation_values_match_refs,
    ),
    rule(
        ValidationFlags::CHECK_TIME_STAMP_MESSAGE_IMPRINTS,
        "CheckTimeStampMessageImprints",
        timestamp_imprints,
    ),
];

fn broken(message: impl Into<String>) -> Error {
    Error::Other(message.into())
}

// ── Cryptographic and structural ─────────────────────────────────────

fn xmldsig_signature(s: &Scope<'_, '_, '_>) -> Result<(), Error> {
    match verify_signature(s.input.ctx, s.input.doc, s.node)? {
        VerifyResult::Valid => Ok(()),
        VerifyResult::Invalid { reason } => Err(broken(reason)),
    }
}

fn against_schema(s: &Scope<'_, '_, '_>) -> Result<(), Error> {
    for qp in qualifying_properties_nodes(s.node) {
        schema::validate_qualifying_properties(qp)?;
    }
    Ok(())
}

fn same_certificate(s: &Scope<'_, '_, '_>) -> Result<(), Error> {
    let cert = s
        .signature
        .signing_certificate()
        .ok_or_else(|| broken("KeyInfo carries no certificate"))?;
    let Some(signing_certificate) = s.signature.signed_properties().and_then(|p| p.signing_certificate()) else {
        // without the property the certificate must be bound by a
        // reference over KeyInfo instead
        let key_info_id = s.signature.key_info.as_ref().and_then(|k| k.id.as_deref());
        let referenced = key_info_id.is_some_and(|id| {
            s.signature
                .signed_info
                .references
                .iter()
                .any(|r| r.target_id() == Some(id))
        });
        return if referenced {
            Ok(())
        } else {
            Err(broken("no SigningCertificate and KeyInfo is not signed"))
        };
    };
    for cert_id in &signing_certificate.certs {
        if cert_id.matches(cert)? {
            return Ok(());
        }
    }
    Err(broken(format!(
        "KeyInfo certificate {} is not the SigningCertificate",
        cert.subject()
    )))
}

fn counter_signatures(s: &Scope<'_, '_, '_>) -> Result<(), Error> {
    for child in s.input.document.counter_signatures_of(s.key) {
        check_at(s.input, child, s.flags).map_err(|e| broken(format!("counter-signature {child}: {e}")))?;
    }
    Ok(())
}

fn counter_signatures_reference(s: &Scope<'_, '_, '_>) -> Result<(), Error> {
    let children = s.input.document.counter_signatures_of(s.key);
    if children.is_empty() {
        return Ok(());
    }
    let value_id = s
        .signature
        .signature_value_id
        .as_deref()
        .ok_or_else(|| broken("counter-signed SignatureValue has no Id"))?;
    for child in children {
        let counter = &s.input.document.entry(child)?.signature;
        let points_back = counter
            .signed_info
            .references
            .iter()
            .any(|r| r.target_id() == Some(value_id));
        if !points_back {
            return Err(broken(format!(
                "counter-signature {child} does not reference #{value_id}"
            )));
        }
    }
    Ok(())
}

fn commitment_object_references(s: &Scope<'_, '_, '_>) -> Result<(), Error> {
    let Some(props) = s.signature.signed_properties() else {
        return Ok(());
    };
    for commitment in props.commitments() {
        for object_ref in &commitment.object_references {
            let id = object_ref.strip_prefix('#').unwrap_or(object_ref);
            if s.signature.signed_info.reference_by_id(id).is_none() {
                return Err(broken(format!(
                    "commitment {} names {object_ref}, which is no Reference",
                    commitment.identifier
                )));
            }
        }
    }
    Ok(())
}

fn signer_role_present(s: &Scope<'_, '_, '_>) -> Result<(), Error> {
    match s.signature.signed_properties().and_then(|p| p.signer_role()) {
        Some(role) if role.is_empty() => Err(broken("SignerRole has neither claimed nor certified roles")),
        _ => Ok(()),
    }
}

fn qualifying_properties_target(s: &Scope<'_, '_, '_>) -> Result<(), Error> {
    let Some(qp) = &s.signature.qualifying_properties else {
        return Ok(());
    };
    let id = s
        .signature
        .id
        .as_deref()
        .ok_or_else(|| broken("a XAdES signature needs an Id"))?;
    if qp.target != format!("#{id}") {
        return Err(broken(format!("Target {} does not name signature {id}", qp.target)));
    }
    Ok(())
}

fn qualifying_properties(s: &Scope<'_, '_, '_>) -> Result<(), Error> {
    let count = qualifying_properties_nodes(s.node).count();
    if count != 1 {
        return Err(broken(format!("{count} QualifyingProperties elements, expected one")));
    }
    let signed = s
        .signature
        .signed_properties()
        .ok_or_else(|| broken("QualifyingProperties without SignedProperties"))?;
    let id = signed
        .id
        .as_deref()
        .ok_or_else(|| broken("SignedProperties has no Id"))?;
    let covered = s
        .signature
        .signed_info
        .references
        .iter()
        .any(|r| r.type_uri.as_deref() == Some(algorithm::TYPE_SIGNED_PROPERTIES) && r.target_id() == Some(id));
    if !covered {
        return Err(broken(format!("no SignedProperties reference to #{id}")));
    }
    Ok(())
}

fn qualifying_properties_nodes<'a, 'i>(sig: Node<'a, 'i>) -> impl Iterator<Item = Node<'a, 'i>> {
    document::find_children(sig, ns::DSIG, ns::node::OBJECT)
        .into_iter()
        .flat_map(|o| document::find_children(o, ns::XADES, ns::node::QUALIFYING_PROPERTIES))
}

// ── Timestamp coverage ───────────────────────────────────────────────

/// Compare a timestamp's includes with the ids it must cover, ignoring
/// order.
fn same_coverage(ts: &XadesTimeStamp, expected: &[String]) -> Result<(), Error> {
    if ts.included_ids().len() != ts.includes.len() {
        return Err(broken(format!(
            "{} includes a URI that is not a same-document reference",
            ts.kind.local_name()
        )));
    }
    let mut actual: Vec<&str> = ts.included_ids();
    let mut wanted: Vec<&str> = expected.iter().map(String::as_str).collect();
    actual.sort_unstable();
    wanted.sort_unstable();
    if actual != wanted {
        return Err(broken(format!(
            "{} covers {actual:?}, expected {wanted:?}",
            ts.kind.local_name()
        )));
    }
    Ok(())
}

fn all_data_objects_includes(s: &Scope<'_, '_, '_>) -> Result<(), Error> {
    let Some(objects) = s.signature.signed_properties().and_then(|p| p.data_objects.as_ref()) else {
        return Ok(());
    };
    for ts in &objects.all_data_objects_timestamps {
        let expected = expected_includes(s.signature, TimeStampKind::AllDataObjects, 0)?.unwrap_or_default();
        same_coverage(ts, &expected)?;
    }
    Ok(())
}

fn individual_data_objects_includes(s: &Scope<'_, '_, '_>) -> Result<(), Error> {
    let Some(objects) = s.signature.signed_properties().and_then(|p| p.data_objects.as_ref()) else {
        return Ok(());
    };
    for ts in &objects.individual_data_objects_timestamps {
        if ts.includes.is_empty() {
            return Err(broken("IndividualDataObjectsTimeStamp includes nothing"));
        }
        for include in &ts.includes {
            let reference = include
                .target_id()
                .and_then(|id| s.signature.signed_info.reference_by_id(id));
            match reference {
                Some(r) if r.type_uri.as_deref() != Some(algorithm::TYPE_SIGNED_PROPERTIES) => {}
                _ => {
                    return Err(broken(format!(
                        "IndividualDataObjectsTimeStamp include {} is not a data object Reference",
                        include.uri
                    )))
                }
            }
        }
    }
    Ok(())
}

fn signature_timestamp_includes(s: &Scope<'_, '_, '_>) -> Result<(), Error> {
    unsigned_timestamp_includes(s, TimeStampKind::Signature)
}

fn sig_and_refs_timestamp_includes(s: &Scope<'_, '_, '_>) -> Result<(), Error> {
    unsigned_timestamp_includes(s, TimeStampKind::SigAndRefs)
}

fn refs_only_timestamp_includes(s: &Scope<'_, '_, '_>) -> Result<(), Error> {
    unsigned_timestamp_includes(s, TimeStampKind::RefsOnly)
}

fn archive_timestamp_includes(s: &Scope<'_, '_, '_>) -> Result<(), Error> {
    unsigned_timestamp_includes(s, TimeStampKind::Archive)
}

fn unsigned_timestamp_includes(s: &Scope<'_, '_, '_>, kind: TimeStampKind) -> Result<(), Error> {
    let Some(unsigned) = s.signature.unsigned_properties() else {
        return Ok(());
    };
    for (position, prop) in unsigned.signature_properties.iter().enumerate() {
        let UnsignedSignatureProperty::TimeStamp(ts) = prop else {
            continue;
        };
        if ts.kind != kind {
            continue;
        }
        if let Some(expected) = expected_includes(s.signature, kind, position)? {
            same_coverage(ts, &expected)?;
        }
    }
    Ok(())
}

fn timestamp_imprints(s: &Scope<'_, '_, '_>) -> Result<(), Error> {
    let signed = s
        .signature
        .signed_properties()
        .and_then(|p| p.data_objects.as_ref())
        .into_iter()
        .flat_map(|o| {
            o.all_data_objects_timestamps
                .iter()
                .chain(o.individual_data_objects_timestamps.iter())
        });
    let unsigned = s
        .signature
        .unsigned_properties()
        .into_iter()
        .flat_map(|u| u.signature_properties.iter())
        .filter_map(|p| match p {
            UnsignedSignatureProperty::TimeStamp(ts) => Some(ts),
            _ => None,
        });
    for ts in signed.chain(unsigned) {
        verify_timestamp(s.input.doc, s.input.ctx, ts).map_err(|e| {
            broken(format!(
                "{} {}: {e}",
                ts.kind.local_name(),
                ts.id.as_deref().unwrap_or("(no Id)")
            ))
        })?;
    }
    Ok(())
}

// ── Level consistency and evidence ───────────────────────────────────

fn c_is_t(s: &Scope<'_, '_, '_>) -> Result<(), Error> {
    let Some(u) = s.signature.unsigned_properties() else {
        return Ok(());
    };
    let has_refs = u.certificate_refs().is_some() || u.revocation_refs().is_some();
    if has_refs && !u.has_timestamp(TimeStampKind::Signature) {
        return Err(broken("certificate or revocation refs without a SignatureTimeStamp"));
    }
    Ok(())
}

fn xl_is_x(s: &Scope<'_, '_, '_>) -> Result<(), Error> {
    let Some(u) = s.signature.unsigned_properties() else {
        return Ok(());
    };
    let has_values = u.certificate_values().is_some() || u.revocation_values().is_some();
    let is_x = u.has_timestamp(TimeStampKind::SigAndRefs) || u.has_timestamp(TimeStampKind::RefsOnly);
    if has_values && !is_x {
        return Err(broken(
            "certificate or revocation values without a SigAndRefsTimeStamp or RefsOnlyTimeStamp",
        ));
    }
    Ok(())
}

fn certificate_values_match_refs(s: &Scope<'_, '_, '_>) -> Result<(), Error> {
    let Some(u) = s.signature.unsigned_properties() else {
        return Ok(());
    };
    let Some(values) = u.certificate_values() else {
        return Ok(());
    };
    let refs: Vec<&DigestAlgAndValue> = u
        .certificate_refs()
        .map(|r| r.certs.iter().map(|c| &c.digest).collect())
        .unwrap_or_default();
    pair_up(&refs, &values.certificates, refs.len(), "certificate")
}

fn revocation_values_match_refs(s: &Scope<'_, '_, '_>) -> Result<(), Error> {
    let Some(u) = s.signature.unsigned_properties() else {
        return Ok(());
    };
    let Some(values) = u.revocation_values() else {
        return Ok(());
    };
    let (crl_refs, ocsp_refs) = revocation_ref_digests(u);
    pair_up(&crl_refs, &values.crls, crl_refs.len(), "CRL")?;

    // an OCSPRef without a digest can only be counted
    let ocsp_digests: Vec<&DigestAlgAndValue> = ocsp_refs.iter().filter_map(|d| *d).collect();
    pair_up(&ocsp_digests, &values.ocsp_responses, ocsp_refs.len(), "OCSP response")
}

fn revocation_ref_digests(u: &UnsignedProperties) -> (Vec<&DigestAlgAndValue>, Vec<Option<&DigestAlgAndValue>>) {
    match u.revocation_refs() {
        Some(r) => (
            r.crl_refs.iter().map(|c| &c.digest).collect(),
            r.ocsp_refs.iter().map(|o| o.digest.as_ref()).collect(),
        ),
        None => (Vec::new(), Vec::new()),
    }
}

/// Every ref digest must match exactly one value not already matched,
/// and `ref_count` refs must account for every value.
fn pair_up(refs: &[&DigestAlgAndValue], values: &[Vec<u8>], ref_count: usize, what: &str) -> Result<(), Error> {
    if ref_count != values.len() {
        return Err(broken(format!(
            "{ref_count} {what} refs for {} {what} values",
            values.len()
        )));
    }
    let mut used = vec![false; values.len()];
    for r in refs {
        let mut hit = None;
        for (i, value) in values.iter().enumerate() {
            if !used[i] && r.matches(value)? {
                hit = Some(i);
                break;
            }
        }
        match hit {
            Some(i) => used[i] = true,
            None => {
                return Err(broken(format!(
                    "{what} ref digest {} matches no embedded value",
                    ulriksdal_dsig::encode_base64(&r.value)
                )))
            }
        }
    }
    Ok(())
}
