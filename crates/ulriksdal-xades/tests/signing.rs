#![forbid(unsafe_code)]

mod common;

use common::{cert, signer, tsa, RecordingTsa};
use pretty_assertions::assert_eq;
use ulriksdal_core::{algorithm, Error};
use ulriksdal_dsig::DsigContext;
use ulriksdal_xades::properties::{CommitmentTypeIndication, SignerRole, TimeStampKind};
use ulriksdal_xades::{
    Prefixes, SignatureContent, SignatureEngine, SignaturePackaging, SignatureParameters, SignedDocument,
    SigningCertificateVersion, SigningMode, ValidationFlags,
};

const DOC: &str = r#"<invoice xmlns="urn:example:invoice" id="test"><line qty="2">Widget</line><total>42.00</total></invoice>"#;

fn xml(text: &str) -> SignatureContent {
    SignatureContent::Xml(text.to_owned())
}

fn assert_valid(doc: &SignedDocument) {
    let result = doc.validate();
    assert!(result.is_valid, "{result:?}");
    assert!(doc.check_signature(ValidationFlags::ALL_CHECKS).unwrap());
}

/// Reload from text and validate again; digests must be unchanged.
fn assert_round_trip(doc: &SignedDocument) {
    let reloaded = SignedDocument::load_with_context(doc.xml(), doc.context().clone()).unwrap();
    assert_eq!(reloaded.signature(), doc.signature());
    assert_valid(&reloaded);
}

#[test]
fn test_enveloped_id_scenario() {
    let doc = SignatureEngine::new()
        .sign(&xml(DOC), &SignatureParameters::default(), &signer("signer-a"))
        .unwrap();
    let sig = doc.signature();
    let sig_id = doc.signature_id().to_owned();
    assert!(sig_id.starts_with("Signature-"));

    let content: Vec<_> = sig
        .signed_info
        .references
        .iter()
        .filter(|r| r.type_uri.as_deref() != Some(algorithm::TYPE_SIGNED_PROPERTIES))
        .collect();
    assert_eq!(content.len(), 1);
    assert_eq!(content[0].uri, "#test");
    let sp = sig.signed_properties().unwrap();
    assert_eq!(sp.id.as_deref(), Some(format!("SignedProperties-{sig_id}").as_str()));
    assert!(sig
        .signature_value_id
        .as_deref()
        .is_some_and(|id| id.starts_with("SignatureValue-")));

    assert_valid(&doc);
    assert_round_trip(&doc);
    // the signature sits inside the signed document
    assert!(doc.xml().starts_with("<invoice"));
}

#[test]
fn test_every_packaging_validates() {
    let key = signer("signer-a");
    let cases = [
        (SignaturePackaging::Enveloped, xml(DOC)),
        (SignaturePackaging::Enveloping, xml(DOC)),
        (SignaturePackaging::Enveloping, SignatureContent::Bytes(b"\x00\x01binary".to_vec())),
        (SignaturePackaging::InternallyDetached, xml(DOC)),
        (SignaturePackaging::InternallyDetachedHash, SignatureContent::Bytes(b"report.pdf".to_vec())),
    ];
    for (packaging, content) in cases {
        let doc = SignatureEngine::new()
            .sign(&content, &SignatureParameters::new(packaging), &key)
            .unwrap_or_else(|e| panic!("{packaging:?}: {e}"));
        assert_valid(&doc);
        assert_round_trip(&doc);
    }
}

#[test]
fn test_externally_detached_needs_context() {
    let uri = "https://files.example.test/contract.pdf";
    let mut ctx = DsigContext::new();
    ctx.add_detached_content(uri, b"%PDF-1.7 contract".to_vec());
    let params = SignatureParameters {
        external_uri: Some(uri.to_owned()),
        mime_type: "application/pdf".to_owned(),
        ..SignatureParameters::new(SignaturePackaging::ExternallyDetached)
    };
    let doc = SignatureEngine::new()
        .with_context(ctx)
        .sign(&SignatureContent::External, &params, &signer("signer-a"))
        .unwrap();
    assert_valid(&doc);
    assert_round_trip(&doc);

    // without the content the reference cannot be resolved
    let bare = SignedDocument::load(doc.xml()).unwrap();
    assert!(!bare.validate().is_valid);
}

#[test]
fn test_internally_detached_existing_target() {
    let host = r#"<bundle><payload Id="p1">data</payload><notes>unsigned</notes></bundle>"#;
    let params = SignatureParameters {
        target_element_id: Some("p1".into()),
        ..SignatureParameters::new(SignaturePackaging::InternallyDetached)
    };
    let doc = SignatureEngine::new().sign(&xml(host), &params, &signer("signer-a")).unwrap();
    assert_valid(&doc);

    // the unsigned sibling may change freely
    let edited = doc.xml().replace("unsigned", "edited");
    assert_valid(&SignedDocument::load(edited).unwrap());
}

#[test]
fn test_tampered_content_fails_first_rule() {
    let doc = SignatureEngine::new()
        .sign(&xml(DOC), &SignatureParameters::default(), &signer("signer-a"))
        .unwrap();
    let tampered = SignedDocument::load(doc.xml().replace("42.00", "4200")).unwrap();
    let result = tampered.validate();
    assert!(!result.is_valid);
    assert_eq!(result.rule, Some("CheckXmldsigSignature"));
    assert!(matches!(
        tampered.check_signature(ValidationFlags::ALL_CHECKS),
        Err(Error::Validation { rule: "CheckXmldsigSignature", .. })
    ));
}

#[test]
fn test_validation_is_idempotent() {
    let doc = SignatureEngine::new()
        .sign(&xml(DOC), &SignatureParameters::default(), &signer("signer-a"))
        .unwrap();
    assert_eq!(doc.validate(), doc.validate());
    let broken = SignedDocument::load(doc.xml().replace("Widget", "Gadget")).unwrap();
    assert_eq!(broken.validate(), broken.validate());
}

#[test]
fn test_signed_properties_options() {
    let params = SignatureParameters {
        signing_certificate_version: SigningCertificateVersion::V2,
        signer_role: Some(SignerRole::claimed(&["Purchaser"])),
        commitments: vec![CommitmentTypeIndication::all_objects(
            "http://uri.etsi.org/01903/v1.2.2#ProofOfApproval",
        )],
        reference_key_info: true,
        signature_method: algorithm::RSA_SHA512.to_owned(),
        digest_method: algorithm::SHA512.to_owned(),
        ..SignatureParameters::default()
    };
    let doc = SignatureEngine::new().sign(&xml(DOC), &params, &signer("signer-a")).unwrap();
    assert_valid(&doc);
    let sig = doc.signature();
    let key_info_id = sig.key_info.as_ref().and_then(|k| k.id.clone()).unwrap();
    assert!(sig
        .signed_info
        .references
        .iter()
        .any(|r| r.target_id() == Some(key_info_id.as_str())));
    assert!(doc.xml().contains("SigningCertificateV2"));
    assert!(doc.xml().contains("ClaimedRole"));
}

#[test]
fn test_ec_signer() {
    let key = signer("signer-ec");
    let params = SignatureParameters {
        signature_method: key.default_signature_method().to_owned(),
        ..SignatureParameters::new(SignaturePackaging::Enveloping)
    };
    let doc = SignatureEngine::new().sign(&xml(DOC), &params, &key).unwrap();
    assert_valid(&doc);
}

#[test]
fn test_custom_prefixes() {
    let prefixes = Prefixes {
        ds: "dsig".into(),
        xades: "xa".into(),
        ..Prefixes::default()
    };
    let doc = SignatureEngine::new()
        .with_prefixes(prefixes)
        .sign(&xml(DOC), &SignatureParameters::default(), &signer("signer-a"))
        .unwrap();
    assert!(doc.xml().contains("<dsig:Signature"));
    assert!(doc.xml().contains("<xa:QualifyingProperties"));
    assert_valid(&doc);
}

#[test]
fn test_remote_signing_with_prehashed_digest() {
    use rsa::pkcs8::DecodePrivateKey;

    let key = signer("signer-a");
    let mut pending = SignatureEngine::new()
        .prepare(&xml(DOC), &SignatureParameters::default(), &key.x509_chain)
        .unwrap();
    let digest = pending.compute_signature(SigningMode::DigestOnly).unwrap();

    // the remote side only ever sees the digest
    let pem = String::from_utf8(common::fixture("signer-a.key.pem")).unwrap();
    let remote = rsa::RsaPrivateKey::from_pkcs8_pem(&pem).unwrap();
    let value = remote
        .sign(rsa::Pkcs1v15Sign::new::<sha2::Sha256>(), &digest)
        .unwrap();

    pending.attach_signature_value(&value).unwrap();
    let doc = pending.into_document().unwrap();
    assert_valid(&doc);
}

#[test]
fn test_attach_before_compute_is_missing_reference() {
    let mut pending = SignatureEngine::new()
        .prepare(&xml(DOC), &SignatureParameters::default(), &[cert("signer-a")])
        .unwrap();
    assert!(matches!(
        pending.attach_signature_value(b"not yet"),
        Err(Error::MissingReference(_))
    ));
}

#[test]
fn test_co_sign_enveloped() {
    let first = SignatureEngine::new()
        .sign(&xml(DOC), &SignatureParameters::default(), &signer("signer-a"))
        .unwrap();
    let both = SignatureEngine::new()
        .co_sign(&first, &SignatureParameters::default(), &signer("signer-b"))
        .unwrap();
    assert_ne!(both.signature_id(), first.signature_id());

    let all = SignedDocument::load_all(both.xml(), DsigContext::new()).unwrap();
    assert_eq!(all.len(), 2);
    for doc in &all {
        assert_valid(doc);
    }
}

#[test]
fn test_co_sign_rejects_unfiltered_enveloped() {
    let params = SignatureParameters {
        exclude_other_signatures: false,
        ..SignatureParameters::default()
    };
    let first = SignatureEngine::new().sign(&xml(DOC), &params, &signer("signer-a")).unwrap();
    assert!(matches!(
        SignatureEngine::new().co_sign(&first, &SignatureParameters::default(), &signer("signer-b")),
        Err(Error::XmlStructure(_))
    ));
}

#[test]
fn test_co_sign_enveloping_wraps_document() {
    let first = SignatureEngine::new()
        .sign(
            &xml(DOC),
            &SignatureParameters::new(SignaturePackaging::Enveloping),
            &signer("signer-a"),
        )
        .unwrap();
    let both = SignatureEngine::new()
        .co_sign(&first, &SignatureParameters::default(), &signer("signer-b"))
        .unwrap();
    assert!(both.xml().starts_with("<Document>"));
    let all = SignedDocument::load_all(both.xml(), DsigContext::new()).unwrap();
    assert_eq!(all.len(), 2);
    for doc in &all {
        assert_valid(doc);
    }
}

#[test]
fn test_counter_signature_scenario() {
    let signed = SignatureEngine::new()
        .sign(&xml(DOC), &SignatureParameters::default(), &signer("signer-a"))
        .unwrap();
    let parent_value_id = signed.signature().signature_value_id.clone().unwrap();

    let countered = SignatureEngine::new()
        .counter_sign(&signed, &SignatureParameters::default(), &signer("signer-b"))
        .unwrap();
    assert_eq!(countered.signature_id(), signed.signature_id());

    let children = countered.counter_signatures_of(countered.signature_id());
    assert_eq!(children.len(), 1);
    let counter = countered.signature_by_id(children[0]).unwrap();
    assert!(counter
        .signed_info
        .references
        .iter()
        .any(|r| r.uri == format!("#{parent_value_id}")
            && r.type_uri.as_deref() == Some(algorithm::TYPE_COUNTERSIGNED_SIGNATURE)));
    assert_eq!(countered.parent_of(children[0]), Some(countered.signature_id()));

    assert_valid(&countered);
    assert_round_trip(&countered);
    assert!(countered
        .check_signature(ValidationFlags::CHECK_COUNTER_SIGNATURES | ValidationFlags::CHECK_COUNTER_SIGNATURES_REFERENCE)
        .unwrap());
}

#[test]
fn test_broken_counter_signature_fails_parent() {
    let signed = SignatureEngine::new()
        .sign(&xml(DOC), &SignatureParameters::default(), &signer("signer-a"))
        .unwrap();
    let countered = SignatureEngine::new()
        .counter_sign(&signed, &SignatureParameters::default(), &signer("signer-b"))
        .unwrap();
    let child_id = countered.counter_signatures_of(countered.signature_id())[0].to_owned();
    let child_value = countered.signature_by_id(&child_id).unwrap().signature_value.clone();

    // corrupt only the counter-signature's value
    let encoded = ulriksdal_dsig::encode_base64(&child_value);
    let mut flipped = child_value;
    flipped[0] ^= 0xff;
    let broken = countered.xml().replace(&encoded, &ulriksdal_dsig::encode_base64(&flipped));
    let doc = SignedDocument::load(broken).unwrap();
    let result = doc.validate();
    assert!(!result.is_valid);
    assert_eq!(result.rule, Some("CheckCounterSignatures"));
}

#[test]
fn test_all_data_objects_timestamp() {
    let tsa = RecordingTsa::new(tsa());
    let params = SignatureParameters {
        all_data_objects_timestamp: true,
        ..SignatureParameters::default()
    };
    let doc = SignatureEngine::new()
        .with_timestamp_client(&tsa)
        .sign(&xml(DOC), &params, &signer("signer-a"))
        .unwrap();
    assert_eq!(tsa.call_count(), 1);
    let ado = doc
        .signature()
        .signed_properties()
        .and_then(|sp| sp.data_objects.as_ref())
        .map(|d| d.all_data_objects_timestamps.clone())
        .unwrap();
    assert_eq!(ado.len(), 1);
    assert_eq!(ado[0].kind, TimeStampKind::AllDataObjects);
    assert_valid(&doc);
}

#[test]
fn test_signing_time_is_recorded() {
    let params = SignatureParameters {
        signing_time: Some(common::now()),
        ..SignatureParameters::default()
    };
    let doc = SignatureEngine::new().sign(&xml(DOC), &params, &signer("signer-a")).unwrap();
    let time = doc
        .signature()
        .signed_properties()
        .and_then(|sp| sp.signature.as_ref())
        .and_then(|s| s.signing_time);
    assert_eq!(time, Some(common::now()));
}
