#![forbid(unsafe_code)]

//! Signature construction: sign, co-sign and counter-sign.
//!
//! A new signature is first written as a template (references with empty
//! digests, empty `SignatureValue`) and placed into its final document.
//! [`PendingSignature`] then fills the reference digests and either signs
//! locally or hands the `SignedInfo` digest to a remote signer whose value
//! is checked before it is attached.

pub use crate::packaging::SignatureContent;

use crate::document::SignedDocument;
use crate::ids::{self, SignatureIds};
use crate::packaging::{self, Placement};
use crate::params::{Prefixes, SignatureParameters};
use crate::properties::{
    DataObjectFormat, QualifyingProperties, SignedDataObjectProperties, SignedProperties,
    SignedSignatureProperties, SigningCertificate, TimeStampKind,
};
use crate::timestamp::{create_timestamp, TimestampRequest};
use chrono::Utc;
use ulriksdal_core::{algorithm, ns, Error};
use ulriksdal_crypto::SigningKey;
use ulriksdal_dsig::keyinfo::KeyInfo;
use ulriksdal_dsig::{sign, DsigContext, Reference, SignedInfo};
use ulriksdal_keys::{Key, X509Certificate};
use ulriksdal_pki::TimestampClient;
use ulriksdal_transforms::TransformKind;
use ulriksdal_xml::{document, edit, XmlWriter};

/// How [`PendingSignature::compute_signature`] finishes.
#[derive(Debug, Clone, Copy)]
pub enum SigningMode<'k> {
    /// Sign with a local private key; returns the signature value.
    Local(&'k SigningKey),
    /// Return the `SignedInfo` digest for a remote signer.
    DigestOnly,
}

/// Builds new signatures.
///
/// Holds the namespace prefixes written into fresh signatures, the
/// dereferencing context for detached content and an optional timestamp
/// client for all-data-objects timestamps. Nothing here is shared
/// between engines.
#[derive(Clone, Default)]
pub struct SignatureEngine<'a> {
    prefixes: Prefixes,
    ctx: DsigContext,
    timestamp_client: Option<&'a dyn TimestampClient>,
}

impl std::fmt::Debug for SignatureEngine<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureEngine")
            .field("prefixes", &self.prefixes)
            .field("ctx", &self.ctx)
            .field("timestamp_client", &self.timestamp_client.is_some())
            .finish()
    }
}

impl<'a> SignatureEngine<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefixes(mut self, prefixes: Prefixes) -> Self {
        self.prefixes = prefixes;
        self
    }

    pub fn with_context(mut self, ctx: DsigContext) -> Self {
        self.ctx = ctx;
        self
    }

    pub fn with_timestamp_client(mut self, client: &'a dyn TimestampClient) -> Self {
        self.timestamp_client = Some(client);
        self
    }

    pub fn prefixes(&self) -> &Prefixes {
        &self.prefixes
    }

    /// Sign `content` with a local key.
    #[tracing::instrument(level = "info", skip_all, fields(packaging = ?params.packaging))]
    pub fn sign(
        &self,
        content: &SignatureContent,
        params: &SignatureParameters,
        key: &Key,
    ) -> Result<SignedDocument, Error> {
        let signing_key = private_key(key)?;
        let mut pending = self.prepare(content, params, &key.x509_chain)?;
        pending.compute_signature(SigningMode::Local(&signing_key))?;
        let document = pending.into_document()?;
        tracing::info!(signature = document.signature_id(), "signature produced");
        Ok(document)
    }

    /// Build the signature template over `content` for the certificate
    /// chain `chain` (signing certificate first).
    pub fn prepare(
        &self,
        content: &SignatureContent,
        params: &SignatureParameters,
        chain: &[X509Certificate],
    ) -> Result<PendingSignature, Error> {
        let packaged = packaging::package(content, params, &self.prefixes)?;
        let template = Template::new(&self.prefixes, params, chain)?;
        let rendered = template.render(packaged.references, packaged.formats, &packaged.objects)?;
        let xml = match packaged.placement {
            Placement::Standalone => rendered.xml.clone(),
            Placement::LastChildOfRoot(host) => append_to_root(&host, &rendered.xml)?,
        };
        let principal = template.ids.signature.clone();
        self.finish_template(xml, template, rendered, &self.ctx, principal)
    }

    /// Add an independent signature over the same content as the
    /// principal signature of `document`.
    #[tracing::instrument(level = "info", skip_all, fields(signature = %document.signature_id()))]
    pub fn co_sign(
        &self,
        document: &SignedDocument,
        params: &SignatureParameters,
        key: &Key,
    ) -> Result<SignedDocument, Error> {
        let signing_key = private_key(key)?;
        let mut pending = self.prepare_co_sign(document, params, &key.x509_chain)?;
        pending.compute_signature(SigningMode::Local(&signing_key))?;
        let co_signed = pending.into_document()?;
        tracing::info!(co_signature = co_signed.signature_id(), "document co-signed");
        Ok(co_signed)
    }

    pub fn prepare_co_sign(
        &self,
        document: &SignedDocument,
        params: &SignatureParameters,
        chain: &[X509Certificate],
    ) -> Result<PendingSignature, Error> {
        let existing = document.signature();
        let original = existing
            .signed_info
            .references
            .iter()
            .find(|r| is_content_reference(existing, r))
            .ok_or_else(|| Error::MissingReference("the signature has no content reference".into()))?;
        let enveloped = original.transforms.contains(&TransformKind::EnvelopedSignature);
        let filtered = original
            .transforms
            .iter()
            .any(|t| matches!(t, TransformKind::XPathFilter { .. }));
        if enveloped && !filtered {
            return Err(Error::XmlStructure(
                "the enveloped signature does not exclude other signatures; a co-signature would break it".into(),
            ));
        }

        let reference_id = ids::property_id("Reference");
        let mut reference = original.clone().with_id(reference_id.clone());
        if reference.type_uri.as_deref() != Some(algorithm::TYPE_OBJECT) {
            reference.type_uri = None;
        }
        reference.digest_value.clear();
        let format = packaging::data_object_format(&reference_id, params);

        let p = document.prefixes(document.signature_id())?;
        let template = Template::new(&p, params, chain)?;
        let rendered = template.render(vec![reference], vec![format], &[])?;

        let doc = ulriksdal_xml::parse(document.xml())?;
        let root = doc.root_element();
        let xml = if document::is_element(root, ns::DSIG, ns::node::SIGNATURE) {
            // the signature is the root: wrap both signatures
            let mut w = XmlWriter::new();
            w.start_element("Document", &[])?;
            w.write_raw(&document.xml()[root.range()])?;
            w.write_raw(&rendered.xml)?;
            w.end_element("Document")?;
            w.into_string()?
        } else {
            edit::apply_edits(document.xml(), vec![edit::insert_last_child(root, &rendered.xml)])?
        };
        let principal = template.ids.signature.clone();
        self.finish_template(xml, template, rendered, document.context(), principal)
    }

    /// Counter-sign the principal signature of `document`. The result
    /// keeps the counter-signed signature as its principal.
    #[tracing::instrument(level = "info", skip_all, fields(signature = %document.signature_id()))]
    pub fn counter_sign(
        &self,
        document: &SignedDocument,
        params: &SignatureParameters,
        key: &Key,
    ) -> Result<SignedDocument, Error> {
        let signing_key = private_key(key)?;
        let mut pending = self.prepare_counter_sign(document, params, &key.x509_chain)?;
        pending.compute_signature(SigningMode::Local(&signing_key))?;
        let counter_id = pending.signature_id().to_owned();
        let signed = pending.into_document()?;
        tracing::info!(counter_signature = %counter_id, "signature counter-signed");
        Ok(signed)
    }

    pub fn prepare_counter_sign(
        &self,
        document: &SignedDocument,
        params: &SignatureParameters,
        chain: &[X509Certificate],
    ) -> Result<PendingSignature, Error> {
        let parent_key = document.signature_id();
        let value_id = document
            .signature()
            .signature_value_id
            .clone()
            .ok_or_else(|| Error::MissingAttribute("Id on the counter-signed <SignatureValue>".into()))?;

        let reference_id = ids::property_id("Reference");
        let reference = Reference::new(format!("#{value_id}"), &params.digest_method)
            .with_id(reference_id.clone())
            .with_type(algorithm::TYPE_COUNTERSIGNED_SIGNATURE)
            .with_transform(TransformKind::c14n(params.c14n_mode));
        let format = packaging::data_object_format(&reference_id, params);

        let p = document.prefixes(parent_key)?;
        let template = Template::new(&p, params, chain)?;
        let rendered = template.render(vec![reference], vec![format], &[])?;

        let wrapper = p.xades(ns::node::COUNTER_SIGNATURE);
        let mut host = document.clone();
        host.append_unsigned_properties(parent_key, &format!("<{wrapper}>{}</{wrapper}>", rendered.xml))?;
        let principal = parent_key.to_owned();
        self.finish_template(host.into_xml(), template, rendered, document.context(), principal)
    }

    fn finish_template(
        &self,
        xml: String,
        template: Template<'_>,
        rendered: Rendered,
        ctx: &DsigContext,
        principal: String,
    ) -> Result<PendingSignature, Error> {
        let xml = if template.params.all_data_objects_timestamp {
            self.add_all_data_objects_timestamp(&xml, &template, rendered.data_reference_ids, ctx)?
        } else {
            xml
        };
        Ok(PendingSignature {
            xml,
            signature_id: template.ids.signature,
            signature_method: template.params.signature_method.clone(),
            certificate: template.certificate.clone(),
            ctx: ctx.clone(),
            principal,
            state: PendingState::Template,
        })
    }

    /// Timestamp the data references and splice the token into the
    /// signature's `SignedDataObjectProperties`.
    fn add_all_data_objects_timestamp(
        &self,
        xml: &str,
        template: &Template<'_>,
        include_ids: Vec<String>,
        ctx: &DsigContext,
    ) -> Result<String, Error> {
        let client = self
            .timestamp_client
            .ok_or_else(|| Error::Timestamp("no timestamp client configured on the engine".into()))?;
        let doc = ulriksdal_xml::parse(xml)?;
        let request = TimestampRequest {
            digest_method: &template.params.digest_method,
            c14n: template.params.c14n_mode,
        };
        let ts = create_timestamp(client, &doc, ctx, TimeStampKind::AllDataObjects, include_ids, request)?;
        let signature = sign::find_signature(&doc, &template.ids.signature)?;
        let container = signature
            .descendants()
            .find(|n| document::is_element(*n, ns::XADES, ns::node::SIGNED_DATA_OBJECT_PROPERTIES))
            .ok_or_else(|| Error::MissingElement("SignedDataObjectProperties".into()))?;
        edit::apply_edits(xml, vec![edit::insert_last_child(container, &ts.to_fragment(template.p)?)])
    }
}

fn private_key(key: &Key) -> Result<SigningKey, Error> {
    if !key.has_private() {
        return Err(Error::Key("the signing key has no private half".into()));
    }
    Ok(key.to_signing_key())
}

/// A reference over signed content rather than over the signature's own
/// properties or key.
fn is_content_reference(sig: &crate::Signature, r: &Reference) -> bool {
    if r.type_uri.as_deref() == Some(algorithm::TYPE_SIGNED_PROPERTIES) {
        return false;
    }
    let key_info_id = sig.key_info.as_ref().and_then(|k| k.id.as_deref());
    key_info_id.is_none() || r.target_id() != key_info_id
}

fn append_to_root(host: &str, fragment: &str) -> Result<String, Error> {
    let doc = ulriksdal_xml::parse(host)?;
    edit::apply_edits(host, vec![edit::insert_last_child(doc.root_element(), fragment)])
}

// ── Templates ────────────────────────────────────────────────────────

/// The parts of a new signature that do not depend on its content.
struct Template<'a> {
    p: &'a Prefixes,
    params: &'a SignatureParameters,
    chain: &'a [X509Certificate],
    certificate: &'a X509Certificate,
    ids: SignatureIds,
}

struct Rendered {
    xml: String,
    /// Ids of every reference except the SignedProperties one.
    data_reference_ids: Vec<String>,
}

impl<'a> Template<'a> {
    fn new(p: &'a Prefixes, params: &'a SignatureParameters, chain: &'a [X509Certificate]) -> Result<Self, Error> {
        let certificate = chain
            .first()
            .ok_or_else(|| Error::Key("no signing certificate supplied".into()))?;
        Ok(Self {
            p,
            params,
            chain,
            certificate,
            ids: SignatureIds::generate(),
        })
    }

    fn render(
        &self,
        mut references: Vec<Reference>,
        formats: Vec<DataObjectFormat>,
        objects: &[String],
    ) -> Result<Rendered, Error> {
        let params = self.params;
        let c14n = TransformKind::c14n(params.c14n_mode);
        if params.reference_key_info {
            references.push(
                Reference::new(format!("#{}", self.ids.key_info), &params.digest_method)
                    .with_id(ids::property_id("Reference"))
                    .with_transform(c14n.clone()),
            );
        }
        let data_reference_ids = references.iter().filter_map(|r| r.id.clone()).collect();
        references.push(
            Reference::new(format!("#{}", self.ids.signed_properties), &params.digest_method)
                .with_id(ids::property_id("Reference"))
                .with_type(algorithm::TYPE_SIGNED_PROPERTIES)
                .with_transform(c14n),
        );

        let mut signed_info = SignedInfo::new(params.c14n_mode, &params.signature_method);
        signed_info.id = Some(self.ids.signed_info.clone());
        signed_info.references = references;

        let qualifying = QualifyingProperties {
            id: Some(self.ids.qualifying_properties.clone()),
            target: format!("#{}", self.ids.signature),
            signed: Some(self.signed_properties(formats)?),
            unsigned: None,
        };
        let key_info = KeyInfo::new(Some(self.ids.key_info.clone()), self.chain.to_vec());

        let p = self.p;
        let signature = p.ds(ns::node::SIGNATURE);
        let object = p.ds(ns::node::OBJECT);
        let xmlns = Prefixes::xmlns(&p.ds);
        let mut w = XmlWriter::new();
        w.start_element(&signature, &[(xmlns.as_str(), ns::DSIG), (ns::attr::ID, &self.ids.signature)])?;
        signed_info.write(&mut w, &p.ds)?;
        w.text_element(
            &p.ds(ns::node::SIGNATURE_VALUE),
            &[(ns::attr::ID, &self.ids.signature_value)],
            "",
        )?;
        key_info.write(&mut w, &p.ds)?;
        for o in objects {
            w.write_raw(o)?;
        }
        w.start_element(&object, &[])?;
        qualifying.write(&mut w, p)?;
        w.end_element(&object)?;
        w.end_element(&signature)?;

        Ok(Rendered {
            xml: w.into_string()?,
            data_reference_ids,
        })
    }

    fn signed_properties(&self, formats: Vec<DataObjectFormat>) -> Result<SignedProperties, Error> {
        let params = self.params;
        Ok(SignedProperties {
            id: Some(self.ids.signed_properties.clone()),
            signature: Some(SignedSignatureProperties {
                signing_time: Some(params.signing_time.unwrap_or_else(Utc::now)),
                signing_certificate: Some(SigningCertificate::for_certificate(
                    self.certificate,
                    &params.digest_method,
                    params.signing_certificate_version,
                )?),
                policy: params.policy.clone(),
                production_place: params.production_place.clone(),
                signer_role: params.signer_role.clone(),
            }),
            data_objects: Some(SignedDataObjectProperties {
                formats,
                commitments: params.commitments.clone(),
                ..SignedDataObjectProperties::default()
            }),
        })
    }
}

// ── Pending signatures ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingState {
    /// Digests and value still empty.
    Template,
    /// Reference digests filled.
    Digested,
    /// Signature value filled.
    Signed,
}

/// A signature placed in its document but not yet signed.
#[derive(Debug, Clone)]
pub struct PendingSignature {
    xml: String,
    signature_id: String,
    signature_method: String,
    certificate: X509Certificate,
    ctx: DsigContext,
    /// Principal of the finished document.
    principal: String,
    state: PendingState,
}

impl PendingSignature {
    pub fn signature_id(&self) -> &str {
        &self.signature_id
    }

    /// Current document text.
    pub fn xml(&self) -> &str {
        &self.xml
    }

    /// Digest every reference, then either sign locally (returns the
    /// signature value) or return the `SignedInfo` digest to be signed
    /// elsewhere.
    pub fn compute_signature(&mut self, mode: SigningMode<'_>) -> Result<Vec<u8>, Error> {
        if self.state == PendingState::Template {
            self.xml = sign::fill_reference_digests(&self.ctx, &self.xml, &self.signature_id)?;
            self.state = PendingState::Digested;
            tracing::debug!(signature = %self.signature_id, "references digested");
        }
        match mode {
            SigningMode::DigestOnly => {
                sign::signed_info_digest(&self.xml, &self.signature_id, &self.signature_method)
            }
            SigningMode::Local(key) => {
                let (xml, value) = sign::sign_template(&self.xml, &self.signature_id, &self.signature_method, key)?;
                self.xml = xml;
                self.state = PendingState::Signed;
                Ok(value)
            }
        }
    }

    /// Attach a value produced by a remote signer over the digest from
    /// [`compute_signature`](Self::compute_signature). The value must
    /// verify under the signing certificate.
    pub fn attach_signature_value(&mut self, value: &[u8]) -> Result<(), Error> {
        if self.state == PendingState::Template {
            return Err(Error::MissingReference(format!(
                "references of {} were never computed",
                self.signature_id
            )));
        }
        let octets = sign::signed_info_octets(&self.xml, &self.signature_id)?;
        let alg = ulriksdal_crypto::sign::from_uri(&self.signature_method)?;
        if !alg.verify(&self.certificate.public_key()?, &octets, value)? {
            return Err(Error::SignatureInvalid(
                "the supplied signature value does not verify with the signing certificate".into(),
            ));
        }
        self.xml = sign::fill_signature_value(&self.xml, &self.signature_id, value)?;
        self.state = PendingState::Signed;
        Ok(())
    }

    /// The finished document, re-indexed from its text.
    pub fn into_document(self) -> Result<SignedDocument, Error> {
        match self.state {
            PendingState::Signed => SignedDocument::from_parts(self.xml, self.ctx, &self.principal),
            _ => Err(Error::MissingReference(format!(
                "signature {} has no signature value",
                self.signature_id
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::SignaturePackaging;
    use crate::validation::ValidationFlags;

    fn fixture(name: &str) -> Vec<u8> {
        let path = format!("{}/../../test-data/pki/{name}", env!("CARGO_MANIFEST_DIR"));
        std::fs::read(path).unwrap()
    }

    fn signer(name: &str) -> Key {
        ulriksdal_keys::loader::load_signing_identity(
            &fixture(&format!("{name}.key.pem")),
            &fixture(&format!("{name}.pem")),
        )
        .unwrap()
    }

    #[test]
    fn test_enveloped_signature_has_expected_shape() {
        let engine = SignatureEngine::new();
        let content = SignatureContent::Xml(r#"<doc id="test"><item>1</item></doc>"#.into());
        let params = SignatureParameters::default();
        let signed = engine.sign(&content, &params, &signer("signer-a")).unwrap();

        let sig = signed.signature();
        let sig_id = sig.id.clone().unwrap();
        let content_refs: Vec<_> = sig
            .signed_info
            .references
            .iter()
            .filter(|r| r.type_uri.is_none())
            .collect();
        assert_eq!(content_refs.len(), 1);
        assert_eq!(content_refs[0].uri, "#test");
        assert_eq!(
            sig.signed_properties().unwrap().id.as_deref(),
            Some(format!("SignedProperties-{sig_id}").as_str())
        );
        assert!(signed.check_signature(ValidationFlags::ALL_CHECKS).unwrap());
    }

    #[test]
    fn test_remote_signing_round_trip() {
        let key = signer("signer-a");
        let engine = SignatureEngine::new();
        let params = SignatureParameters::new(SignaturePackaging::Enveloping);
        let mut pending = engine
            .prepare(&SignatureContent::Bytes(b"payload".to_vec()), &params, &key.x509_chain)
            .unwrap();

        assert!(matches!(
            pending.attach_signature_value(&[0; 256]),
            Err(Error::MissingReference(_))
        ));
        let digest = pending.compute_signature(SigningMode::DigestOnly).unwrap();
        assert_eq!(digest.len(), 32);

        // The remote side signs the same SignedInfo octets.
        let octets = sign::signed_info_octets(pending.xml(), pending.signature_id()).unwrap();
        let alg = ulriksdal_crypto::sign::from_uri(algorithm::RSA_SHA256).unwrap();
        let value = alg.sign(&key.to_signing_key(), &octets).unwrap();
        pending.attach_signature_value(&value).unwrap();
        let signed = pending.into_document().unwrap();
        assert!(signed.validate().is_valid);
    }

    #[test]
    fn test_attach_rejects_foreign_value() {
        let engine = SignatureEngine::new();
        let params = SignatureParameters::new(SignaturePackaging::Enveloping);
        let mut pending = engine
            .prepare(&SignatureContent::Bytes(b"x".to_vec()), &params, &signer("signer-a").x509_chain)
            .unwrap();
        pending.compute_signature(SigningMode::DigestOnly).unwrap();
        let octets = sign::signed_info_octets(pending.xml(), pending.signature_id()).unwrap();
        let alg = ulriksdal_crypto::sign::from_uri(algorithm::RSA_SHA256).unwrap();
        let wrong = alg.sign(&signer("signer-b").to_signing_key(), &octets).unwrap();
        assert!(matches!(
            pending.attach_signature_value(&wrong),
            Err(Error::SignatureInvalid(_))
        ));
        assert!(pending.into_document().is_err());
    }

    #[test]
    fn test_public_key_only_cannot_sign() {
        let cert_only = ulriksdal_keys::loader::load_x509_cert_pem(&fixture("signer-a.pem")).unwrap();
        let err = SignatureEngine::new()
            .sign(&SignatureContent::Xml("<a/>".into()), &SignatureParameters::default(), &cert_only)
            .unwrap_err();
        assert!(matches!(err, Error::Key(_)));
    }

    #[test]
    fn test_all_data_objects_timestamp_needs_client() {
        let mut params = SignatureParameters::default();
        params.all_data_objects_timestamp = true;
        let err = SignatureEngine::new()
            .sign(&SignatureContent::Xml("<a/>".into()), &params, &signer("signer-a"))
            .unwrap_err();
        assert!(matches!(err, Error::Timestamp(_)));
    }
}
