#![forbid(unsafe_code)]

//! Long-term upgrades: XAdES-BES → T → XL → A.
//!
//! Every step only appends to `UnsignedSignatureProperties`. A step runs
//! on a copy of the document and the copy replaces the original only
//! when the step completes, so a failed collaborator call leaves the
//! document at its last good level.

mod evidence;

use crate::document::SignedDocument;
use crate::level::SignatureLevel;
use crate::properties::{TimeStampKind, XadesTimeStamp};
use crate::timestamp::{create_timestamp, expected_includes, TimestampRequest};
use chrono::{DateTime, Utc};
use evidence::{ChainWalk, Evidence, RevocationSources};
use ulriksdal_c14n::C14nMode;
use ulriksdal_core::{algorithm, Error};
use ulriksdal_keys::ChainBuilder;
use ulriksdal_pki::{CrlList, OcspClient, TimestampClient, TimestampToken};
use ulriksdal_xml::XmlWriter;

const TIMESTAMP_STEP: &str = "while inserting the timestamp";
const EVIDENCE_STEP: &str = "while inserting the evidence";

/// Settings for one upgrade call.
#[derive(Debug, Clone)]
pub struct UpgradeParameters {
    /// Digest for timestamp imprints and evidence references.
    pub digest_method: String,
    /// Canonicalization of the elements a timestamp covers.
    pub c14n: C14nMode,
    /// OCSP responders tried after a certificate's own AIA responder.
    pub ocsp_servers: Vec<String>,
    pub requestor_name: Option<String>,
    /// Instant at which CRLs must be current. Defaults to now.
    pub evaluation_time: Option<DateTime<Utc>>,
}

impl Default for UpgradeParameters {
    fn default() -> Self {
        Self {
            digest_method: algorithm::SHA256.to_owned(),
            c14n: C14nMode::Inclusive,
            ocsp_servers: Vec::new(),
            requestor_name: None,
            evaluation_time: None,
        }
    }
}

impl UpgradeParameters {
    fn request(&self) -> TimestampRequest<'_> {
        TimestampRequest {
            digest_method: &self.digest_method,
            c14n: self.c14n,
        }
    }
}

/// Raises signatures to higher XAdES levels with the help of a TSA,
/// revocation sources and a chain builder.
pub struct Upgrader<'a> {
    tsa: &'a dyn TimestampClient,
    chain_builder: &'a dyn ChainBuilder,
    ocsp: Option<&'a dyn OcspClient>,
    crls: CrlList,
}

impl std::fmt::Debug for Upgrader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Upgrader")
            .field("ocsp", &self.ocsp.is_some())
            .field("crls", &self.crls.len())
            .finish_non_exhaustive()
    }
}

impl<'a> Upgrader<'a> {
    pub fn new(tsa: &'a dyn TimestampClient, chain_builder: &'a dyn ChainBuilder) -> Self {
        Self {
            tsa,
            chain_builder,
            ocsp: None,
            crls: CrlList::new(),
        }
    }

    pub fn with_ocsp(mut self, ocsp: &'a dyn OcspClient) -> Self {
        self.ocsp = Some(ocsp);
        self
    }

    /// CRLs consulted before any OCSP query. Read-only during a run.
    pub fn with_crls(mut self, crls: CrlList) -> Self {
        self.crls = crls;
        self
    }

    /// Add a `SignatureTimeStamp` over the `SignatureValue`.
    #[tracing::instrument(level = "info", skip_all, fields(signature = %document.signature_id()))]
    pub fn upgrade_to_t(&self, document: &mut SignedDocument, params: &UpgradeParameters) -> Result<(), Error> {
        let sig = document.signature();
        require_xades(document)?;
        if sig
            .unsigned_properties()
            .is_some_and(|u| u.has_timestamp(TimeStampKind::Signature))
        {
            return Err(Error::AlreadyTimestamped);
        }

        let mut work = document.clone();
        let ts = self
            .timestamp(&work, TimeStampKind::Signature, params)
            .map_err(|e| e.in_upgrade(TIMESTAMP_STEP))?;
        append(&mut work, |w, p| ts.write(w, p))?;
        commit(document, work)
    }

    /// Add certificate and revocation references, a `SigAndRefsTimeStamp`
    /// over them, then the values themselves.
    ///
    /// The signer's chain is walked first, then the chain of every TSA
    /// whose token is already in the signature.
    #[tracing::instrument(level = "info", skip_all, fields(signature = %document.signature_id()))]
    pub fn upgrade_to_xl(&self, document: &mut SignedDocument, params: &UpgradeParameters) -> Result<(), Error> {
        require_xades(document)?;
        let sig = document.signature();
        let Some(unsigned) = sig.unsigned_properties() else {
            return Err(Error::MissingElement("SignatureTimeStamp".into()));
        };
        if !unsigned.has_timestamp(TimeStampKind::Signature) {
            return Err(Error::MissingElement("SignatureTimeStamp".into()));
        }
        if unsigned.certificate_refs().is_some() || unsigned.certificate_values().is_some() {
            return Err(Error::XmlStructure(format!(
                "signature {} already carries validation evidence",
                document.signature_id()
            )));
        }

        let at = params.evaluation_time.unwrap_or_else(Utc::now);
        let evidence = self.collect_evidence(document, params, at).map_err(|e| match e {
            revoked @ Error::RevokedCertificate { .. } => revoked,
            other => other.in_upgrade(EVIDENCE_STEP),
        })?;
        let (cert_refs, revocation_refs) = evidence.refs(&params.digest_method, at)?;
        let (cert_values, revocation_values) = evidence.values();

        let mut work = document.clone();
        append(&mut work, |w, p| {
            cert_refs.write(w, p)?;
            revocation_refs.write(w, p)
        })?;
        let ts = self
            .timestamp(&work, TimeStampKind::SigAndRefs, params)
            .map_err(|e| e.in_upgrade(TIMESTAMP_STEP))?;
        append(&mut work, |w, p| {
            ts.write(w, p)?;
            cert_values.write(w, p)?;
            revocation_values.write(w, p)
        })?;
        commit(document, work)
    }

    /// Add an `ArchiveTimeStamp` over everything signed and every
    /// unsigned property before it.
    #[tracing::instrument(level = "info", skip_all, fields(signature = %document.signature_id()))]
    pub fn upgrade_to_a(&self, document: &mut SignedDocument, params: &UpgradeParameters) -> Result<(), Error> {
        require_xades(document)?;
        if document.level() < SignatureLevel::XL {
            return Err(Error::MissingElement(
                "CertificateValues and RevocationValues (the signature is not XAdES-XL)".into(),
            ));
        }
        let mut work = document.clone();
        let ts = self
            .timestamp(&work, TimeStampKind::Archive, params)
            .map_err(|e| e.in_upgrade(TIMESTAMP_STEP))?;
        append(&mut work, |w, p| ts.write(w, p))?;
        commit(document, work)
    }

    fn timestamp(
        &self,
        document: &SignedDocument,
        kind: TimeStampKind,
        params: &UpgradeParameters,
    ) -> Result<XadesTimeStamp, Error> {
        let sig = document.signature();
        let position = sig
            .unsigned_properties()
            .map_or(0, |u| u.signature_properties.len());
        let includes = expected_includes(sig, kind, position)?
            .ok_or_else(|| Error::Other(format!("{} cannot be added by an upgrade", kind.local_name())))?;
        let doc = ulriksdal_xml::parse(document.xml())?;
        create_timestamp(self.tsa, &doc, document.context(), kind, includes, params.request())
    }

    fn collect_evidence(
        &self,
        document: &SignedDocument,
        params: &UpgradeParameters,
        at: DateTime<Utc>,
    ) -> Result<Evidence, Error> {
        let sig = document.signature();
        let key_info_certs = sig.key_info.as_ref().map(|k| k.certificates.as_slice()).unwrap_or(&[]);
        let signer = sig
            .signing_certificate()
            .ok_or_else(|| Error::MissingElement("X509Certificate in KeyInfo".into()))?;

        let sources = RevocationSources {
            crls: &self.crls,
            ocsp: self.ocsp,
            responders: &params.ocsp_servers,
            requestor_name: params.requestor_name.as_deref(),
            at,
        };
        let mut walk = ChainWalk::new(sources, &params.digest_method);
        let chain = self.chain_builder.build_chain(signer, key_info_certs)?;
        walk.walk(&chain, false)?;

        let tokens = sig
            .unsigned_properties()
            .map(|u| u.timestamps(TimeStampKind::Signature).collect::<Vec<_>>())
            .unwrap_or_default();
        for ts in tokens {
            let token = TimestampToken::from_der(&ts.token)?;
            let tsa = token.signer_certificate(key_info_certs)?;
            let chain = self.chain_builder.build_chain(&tsa, token.certificates())?;
            tracing::debug!(tsa = %tsa.subject(), links = chain.len(), "walking TSA chain");
            walk.walk(&chain, true)?;
        }
        Ok(walk.finish())
    }
}

fn require_xades(document: &SignedDocument) -> Result<(), Error> {
    if document.signature().is_xades() {
        Ok(())
    } else {
        Err(Error::MissingElement(format!(
            "QualifyingProperties of signature {}",
            document.signature_id()
        )))
    }
}

/// Serialize properties with the document's own prefixes and append them
/// to the principal signature.
fn append(
    document: &mut SignedDocument,
    write: impl FnOnce(&mut XmlWriter, &crate::Prefixes) -> Result<(), Error>,
) -> Result<(), Error> {
    let key = document.signature_id().to_owned();
    let p = document.prefixes(&key)?;
    let mut w = XmlWriter::new();
    write(&mut w, &p)?;
    document.append_unsigned_properties(&key, &w.into_string()?)
}

fn commit(document: &mut SignedDocument, work: SignedDocument) -> Result<(), Error> {
    *document = work;
    tracing::info!(
        signature = document.signature_id(),
        level = %document.level(),
        "signature upgraded"
    );
    Ok(())
}
