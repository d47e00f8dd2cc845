#![forbid(unsafe_code)]

//! Revocation evidence for a certificate chain.
//!
//! Each non-root certificate is checked against the caller's CRLs first.
//! Without a usable CRL the OCSP responders are asked in turn: the
//! certificate's own AIA URL, then the configured ones. `Unknown` moves
//! on to the next responder, a transport error aborts the walk, and a
//! revoked certificate is fatal.

use crate::ids;
use crate::params::SigningCertificateVersion;
use crate::properties::{
    CertId, CertificateValues, CompleteCertificateRefs, CompleteRevocationRefs, CrlRef, DigestAlgAndValue,
    OcspRef, RevocationValues,
};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use ulriksdal_core::Error;
use ulriksdal_keys::X509Certificate;
use ulriksdal_pki::{CertStatus, Crl, CrlList, OcspClient, OcspResponse};

/// Where revocation status comes from.
#[derive(Clone, Copy)]
pub(crate) struct RevocationSources<'a> {
    pub crls: &'a CrlList,
    pub ocsp: Option<&'a dyn OcspClient>,
    /// Tried after each certificate's own AIA responders.
    pub responders: &'a [String],
    pub requestor_name: Option<&'a str>,
    pub at: DateTime<Utc>,
}

/// One OCSP answer and the responder URL it came from.
#[derive(Debug, Clone)]
pub(crate) struct OcspEvidence {
    pub url: String,
    pub response: OcspResponse,
}

/// Certificates and revocation data gathered over one or more chains.
#[derive(Debug, Clone, Default)]
pub(crate) struct Evidence {
    pub certificates: Vec<X509Certificate>,
    pub crls: Vec<Crl>,
    pub ocsp: Vec<OcspEvidence>,
    /// (issuer, digest) of every revocation object already recorded.
    seen: HashSet<(String, Vec<u8>)>,
}

impl Evidence {
    fn add_certificate(&mut self, cert: &X509Certificate) {
        if !self.certificates.contains(cert) {
            self.certificates.push(cert.clone());
        }
    }

    fn add_crl(&mut self, crl: &Crl, digest_method: &str) -> Result<(), Error> {
        if self.seen.insert((crl.issuer(), crl.digest(digest_method)?)) {
            self.crls.push(crl.clone());
        }
        Ok(())
    }

    fn add_ocsp(&mut self, issuer: &X509Certificate, url: &str, response: OcspResponse, digest_method: &str) -> Result<(), Error> {
        if self.seen.insert((issuer.subject(), response.digest(digest_method)?)) {
            self.ocsp.push(OcspEvidence {
                url: url.to_owned(),
                response,
            });
        }
        Ok(())
    }

    /// `CompleteCertificateRefs` and `CompleteRevocationRefs` naming
    /// everything gathered.
    pub fn refs(
        &self,
        digest_method: &str,
        at: DateTime<Utc>,
    ) -> Result<(CompleteCertificateRefs, CompleteRevocationRefs), Error> {
        let certs = self
            .certificates
            .iter()
            .map(|c| CertId::for_certificate(c, digest_method, SigningCertificateVersion::V1))
            .collect::<Result<Vec<_>, _>>()?;
        let crl_refs = self
            .crls
            .iter()
            .map(|crl| {
                Ok(CrlRef {
                    digest: DigestAlgAndValue::compute(digest_method, crl.der())?,
                    issuer: Some(crl.issuer()),
                    issue_time: Some(crl.this_update()?),
                    number: crl.number(),
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;
        let ocsp_refs = self
            .ocsp
            .iter()
            .map(|o| {
                Ok(OcspRef {
                    responder: o.response.responder_id.clone().unwrap_or_else(|| o.url.clone()),
                    produced_at: o.response.produced_at.unwrap_or(at),
                    digest: Some(DigestAlgAndValue::compute(digest_method, &o.response.response)?),
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;
        Ok((
            CompleteCertificateRefs {
                id: Some(ids::property_id("CompleteCertificateRefs")),
                certs,
            },
            CompleteRevocationRefs {
                id: Some(ids::property_id("CompleteRevocationRefs")),
                crl_refs,
                ocsp_refs,
            },
        ))
    }

    /// `CertificateValues` and `RevocationValues` carrying the DER of
    /// everything gathered.
    pub fn values(&self) -> (CertificateValues, RevocationValues) {
        (
            CertificateValues {
                id: Some(ids::property_id("CertificateValues")),
                certificates: self.certificates.iter().map(|c| c.der().to_vec()).collect(),
            },
            RevocationValues {
                id: Some(ids::property_id("RevocationValues")),
                crls: self.crls.iter().map(|c| c.der().to_vec()).collect(),
                ocsp_responses: self.ocsp.iter().map(|o| o.response.response.clone()).collect(),
            },
        )
    }
}

/// Walks chains and accumulates [`Evidence`].
pub(crate) struct ChainWalk<'a> {
    sources: RevocationSources<'a>,
    digest_method: &'a str,
    evidence: Evidence,
}

impl<'a> ChainWalk<'a> {
    pub fn new(sources: RevocationSources<'a>, digest_method: &'a str) -> Self {
        Self {
            sources,
            digest_method,
            evidence: Evidence::default(),
        }
    }

    /// Check every link of `chain` (leaf first, root last). With
    /// `record_leaf` the leaf certificate itself is kept as evidence.
    pub fn walk(&mut self, chain: &[X509Certificate], record_leaf: bool) -> Result<(), Error> {
        for (i, cert) in chain.iter().enumerate() {
            if i > 0 || record_leaf {
                self.evidence.add_certificate(cert);
            }
            if cert.is_self_issued() {
                tracing::debug!(subject = %cert.subject(), "trust anchor, no revocation check");
                continue;
            }
            let issuer = chain.get(i + 1).ok_or_else(|| {
                Error::Certificate(format!("chain of {} ends before a self-issued root", cert.subject()))
            })?;
            self.check(cert, issuer)?;
        }
        Ok(())
    }

    pub fn finish(self) -> Evidence {
        self.evidence
    }

    fn check(&mut self, cert: &X509Certificate, issuer: &X509Certificate) -> Result<(), Error> {
        if let Some(crl) = self.sources.crls.find_usable(cert, issuer, self.sources.at) {
            if let Some(entry) = crl.revocation(cert)? {
                return Err(Error::RevokedCertificate {
                    subject: cert.subject(),
                    serial: entry.serial,
                    revoked_at: entry.revoked_at.to_rfc3339(),
                });
            }
            tracing::debug!(subject = %cert.subject(), crl_issuer = %crl.issuer(), "status from CRL");
            return self.evidence.add_crl(crl, self.digest_method);
        }
        self.check_ocsp(cert, issuer)
    }

    fn check_ocsp(&mut self, cert: &X509Certificate, issuer: &X509Certificate) -> Result<(), Error> {
        let Some(client) = self.sources.ocsp else {
            return Err(Error::Revocation(format!(
                "no usable CRL for {} and no OCSP client configured",
                cert.subject()
            )));
        };
        let mut urls = cert.ocsp_urls();
        for url in self.sources.responders {
            if !urls.contains(url) {
                urls.push(url.clone());
            }
        }
        if urls.is_empty() {
            return Err(Error::Revocation(format!(
                "no usable CRL and no OCSP responder for {}",
                cert.subject()
            )));
        }

        for url in &urls {
            let response = client.query(cert, issuer, url, self.sources.requestor_name, None)?;
            match response.status {
                CertStatus::Good => {
                    tracing::debug!(subject = %cert.subject(), responder = %url, "status from OCSP");
                    return self.evidence.add_ocsp(issuer, url, response, self.digest_method);
                }
                CertStatus::Revoked { revoked_at } => {
                    return Err(Error::RevokedCertificate {
                        subject: cert.subject(),
                        serial: cert.serial_decimal(),
                        revoked_at: revoked_at.map_or_else(|| "an unknown time".to_owned(), |t| t.to_rfc3339()),
                    });
                }
                CertStatus::Unknown => {
                    tracing::warn!(subject = %cert.subject(), responder = %url, "OCSP responder does not know the certificate");
                }
            }
        }
        Err(Error::Revocation(format!(
            "no OCSP responder knows the status of {}",
            cert.subject()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::cell::RefCell;
    use ulriksdal_core::algorithm;

    fn fixture(name: &str) -> Vec<u8> {
        let path = format!("{}/../../test-data/pki/{name}", env!("CARGO_MANIFEST_DIR"));
        std::fs::read(path).unwrap()
    }

    fn cert(name: &str) -> X509Certificate {
        X509Certificate::from_der(&fixture(&format!("{name}.der"))).unwrap()
    }

    fn chain(leaf: &str) -> Vec<X509Certificate> {
        vec![cert(leaf), cert("intermediate"), cert("root")]
    }

    fn crls(names: &[&str]) -> CrlList {
        let mut list = CrlList::new();
        for n in names {
            list.add_der(&fixture(n)).unwrap();
        }
        list
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap()
    }

    /// Answers from a script, one status per call, and records the URLs.
    struct Scripted {
        statuses: RefCell<Vec<Result<CertStatus, Error>>>,
        urls: RefCell<Vec<String>>,
    }

    impl Scripted {
        fn new(statuses: Vec<Result<CertStatus, Error>>) -> Self {
            Self {
                statuses: RefCell::new(statuses),
                urls: RefCell::new(Vec::new()),
            }
        }
    }

    impl OcspClient for Scripted {
        fn query(
            &self,
            subject: &X509Certificate,
            _issuer: &X509Certificate,
            url: &str,
            _requestor: Option<&str>,
            _signer: Option<&X509Certificate>,
        ) -> Result<OcspResponse, Error> {
            self.urls.borrow_mut().push(url.to_owned());
            let status = self.statuses.borrow_mut().remove(0)?;
            Ok(OcspResponse::new(status, format!("{url}|{}", subject.serial_decimal()).into_bytes()))
        }
    }

    fn sources<'a>(crls: &'a CrlList, ocsp: Option<&'a dyn OcspClient>, responders: &'a [String]) -> RevocationSources<'a> {
        RevocationSources {
            crls,
            ocsp,
            responders,
            requestor_name: None,
            at: at(),
        }
    }

    #[test]
    fn test_crls_cover_chain() {
        let list = crls(&["intermediate.crl", "root.crl"]);
        let mut walk = ChainWalk::new(sources(&list, None, &[]), algorithm::SHA256);
        walk.walk(&chain("signer-a"), false).unwrap();
        let evidence = walk.finish();
        assert_eq!(evidence.certificates, vec![cert("intermediate"), cert("root")]);
        assert_eq!(evidence.crls.len(), 2);
        assert!(evidence.ocsp.is_empty());

        let (cert_refs, rev_refs) = evidence.refs(algorithm::SHA256, at()).unwrap();
        assert_eq!(cert_refs.certs.len(), 2);
        assert_eq!(rev_refs.crl_refs.len(), 2);
        let (cert_values, rev_values) = evidence.values();
        assert_eq!(cert_values.certificates[0], cert("intermediate").der());
        assert_eq!(rev_values.crls.len(), 2);
    }

    #[test]
    fn test_same_crl_recorded_once() {
        let list = crls(&["intermediate.crl", "root.crl"]);
        let mut walk = ChainWalk::new(sources(&list, None, &[]), algorithm::SHA256);
        walk.walk(&chain("signer-a"), false).unwrap();
        walk.walk(&chain("signer-b"), true).unwrap();
        let evidence = walk.finish();
        assert_eq!(evidence.crls.len(), 2);
        assert_eq!(evidence.certificates.len(), 3);
    }

    #[test]
    fn test_revoked_by_crl_is_fatal() {
        let list = crls(&["intermediate.crl", "root.crl"]);
        let mut walk = ChainWalk::new(sources(&list, None, &[]), algorithm::SHA256);
        let err = walk.walk(&chain("revoked"), false).unwrap_err();
        assert!(matches!(err, Error::RevokedCertificate { ref serial, .. } if serial == "4098"));
    }

    #[test]
    fn test_expired_crl_falls_back_to_aia_responder() {
        let list = crls(&["intermediate-expired.crl", "root.crl"]);
        let ocsp = Scripted::new(vec![Ok(CertStatus::Good)]);
        let mut walk = ChainWalk::new(sources(&list, Some(&ocsp), &[]), algorithm::SHA256);
        walk.walk(&chain("signer-a"), false).unwrap();
        assert_eq!(*ocsp.urls.borrow(), vec!["http://ocsp.ulriksdal.test/intermediate".to_string()]);
        let evidence = walk.finish();
        assert_eq!(evidence.ocsp.len(), 1);
        assert_eq!(evidence.crls.len(), 1);
    }

    #[test]
    fn test_unknown_moves_to_configured_responder() {
        let list = crls(&["root.crl"]);
        let ocsp = Scripted::new(vec![Ok(CertStatus::Unknown), Ok(CertStatus::Good)]);
        let responders = vec!["http://backup.ulriksdal.test".to_string()];
        let mut walk = ChainWalk::new(sources(&list, Some(&ocsp), &responders), algorithm::SHA256);
        walk.walk(&chain("signer-a"), false).unwrap();
        assert_eq!(
            *ocsp.urls.borrow(),
            vec![
                "http://ocsp.ulriksdal.test/intermediate".to_string(),
                "http://backup.ulriksdal.test".to_string()
            ]
        );
        assert_eq!(walk.finish().ocsp[0].url, "http://backup.ulriksdal.test");
    }

    #[test]
    fn test_transport_error_aborts() {
        let list = crls(&["root.crl"]);
        let ocsp = Scripted::new(vec![Err(Error::Revocation("connection refused".into())), Ok(CertStatus::Good)]);
        let responders = vec!["http://backup.ulriksdal.test".to_string()];
        let mut walk = ChainWalk::new(sources(&list, Some(&ocsp), &responders), algorithm::SHA256);
        assert!(matches!(walk.walk(&chain("signer-a"), false), Err(Error::Revocation(_))));
        assert_eq!(ocsp.urls.borrow().len(), 1);
    }

    #[test]
    fn test_revoked_by_ocsp_is_fatal() {
        let list = crls(&["root.crl"]);
        let ocsp = Scripted::new(vec![Ok(CertStatus::Revoked { revoked_at: Some(at()) })]);
        let mut walk = ChainWalk::new(sources(&list, Some(&ocsp), &[]), algorithm::SHA256);
        assert!(matches!(
            walk.walk(&chain("signer-a"), false),
            Err(Error::RevokedCertificate { .. })
        ));
    }

    #[test]
    fn test_no_source_at_all() {
        let list = CrlList::new();
        let mut walk = ChainWalk::new(sources(&list, None, &[]), algorithm::SHA256);
        assert!(matches!(walk.walk(&chain("signer-a"), false), Err(Error::Revocation(_))));
    }
}
