#![forbid(unsafe_code)]
#![allow(dead_code)]

//! Fixtures and collaborator doubles shared by the integration tests.

use chrono::{DateTime, TimeZone, Utc};
use std::cell::RefCell;
use ulriksdal_core::Error;
use ulriksdal_keys::{IssuerChainBuilder, Key, X509Certificate};
use ulriksdal_pki::{CertStatus, CrlList, LocalTimestampAuthority, OcspClient, OcspResponse, TimestampClient};

pub const AIA_RESPONDER: &str = "http://ocsp.ulriksdal.test/intermediate";

pub fn fixture(name: &str) -> Vec<u8> {
    let path = format!("{}/../../test-data/pki/{name}", env!("CARGO_MANIFEST_DIR"));
    std::fs::read(&path).unwrap_or_else(|e| panic!("fixture {path}: {e}"))
}

pub fn signer(name: &str) -> Key {
    ulriksdal_keys::loader::load_signing_identity(
        &fixture(&format!("{name}.key.pem")),
        &fixture(&format!("{name}.pem")),
    )
    .unwrap()
}

pub fn cert(name: &str) -> X509Certificate {
    X509Certificate::from_der(&fixture(&format!("{name}.der"))).unwrap()
}

/// All fixtures are valid at this instant.
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap()
}

pub fn tsa() -> LocalTimestampAuthority {
    LocalTimestampAuthority::new(signer("tsa")).unwrap().with_time(now())
}

pub fn chain_builder() -> IssuerChainBuilder {
    IssuerChainBuilder::new(vec![cert("intermediate"), cert("root")])
}

pub fn crls(names: &[&str]) -> CrlList {
    let mut list = CrlList::new();
    for n in names {
        list.add_der(&fixture(n)).unwrap();
    }
    list
}

/// A timestamp client that counts requests and can be told to fail.
pub struct RecordingTsa<T> {
    inner: T,
    pub calls: RefCell<Vec<String>>,
    pub fail: bool,
}

impl<T: TimestampClient> RecordingTsa<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            calls: RefCell::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing(inner: T) -> Self {
        Self {
            fail: true,
            ..Self::new(inner)
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl<T: TimestampClient> TimestampClient for RecordingTsa<T> {
    fn request_timestamp(&self, digest: &[u8], digest_uri: &str, cert_req: bool) -> Result<Vec<u8>, Error> {
        self.calls.borrow_mut().push(digest_uri.to_owned());
        if self.fail {
            return Err(Error::Timestamp("TSA unreachable".into()));
        }
        self.inner.request_timestamp(digest, digest_uri, cert_req)
    }
}

/// An OCSP responder answering from a script, in call order. Once the
/// script runs out every answer is `Good`.
#[derive(Default)]
pub struct ScriptedOcsp {
    script: RefCell<Vec<Result<CertStatus, String>>>,
    /// (subject serial, responder URL) per query.
    pub queries: RefCell<Vec<(String, String)>>,
}

impl ScriptedOcsp {
    pub fn new(script: Vec<Result<CertStatus, String>>) -> Self {
        Self {
            script: RefCell::new(script),
            queries: RefCell::new(Vec::new()),
        }
    }

    pub fn urls(&self) -> Vec<String> {
        self.queries.borrow().iter().map(|(_, url)| url.clone()).collect()
    }
}

impl OcspClient for ScriptedOcsp {
    fn query(
        &self,
        subject: &X509Certificate,
        _issuer: &X509Certificate,
        responder_url: &str,
        _requestor_name: Option<&str>,
        _signing_certificate: Option<&X509Certificate>,
    ) -> Result<OcspResponse, Error> {
        self.queries
            .borrow_mut()
            .push((subject.serial_decimal(), responder_url.to_owned()));
        let mut script = self.script.borrow_mut();
        let status = if script.is_empty() {
            CertStatus::Good
        } else {
            script.remove(0).map_err(Error::Revocation)?
        };
        let body = format!("{responder_url}|{}", subject.serial_decimal()).into_bytes();
        Ok(OcspResponse::new(status, body).with_responder("CN=Ulriksdal Test OCSP", now()))
    }
}
