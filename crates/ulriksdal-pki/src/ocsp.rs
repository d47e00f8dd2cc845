#![forbid(unsafe_code)]

//! OCSP collaborator interface.
//!
//! Request encoding and transport belong to the implementor; the engine
//! only needs the certificate status and the raw response bytes it
//! embeds as evidence.

use chrono::{DateTime, Utc};
use ulriksdal_core::Error;
use ulriksdal_keys::X509Certificate;

/// Certificate status reported by a responder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertStatus {
    Good,
    Revoked { revoked_at: Option<DateTime<Utc>> },
    Unknown,
}

/// One answer from an OCSP responder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcspResponse {
    pub status: CertStatus,
    /// DER-encoded `OCSPResponse`.
    pub response: Vec<u8>,
    /// Responder name (RFC 4514), when the client decoded it.
    pub responder_id: Option<String>,
    pub produced_at: Option<DateTime<Utc>>,
}

impl OcspResponse {
    pub fn new(status: CertStatus, response: Vec<u8>) -> Self {
        Self {
            status,
            response,
            responder_id: None,
            produced_at: None,
        }
    }

    pub fn with_responder(mut self, responder_id: impl Into<String>, produced_at: DateTime<Utc>) -> Self {
        self.responder_id = Some(responder_id.into());
        self.produced_at = Some(produced_at);
        self
    }

    /// Digest of the response bytes under an XML-DSig digest URI.
    pub fn digest(&self, digest_uri: &str) -> Result<Vec<u8>, Error> {
        ulriksdal_crypto::digest::digest(digest_uri, &self.response)
    }
}

/// Queries an OCSP responder.
///
/// A call blocks until the responder answers. Transport and protocol
/// failures are returned as errors; timeouts and cancellation are the
/// implementor's concern.
pub trait OcspClient {
    fn query(
        &self,
        subject: &X509Certificate,
        issuer: &X509Certificate,
        responder_url: &str,
        requestor_name: Option<&str>,
        signing_certificate: Option<&X509Certificate>,
    ) -> Result<OcspResponse, Error>;
}

impl<T: OcspClient + ?Sized> OcspClient for &T {
    fn query(
        &self,
        subject: &X509Certificate,
        issuer: &X509Certificate,
        responder_url: &str,
        requestor_name: Option<&str>,
        signing_certificate: Option<&X509Certificate>,
    ) -> Result<OcspResponse, Error> {
        (**self).query(subject, issuer, responder_url, requestor_name, signing_certificate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    struct AlwaysGood;

    impl OcspClient for AlwaysGood {
        fn query(
            &self,
            subject: &X509Certificate,
            _issuer: &X509Certificate,
            url: &str,
            _requestor: Option<&str>,
            _signer: Option<&X509Certificate>,
        ) -> Result<OcspResponse, Error> {
            Ok(OcspResponse::new(CertStatus::Good, format!("{url}|{}", subject.serial_decimal()).into_bytes()))
        }
    }

    #[test]
    fn test_trait_object_and_reference() {
        let path = format!("{}/../../test-data/pki/signer-a.der", env!("CARGO_MANIFEST_DIR"));
        let cert = X509Certificate::from_der(&std::fs::read(path).unwrap()).unwrap();
        let client: &dyn OcspClient = &AlwaysGood;
        let by_ref = &client;
        let resp = by_ref.query(&cert, &cert, "http://ocsp.test", None, None).unwrap();
        assert_eq!(resp.status, CertStatus::Good);
        assert_eq!(resp.response, b"http://ocsp.test|4096");
    }

    #[test]
    fn test_responder_metadata() {
        let at = Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap();
        let resp = OcspResponse::new(CertStatus::Unknown, vec![1]).with_responder("CN=OCSP", at);
        assert_eq!(resp.responder_id.as_deref(), Some("CN=OCSP"));
        assert_eq!(resp.produced_at, Some(at));
        assert_eq!(resp.digest(ulriksdal_core::algorithm::SHA256).unwrap().len(), 32);
    }
}
