#![forbid(unsafe_code)]

//! Certificate revocation lists (RFC 5280 §5).
//!
//! CRLs are handed to the engine up front. A CRL is only consulted for a
//! certificate when it was issued by that certificate's issuer, is
//! current at the evaluation time, and carries a valid issuer signature.

use chrono::{DateTime, Utc};
use der::{Decode, Encode};
use ulriksdal_core::Error;
use ulriksdal_keys::x509::{serial_to_decimal, time_to_chrono, verify_signature};
use ulriksdal_keys::X509Certificate;
use x509_cert::crl::CertificateList;

const CRL_NUMBER: &str = "2.5.29.20";
const CRL_REASON: &str = "2.5.29.21";

/// CRL revocation reason codes (RFC 5280 §5.3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevocationReason {
    Unspecified,
    KeyCompromise,
    CaCompromise,
    AffiliationChanged,
    Superseded,
    CessationOfOperation,
    CertificateHold,
    RemoveFromCrl,
    PrivilegeWithdrawn,
    AaCompromise,
}

impl RevocationReason {
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::Unspecified,
            1 => Self::KeyCompromise,
            2 => Self::CaCompromise,
            3 => Self::AffiliationChanged,
            4 => Self::Superseded,
            5 => Self::CessationOfOperation,
            6 => Self::CertificateHold,
            8 => Self::RemoveFromCrl,
            9 => Self::PrivilegeWithdrawn,
            10 => Self::AaCompromise,
            _ => return None,
        })
    }
}

/// A revoked-certificate entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevokedEntry {
    /// Serial number in decimal.
    pub serial: String,
    pub revoked_at: DateTime<Utc>,
    pub reason: Option<RevocationReason>,
}

/// A parsed CRL together with its DER encoding.
#[derive(Clone)]
pub struct Crl {
    der: Vec<u8>,
    list: CertificateList,
}

impl std::fmt::Debug for Crl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crl")
            .field("issuer", &self.issuer())
            .field("number", &self.number())
            .finish()
    }
}

impl Crl {
    pub fn from_der(der: &[u8]) -> Result<Self, Error> {
        let list = CertificateList::from_der(der)
            .map_err(|e| Error::Revocation(format!("failed to parse CRL: {e}")))?;
        Ok(Self {
            der: der.to_vec(),
            list,
        })
    }

    pub fn from_pem(pem: &[u8]) -> Result<Self, Error> {
        let (label, der) = pem_rfc7468::decode_vec(pem)
            .map_err(|e| Error::Revocation(format!("failed to decode CRL PEM: {e}")))?;
        if label != "X509 CRL" {
            return Err(Error::Revocation(format!("expected X509 CRL PEM, got {label}")));
        }
        Self::from_der(&der)
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Issuer name (RFC 4514).
    pub fn issuer(&self) -> String {
        self.list.tbs_cert_list.issuer.to_string()
    }

    pub fn issuer_der(&self) -> Vec<u8> {
        self.list.tbs_cert_list.issuer.to_der().unwrap_or_default()
    }

    pub fn this_update(&self) -> Result<DateTime<Utc>, Error> {
        time_to_chrono(&self.list.tbs_cert_list.this_update)
    }

    pub fn next_update(&self) -> Result<Option<DateTime<Utc>>, Error> {
        self.list
            .tbs_cert_list
            .next_update
            .as_ref()
            .map(time_to_chrono)
            .transpose()
    }

    /// The CRL number extension, in decimal.
    pub fn number(&self) -> Option<String> {
        let exts = self.list.tbs_cert_list.crl_extensions.as_ref()?;
        let ext = exts.iter().find(|e| e.extn_id.to_string() == CRL_NUMBER)?;
        let value = der::asn1::Int::from_der(ext.extn_value.as_bytes()).ok()?;
        Some(serial_to_decimal(value.as_bytes()))
    }

    /// Digest of the DER encoding under an XML-DSig digest URI.
    pub fn digest(&self, digest_uri: &str) -> Result<Vec<u8>, Error> {
        ulriksdal_crypto::digest::digest(digest_uri, &self.der)
    }

    /// `thisUpdate <= at < nextUpdate`. A CRL without `nextUpdate` is
    /// never considered current.
    pub fn is_current_at(&self, at: DateTime<Utc>) -> Result<bool, Error> {
        let Some(next) = self.next_update()? else {
            return Ok(false);
        };
        Ok(self.this_update()? <= at && at < next)
    }

    /// Verify the CRL signature with the issuer's key.
    pub fn verify_signed_by(&self, issuer: &X509Certificate) -> Result<(), Error> {
        let tbs = self
            .list
            .tbs_cert_list
            .to_der()
            .map_err(|e| Error::Revocation(format!("failed to encode TBSCertList: {e}")))?;
        let sig = self
            .list
            .signature
            .as_bytes()
            .ok_or_else(|| Error::Revocation("CRL signature has unused bits".into()))?;
        verify_signature(issuer.spki(), &self.list.signature_algorithm.oid, None, &tbs, sig)
    }

    /// Look up a certificate's entry.
    pub fn revocation(&self, cert: &X509Certificate) -> Result<Option<RevokedEntry>, Error> {
        let serial = strip_leading_zeros(cert.serial_bytes());
        let Some(revoked) = &self.list.tbs_cert_list.revoked_certificates else {
            return Ok(None);
        };
        let Some(entry) = revoked
            .iter()
            .find(|r| strip_leading_zeros(r.serial_number.as_bytes()) == serial)
        else {
            return Ok(None);
        };
        let reason = entry.crl_entry_extensions.as_ref().and_then(|exts| {
            exts.iter()
                .find(|e| e.extn_id.to_string() == CRL_REASON)
                .and_then(|e| match e.extn_value.as_bytes() {
                    // ENUMERATED, one content octet
                    [0x0a, 0x01, code] => RevocationReason::from_code(*code),
                    _ => None,
                })
        });
        Ok(Some(RevokedEntry {
            serial: cert.serial_decimal(),
            revoked_at: time_to_chrono(&entry.revocation_date)?,
            reason,
        }))
    }
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

// ── CRL list ─────────────────────────────────────────────────────────

/// The caller-supplied CRLs available to an upgrade run.
#[derive(Debug, Clone, Default)]
pub struct CrlList {
    crls: Vec<Crl>,
}

impl CrlList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, crl: Crl) {
        self.crls.push(crl);
    }

    pub fn add_der(&mut self, der: &[u8]) -> Result<(), Error> {
        self.add(Crl::from_der(der)?);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Crl> {
        self.crls.iter()
    }

    pub fn len(&self) -> usize {
        self.crls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.crls.is_empty()
    }

    /// First CRL usable for `cert`: issued under `issuer`'s name,
    /// current at `at`, and signed by `issuer`.
    pub fn find_usable(
        &self,
        cert: &X509Certificate,
        issuer: &X509Certificate,
        at: DateTime<Utc>,
    ) -> Option<&Crl> {
        let wanted = cert.issuer_der();
        for crl in &self.crls {
            if crl.issuer_der() != wanted {
                continue;
            }
            match crl.is_current_at(at) {
                Ok(true) => {}
                Ok(false) => {
                    tracing::warn!(issuer = %crl.issuer(), number = ?crl.number(), "skipping CRL outside its validity window");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(issuer = %crl.issuer(), error = %e, "skipping CRL with unreadable dates");
                    continue;
                }
            }
            if let Err(e) = crl.verify_signed_by(issuer) {
                tracing::warn!(issuer = %crl.issuer(), error = %e, "skipping CRL with bad signature");
                continue;
            }
            return Some(crl);
        }
        None
    }
}
