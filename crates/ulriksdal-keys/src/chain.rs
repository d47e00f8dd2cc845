#![forbid(unsafe_code)]

//! Certificate chain building.

use crate::x509::X509Certificate;
use ulriksdal_core::Error;

const MAX_DEPTH: usize = 10;

/// Builds the issuer chain of a certificate.
pub trait ChainBuilder {
    /// Returns the chain ordered from `leaf` to its root. `extra` supplies
    /// additional candidate issuers for this call only (e.g. the
    /// certificates shipped inside a timestamp token).
    fn build_chain(
        &self,
        leaf: &X509Certificate,
        extra: &[X509Certificate],
    ) -> Result<Vec<X509Certificate>, Error>;
}

/// Walks issuer names through a fixed pool of certificates, checking each
/// link's signature. The walk ends at a self-issued certificate.
#[derive(Debug, Clone, Default)]
pub struct IssuerChainBuilder {
    pool: Vec<X509Certificate>,
}

impl IssuerChainBuilder {
    pub fn new(pool: Vec<X509Certificate>) -> Self {
        Self { pool }
    }

    pub fn add(&mut self, cert: X509Certificate) {
        if !self.pool.contains(&cert) {
            self.pool.push(cert);
        }
    }

    pub fn pool(&self) -> &[X509Certificate] {
        &self.pool
    }
}

impl ChainBuilder for IssuerChainBuilder {
    fn build_chain(
        &self,
        leaf: &X509Certificate,
        extra: &[X509Certificate],
    ) -> Result<Vec<X509Certificate>, Error> {
        let mut chain = vec![leaf.clone()];
        let mut current = leaf.clone();

        for _ in 0..MAX_DEPTH {
            if current.is_self_issued() {
                current.verify_signed_by(&current)?;
                return Ok(chain);
            }

            let issuer = self
                .pool
                .iter()
                .chain(extra.iter())
                .filter(|c| !chain.contains(c))
                .find(|c| current.is_issued_by(c))
                .cloned();

            let Some(issuer) = issuer else {
                return Err(Error::Certificate(format!(
                    "cannot find issuer of {} (incomplete chain)",
                    current.subject()
                )));
            };
            tracing::debug!(subject = %current.subject(), issuer = %issuer.subject(), "chain link");
            chain.push(issuer.clone());
            current = issuer;
        }

        Err(Error::Certificate("certificate chain too long".into()))
    }
}
