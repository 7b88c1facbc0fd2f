//! Issuer lookup capability for the repair pass.
//!
//! Where the repair pass gets "additional certificate material" from is
//! deliberately injectable: the default production source is the
//! [`CertificateStore`] cache of everything seen so far during a scan, and
//! an AIA-style network fetcher can slot in later without touching the
//! fixer.

use std::sync::Arc;

use crate::cert::{Certificate, CertificateStore};

/// Supplies candidate issuers for a certificate during chain repair.
pub trait IssuerSource: Send + Sync {
    /// Returns certificates whose subject matches `cert`'s issuer.
    ///
    /// Candidates are unvalidated; the chain builder checks the actual
    /// issuance relationship before extending a path.
    fn find_issuers(&self, cert: &Certificate) -> Vec<Arc<Certificate>>;
}

impl IssuerSource for CertificateStore {
    fn find_issuers(&self, cert: &Certificate) -> Vec<Arc<Certificate>> {
        self.find_by_subject(cert.issuer_der())
    }
}

/// A fixed pool of candidate issuers.
///
/// Used for root bundles handed in by the caller and as a deterministic
/// source in tests.
#[derive(Debug, Default)]
pub struct StaticIssuerSource {
    pool: Vec<Arc<Certificate>>,
}

impl StaticIssuerSource {
    /// Creates a source over the given pool.
    #[must_use]
    pub fn new(pool: Vec<Arc<Certificate>>) -> Self {
        Self { pool }
    }

    /// Adds a certificate to the pool.
    pub fn push(&mut self, cert: Arc<Certificate>) {
        self.pool.push(cert);
    }
}

impl IssuerSource for StaticIssuerSource {
    fn find_issuers(&self, cert: &Certificate) -> Vec<Arc<Certificate>> {
        self.pool
            .iter()
            .filter(|candidate| candidate.subject_der() == cert.issuer_der())
            .map(Arc::clone)
            .collect()
    }
}
