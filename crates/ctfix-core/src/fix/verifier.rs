//! Strict chain verification capability.
//!
//! Verification is treated as a trusted library primitive behind the
//! [`ChainVerifier`] trait so the fixer never depends on a particular
//! X.509 implementation. The production implementation drives OpenSSL's
//! path validation.

use std::sync::Arc;

use openssl::stack::Stack;
use openssl::x509::store::X509StoreBuilder;
use openssl::x509::{X509, X509StoreContext};

use super::error::VerifyError;
use crate::cert::{Certificate, Chain, RootSet};

/// Verifies a leaf against a candidate chain and a set of trusted roots.
///
/// Returns every complete certification path the verifier accepts, leaf
/// first and ending at a trust anchor. An empty root set must always fail.
pub trait ChainVerifier: Send + Sync {
    /// Attempts strict verification of `leaf` through `chain` to `roots`.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::NoRoots`] when no roots are trusted,
    /// [`VerifyError::Rejected`] when the material does not form a valid
    /// path, and [`VerifyError::Internal`] on verifier failure.
    fn verify(
        &self,
        leaf: &Arc<Certificate>,
        chain: &[Arc<Certificate>],
        roots: &RootSet,
    ) -> Result<Vec<Chain>, VerifyError>;
}

/// OpenSSL-backed verifier using `X509_verify_cert` path validation.
#[derive(Debug, Default, Clone, Copy)]
pub struct X509Verifier;

impl X509Verifier {
    /// Creates a verifier.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ChainVerifier for X509Verifier {
    fn verify(
        &self,
        leaf: &Arc<Certificate>,
        chain: &[Arc<Certificate>],
        roots: &RootSet,
    ) -> Result<Vec<Chain>, VerifyError> {
        if roots.is_empty() {
            return Err(VerifyError::NoRoots);
        }

        let mut store = X509StoreBuilder::new()?;
        for root in roots.iter() {
            store.add_cert(root.x509().clone())?;
        }
        let store = store.build();

        let mut untrusted = Stack::<X509>::new()?;
        for cert in chain {
            untrusted.push(cert.x509().clone())?;
        }

        let mut ctx = X509StoreContext::new()?;
        let verdict = ctx.init(&store, leaf.x509(), &untrusted, |ctx| {
            if ctx.verify_cert()? {
                let mut ders = Vec::new();
                if let Some(built) = ctx.chain() {
                    for cert in built {
                        ders.push(cert.to_der()?);
                    }
                }
                Ok(Ok(ders))
            } else {
                Ok(Err(ctx.error().error_string().to_string()))
            }
        })?;

        match verdict {
            Ok(ders) => {
                let mut certs = Vec::with_capacity(ders.len());
                for der in &ders {
                    let cert = Certificate::from_der(der).map_err(|e| {
                        VerifyError::Rejected {
                            reason: format!("verified chain failed to re-parse: {e}"),
                        }
                    })?;
                    certs.push(Arc::new(cert));
                }
                let chain = Chain::from_certs(certs).map_err(|e| VerifyError::Rejected {
                    reason: e.to_string(),
                })?;
                Ok(vec![chain])
            },
            Err(reason) => Err(VerifyError::Rejected { reason }),
        }
    }
}
