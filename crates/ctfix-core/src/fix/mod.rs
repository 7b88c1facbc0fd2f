//! Chain verification and repair.
//!
//! The heart of the system: given a leaf certificate, an optional (possibly
//! incomplete or malformed) chain, and a set of trusted roots,
//! [`Fixer::handle_chain`] decides whether the chain verifies as-is, can be
//! repaired into one or more verifying chains, or is unfixable.
//!
//! # Algorithm
//!
//! 1. Strict verification through the injected [`ChainVerifier`]. Success
//!    returns the verified chain(s) with an empty error sequence; no repair
//!    is attempted.
//! 2. On failure, a `VerifyFailed` error is recorded and the repair pass
//!    runs: depth-first path construction over the supplied material plus
//!    candidates from the injected [`IssuerSource`], rejecting any path
//!    that would repeat a certificate.
//! 3. A successful repair returns the constructed chain(s) *together with*
//!    the recorded `VerifyFailed` error; both facts are reported.
//! 4. A failed repair appends `FixFailed`; no chain is returned.
//!
//! # Invariants
//!
//! - [INV-FIX-001] A reported chain never contains the same certificate
//!   twice.
//! - [INV-FIX-002] A reported chain terminates at (or is issued to
//!   terminate at) a member of the root set.
//! - [INV-FIX-003] The error sequence preserves the order in which errors
//!   occurred within one fix attempt.

mod builder;
mod error;
mod issuer;
mod verifier;


use std::sync::Arc;

use tracing::{debug, warn};

pub use error::{FixError, FixErrorKind, VerifyError};
pub use issuer::{IssuerSource, StaticIssuerSource};
pub use verifier::{ChainVerifier, X509Verifier};

use builder::ChainBuilder;

use crate::cert::{Certificate, Chain, RootSet};

/// Result of one fix attempt: the valid chains found (possibly several)
/// and the ordered error history.
#[derive(Debug, Default)]
pub struct FixOutcome {
    /// Complete, cycle-free, root-anchored chains, leaf first.
    pub chains: Vec<Chain>,
    /// Ordered error sequence for this attempt.
    pub errors: Vec<FixError>,
}

impl FixOutcome {
    /// Returns `true` when at least one valid chain was produced.
    #[must_use]
    pub fn is_success(&self) -> bool {
        !self.chains.is_empty()
    }

    /// The error kinds in occurrence order, for classification.
    #[must_use]
    pub fn kinds(&self) -> Vec<FixErrorKind> {
        self.errors.iter().map(|e| e.kind).collect()
    }
}

/// Verification-then-repair engine.
///
/// Stateless per call: safe to invoke concurrently across unrelated inputs.
pub struct Fixer<V> {
    verifier: V,
    issuers: Arc<dyn IssuerSource>,
}

impl<V: ChainVerifier> Fixer<V> {
    /// Creates a fixer over a verification capability and an issuer source.
    pub fn new(verifier: V, issuers: Arc<dyn IssuerSource>) -> Self {
        Self { verifier, issuers }
    }

    /// Verifies the supplied chain, repairing it if strict verification
    /// fails.
    ///
    /// `chain` is the caller-supplied intermediate material, leaf-first
    /// order is conventional but not required; duplicates are tolerated.
    /// The supplied `roots` are read-only for the duration of the call.
    pub fn handle_chain(
        &self,
        leaf: &Arc<Certificate>,
        chain: &[Arc<Certificate>],
        roots: &RootSet,
    ) -> FixOutcome {
        match self.verifier.verify(leaf, chain, roots) {
            Ok(chains) => {
                debug!(leaf = leaf.name(), "chain verified as supplied");
                FixOutcome {
                    chains,
                    errors: Vec::new(),
                }
            },
            Err(verify_err) => {
                debug!(
                    leaf = leaf.name(),
                    error = %verify_err,
                    "strict verification failed, attempting repair"
                );
                let mut errors = vec![FixError::verify_failed(leaf, chain, &verify_err)];

                let repaired = ChainBuilder::new(self.issuers.as_ref(), roots)
                    .build(leaf, chain);
                if repaired.is_empty() {
                    warn!(
                        leaf = leaf.name(),
                        leaf_hash = %leaf.hash_hex(),
                        "no verifiable chain could be constructed"
                    );
                    errors.push(FixError::fix_failed(leaf, chain));
                    FixOutcome {
                        chains: Vec::new(),
                        errors,
                    }
                } else {
                    debug!(
                        leaf = leaf.name(),
                        chains = repaired.len(),
                        "repair produced valid chain(s)"
                    );
                    FixOutcome {
                        chains: repaired,
                        errors,
                    }
                }
            },
        }
    }
}
