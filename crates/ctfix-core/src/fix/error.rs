//! Fix-attempt error taxonomy.
//!
//! Errors here are data about an input chain, not transient faults: a
//! single fix attempt accumulates an ordered sequence of [`FixError`]
//! values so the full history survives ("verification failed, then the
//! repair succeeded" and "verification failed, then the repair failed" are
//! different outcomes and both are reportable).

use std::fmt;
use std::sync::Arc;

use openssl::error::ErrorStack;
use thiserror::Error;

use crate::cert::{Certificate, Chain};

/// Classification of a fix-attempt error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum FixErrorKind {
    /// No error. Present for report compatibility; never pushed onto an
    /// outcome's error sequence.
    None,
    /// The supplied chain does not verify as-is.
    VerifyFailed,
    /// No repair path exists for the supplied material.
    FixFailed,
    /// Submission of a chain to a log failed.
    LogPostFailed,
}

impl fmt::Display for FixErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::VerifyFailed => "verify failed",
            Self::FixFailed => "fix failed",
            Self::LogPostFailed => "log post failed",
        };
        f.write_str(s)
    }
}

/// A tagged fix-attempt error with enough context for an operator to
/// investigate: the leaf's identity and the chain that was attempted.
#[derive(Debug, Clone, Error)]
#[error("{kind}: leaf {leaf} ({leaf_hash}): {reason}")]
pub struct FixError {
    /// Error classification.
    pub kind: FixErrorKind,
    /// Display name of the leaf certificate ("-" when unknown).
    pub leaf: String,
    /// Content hash of the leaf, hex encoded ("-" when unknown).
    pub leaf_hash: String,
    /// Display names of the attempted chain, leaf first.
    pub chain: Vec<String>,
    /// Underlying cause.
    pub reason: String,
}

impl FixError {
    /// Records that the supplied chain failed strict verification.
    #[must_use]
    pub fn verify_failed(
        leaf: &Certificate,
        chain: &[Arc<Certificate>],
        reason: &VerifyError,
    ) -> Self {
        Self {
            kind: FixErrorKind::VerifyFailed,
            leaf: leaf.name().to_string(),
            leaf_hash: leaf.hash_hex(),
            chain: chain.iter().map(|c| c.name().to_string()).collect(),
            reason: reason.to_string(),
        }
    }

    /// Records that no repair path exists.
    #[must_use]
    pub fn fix_failed(leaf: &Certificate, chain: &[Arc<Certificate>]) -> Self {
        Self {
            kind: FixErrorKind::FixFailed,
            leaf: leaf.name().to_string(),
            leaf_hash: leaf.hash_hex(),
            chain: chain.iter().map(|c| c.name().to_string()).collect(),
            reason: "no verifiable chain could be constructed".to_string(),
        }
    }

    /// Records a failed log submission for a chain.
    #[must_use]
    pub fn log_post_failed(chain: &Chain, reason: &dyn fmt::Display) -> Self {
        let (leaf, leaf_hash) = chain
            .certs()
            .first()
            .map_or_else(|| ("-".to_string(), "-".to_string()), |c| {
                (c.name().to_string(), c.hash_hex())
            });
        Self {
            kind: FixErrorKind::LogPostFailed,
            leaf,
            leaf_hash,
            chain: chain.names(),
            reason: reason.to_string(),
        }
    }
}

/// Errors from the chain verification capability.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum VerifyError {
    /// Verification can never succeed without at least one trusted root.
    #[error("no trusted roots supplied")]
    NoRoots,

    /// The verifier examined the chain and rejected it.
    #[error("chain rejected: {reason}")]
    Rejected {
        /// Verifier-reported rejection reason.
        reason: String,
    },

    /// The verifier itself failed before reaching a verdict.
    #[error("verifier error: {0}")]
    Internal(#[from] ErrorStack),
}
