//! Repair-pass path construction.
//!
//! Depth-first search from the leaf over the supplied chain material plus
//! whatever the [`IssuerSource`] can contribute. A per-path seen-hash set
//! rejects cycles: a candidate whose hash is already on the in-progress
//! path abandons that extension without emitting anything.

use std::collections::HashSet;
use std::sync::Arc;

use super::issuer::IssuerSource;
use crate::cert::{CertHash, Certificate, Chain, RootSet};

/// Upper bound on constructed path length, pathological inputs aside no
/// real certification path comes close.
pub(crate) const MAX_CHAIN_LENGTH: usize = 10;

pub(crate) struct ChainBuilder<'a> {
    issuers: &'a dyn IssuerSource,
    roots: &'a RootSet,
}

impl<'a> ChainBuilder<'a> {
    pub(crate) fn new(issuers: &'a dyn IssuerSource, roots: &'a RootSet) -> Self {
        Self { issuers, roots }
    }

    /// Returns every distinct cycle-free, root-anchored path from `leaf`.
    pub(crate) fn build(
        &self,
        leaf: &Arc<Certificate>,
        supplied: &[Arc<Certificate>],
    ) -> Vec<Chain> {
        let mut found = Vec::new();
        let mut emitted = HashSet::new();
        let mut path = vec![Arc::clone(leaf)];
        let mut seen: HashSet<CertHash> = HashSet::from([leaf.hash()]);
        self.extend(&mut path, &mut seen, supplied, &mut found, &mut emitted);
        found
    }

    fn extend(
        &self,
        path: &mut Vec<Arc<Certificate>>,
        seen: &mut HashSet<CertHash>,
        supplied: &[Arc<Certificate>],
        found: &mut Vec<Chain>,
        emitted: &mut HashSet<Vec<CertHash>>,
    ) {
        let Some(tip) = path.last().map(Arc::clone) else {
            return;
        };

        // Path already terminates at a trust anchor.
        if self.roots.contains_hash(&tip.hash()) {
            Self::emit(path, found, emitted);
            return;
        }

        // A root that directly issued the tip completes the path.
        for root in self.roots.iter() {
            if !seen.contains(&root.hash()) && root.issued(&tip) {
                path.push(Arc::clone(root));
                Self::emit(path, found, emitted);
                path.pop();
            }
        }

        if path.len() >= MAX_CHAIN_LENGTH {
            return;
        }

        let mut candidates: Vec<Arc<Certificate>> = supplied.to_vec();
        candidates.extend(self.issuers.find_issuers(&tip));

        for candidate in candidates {
            if seen.contains(&candidate.hash()) {
                // Cycle: this candidate is already on the path.
                continue;
            }
            if !candidate.issued(&tip) {
                continue;
            }
            seen.insert(candidate.hash());
            path.push(Arc::clone(&candidate));
            self.extend(path, seen, supplied, found, emitted);
            path.pop();
            seen.remove(&candidate.hash());
        }
    }

    fn emit(
        path: &[Arc<Certificate>],
        found: &mut Vec<Chain>,
        emitted: &mut HashSet<Vec<CertHash>>,
    ) {
        let key: Vec<CertHash> = path.iter().map(|c| c.hash()).collect();
        if emitted.insert(key) {
            if let Ok(chain) = Chain::from_certs(path.to_vec()) {
                found.push(chain);
            }
        }
    }
}
