//! Certificate model: parsed certificates, chains, trust anchors, and the
//! deduplicating certificate cache.
//!
//! Everything here is built around content identity: a [`Certificate`] is
//! immutable once parsed and is identified by the SHA-256 hash of its DER
//! encoding. Chain construction relies on that identity for cycle
//! detection, and the [`CertificateStore`] relies on it for deduplication.
//!
//! # Invariants
//!
//! - [INV-CERT-001] A `Certificate` never changes after construction.
//! - [INV-CERT-002] Two certificates compare equal iff their DER bytes hash
//!   to the same value.
//! - [INV-CERT-003] A `Chain` never contains the same certificate twice.
//! - [INV-CERT-004] The `CertificateStore` is append-only; entries are never
//!   removed or replaced.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, RwLock};

use openssl::error::ErrorStack;
use openssl::nid::Nid;
use openssl::x509::{X509, X509NameRef};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// SHA-256 content hash identifying a certificate.
pub type CertHash = [u8; 32];

/// Errors arising from certificate parsing and chain assembly.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CertError {
    /// The bytes could not be parsed as an X.509 certificate.
    #[error("failed to parse certificate: {0}")]
    Parse(#[from] ErrorStack),

    /// A chain was assembled with the same certificate appearing twice.
    #[error("certificate {name} appears more than once in chain")]
    DuplicateInChain {
        /// Display name of the repeated certificate.
        name: String,
    },

    /// A PEM bundle contained no certificates.
    #[error("no certificates found in PEM bundle")]
    EmptyBundle,
}

/// An immutable X.509 certificate with derived identity.
///
/// Holds the raw DER encoding, its SHA-256 hash, the parsed `openssl`
/// handle, and the DER-encoded subject and issuer names used for
/// issuer/subject matching during chain construction.
#[derive(Clone)]
pub struct Certificate {
    der: Vec<u8>,
    hash: CertHash,
    x509: X509,
    subject_der: Vec<u8>,
    issuer_der: Vec<u8>,
    name: String,
}

impl Certificate {
    /// Parses a certificate from DER bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CertError::Parse`] if the bytes are not a valid X.509
    /// certificate.
    pub fn from_der(der: &[u8]) -> Result<Self, CertError> {
        let x509 = X509::from_der(der)?;
        Self::from_parts(der.to_vec(), x509)
    }

    /// Parses a certificate from a PEM block.
    ///
    /// # Errors
    ///
    /// Returns [`CertError::Parse`] if the PEM does not contain a valid
    /// certificate.
    pub fn from_pem(pem: &[u8]) -> Result<Self, CertError> {
        let x509 = X509::from_pem(pem)?;
        let der = x509.to_der()?;
        Self::from_parts(der, x509)
    }

    /// Wraps an already-parsed `X509` handle.
    ///
    /// # Errors
    ///
    /// Returns [`CertError::Parse`] if re-encoding the certificate fails.
    pub fn from_x509(x509: X509) -> Result<Self, CertError> {
        let der = x509.to_der()?;
        Self::from_parts(der, x509)
    }

    /// Parses every certificate in a PEM bundle, in order.
    ///
    /// # Errors
    ///
    /// Returns [`CertError::EmptyBundle`] if the bundle holds no
    /// certificates, or [`CertError::Parse`] on malformed input.
    pub fn parse_pem_bundle(pem: &[u8]) -> Result<Vec<Self>, CertError> {
        let stack = X509::stack_from_pem(pem)?;
        if stack.is_empty() {
            return Err(CertError::EmptyBundle);
        }
        stack.into_iter().map(Self::from_x509).collect()
    }

    fn from_parts(der: Vec<u8>, x509: X509) -> Result<Self, CertError> {
        let hash: CertHash = Sha256::digest(&der).into();
        let subject_der = x509.subject_name().to_der()?;
        let issuer_der = x509.issuer_name().to_der()?;
        let name = common_name(x509.subject_name())
            .unwrap_or_else(|| hex::encode(&hash[..8]));
        Ok(Self {
            der,
            hash,
            x509,
            subject_der,
            issuer_der,
            name,
        })
    }

    /// SHA-256 hash of the DER encoding.
    #[must_use]
    pub fn hash(&self) -> CertHash {
        self.hash
    }

    /// Hash rendered as lowercase hex, for logs and reports.
    #[must_use]
    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }

    /// Raw DER encoding.
    #[must_use]
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Underlying `openssl` handle.
    #[must_use]
    pub fn x509(&self) -> &X509 {
        &self.x509
    }

    /// Subject common name, or a hash prefix when the subject has no CN.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// DER-encoded subject name.
    #[must_use]
    pub fn subject_der(&self) -> &[u8] {
        &self.subject_der
    }

    /// DER-encoded issuer name.
    #[must_use]
    pub fn issuer_der(&self) -> &[u8] {
        &self.issuer_der
    }

    /// Returns `true` if `self` issued `child`: the names chain and the
    /// child's signature verifies under `self`'s public key.
    ///
    /// Signature or key errors are treated as "not issued" rather than
    /// surfaced; a candidate issuer that cannot be checked cannot extend a
    /// path.
    #[must_use]
    pub fn issued(&self, child: &Certificate) -> bool {
        if child.issuer_der != self.subject_der {
            return false;
        }
        self.x509
            .public_key()
            .and_then(|key| child.x509.verify(&key))
            .unwrap_or(false)
    }

    /// Returns `true` if the certificate is its own issuer.
    #[must_use]
    pub fn is_self_signed(&self) -> bool {
        self.subject_der == self.issuer_der && self.issued(self)
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("name", &self.name)
            .field("hash", &self.hash_hex())
            .finish_non_exhaustive()
    }
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for Certificate {}

impl std::hash::Hash for Certificate {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
    }
}

fn common_name(name: &X509NameRef) -> Option<String> {
    name.entries_by_nid(Nid::COMMONNAME)
        .next()
        .and_then(|entry| entry.data().to_string().ok())
}

/// An ordered, leaf-first certificate chain.
///
/// Construction enforces the cycle-free invariant: no certificate hash may
/// appear twice. An empty chain is permitted (it is a valid, if vacuous,
/// log submission).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Chain {
    certs: Vec<Arc<Certificate>>,
}

impl Chain {
    /// Builds a chain from leaf-first certificates.
    ///
    /// # Errors
    ///
    /// Returns [`CertError::DuplicateInChain`] if any certificate appears
    /// more than once.
    pub fn from_certs(certs: Vec<Arc<Certificate>>) -> Result<Self, CertError> {
        let mut seen = HashSet::with_capacity(certs.len());
        for cert in &certs {
            if !seen.insert(cert.hash()) {
                return Err(CertError::DuplicateInChain {
                    name: cert.name().to_string(),
                });
            }
        }
        Ok(Self { certs })
    }

    /// The certificates, leaf first.
    #[must_use]
    pub fn certs(&self) -> &[Arc<Certificate>] {
        &self.certs
    }

    /// Display names of the certificates, leaf first.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.certs.iter().map(|c| c.name().to_string()).collect()
    }

    /// Returns `true` if the chain contains a certificate with this hash.
    #[must_use]
    pub fn contains_hash(&self, hash: &CertHash) -> bool {
        self.certs.iter().any(|c| &c.hash() == hash)
    }

    /// Number of certificates in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.certs.len()
    }

    /// Returns `true` for a chain with no certificates.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }
}

/// A read-only set of trusted root certificates.
#[derive(Debug, Clone, Default)]
pub struct RootSet {
    certs: Vec<Arc<Certificate>>,
    hashes: HashSet<CertHash>,
}

impl RootSet {
    /// Creates an empty root set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a root set from certificates, dropping duplicates.
    #[must_use]
    pub fn from_certs(certs: impl IntoIterator<Item = Arc<Certificate>>) -> Self {
        let mut roots = Self::new();
        for cert in certs {
            roots.add(cert);
        }
        roots
    }

    /// Loads trusted roots from a PEM bundle.
    ///
    /// # Errors
    ///
    /// Returns an error if the bundle is empty or malformed.
    pub fn from_pem_bundle(pem: &[u8]) -> Result<Self, CertError> {
        let certs = Certificate::parse_pem_bundle(pem)?;
        Ok(Self::from_certs(certs.into_iter().map(Arc::new)))
    }

    /// Adds a root; duplicates are ignored.
    pub fn add(&mut self, cert: Arc<Certificate>) {
        if self.hashes.insert(cert.hash()) {
            self.certs.push(cert);
        }
    }

    /// Membership by certificate identity.
    #[must_use]
    pub fn contains(&self, cert: &Certificate) -> bool {
        self.hashes.contains(&cert.hash())
    }

    /// Membership by content hash.
    #[must_use]
    pub fn contains_hash(&self, hash: &CertHash) -> bool {
        self.hashes.contains(hash)
    }

    /// Iterates over the trusted roots.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Certificate>> {
        self.certs.iter()
    }

    /// Number of trusted roots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.certs.len()
    }

    /// Returns `true` when no roots are trusted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }
}

#[derive(Default)]
struct StoreInner {
    by_hash: HashMap<CertHash, Arc<Certificate>>,
    by_subject: HashMap<Vec<u8>, Vec<CertHash>>,
}

/// Append-only, deduplicating cache of certificates seen so far.
///
/// Keyed by content hash with a subject-name index, so it can answer "which
/// cached certificates could have issued this one" during chain repair.
/// Interior locking makes it shareable across fetch workers.
#[derive(Default)]
pub struct CertificateStore {
    inner: RwLock<StoreInner>,
}

impl CertificateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a certificate, returning the canonical shared handle.
    ///
    /// If an identical certificate was inserted before, the existing handle
    /// is returned and the new one is dropped.
    pub fn add(&self, cert: Certificate) -> Arc<Certificate> {
        self.add_arc(Arc::new(cert))
    }

    /// Inserts an already-shared certificate, deduplicating by hash.
    pub fn add_arc(&self, cert: Arc<Certificate>) -> Arc<Certificate> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = inner.by_hash.get(&cert.hash()) {
            return Arc::clone(existing);
        }
        inner
            .by_subject
            .entry(cert.subject_der().to_vec())
            .or_default()
            .push(cert.hash());
        inner.by_hash.insert(cert.hash(), Arc::clone(&cert));
        cert
    }

    /// Looks up a certificate by content hash.
    #[must_use]
    pub fn get(&self, hash: &CertHash) -> Option<Arc<Certificate>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.by_hash.get(hash).cloned()
    }

    /// All cached certificates whose subject matches the given DER name.
    #[must_use]
    pub fn find_by_subject(&self, subject_der: &[u8]) -> Vec<Arc<Certificate>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner
            .by_subject
            .get(subject_der)
            .map(|hashes| {
                hashes
                    .iter()
                    .filter_map(|h| inner.by_hash.get(h).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of distinct certificates cached.
    #[must_use]
    pub fn len(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.by_hash.len()
    }

    /// Returns `true` when the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for CertificateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateStore")
            .field("len", &self.len())
            .finish()
    }
}
