//! Minimal decoding of logged entries.
//!
//! Just enough of the RFC 6962 `MerkleTreeLeaf` / `extra_data` structures
//! to recover the leaf certificate and its submitted chain from an
//! `x509_entry`. Precertificate entries carry a different payload and are
//! reported as unsupported; callers skip them.

use thiserror::Error;

use super::LeafEntry;
use crate::cert::{CertError, Certificate};

/// `MerkleLeafType.timestamped_entry`.
const TIMESTAMPED_ENTRY: u8 = 0;

/// `LogEntryType.x509_entry`.
const X509_ENTRY: u16 = 0;

/// `LogEntryType.precert_entry`.
const PRECERT_ENTRY: u16 = 1;

/// Errors decoding a logged entry.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EntryError {
    /// The entry bytes end before the structure does.
    #[error("truncated entry: needed {needed} more bytes reading {context}")]
    Truncated {
        /// Bytes missing.
        needed: usize,
        /// What was being read.
        context: &'static str,
    },

    /// Unknown `MerkleTreeLeaf` version.
    #[error("unsupported leaf version {0}")]
    UnsupportedVersion(u8),

    /// Unknown leaf type.
    #[error("unsupported merkle leaf type {0}")]
    UnsupportedLeafType(u8),

    /// Precert entries (or unknown types) carry no directly submittable
    /// certificate.
    #[error("unsupported log entry type {0}")]
    UnsupportedEntryType(u16),

    /// The embedded certificate failed to parse.
    #[error(transparent)]
    Cert(#[from] CertError),
}

/// A decoded `x509_entry`: the logged leaf certificate and the chain the
/// submitter presented with it.
#[derive(Debug)]
pub struct ParsedEntry {
    /// The logged end-entity certificate.
    pub leaf: Certificate,
    /// Submitted chain certificates, in submission order.
    pub chain: Vec<Certificate>,
}

/// Decodes an `x509_entry` leaf input plus its `extra_data` chain.
///
/// # Errors
///
/// Returns [`EntryError::UnsupportedEntryType`] for precert entries and
/// structural errors for malformed input. A malformed `extra_data` chain
/// after a valid certificate is an error; nothing is silently dropped.
pub fn parse_entry(entry: &LeafEntry) -> Result<ParsedEntry, EntryError> {
    let mut input = Reader::new(&entry.leaf_input);

    let version = input.u8("leaf version")?;
    if version != 0 {
        return Err(EntryError::UnsupportedVersion(version));
    }
    let leaf_type = input.u8("merkle leaf type")?;
    if leaf_type != TIMESTAMPED_ENTRY {
        return Err(EntryError::UnsupportedLeafType(leaf_type));
    }
    let _timestamp = input.u64("timestamp")?;
    let entry_type = input.u16("entry type")?;
    match entry_type {
        X509_ENTRY => {},
        PRECERT_ENTRY => return Err(EntryError::UnsupportedEntryType(entry_type)),
        other => return Err(EntryError::UnsupportedEntryType(other)),
    }

    let der = input.u24_vector("leaf certificate")?;
    let leaf = Certificate::from_der(der)?;

    let chain = parse_chain(&entry.extra_data)?;
    Ok(ParsedEntry { leaf, chain })
}

/// Decodes the `ASN.1Cert chain<0..2^24-1>` structure of an
/// `x509_entry`'s `extra_data`. Empty input is an empty chain.
fn parse_chain(extra_data: &[u8]) -> Result<Vec<Certificate>, EntryError> {
    if extra_data.is_empty() {
        return Ok(Vec::new());
    }
    let mut outer = Reader::new(extra_data);
    let chain_bytes = outer.u24_vector("certificate chain")?;
    let mut inner = Reader::new(chain_bytes);
    let mut chain = Vec::new();
    while !inner.is_empty() {
        let der = inner.u24_vector("chain certificate")?;
        chain.push(Certificate::from_der(der)?);
    }
    Ok(chain)
}

struct Reader<'a> {
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn take(&mut self, n: usize, context: &'static str) -> Result<&'a [u8], EntryError> {
        if self.bytes.len() < n {
            return Err(EntryError::Truncated {
                needed: n - self.bytes.len(),
                context,
            });
        }
        let (head, tail) = self.bytes.split_at(n);
        self.bytes = tail;
        Ok(head)
    }

    fn u8(&mut self, context: &'static str) -> Result<u8, EntryError> {
        Ok(self.take(1, context)?[0])
    }

    fn u16(&mut self, context: &'static str) -> Result<u16, EntryError> {
        let b = self.take(2, context)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u64(&mut self, context: &'static str) -> Result<u64, EntryError> {
        let b = self.take(8, context)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(b);
        Ok(u64::from_be_bytes(buf))
    }

    /// Reads a 24-bit length prefix followed by that many bytes.
    fn u24_vector(&mut self, context: &'static str) -> Result<&'a [u8], EntryError> {
        let b = self.take(3, context)?;
        let len = usize::from(b[0]) << 16 | usize::from(b[1]) << 8 | usize::from(b[2]);
        self.take(len, context)
    }
}

/// Encodes an `x509_entry` leaf input for a DER certificate.
///
/// The inverse of [`parse_entry`]'s leaf decoding; used by tests and
/// tooling that synthesize log entries.
#[must_use]
pub fn encode_x509_leaf_input(timestamp: u64, der: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(15 + der.len());
    out.push(0); // version v1
    out.push(TIMESTAMPED_ENTRY);
    out.extend_from_slice(&timestamp.to_be_bytes());
    out.extend_from_slice(&X509_ENTRY.to_be_bytes());
    push_u24(&mut out, der.len());
    out.extend_from_slice(der);
    out.extend_from_slice(&[0, 0]); // empty CtExtensions
    out
}

/// Encodes an `x509_entry` `extra_data` chain for DER certificates.
#[must_use]
pub fn encode_chain_extra_data(ders: &[&[u8]]) -> Vec<u8> {
    let total: usize = ders.iter().map(|d| d.len() + 3).sum();
    let mut out = Vec::with_capacity(total + 3);
    push_u24(&mut out, total);
    for der in ders {
        push_u24(&mut out, der.len());
        out.extend_from_slice(der);
    }
    out
}

fn push_u24(out: &mut Vec<u8>, len: usize) {
    debug_assert!(len < 1 << 24);
    out.push((len >> 16) as u8);
    out.push((len >> 8) as u8);
    out.push(len as u8);
}
