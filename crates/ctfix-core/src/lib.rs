//! Core library for scanning CT logs and repairing certificate chains.
//!
//! # Architecture
//!
//! - [`client`]: REST client for the log's `get-sth`, `get-entries`, and
//!   `add-chain` endpoints, plus TLS-struct entry decoding.
//! - [`scanner`]: concurrent entry fetcher with exactly-once delivery
//!   over a configured index interval.
//! - [`cert`]: certificate, chain, root-set, and issuer-store types built
//!   on content hashes.
//! - [`fix`]: strict chain verification and the repair pass that rebuilds
//!   broken chains from known issuers.
//! - [`submit`]: one-shot submission of repaired chains to a log.
//! - [`config`]: TOML run configuration.

pub mod cert;
pub mod client;
pub mod config;
pub mod fix;
pub mod scanner;
pub mod submit;

#[cfg(test)]
pub(crate) mod testpki;

pub use cert::{CertError, Certificate, CertificateStore, Chain, RootSet};
pub use client::{HttpLogClient, LogClient};
pub use config::{ConfigError, ScanConfig};
pub use fix::{FixError, FixErrorKind, FixOutcome, Fixer, X509Verifier};
pub use scanner::{EntryBatch, Fetcher, FetcherOptions, RetryPolicy};
pub use submit::LogPoster;
