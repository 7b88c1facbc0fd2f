//! CT log REST client.
//!
//! Models the three upstream operations the system needs: `get-sth`,
//! `get-entries`, and `add-chain` (RFC 6962 v1 paths). The [`LogClient`]
//! trait abstracts the transport so the fetcher and poster can be driven
//! by an in-memory log in tests.

mod error;
pub mod entry;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use error::ClientError;

/// Connect timeout for log requests.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Overall request timeout for log requests.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// A log's signed attestation of its current tree.
///
/// Opaque beyond `tree_size`, which bounds the fetch interval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedTreeHead {
    /// Number of entries in the log.
    pub tree_size: u64,
    /// Log-reported timestamp, milliseconds since epoch.
    pub timestamp: u64,
    /// Root hash of the Merkle tree.
    #[serde(with = "b64")]
    pub sha256_root_hash: Vec<u8>,
    /// Signature over the tree head.
    #[serde(with = "b64")]
    pub tree_head_signature: Vec<u8>,
}

/// One log-recorded entry, as returned by `get-entries`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeafEntry {
    /// TLS-encoded `MerkleTreeLeaf`.
    #[serde(with = "b64")]
    pub leaf_input: Vec<u8>,
    /// Entry-type-dependent auxiliary data (certificate chain).
    #[serde(default, with = "b64")]
    pub extra_data: Vec<u8>,
}

/// Response to `get-entries`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetEntriesResponse {
    /// Entries for the requested range; may be fewer than requested,
    /// never more, never out of order.
    pub entries: Vec<LeafEntry>,
}

#[derive(Debug, Serialize)]
struct AddChainRequest {
    #[serde(with = "b64_list")]
    chain: Vec<Vec<u8>>,
}

/// Signed certificate timestamp returned by a successful `add-chain`.
///
/// Fields are lenient: older logs omit some of them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddChainResponse {
    /// SCT version.
    #[serde(default)]
    pub sct_version: u8,
    /// Log ID.
    #[serde(default, with = "b64")]
    pub id: Vec<u8>,
    /// Log timestamp, milliseconds since epoch.
    #[serde(default)]
    pub timestamp: u64,
    /// CT extensions, base64 as transmitted.
    #[serde(default)]
    pub extensions: String,
    /// SCT signature.
    #[serde(default, with = "b64")]
    pub signature: Vec<u8>,
}

/// Transport abstraction over a CT log.
#[async_trait]
pub trait LogClient: Send + Sync {
    /// Requests the log's current signed tree head.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] on transport or protocol failure.
    async fn get_sth(&self) -> Result<SignedTreeHead, ClientError>;

    /// Requests raw entries for the inclusive index range `[start, end]`.
    ///
    /// The log may return fewer entries than requested; callers must
    /// re-request the remainder.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] on transport or protocol failure.
    async fn get_raw_entries(
        &self,
        start: u64,
        end: u64,
    ) -> Result<GetEntriesResponse, ClientError>;

    /// Submits a certificate chain (DER, leaf first) for inclusion.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] on transport or protocol failure.
    async fn add_chain(&self, chain: &[Vec<u8>]) -> Result<AddChainResponse, ClientError>;
}

/// `reqwest`-backed log client.
#[derive(Debug, Clone)]
pub struct HttpLogClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpLogClient {
    /// Creates a client for the log at `base_url` (scheme + host +
    /// optional prefix, e.g. `https://ct.googleapis.com/pilot`).
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidUrl`] for an empty URL and a
    /// transport error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let base_url = base_url.into();
        let trimmed = base_url.trim_end_matches('/').to_string();
        if trimmed.is_empty() {
            return Err(ClientError::InvalidUrl {
                url: base_url,
                reason: "must not be empty".to_string(),
            });
        }
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|source| ClientError::Transport {
                url: trimmed.clone(),
                source,
            })?;
        Ok(Self {
            base_url: trimmed,
            http,
        })
    }

    /// The configured base URL, without trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, suffix: &str) -> String {
        format!("{}/ct/v1/{suffix}", self.base_url)
    }

    async fn check(response: reqwest::Response, url: &str) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "unable to read response body".to_string());
        Err(ClientError::Status {
            url: url.to_string(),
            status: status.as_u16(),
            body,
        })
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        url: &str,
    ) -> Result<T, ClientError> {
        response.json().await.map_err(|e| ClientError::Decode {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl LogClient for HttpLogClient {
    async fn get_sth(&self) -> Result<SignedTreeHead, ClientError> {
        let url = self.endpoint("get-sth");
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| ClientError::Transport {
                url: url.clone(),
                source,
            })?;
        let response = Self::check(response, &url).await?;
        Self::decode(response, &url).await
    }

    async fn get_raw_entries(
        &self,
        start: u64,
        end: u64,
    ) -> Result<GetEntriesResponse, ClientError> {
        let url = self.endpoint("get-entries");
        let response = self
            .http
            .get(&url)
            .query(&[("start", start), ("end", end)])
            .send()
            .await
            .map_err(|source| ClientError::Transport {
                url: url.clone(),
                source,
            })?;
        let response = Self::check(response, &url).await?;
        Self::decode(response, &url).await
    }

    async fn add_chain(&self, chain: &[Vec<u8>]) -> Result<AddChainResponse, ClientError> {
        let url = self.endpoint("add-chain");
        let body = AddChainRequest {
            chain: chain.to_vec(),
        };
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|source| ClientError::Transport {
                url: url.clone(),
                source,
            })?;
        let response = Self::check(response, &url).await?;
        Self::decode(response, &url).await
    }
}

/// Serde adapter for base64-encoded byte fields (CT JSON wire format).
mod b64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for lists of base64-encoded byte strings.
mod b64_list {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::ser::SerializeSeq;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(
        items: &[Vec<u8>],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(items.len()))?;
        for item in items {
            seq.serialize_element(&STANDARD.encode(item))?;
        }
        seq.end()
    }
}
