//! Log client error types.

use thiserror::Error;

/// Errors talking to a CT log over HTTP.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// The configured log URL is unusable.
    #[error("invalid log URL {url:?}: {reason}")]
    InvalidUrl {
        /// The offending URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Transport-level failure (connect, TLS, timeout).
    #[error("transport error for {url}: {source}")]
    Transport {
        /// Request URL.
        url: String,
        /// Underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The log answered with a non-success status.
    #[error("log returned status {status} for {url}: {body}")]
    Status {
        /// Request URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },

    /// The response body could not be decoded.
    #[error("failed to decode response from {url}: {reason}")]
    Decode {
        /// Request URL.
        url: String,
        /// Decoding failure detail.
        reason: String,
    },
}
