//! Chain submission.
//!
//! [`LogPoster`] sends repaired chains to a log's `add-chain` endpoint.
//! Submission is one-shot: a failed post is reported, never retried,
//! because the chain itself is already persisted upstream and a duplicate
//! submission would only earn a duplicate SCT.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::cert::Chain;
use crate::client::{AddChainResponse, LogClient};
use crate::fix::FixError;

/// Posts certificate chains to a CT log.
pub struct LogPoster<C> {
    client: Arc<C>,
}

impl<C: LogClient> LogPoster<C> {
    /// Creates a poster over `client`.
    #[must_use]
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }

    /// Submits `chain` (leaf first) for inclusion.
    ///
    /// An empty chain is a valid submission; the log decides whether to
    /// accept it.
    ///
    /// # Errors
    ///
    /// Returns a [`FixError`] with kind `LogPostFailed` when the log
    /// rejects the chain or the transport fails.
    pub async fn post_chain(&self, chain: &Chain) -> Result<AddChainResponse, FixError> {
        let ders: Vec<Vec<u8>> = chain.certs().iter().map(|c| c.der().to_vec()).collect();
        match self.client.add_chain(&ders).await {
            Ok(resp) => {
                debug!(chain_len = chain.len(), "chain accepted by log");
                Ok(resp)
            },
            Err(e) => {
                warn!(chain_len = chain.len(), error = %e, "add-chain failed");
                Err(FixError::log_post_failed(chain, &e))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::cert::Certificate;
    use crate::client::{ClientError, GetEntriesResponse, SignedTreeHead};
    use crate::fix::FixErrorKind;
    use crate::testpki::TestPki;

    struct MockLog {
        fail: bool,
        posts: AtomicUsize,
        last_len: AtomicUsize,
    }

    impl MockLog {
        fn new(fail: bool) -> Self {
            Self {
                fail,
                posts: AtomicUsize::new(0),
                last_len: AtomicUsize::new(usize::MAX),
            }
        }
    }

    #[async_trait]
    impl LogClient for MockLog {
        async fn get_sth(&self) -> Result<SignedTreeHead, ClientError> {
            unreachable!("poster never queries the STH")
        }

        async fn get_raw_entries(
            &self,
            _start: u64,
            _end: u64,
        ) -> Result<GetEntriesResponse, ClientError> {
            unreachable!("poster never fetches entries")
        }

        async fn add_chain(&self, chain: &[Vec<u8>]) -> Result<AddChainResponse, ClientError> {
            self.posts.fetch_add(1, Ordering::SeqCst);
            self.last_len.store(chain.len(), Ordering::SeqCst);
            if self.fail {
                return Err(ClientError::Status {
                    url: "mock".into(),
                    status: 502,
                    body: "bad gateway".into(),
                });
            }
            Ok(AddChainResponse::default())
        }
    }

    fn test_chain() -> Chain {
        let pki = TestPki::new();
        Chain::from_certs(vec![pki.leaf, pki.intermediate2, pki.intermediate1, pki.root])
            .unwrap()
    }

    #[tokio::test]
    async fn successful_post_returns_the_sct() {
        let log = Arc::new(MockLog::new(false));
        let poster = LogPoster::new(Arc::clone(&log));
        poster.post_chain(&test_chain()).await.unwrap();
        assert_eq!(log.posts.load(Ordering::SeqCst), 1);
        assert_eq!(log.last_len.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn failed_post_maps_to_log_post_failed() {
        let log = Arc::new(MockLog::new(true));
        let poster = LogPoster::new(Arc::clone(&log));
        let err = poster.post_chain(&test_chain()).await.unwrap_err();
        assert_eq!(err.kind, FixErrorKind::LogPostFailed);
        assert_eq!(log.posts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_post_is_not_retried() {
        let log = Arc::new(MockLog::new(true));
        let poster = LogPoster::new(Arc::clone(&log));
        let _ = poster.post_chain(&test_chain()).await;
        assert_eq!(log.posts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_chain_is_a_valid_submission() {
        let log = Arc::new(MockLog::new(false));
        let poster = LogPoster::new(Arc::clone(&log));
        let empty = Chain::from_certs(Vec::<Arc<Certificate>>::new()).unwrap();
        poster.post_chain(&empty).await.unwrap();
        assert_eq!(log.last_len.load(Ordering::SeqCst), 0);
    }
}
