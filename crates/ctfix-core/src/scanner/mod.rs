//! Concurrent log-entry fetching.
//!
//! A [`Fetcher`] partitions `[start_index, end_index)` into batches via
//! [`range_stream`] and fans them out to `parallel_fetch` worker tasks
//! pulling from one shared feed. Each range is consumed by exactly one
//! worker; within a range the worker re-requests until the log has
//! returned every entry, so short reads never lose data. Retrieval errors
//! are retried under the injected [`RetryPolicy`] until cancellation.
//!
//! # Ordering
//!
//! Entries within one [`EntryBatch`] are index-ordered and contiguous. No
//! ordering holds across workers; the callback must tolerate concurrent
//! invocation. Absent cancellation every index in
//! `[start_index, end_index)` is delivered exactly once; cancellation may
//! leave an undelivered suffix, never a duplicate.
//!
//! # Termination
//!
//! Workers distinguish two exits: the feed closing ("no more work") and
//! the cancellation token firing. `run` waits for every worker either way.

mod retry;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub use retry::RetryPolicy;

use crate::client::{ClientError, LeafEntry, LogClient, SignedTreeHead};

/// Capacity of the range feed; the generator stays one range ahead of the
/// workers.
const RANGE_FEED_CAPACITY: usize = 1;

/// Configuration for a [`Fetcher`].
#[derive(Debug, Clone)]
pub struct FetcherOptions {
    /// Number of entries to request per batch.
    pub batch_size: u64,
    /// Number of concurrent fetch workers.
    pub parallel_fetch: usize,
    /// First index to fetch (inclusive).
    pub start_index: u64,
    /// End of the fetch interval (exclusive). Zero means "to the current
    /// tree size", resolved during `prepare`.
    pub end_index: u64,
}

impl Default for FetcherOptions {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            parallel_fetch: 1,
            start_index: 0,
            end_index: 0,
        }
    }
}

/// A contiguous, index-ordered slice of log entries.
#[derive(Debug, Clone)]
pub struct EntryBatch {
    /// Index of the first entry in the batch.
    pub start: u64,
    /// The entries, in index order.
    pub entries: Vec<LeafEntry>,
}

/// A unit of fetch work: an inclusive index range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchRange {
    /// First index, inclusive.
    pub start: u64,
    /// Last index, inclusive.
    pub end: u64,
}

/// Produces the batch ranges covering `[start, end)`.
///
/// Ranges are emitted lazily through a channel: contiguous, disjoint, each
/// at most `batch_size` long. The producer stops early when `cancel`
/// fires, so a cancelled consumer never leaves it blocked. `end <= start`
/// or a zero `batch_size` yields an empty stream.
#[must_use]
pub fn range_stream(
    start: u64,
    end: u64,
    batch_size: u64,
    cancel: CancellationToken,
) -> mpsc::Receiver<FetchRange> {
    let (tx, rx) = mpsc::channel(RANGE_FEED_CAPACITY);
    tokio::spawn(async move {
        if batch_size == 0 {
            warn!("batch_size is zero, nothing to fetch");
            return;
        }
        let mut next = start;
        while next < end {
            let batch_end = end.min(next + batch_size);
            let range = FetchRange {
                start: next,
                end: batch_end - 1,
            };
            tokio::select! {
                () = cancel.cancelled() => {
                    warn!(remaining_from = next, "range generation cancelled");
                    return;
                },
                sent = tx.send(range) => {
                    if sent.is_err() {
                        // All workers are gone.
                        return;
                    }
                },
            }
            next = batch_end;
        }
    });
    rx
}

/// Fetches entries from a CT log with bounded concurrency.
///
/// Not safe for concurrent `prepare`/`run` on one instance; callers
/// serialize those. The callback, by contrast, must tolerate concurrent
/// invocation from multiple workers.
pub struct Fetcher<C> {
    client: Arc<C>,
    opts: FetcherOptions,
    retry: RetryPolicy,
    cancel: CancellationToken,
    sth: Option<SignedTreeHead>,
}

impl<C: LogClient + 'static> Fetcher<C> {
    /// Creates a fetcher over `client` with the given options.
    #[must_use]
    pub fn new(client: Arc<C>, opts: FetcherOptions) -> Self {
        Self {
            client,
            opts,
            retry: RetryPolicy::default(),
            cancel: CancellationToken::new(),
            sth: None,
        }
    }

    /// Replaces the retry policy applied between failed retrievals.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Uses an externally owned cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The STH cached by `prepare`, if any.
    #[must_use]
    pub fn sth(&self) -> Option<&SignedTreeHead> {
        self.sth.as_ref()
    }

    /// Current fetch options (bounds may have been clamped by `prepare`).
    #[must_use]
    pub fn options(&self) -> &FetcherOptions {
        &self.opts
    }

    /// Queries the log's current STH, caches it, and clamps `end_index`
    /// to the tree size when unset or too large.
    ///
    /// # Errors
    ///
    /// Returns the transport/protocol error from `get-sth`; this is fatal
    /// to the fetch.
    pub async fn prepare(&mut self) -> Result<SignedTreeHead, ClientError> {
        let sth = match self.client.get_sth().await {
            Ok(sth) => sth,
            Err(e) => {
                error!(error = %e, "get-sth failed");
                return Err(e);
            },
        };
        info!(tree_size = sth.tree_size, "got STH");

        if self.opts.end_index == 0 || self.opts.end_index > sth.tree_size {
            warn!(
                from = self.opts.end_index,
                to = sth.tree_size,
                "clamping end_index to tree size"
            );
            self.opts.end_index = sth.tree_size;
        }
        self.sth = Some(sth.clone());
        Ok(sth)
    }

    /// Fetches the configured range, invoking `callback` once per
    /// successfully retrieved batch. Blocks until the range is drained or
    /// cancellation has been observed by every worker.
    ///
    /// Worker-level fetch errors are retried internally and never
    /// surfaced here.
    ///
    /// # Errors
    ///
    /// Returns an error only if an implicit `prepare` fails.
    pub async fn run<F>(&mut self, callback: F) -> Result<(), ClientError>
    where
        F: Fn(EntryBatch) + Send + Sync + 'static,
    {
        debug!("starting up fetcher");
        if self.sth.is_none() {
            self.prepare().await?;
        }

        let ranges = range_stream(
            self.opts.start_index,
            self.opts.end_index,
            self.opts.batch_size,
            self.cancel.clone(),
        );
        let feed = Arc::new(Mutex::new(ranges));
        let callback = Arc::new(callback);

        let mut workers = Vec::with_capacity(self.opts.parallel_fetch.max(1));
        for idx in 0..self.opts.parallel_fetch.max(1) {
            let worker = Worker {
                client: Arc::clone(&self.client),
                feed: Arc::clone(&feed),
                callback: Arc::clone(&callback),
                retry: self.retry.clone(),
                cancel: self.cancel.clone(),
            };
            workers.push(tokio::spawn(async move {
                debug!(worker = idx, "fetcher worker starting");
                worker.run().await;
                debug!(worker = idx, "fetcher worker finished");
            }));
        }
        for handle in workers {
            if let Err(e) = handle.await {
                error!(error = %e, "fetcher worker panicked");
            }
        }
        debug!("fetcher terminated");
        Ok(())
    }
}

struct Worker<C, F> {
    client: Arc<C>,
    feed: Arc<Mutex<mpsc::Receiver<FetchRange>>>,
    callback: Arc<F>,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl<C, F> Worker<C, F>
where
    C: LogClient,
    F: Fn(EntryBatch) + Send + Sync,
{
    async fn run(&self) {
        loop {
            let next = {
                let mut feed = self.feed.lock().await;
                tokio::select! {
                    () = self.cancel.cancelled() => return,
                    range = feed.recv() => range,
                }
            };
            let Some(range) = next else {
                // Feed closed: no more work.
                return;
            };
            if !self.fetch_range(range).await {
                return;
            }
        }
    }

    /// Retrieves one range completely. Returns `false` if cancellation
    /// interrupted the retrieval.
    async fn fetch_range(&self, mut range: FetchRange) -> bool {
        let mut attempt: u32 = 0;
        // Logs may return fewer entries than requested; keep re-requesting
        // the remainder until the whole range has been delivered.
        while range.start <= range.end {
            if self.cancel.is_cancelled() {
                warn!(start = range.start, end = range.end, "worker cancelled mid-range");
                return false;
            }
            match self.client.get_raw_entries(range.start, range.end).await {
                Ok(resp) if resp.entries.is_empty() => {
                    // An empty success makes no forward progress; treat it
                    // like a transient failure.
                    attempt += 1;
                    if !self.pause(attempt).await {
                        return false;
                    }
                },
                Ok(resp) => {
                    let remaining = usize::try_from(range.end - range.start + 1)
                        .unwrap_or(usize::MAX);
                    let mut entries = resp.entries;
                    if entries.len() > remaining {
                        warn!(
                            got = entries.len(),
                            want = remaining,
                            "log returned more entries than requested, truncating"
                        );
                        entries.truncate(remaining);
                    }
                    let count = entries.len() as u64;
                    (self.callback)(EntryBatch {
                        start: range.start,
                        entries,
                    });
                    range.start += count;
                    attempt = 0;
                },
                Err(e) => {
                    error!(
                        start = range.start,
                        end = range.end,
                        error = %e,
                        "get-entries failed, will retry"
                    );
                    attempt += 1;
                    if !self.pause(attempt).await {
                        return false;
                    }
                },
            }
        }
        true
    }

    /// Sleeps per the retry policy; returns `false` when cancellation
    /// fired during the pause.
    async fn pause(&self, attempt: u32) -> bool {
        let delay = self.retry.delay_for_attempt(attempt);
        if delay.is_zero() {
            return !self.cancel.is_cancelled();
        }
        tokio::select! {
            () = self.cancel.cancelled() => false,
            () = tokio::time::sleep(delay) => true,
        }
    }
}
