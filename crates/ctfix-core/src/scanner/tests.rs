use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use proptest::prelude::*;
use tokio_util::sync::CancellationToken;

use super::{range_stream, EntryBatch, FetchRange, Fetcher, FetcherOptions, RetryPolicy};
use crate::client::{
    AddChainResponse, ClientError, GetEntriesResponse, LeafEntry, LogClient, SignedTreeHead,
};

/// In-memory log serving synthetic entries whose `leaf_input` encodes
/// their own index, so delivery can be checked end to end.
struct MockLogClient {
    tree_size: u64,
    /// Cap on entries returned per call, exercising short reads.
    max_per_call: u64,
    fail_sth: bool,
    fail_entries: bool,
    entry_calls: AtomicUsize,
}

impl MockLogClient {
    fn new(tree_size: u64) -> Self {
        Self {
            tree_size,
            max_per_call: u64::MAX,
            fail_sth: false,
            fail_entries: false,
            entry_calls: AtomicUsize::new(0),
        }
    }

    fn with_max_per_call(mut self, max: u64) -> Self {
        self.max_per_call = max;
        self
    }

    fn entry_for(index: u64) -> LeafEntry {
        LeafEntry {
            leaf_input: index.to_be_bytes().to_vec(),
            extra_data: Vec::new(),
        }
    }

    fn index_of(entry: &LeafEntry) -> u64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&entry.leaf_input);
        u64::from_be_bytes(buf)
    }
}

#[async_trait]
impl LogClient for MockLogClient {
    async fn get_sth(&self) -> Result<SignedTreeHead, ClientError> {
        if self.fail_sth {
            return Err(ClientError::Decode {
                url: "mock".into(),
                reason: "sth unavailable".into(),
            });
        }
        Ok(SignedTreeHead {
            tree_size: self.tree_size,
            timestamp: 0,
            sha256_root_hash: vec![0; 32],
            tree_head_signature: Vec::new(),
        })
    }

    async fn get_raw_entries(
        &self,
        start: u64,
        end: u64,
    ) -> Result<GetEntriesResponse, ClientError> {
        self.entry_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_entries {
            return Err(ClientError::Decode {
                url: "mock".into(),
                reason: "entries unavailable".into(),
            });
        }
        assert!(start <= end, "inverted range requested");
        assert!(end < self.tree_size, "range beyond tree size requested");
        let stop = end.min(start.saturating_add(self.max_per_call - 1));
        Ok(GetEntriesResponse {
            entries: (start..=stop).map(Self::entry_for).collect(),
        })
    }

    async fn add_chain(&self, _chain: &[Vec<u8>]) -> Result<AddChainResponse, ClientError> {
        Ok(AddChainResponse::default())
    }
}

async fn collect_ranges(start: u64, end: u64, batch_size: u64) -> Vec<FetchRange> {
    let mut rx = range_stream(start, end, batch_size, CancellationToken::new());
    let mut out = Vec::new();
    while let Some(r) = rx.recv().await {
        out.push(r);
    }
    out
}

fn assert_covering(ranges: &[FetchRange], start: u64, end: u64, batch_size: u64) {
    let mut next = start;
    for r in ranges {
        assert_eq!(r.start, next, "ranges must be contiguous and disjoint");
        assert!(r.end >= r.start);
        assert!(r.end - r.start + 1 <= batch_size, "range exceeds batch size");
        next = r.end + 1;
    }
    assert_eq!(next, end, "ranges must cover the interval exactly");
}

#[tokio::test]
async fn ranges_cover_the_interval() {
    let ranges = collect_ranges(3, 47, 10).await;
    assert_covering(&ranges, 3, 47, 10);
}

#[tokio::test]
async fn ranges_handle_exact_multiple() {
    let ranges = collect_ranges(0, 30, 10).await;
    assert_eq!(
        ranges,
        vec![
            FetchRange { start: 0, end: 9 },
            FetchRange { start: 10, end: 19 },
            FetchRange { start: 20, end: 29 },
        ]
    );
}

#[tokio::test]
async fn empty_interval_yields_no_ranges() {
    assert!(collect_ranges(10, 10, 5).await.is_empty());
    assert!(collect_ranges(10, 4, 5).await.is_empty());
}

#[tokio::test]
async fn zero_batch_size_yields_no_ranges() {
    assert!(collect_ranges(0, 100, 0).await.is_empty());
}

#[tokio::test]
async fn cancelled_stream_yields_a_prefix() {
    let cancel = CancellationToken::new();
    let mut rx = range_stream(0, 1000, 10, cancel.clone());
    let first = rx.recv().await.unwrap();
    assert_eq!(first, FetchRange { start: 0, end: 9 });
    cancel.cancel();
    let mut got = vec![first];
    while let Some(r) = rx.recv().await {
        got.push(r);
    }
    // Whatever was delivered is still a contiguous prefix.
    let delivered_end = got.last().unwrap().end + 1;
    assert_covering(&got, 0, delivered_end, 10);
    assert!(got.len() < 100, "cancellation must stop generation early");
}

proptest! {
    #[test]
    fn ranges_always_partition_the_interval(
        start in 0u64..1_000,
        len in 0u64..500,
        batch_size in 1u64..64,
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let ranges = rt.block_on(collect_ranges(start, start + len, batch_size));
        assert_covering(&ranges, start, start + len, batch_size);
    }
}

#[tokio::test]
async fn fetcher_delivers_every_index_exactly_once() {
    let client = Arc::new(MockLogClient::new(100).with_max_per_call(3));
    let mut fetcher = Fetcher::new(
        client,
        FetcherOptions {
            batch_size: 10,
            parallel_fetch: 3,
            start_index: 0,
            end_index: 0,
        },
    );
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    fetcher
        .run(move |batch: EntryBatch| {
            let mut seen = sink.lock().unwrap();
            for (offset, entry) in batch.entries.iter().enumerate() {
                let index = MockLogClient::index_of(entry);
                assert_eq!(index, batch.start + offset as u64, "batch must be contiguous");
                seen.push(index);
            }
        })
        .await
        .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 100);
    let distinct: HashSet<u64> = seen.iter().copied().collect();
    assert_eq!(distinct.len(), 100, "no index may be delivered twice");
    assert!(distinct.contains(&0) && distinct.contains(&99));
}

#[tokio::test]
async fn prepare_clamps_end_index_to_tree_size() {
    let client = Arc::new(MockLogClient::new(50));
    let mut fetcher = Fetcher::new(
        client,
        FetcherOptions {
            batch_size: 10,
            parallel_fetch: 1,
            start_index: 0,
            end_index: 10_000,
        },
    );
    let sth = fetcher.prepare().await.unwrap();
    assert_eq!(sth.tree_size, 50);
    assert_eq!(fetcher.options().end_index, 50);
    assert!(fetcher.sth().is_some());
}

#[tokio::test]
async fn explicit_end_index_within_tree_is_kept() {
    let client = Arc::new(MockLogClient::new(50));
    let mut fetcher = Fetcher::new(
        client,
        FetcherOptions {
            batch_size: 10,
            parallel_fetch: 1,
            start_index: 0,
            end_index: 20,
        },
    );
    fetcher.prepare().await.unwrap();
    assert_eq!(fetcher.options().end_index, 20);

    let count = Arc::new(AtomicU64::new(0));
    let sink = Arc::clone(&count);
    fetcher
        .run(move |batch: EntryBatch| {
            sink.fetch_add(batch.entries.len() as u64, Ordering::SeqCst);
        })
        .await
        .unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 20);
}

#[tokio::test]
async fn sth_failure_is_fatal_to_run() {
    let mut client = MockLogClient::new(10);
    client.fail_sth = true;
    let mut fetcher = Fetcher::new(Arc::new(client), FetcherOptions::default());
    let err = fetcher.run(|_| {}).await.unwrap_err();
    assert!(matches!(err, ClientError::Decode { .. }));
}

#[tokio::test]
async fn persistent_entry_failures_retry_until_cancelled() {
    let mut client = MockLogClient::new(10);
    client.fail_entries = true;
    let client = Arc::new(client);
    let cancel = CancellationToken::new();
    let mut fetcher = Fetcher::new(
        Arc::clone(&client),
        FetcherOptions {
            batch_size: 5,
            parallel_fetch: 1,
            start_index: 0,
            end_index: 0,
        },
    )
    .with_retry_policy(RetryPolicy::Fixed {
        delay: std::time::Duration::from_millis(1),
    })
    .with_cancellation(cancel.clone());

    let handle = tokio::spawn(async move {
        fetcher
            .run(|_| panic!("no batch can succeed here"))
            .await
    });
    // Let the worker accumulate a few failed attempts before cancelling.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    cancel.cancel();
    handle.await.unwrap().unwrap();
    assert!(client.entry_calls.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn single_worker_delivers_in_order() {
    let client = Arc::new(MockLogClient::new(25).with_max_per_call(4));
    let mut fetcher = Fetcher::new(
        client,
        FetcherOptions {
            batch_size: 7,
            parallel_fetch: 1,
            start_index: 0,
            end_index: 0,
        },
    );
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    fetcher
        .run(move |batch: EntryBatch| {
            let mut seen = sink.lock().unwrap();
            for entry in &batch.entries {
                seen.push(MockLogClient::index_of(entry));
            }
        })
        .await
        .unwrap();
    let seen = seen.lock().unwrap();
    assert_eq!(*seen, (0..25).collect::<Vec<u64>>());
}
