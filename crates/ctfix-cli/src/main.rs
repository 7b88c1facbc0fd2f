//! ctfix - scan a CT log and repair broken certificate chains.
//!
//! Reads entries from a log, verifies each entry's chain against a trusted
//! root bundle, attempts to repair chains that fail strict verification
//! from issuers seen elsewhere in the scan, and optionally submits
//! repaired chains to a second log.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use ctfix_core::cert::{Certificate, CertificateStore, Chain, RootSet};
use ctfix_core::client::entry::{parse_entry, EntryError};
use ctfix_core::client::HttpLogClient;
use ctfix_core::fix::{FixErrorKind, Fixer, IssuerSource, X509Verifier};
use ctfix_core::scanner::{Fetcher, FetcherOptions};
use ctfix_core::submit::LogPoster;
use ctfix_core::ScanConfig;

/// ctfix - CT log scanner and chain fixer
#[derive(Parser, Debug)]
#[command(name = "ctfix")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Base URL of the log to scan (overrides the config file)
    #[arg(long)]
    log_url: Option<String>,

    /// Entries requested per get-entries call
    #[arg(long)]
    batch_size: Option<u64>,

    /// Concurrent fetch workers
    #[arg(long)]
    parallel_fetch: Option<usize>,

    /// First entry index to scan
    #[arg(long)]
    start_index: Option<u64>,

    /// End of the scan interval, exclusive (0 = current tree size)
    #[arg(long)]
    end_index: Option<u64>,

    /// PEM bundle of trusted roots
    #[arg(long)]
    roots: Option<PathBuf>,

    /// Base URL of the log to submit repaired chains to
    #[arg(long)]
    submit_url: Option<String>,

    /// Log filter (tracing `EnvFilter` syntax)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    /// Resolves the effective configuration: file first, then flag
    /// overrides.
    fn into_config(self) -> Result<ScanConfig> {
        let mut config = match &self.config {
            Some(path) => ScanConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => ScanConfig::new(
                self.log_url
                    .as_deref()
                    .context("either --config or --log-url is required")?,
            ),
        };
        if let Some(url) = self.log_url {
            config.log_url = url;
        }
        if let Some(n) = self.batch_size {
            config.batch_size = n;
        }
        if let Some(n) = self.parallel_fetch {
            config.parallel_fetch = n;
        }
        if let Some(n) = self.start_index {
            config.start_index = n;
        }
        if let Some(n) = self.end_index {
            config.end_index = n;
        }
        if let Some(path) = self.roots {
            config.root_bundle = Some(path);
        }
        if let Some(url) = self.submit_url {
            config.submit_url = Some(url);
        }
        config.validate()?;
        Ok(config)
    }
}

/// Per-run counters reported in the final summary.
#[derive(Default)]
struct Stats {
    entries: AtomicU64,
    undecodable: AtomicU64,
    verified: AtomicU64,
    repaired: AtomicU64,
    unfixable: AtomicU64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = args.into_config()?;

    let roots = match &config.root_bundle {
        Some(path) => {
            let pem = std::fs::read(path)
                .with_context(|| format!("reading root bundle {}", path.display()))?;
            let roots = RootSet::from_pem_bundle(&pem)?;
            info!(count = roots.len(), "loaded trusted roots");
            roots
        },
        None => {
            warn!(
                "no root bundle configured; verification cannot anchor and \
                 every entry will be reported unfixable"
            );
            RootSet::new()
        },
    };
    let roots = Arc::new(roots);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, shutting down");
                cancel.cancel();
            }
        });
    }

    let scan_client = Arc::new(HttpLogClient::new(&config.log_url)?);
    let store = Arc::new(CertificateStore::new());
    let issuers: Arc<dyn IssuerSource> = store.clone();
    let fixer = Arc::new(Fixer::new(X509Verifier::new(), issuers));
    let stats = Arc::new(Stats::default());

    // Repaired chains go to a dedicated submission task so slow posts
    // never stall the fetch workers.
    let (chain_tx, poster_handle) = match &config.submit_url {
        Some(url) => {
            let poster = LogPoster::new(Arc::new(HttpLogClient::new(url)?));
            // Unbounded because the fetch callback is synchronous and must
            // never block a worker on a slow submission.
            let (tx, mut rx) = mpsc::unbounded_channel::<Chain>();
            let handle = tokio::spawn(async move {
                let mut posted: u64 = 0;
                while let Some(chain) = rx.recv().await {
                    match poster.post_chain(&chain).await {
                        Ok(_) => posted += 1,
                        Err(e) => error!(error = %e, "chain submission failed"),
                    }
                }
                posted
            });
            (Some(tx), Some(handle))
        },
        None => (None, None),
    };

    let mut fetcher = Fetcher::new(
        scan_client,
        FetcherOptions {
            batch_size: config.batch_size,
            parallel_fetch: config.parallel_fetch,
            start_index: config.start_index,
            end_index: config.end_index,
        },
    )
    .with_retry_policy(config.retry.clone())
    .with_cancellation(cancel.clone());

    let cb_store = Arc::clone(&store);
    let cb_fixer = Arc::clone(&fixer);
    let cb_roots = Arc::clone(&roots);
    let cb_stats = Arc::clone(&stats);
    let cb_tx = chain_tx.clone();
    fetcher
        .run(move |batch| {
            for (offset, raw) in batch.entries.iter().enumerate() {
                cb_stats.entries.fetch_add(1, Ordering::Relaxed);
                let parsed = match parse_entry(raw) {
                    Ok(parsed) => parsed,
                    Err(EntryError::UnsupportedEntryType(_)) => continue,
                    Err(e) => {
                        warn!(
                            index = batch.start + offset as u64,
                            error = %e,
                            "skipping undecodable entry"
                        );
                        cb_stats.undecodable.fetch_add(1, Ordering::Relaxed);
                        continue;
                    },
                };
                let leaf = cb_store.add(parsed.leaf);
                let chain: Vec<Arc<Certificate>> =
                    parsed.chain.into_iter().map(|c| cb_store.add(c)).collect();

                let outcome = cb_fixer.handle_chain(&leaf, &chain, &cb_roots);
                if outcome.errors.is_empty() {
                    cb_stats.verified.fetch_add(1, Ordering::Relaxed);
                } else if outcome.is_success() {
                    cb_stats.repaired.fetch_add(1, Ordering::Relaxed);
                } else {
                    cb_stats.unfixable.fetch_add(1, Ordering::Relaxed);
                }
                for err in &outcome.errors {
                    if err.kind == FixErrorKind::FixFailed {
                        warn!(
                            leaf = %err.leaf,
                            leaf_hash = %err.leaf_hash,
                            chain = ?err.chain,
                            "unfixable chain"
                        );
                    }
                }
                if let Some(tx) = &cb_tx {
                    for chain in outcome.chains {
                        if tx.send(chain).is_err() {
                            return;
                        }
                    }
                }
            }
        })
        .await
        .context("fetching log entries")?;

    drop(chain_tx);
    let posted = match poster_handle {
        Some(handle) => handle.await.context("submission task failed")?,
        None => 0,
    };

    info!(
        entries = stats.entries.load(Ordering::Relaxed),
        undecodable = stats.undecodable.load(Ordering::Relaxed),
        verified = stats.verified.load(Ordering::Relaxed),
        repaired = stats.repaired.load(Ordering::Relaxed),
        unfixable = stats.unfixable.load(Ordering::Relaxed),
        posted,
        store_size = store.len(),
        "scan complete"
    );
    Ok(())
}
