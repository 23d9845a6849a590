//! Concurrent, resumable HTTP(S) transfers.
//!
//! # Components
//!
//! - [`sanitize_filename`] / [`resolve_destination`]: safe local names that
//!   always resolve inside the download directory
//! - [`Prober`]: HEAD-then-ranged-GET check of whether a URL is a file
//! - [`HttpClient::fetch`]: one resource with resume, retry and progress
//! - [`DownloadEngine::run`]: a batch under a bounded concurrency gate
//! - [`DownloadObserver`] / [`ChannelObserver`]: progress and status callbacks
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use batchfetch_core::download::{ChannelObserver, DownloadConfig, DownloadEngine};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (observer, mut events) = ChannelObserver::new();
//! tokio::spawn(async move {
//!     while let Some(event) = events.recv().await {
//!         println!("{event:?}");
//!     }
//! });
//!
//! let engine = DownloadEngine::new(DownloadConfig::new("./downloads"))?;
//! let summary = engine
//!     .run(["https://example.com/paper.pdf"], Some(Arc::new(observer)))
//!     .await?;
//! println!("{} of {} saved", summary.successful(), summary.total());
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod constants;
mod engine;
mod error;
mod filename;
mod observer;
mod probe;
mod request;
mod retry;

pub use client::{HttpClient, TransferOptions};
pub use config::{ConfigError, DownloadConfig};
pub use constants::{
    CONNECT_TIMEOUT_SECS, DEFAULT_BLOCKED_HOSTS, DEFAULT_CHUNK_SIZE, DEFAULT_CONCURRENCY,
    DEFAULT_DOWNLOAD_DIR, DEFAULT_MAX_BACKOFF, REQUEST_TIMEOUT_SECS,
};
pub use engine::{DownloadEngine, EngineError, Summary};
pub use error::DownloadError;
pub use filename::{
    Destination, fallback_filename, filename_from_url, resolve_destination, sanitize_filename,
};
pub use observer::{ChannelObserver, DownloadEvent, DownloadObserver, ObserverError, TransferStatus};
pub use probe::{ProbeResult, Prober};
pub use request::{Outcome, ResourceRequest, TransferResult};
pub use retry::{DEFAULT_MAX_RETRIES, FailureType, RetryDecision, RetryPolicy, classify_error};

// Note: no module-local Result aliases; signatures spell out
// `Result<T, DownloadError>` and friends.
