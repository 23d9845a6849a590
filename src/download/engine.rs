//! Concurrency dispatcher: runs a batch of transfers under a bounded gate.
//!
//! # Example
//!
//! ```no_run
//! use batchfetch_core::{DownloadConfig, DownloadEngine};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = DownloadEngine::new(DownloadConfig::new("./downloads"))?;
//! let summary = engine
//!     .run(["https://example.com/a.pdf", "https://example.com/b.pdf"], None)
//!     .await?;
//! println!("ok: {}, failed: {}", summary.successful(), summary.failed());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use super::config::{ConfigError, DownloadConfig};
use super::error::DownloadError;
use super::filename::resolve_destination;
use super::observer::{DownloadObserver, TransferStatus, notify_status};
use super::request::{Outcome, ResourceRequest, TransferResult};
use super::HttpClient;

/// Faults that stop a run before any resource is processed.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The configuration failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The download directory could not be created.
    #[error("cannot create download directory {path}: {source}")]
    CreateDir {
        /// The directory that could not be created.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The shared HTTP client could not be built.
    #[error("cannot build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// Semaphore was closed unexpectedly.
    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,
}

/// Aggregate result of a run, one [`TransferResult`] per input in input order.
#[derive(Debug, Default)]
pub struct Summary {
    results: Vec<TransferResult>,
}

impl Summary {
    /// Number of resources fully on disk.
    #[must_use]
    pub fn successful(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.outcome.is_success())
            .count()
    }

    /// Number of resources that gave up.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.total() - self.successful()
    }

    /// Number of resources processed.
    #[must_use]
    pub fn total(&self) -> usize {
        self.results.len()
    }

    /// Total backoff sleeps taken across the run.
    #[must_use]
    pub fn retried(&self) -> u64 {
        self.results.iter().map(|r| u64::from(r.retries())).sum()
    }

    #[must_use]
    pub fn results(&self) -> &[TransferResult] {
        &self.results
    }

    #[must_use]
    pub fn into_results(self) -> Vec<TransferResult> {
        self.results
    }
}

/// Runs batches of transfers with at most `max_concurrent` in flight.
///
/// # Concurrency Model
///
/// - Each resource runs in its own Tokio task
/// - A semaphore permit is acquired before a task is spawned
/// - The permit is released when the task ends (RAII), success or not
/// - A failing or panicking task never affects the others
#[derive(Debug, Clone)]
pub struct DownloadEngine {
    config: DownloadConfig,
}

impl DownloadEngine {
    /// Creates an engine after validating `config`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] when a bound is violated.
    #[instrument(level = "debug", skip(config), fields(dir = %config.download_dir.display()))]
    pub fn new(config: DownloadConfig) -> Result<Self, EngineError> {
        config.validate()?;
        debug!(
            concurrency = config.max_concurrent,
            chunk_size = config.chunk_size,
            max_retries = config.max_retries,
            "creating download engine"
        );
        Ok(Self { config })
    }

    #[must_use]
    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Returns the configured concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.config.max_concurrent
    }

    /// Fetches every request and reports each outcome.
    ///
    /// `observer` receives progress from every transfer and exactly one
    /// status per request. Per-resource failures never fail the run.
    ///
    /// # Errors
    ///
    /// Fails only before any transfer starts: the directory cannot be
    /// created or the client cannot be built. [`EngineError::SemaphoreClosed`]
    /// cannot happen while the engine owns the semaphore.
    #[instrument(skip_all, fields(dir = %self.config.download_dir.display()))]
    pub async fn run<I>(
        &self,
        requests: I,
        observer: Option<Arc<dyn DownloadObserver>>,
    ) -> Result<Summary, EngineError>
    where
        I: IntoIterator,
        I::Item: Into<ResourceRequest>,
    {
        let download_dir = self.config.download_dir.clone();
        tokio::fs::create_dir_all(&download_dir)
            .await
            .map_err(|source| EngineError::CreateDir {
                path: download_dir.clone(),
                source,
            })?;

        let client =
            HttpClient::try_with_timeouts(self.config.connect_timeout, self.config.request_timeout)
                .map_err(EngineError::Client)?;
        let options = Arc::new(self.config.transfer_options());
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent));

        info!(concurrency = self.config.max_concurrent, "starting batch");

        let mut pending = Vec::new();
        for request in requests {
            let request: ResourceRequest = request.into();
            let destination = resolve_destination(&download_dir, &request);

            // Blocks while the limit is reached.
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|_| EngineError::SemaphoreClosed)?;

            let client = client.clone();
            let options = Arc::clone(&options);
            let observer = observer.clone();
            let url = request.url().to_string();
            let filename = destination.filename.clone();

            let handle = tokio::spawn(async move {
                // Permit is dropped when this block exits (RAII)
                let _permit = permit;

                let result = client
                    .fetch_to(&url, destination, &options, observer.as_deref())
                    .await;

                if let Some(observer) = observer.as_deref() {
                    report_status(observer, &result);
                }
                result
            });
            pending.push((request, filename, handle));
        }

        debug!(task_count = pending.len(), "waiting for transfers to complete");

        let mut results = Vec::with_capacity(pending.len());
        for (request, filename, handle) in pending {
            match handle.await {
                Ok(result) => results.push(result),
                Err(join_error) => {
                    warn!(
                        url = %request.url(),
                        filename = %filename,
                        error = %join_error,
                        "transfer task panicked"
                    );
                    let error = DownloadError::aborted(request.url(), join_error.to_string());
                    if let Some(observer) = observer.as_deref() {
                        notify_status(observer, &filename, TransferStatus::Failed, &error.to_string());
                    }
                    results.push(TransferResult {
                        url: request.url().to_string(),
                        bytes_on_disk: 0,
                        filename,
                        attempts: 0,
                        outcome: Outcome::Failure(error),
                    });
                }
            }
        }

        let summary = Summary { results };
        info!(
            successful = summary.successful(),
            failed = summary.failed(),
            retried = summary.retried(),
            total = summary.total(),
            "batch complete"
        );
        Ok(summary)
    }
}

fn report_status(observer: &dyn DownloadObserver, result: &TransferResult) {
    match &result.outcome {
        Outcome::Success(path) => notify_status(
            observer,
            &result.filename,
            TransferStatus::Completed,
            &path.display().to_string(),
        ),
        Outcome::Failure(error) => notify_status(
            observer,
            &result.filename,
            TransferStatus::Failed,
            &error.to_string(),
        ),
    }
}
