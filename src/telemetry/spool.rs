//! Log spooler: at-least-once HTTP delivery backed by a local spool file.
//!
//! The spool file holds one record per line, oldest first. Records leave it
//! only after the collector acknowledged them with a 2xx status.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::SpoolMakeWriter;
use crate::user_agent;

/// How often the spool is retried when no new records arrive.
const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(30);

/// Per-POST timeout.
const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from the spool file or the delivery client.
#[derive(Debug, Error)]
pub enum SpoolError {
    /// Reading or writing the spool file failed.
    #[error("spool file {path}: {source}")]
    Io {
        /// The spool (or temporary) file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The delivery client could not be built.
    #[error("cannot build log delivery client: {0}")]
    Client(#[source] reqwest::Error),
}

impl SpoolError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Where and how often to deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpoolConfig {
    /// Collector URL receiving one JSON record per POST.
    pub endpoint: String,
    /// Local file holding undelivered records.
    pub spool_path: PathBuf,
    /// Idle interval between spool drain attempts.
    pub flush_interval: Duration,
    /// Timeout for a single POST.
    pub request_timeout: Duration,
}

impl SpoolConfig {
    #[must_use]
    pub fn new(endpoint: impl Into<String>, spool_path: impl Into<PathBuf>) -> Self {
        Self {
            endpoint: endpoint.into(),
            spool_path: spool_path.into(),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            request_timeout: DEFAULT_DELIVERY_TIMEOUT,
        }
    }
}

/// Background worker delivering log records.
#[derive(Debug, Clone)]
pub struct LogSpooler {
    config: SpoolConfig,
    client: reqwest::Client,
}

impl LogSpooler {
    /// Builds the worker and its delivery client.
    ///
    /// # Errors
    ///
    /// Returns [`SpoolError::Client`] if the HTTP client cannot be built.
    pub fn new(config: SpoolConfig) -> Result<Self, SpoolError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(user_agent::default_user_agent())
            .build()
            .map_err(SpoolError::Client)?;
        Ok(Self { config, client })
    }

    #[must_use]
    pub fn config(&self) -> &SpoolConfig {
        &self.config
    }

    /// Starts the worker on the current runtime.
    ///
    /// The task ends when every clone of the returned writer is dropped or
    /// [`SpoolHandle::shutdown`] is called, after a final delivery pass.
    #[must_use]
    pub fn spawn(self) -> (SpoolMakeWriter, SpoolHandle) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(self.run(receiver, shutdown_rx));
        (SpoolMakeWriter::new(sender), SpoolHandle { shutdown, task })
    }

    /// Worker loop: wakes on new records and on the flush tick.
    ///
    /// On shutdown (signal sent or its sender dropped) the records already
    /// queued are processed once more before the final drain.
    pub async fn run(
        self,
        mut receiver: mpsc::UnboundedReceiver<String>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        let mut ticker = tokio::time::interval(self.config.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                received = receiver.recv() => {
                    let Some(first) = received else {
                        break;
                    };
                    let mut batch = vec![first];
                    while let Ok(record) = receiver.try_recv() {
                        batch.push(record);
                    }
                    self.process_logged(&batch).await;
                }
                _ = &mut shutdown => {
                    let mut batch = Vec::new();
                    while let Ok(record) = receiver.try_recv() {
                        batch.push(record);
                    }
                    self.process_logged(&batch).await;
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(error) = self.drain_spool().await {
                        warn!(error = %error, "log spool drain failed");
                    }
                }
            }
        }

        if let Err(error) = self.drain_spool().await {
            warn!(error = %error, "final log spool drain failed");
        }
    }

    async fn process_logged(&self, batch: &[String]) {
        if batch.is_empty() {
            return;
        }
        if let Err(error) = self.process_batch(batch).await {
            warn!(error = %error, "log spool batch failed");
        }
    }

    /// Drains the spool, then delivers `batch` in order.
    ///
    /// Records that cannot be delivered (including all of `batch` when older
    /// records are still spooled) are appended to the spool file.
    ///
    /// # Errors
    ///
    /// Returns [`SpoolError::Io`] when the spool file cannot be read or written.
    pub async fn process_batch(&self, batch: &[String]) -> Result<(), SpoolError> {
        if self.drain_spool().await? > 0 {
            return self.append_to_spool(batch).await;
        }

        for (index, record) in batch.iter().enumerate() {
            if !self.deliver(record).await {
                return self.append_to_spool(&batch[index..]).await;
            }
        }
        Ok(())
    }

    /// Delivers spooled records oldest first, stopping at the first failure.
    ///
    /// Returns how many records remain spooled.
    ///
    /// # Errors
    ///
    /// Returns [`SpoolError::Io`] when the spool file cannot be read or rewritten.
    pub async fn drain_spool(&self) -> Result<usize, SpoolError> {
        let records = self.read_spool().await?;
        if records.is_empty() {
            return Ok(0);
        }

        let mut delivered = 0;
        for record in &records {
            if !self.deliver(record).await {
                break;
            }
            delivered += 1;
        }

        let remaining = &records[delivered..];
        if delivered > 0 {
            debug!(delivered, remaining = remaining.len(), "drained log spool");
            self.rewrite_spool(remaining).await?;
        }
        Ok(remaining.len())
    }

    async fn deliver(&self, record: &str) -> bool {
        let response = self
            .client
            .post(&self.config.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(record.to_string())
            .send()
            .await;
        match response {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                debug!(status = response.status().as_u16(), "collector rejected log record");
                false
            }
            Err(error) => {
                debug!(error = %error, "log delivery failed");
                false
            }
        }
    }

    async fn read_spool(&self) -> Result<Vec<String>, SpoolError> {
        let path = &self.config.spool_path;
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(content
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(ToString::to_string)
                .collect()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(error) => Err(SpoolError::io(path, error)),
        }
    }

    async fn append_to_spool(&self, records: &[String]) -> Result<(), SpoolError> {
        if records.is_empty() {
            return Ok(());
        }
        let path = &self.config.spool_path;
        ensure_parent(path).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| SpoolError::io(path, e))?;
        file.write_all(join_records(records).as_bytes())
            .await
            .map_err(|e| SpoolError::io(path, e))?;
        file.flush().await.map_err(|e| SpoolError::io(path, e))
    }

    /// Replaces the spool with `records` via a temporary file and rename.
    async fn rewrite_spool(&self, records: &[String]) -> Result<(), SpoolError> {
        let path = &self.config.spool_path;
        if records.is_empty() {
            return match tokio::fs::remove_file(path).await {
                Ok(()) => Ok(()),
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(error) => Err(SpoolError::io(path, error)),
            };
        }

        let mut temp_name = path.as_os_str().to_owned();
        temp_name.push(".tmp");
        let temp_path = PathBuf::from(temp_name);
        tokio::fs::write(&temp_path, join_records(records))
            .await
            .map_err(|e| SpoolError::io(&temp_path, e))?;
        tokio::fs::rename(&temp_path, path)
            .await
            .map_err(|e| SpoolError::io(path, e))
    }
}

/// Stops a spawned [`LogSpooler`].
#[derive(Debug)]
pub struct SpoolHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl SpoolHandle {
    /// Signals the worker and waits for its final delivery pass.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(error) = self.task.await {
            warn!(error = %error, "log spool worker panicked");
        }
    }
}

fn join_records(records: &[String]) -> String {
    let mut joined = String::new();
    for record in records {
        joined.push_str(record.trim_end_matches(['\r', '\n']));
        joined.push('\n');
    }
    joined
}

async fn ensure_parent(path: &Path) -> Result<(), SpoolError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| SpoolError::io(parent, e)),
        _ => Ok(()),
    }
}
