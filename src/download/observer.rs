//! Progress and status reporting for presentation layers.
//!
//! Two forms are offered: implement [`DownloadObserver`] directly, or use
//! [`ChannelObserver`] and drain [`DownloadEvent`]s on a task of your own.
//! Observer failures never affect a transfer. Errors and panics raised by a
//! callback are logged and dropped.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Terminal status of one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    /// The file is fully on disk.
    Completed,
    /// The transfer gave up.
    Failed,
}

impl TransferStatus {
    /// Lowercase name, as used in log fields and JSON.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error an observer may return from a callback. Always swallowed.
#[derive(Debug, Error)]
pub enum ObserverError {
    /// The receiving side of a channel observer is gone.
    #[error("observer receiver disconnected")]
    Disconnected,

    /// Any other observer-specific failure.
    #[error("observer failed: {0}")]
    Other(String),
}

/// Callbacks invoked by the transfer engine and the dispatcher.
///
/// `on_progress` runs zero or more times per resource with non-decreasing
/// `downloaded` values. `on_status` runs exactly once per resource, after
/// its transfer ends. Callbacks run on the transfer's task and should return
/// quickly.
pub trait DownloadObserver: Send + Sync {
    /// Bytes of `filename` now on disk, and the declared total if known.
    ///
    /// # Errors
    ///
    /// Any error is logged and ignored by the caller.
    fn on_progress(
        &self,
        filename: &str,
        downloaded: u64,
        total: Option<u64>,
    ) -> Result<(), ObserverError> {
        let _ = (filename, downloaded, total);
        Ok(())
    }

    /// Terminal status of `filename`; `info` is the saved path or the error text.
    ///
    /// # Errors
    ///
    /// Any error is logged and ignored by the caller.
    fn on_status(
        &self,
        filename: &str,
        status: TransferStatus,
        info: &str,
    ) -> Result<(), ObserverError> {
        let _ = (filename, status, info);
        Ok(())
    }
}

/// Observer callbacks as messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DownloadEvent {
    Progress {
        filename: String,
        downloaded_bytes: u64,
        total_bytes: Option<u64>,
    },
    Status {
        filename: String,
        status: TransferStatus,
        info: String,
    },
}

impl DownloadEvent {
    /// Filename the event refers to.
    #[must_use]
    pub fn filename(&self) -> &str {
        match self {
            Self::Progress { filename, .. } | Self::Status { filename, .. } => filename,
        }
    }
}

/// Observer that forwards every callback over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    sender: mpsc::UnboundedSender<DownloadEvent>,
}

impl ChannelObserver {
    /// Creates the observer and the receiver its events arrive on.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DownloadEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    fn send(&self, event: DownloadEvent) -> Result<(), ObserverError> {
        self.sender
            .send(event)
            .map_err(|_| ObserverError::Disconnected)
    }
}

impl DownloadObserver for ChannelObserver {
    fn on_progress(
        &self,
        filename: &str,
        downloaded: u64,
        total: Option<u64>,
    ) -> Result<(), ObserverError> {
        self.send(DownloadEvent::Progress {
            filename: filename.to_string(),
            downloaded_bytes: downloaded,
            total_bytes: total,
        })
    }

    fn on_status(
        &self,
        filename: &str,
        status: TransferStatus,
        info: &str,
    ) -> Result<(), ObserverError> {
        self.send(DownloadEvent::Status {
            filename: filename.to_string(),
            status,
            info: info.to_string(),
        })
    }
}

impl<T: DownloadObserver + ?Sized> DownloadObserver for Arc<T> {
    fn on_progress(
        &self,
        filename: &str,
        downloaded: u64,
        total: Option<u64>,
    ) -> Result<(), ObserverError> {
        (**self).on_progress(filename, downloaded, total)
    }

    fn on_status(
        &self,
        filename: &str,
        status: TransferStatus,
        info: &str,
    ) -> Result<(), ObserverError> {
        (**self).on_status(filename, status, info)
    }
}

/// Calls `on_progress`, isolating errors and panics.
pub(crate) fn notify_progress(
    observer: &dyn DownloadObserver,
    filename: &str,
    downloaded: u64,
    total: Option<u64>,
) {
    match catch_unwind(AssertUnwindSafe(|| {
        observer.on_progress(filename, downloaded, total)
    })) {
        Ok(Ok(())) => {}
        Ok(Err(error)) => debug!(filename, error = %error, "progress observer failed"),
        Err(_) => warn!(filename, "progress observer panicked"),
    }
}

/// Calls `on_status`, isolating errors and panics.
pub(crate) fn notify_status(
    observer: &dyn DownloadObserver,
    filename: &str,
    status: TransferStatus,
    info: &str,
) {
    match catch_unwind(AssertUnwindSafe(|| observer.on_status(filename, status, info))) {
        Ok(Ok(())) => {}
        Ok(Err(error)) => debug!(filename, %status, error = %error, "status observer failed"),
        Err(_) => warn!(filename, %status, "status observer panicked"),
    }
}

/// Per-resource progress forwarder that keeps reported values monotonic.
///
/// Lives for the whole transfer, across attempts. When a server ignores a
/// range request the position drops back to zero; nothing is reported again
/// until it reaches the previous high water mark.
pub(crate) struct ProgressReporter<'a> {
    observer: Option<&'a dyn DownloadObserver>,
    filename: &'a str,
    position: u64,
    total: Option<u64>,
    high_water: u64,
}

impl<'a> ProgressReporter<'a> {
    pub(crate) fn new(observer: Option<&'a dyn DownloadObserver>, filename: &'a str) -> Self {
        Self {
            observer,
            filename,
            position: 0,
            total: None,
            high_water: 0,
        }
    }

    /// Resets the position for a new attempt starting at `offset`.
    pub(crate) fn start(&mut self, offset: u64, total: Option<u64>) {
        self.position = offset;
        self.total = total;
    }

    /// Records `bytes` more on disk and reports the new position.
    pub(crate) fn advance(&mut self, bytes: u64) {
        self.position = self.position.saturating_add(bytes);
        self.report();
    }

    /// Marks the file as complete at its current size.
    pub(crate) fn finish(&mut self, size: u64) {
        self.position = size;
        self.total = Some(size);
        self.report();
    }

    pub(crate) fn position(&self) -> u64 {
        self.position
    }

    #[cfg(test)]
    pub(crate) fn total(&self) -> Option<u64> {
        self.total
    }

    fn report(&mut self) {
        let Some(observer) = self.observer else {
            return;
        };
        if self.position < self.high_water {
            return;
        }
        self.high_water = self.position;
        notify_progress(observer, self.filename, self.position, self.total);
    }
}
