//! Per-resource request and outcome types shared by the engine and dispatcher.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::DownloadError;

/// A single resource to fetch: its URL and an optional explicit filename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequest {
    url: String,
    filename: Option<String>,
}

impl ResourceRequest {
    /// Creates a request whose local name is derived from the URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            filename: None,
        }
    }

    /// Sets an explicit local filename (still sanitized before use).
    #[must_use]
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Returns the source URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the explicit filename, if any.
    #[must_use]
    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }
}

impl From<&str> for ResourceRequest {
    fn from(url: &str) -> Self {
        Self::new(url)
    }
}

impl From<String> for ResourceRequest {
    fn from(url: String) -> Self {
        Self::new(url)
    }
}

/// Terminal result of one transfer.
#[derive(Debug)]
pub enum Outcome {
    /// The resource is fully on disk at this path.
    Success(PathBuf),
    /// The transfer gave up; any partial file is left in place.
    Failure(DownloadError),
}

impl Outcome {
    /// Returns true for [`Outcome::Success`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns the saved path on success.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Success(path) => Some(path),
            Self::Failure(_) => None,
        }
    }

    /// Returns the terminal error on failure.
    #[must_use]
    pub fn error(&self) -> Option<&DownloadError> {
        match self {
            Self::Success(_) => None,
            Self::Failure(error) => Some(error),
        }
    }
}

/// What one Transfer Engine invocation produced.
#[derive(Debug)]
pub struct TransferResult {
    /// The requested URL (never the redirected one).
    pub url: String,
    /// Sanitized local filename.
    pub filename: String,
    /// Number of HTTP attempts made (0 when the request never left the process).
    pub attempts: u32,
    /// Size of the destination file when the transfer ended.
    pub bytes_on_disk: u64,
    /// Success or failure.
    pub outcome: Outcome,
}

impl TransferResult {
    /// Number of retries beyond the first attempt.
    #[must_use]
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}
