//! Run configuration for the dispatcher and transfer engine.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Semaphore;

use super::client::TransferOptions;
use super::constants::{
    CONNECT_TIMEOUT_SECS, DEFAULT_BLOCKED_HOSTS, DEFAULT_CHUNK_SIZE, DEFAULT_CONCURRENCY,
    DEFAULT_DOWNLOAD_DIR, DEFAULT_MAX_BACKOFF, REQUEST_TIMEOUT_SECS,
};
use super::retry::{DEFAULT_MAX_RETRIES, RetryPolicy};

/// Invalid configuration value.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Concurrency must admit at least one transfer.
    #[error("invalid concurrency value {value}: must be between 1 and {}", Semaphore::MAX_PERMITS)]
    InvalidConcurrency {
        /// The rejected value.
        value: usize,
    },

    /// Chunk size must be at least one byte.
    #[error("invalid chunk size {value}: must be at least 1 byte")]
    InvalidChunkSize {
        /// The rejected value.
        value: usize,
    },

    /// A timeout was zero.
    #[error("invalid {field}: must be greater than zero")]
    InvalidTimeout {
        /// Which timeout was rejected.
        field: &'static str,
    },
}

/// Everything a dispatcher run needs.
///
/// There is no process-wide download directory: each run carries its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadConfig {
    /// Target directory, created if absent.
    pub download_dir: PathBuf,
    /// Maximum transfers in flight at once (≥ 1).
    pub max_concurrent: usize,
    /// Largest slice written (and reported) per progress step (≥ 1).
    pub chunk_size: usize,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// First backoff sleep; doubles per attempt.
    pub backoff_base: Duration,
    /// Upper bound for any single backoff sleep.
    pub max_backoff: Duration,
    /// Whole-request timeout, body included (> 0).
    pub request_timeout: Duration,
    /// TCP/TLS connect timeout (> 0).
    pub connect_timeout: Duration,
    /// Domain suffixes the prober refuses without network I/O.
    pub blocked_hosts: Vec<String>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from(DEFAULT_DOWNLOAD_DIR),
            max_concurrent: DEFAULT_CONCURRENCY,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: RetryPolicy::default().backoff_base(),
            max_backoff: DEFAULT_MAX_BACKOFF,
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            blocked_hosts: DEFAULT_BLOCKED_HOSTS
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

impl DownloadConfig {
    /// Config with defaults and the given target directory.
    #[must_use]
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            download_dir: download_dir.into(),
            ..Self::default()
        }
    }

    /// Checks the bounds every run depends on.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent == 0 || self.max_concurrent > Semaphore::MAX_PERMITS {
            return Err(ConfigError::InvalidConcurrency {
                value: self.max_concurrent,
            });
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidChunkSize {
                value: self.chunk_size,
            });
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout {
                field: "request timeout",
            });
        }
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout {
                field: "connect timeout",
            });
        }
        Ok(())
    }

    /// Retry policy derived from the retry fields.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.backoff_base).with_max_delay(self.max_backoff)
    }

    /// Per-transfer options derived from this config.
    #[must_use]
    pub fn transfer_options(&self) -> TransferOptions {
        TransferOptions {
            chunk_size: self.chunk_size,
            retry_policy: self.retry_policy(),
        }
    }
}
