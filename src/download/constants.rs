//! Constants for the download module (timeouts, sizes, defaults).

use std::time::Duration;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default per-request timeout (5 minutes for large files).
pub const REQUEST_TIMEOUT_SECS: u64 = 300;

/// Default number of transfers allowed to run at once.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Default streaming chunk size in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Default target directory, relative to the working directory.
pub const DEFAULT_DOWNLOAD_DIR: &str = "downloads";

/// Upper bound for a single backoff sleep.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Hosts that serve players or feeds rather than downloadable files.
pub const DEFAULT_BLOCKED_HOSTS: &[&str] = &[
    "youtube.com",
    "youtu.be",
    "vimeo.com",
    "facebook.com",
    "instagram.com",
    "tiktok.com",
    "twitter.com",
    "x.com",
];
