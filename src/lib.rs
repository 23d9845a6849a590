//! Batchfetch Core Library
//!
//! This library provides the core functionality for the batchfetch tool,
//! which concurrently fetches lists of HTTP(S) resources into a local
//! directory with resume, retry, and progress reporting.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`download`] - Transfer engine, concurrency dispatcher, prober, observers
//! - [`telemetry`] - Durable delivery of structured log records to a collector

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod download;
pub mod telemetry;
#[cfg(test)]
pub(crate) mod test_support;
pub(crate) mod user_agent;

// Re-export commonly used types
pub use download::{
    ChannelObserver, ConfigError, DEFAULT_BLOCKED_HOSTS, DEFAULT_CHUNK_SIZE, DEFAULT_CONCURRENCY,
    DEFAULT_MAX_RETRIES, Destination, DownloadConfig, DownloadEngine, DownloadError,
    DownloadEvent, DownloadObserver, EngineError, FailureType, HttpClient, ObserverError, Outcome,
    ProbeResult, Prober, ResourceRequest, RetryDecision, RetryPolicy, Summary, TransferOptions,
    TransferResult, TransferStatus, classify_error, fallback_filename, filename_from_url,
    resolve_destination, sanitize_filename,
};
pub use telemetry::{LogSpooler, SpoolConfig, SpoolError, SpoolHandle, SpoolMakeWriter};
