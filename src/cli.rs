//! CLI argument definitions using clap derive macros.
//!
//! Tuning flags are optional so that config-file values apply when a flag
//! is absent. Precedence is flag, then config file, then built-in default.

use std::path::PathBuf;

use clap::Parser;

use crate::app_config::{
    MAX_BACKOFF_BASE_SECS, MAX_CHUNK_SIZE, MAX_CONCURRENT_LIMIT, MAX_RETRIES_LIMIT,
    MAX_TIMEOUT_SECS,
};

/// Download many HTTP(S) resources concurrently, with resume and retry.
///
/// URLs come from the command line, or one per line on stdin when none are
/// given. Lines starting with `#` are ignored.
#[derive(Parser, Debug)]
#[command(name = "batchfetch")]
#[command(author, version, about)]
pub struct Args {
    /// URLs to download (reads stdin when omitted)
    pub urls: Vec<String>,

    /// Directory receiving the downloaded files [default: downloads]
    #[arg(short = 'd', long)]
    pub download_dir: Option<PathBuf>,

    /// Maximum concurrent transfers [default: 5]
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u16).range(1..=MAX_CONCURRENT_LIMIT as i64))]
    pub max_concurrent: Option<u16>,

    /// Write buffer size in bytes [default: 8192]
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=MAX_CHUNK_SIZE))]
    pub chunk_size: Option<u64>,

    /// Retries after the first attempt [default: 3]
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u32).range(0..=MAX_RETRIES_LIMIT as i64))]
    pub max_retries: Option<u32>,

    /// Base of the exponential backoff, in seconds [default: 1]
    #[arg(long, value_parser = parse_backoff_secs)]
    pub backoff_base: Option<f64>,

    /// Per-request timeout in seconds [default: 300]
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=MAX_TIMEOUT_SECS))]
    pub timeout: Option<u64>,

    /// Connection timeout in seconds [default: 30]
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=MAX_TIMEOUT_SECS))]
    pub connect_timeout: Option<u64>,

    /// Block a host (and its subdomains) in probe mode; repeatable.
    /// Replaces the built-in list.
    #[arg(long = "block-host", value_name = "HOST")]
    pub block_hosts: Vec<String>,

    /// Classify each URL as downloadable or not, without downloading
    #[arg(long)]
    pub probe: bool,

    /// Print probe verdicts as JSON lines
    #[arg(long, requires = "probe")]
    pub json: bool,

    /// Config file path [default: $XDG_CONFIG_HOME/batchfetch/config.toml]
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Also write JSON log records to this file
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Deliver JSON log records to this HTTP collector
    #[arg(long, value_name = "URL")]
    pub log_endpoint: Option<String>,

    /// Spool file for log records the collector has not acknowledged
    #[arg(long, value_name = "PATH", requires = "log_endpoint")]
    pub log_spool: Option<PathBuf>,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

fn parse_backoff_secs(raw: &str) -> Result<f64, String> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| format!("`{raw}` is not a number"))?;
    if !value.is_finite() || !(0.0..=MAX_BACKOFF_BASE_SECS).contains(&value) {
        return Err(format!("{value} is not in 0..={MAX_BACKOFF_BASE_SECS}"));
    }
    Ok(value)
}
