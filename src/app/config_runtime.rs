use std::path::PathBuf;
use std::time::Duration;

use batchfetch_core::DownloadConfig;

use crate::app_config::FileConfig;
use crate::cli::Args;

/// Where structured log records go besides stderr.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct LogSettings {
    pub(crate) file: Option<PathBuf>,
    pub(crate) endpoint: Option<String>,
    pub(crate) spool: Option<PathBuf>,
}

/// Default spool file used when an endpoint is set without a spool path.
pub(crate) fn default_spool_path(download_dir: &std::path::Path) -> PathBuf {
    download_dir.join(".batchfetch-log-spool.jsonl")
}

/// Flag, then config file, then built-in default.
pub(crate) fn resolve_download_config(args: &Args, file: &FileConfig) -> DownloadConfig {
    let defaults = DownloadConfig::default();

    let blocked_hosts = if args.block_hosts.is_empty() {
        file.blocked_hosts.clone().unwrap_or(defaults.blocked_hosts)
    } else {
        args.block_hosts.clone()
    };

    DownloadConfig {
        download_dir: args
            .download_dir
            .clone()
            .or_else(|| file.download_dir.clone())
            .unwrap_or(defaults.download_dir),
        max_concurrent: args
            .max_concurrent
            .map(usize::from)
            .or(file.max_concurrent)
            .unwrap_or(defaults.max_concurrent),
        chunk_size: args
            .chunk_size
            .and_then(|size| usize::try_from(size).ok())
            .or(file.chunk_size)
            .unwrap_or(defaults.chunk_size),
        max_retries: args
            .max_retries
            .or(file.max_retries)
            .unwrap_or(defaults.max_retries),
        backoff_base: args
            .backoff_base
            .or(file.backoff_base_secs)
            .map_or(defaults.backoff_base, Duration::from_secs_f64),
        max_backoff: defaults.max_backoff,
        request_timeout: args
            .timeout
            .or(file.timeout_secs)
            .map_or(defaults.request_timeout, Duration::from_secs),
        connect_timeout: args
            .connect_timeout
            .or(file.connect_timeout_secs)
            .map_or(defaults.connect_timeout, Duration::from_secs),
        blocked_hosts,
    }
}

pub(crate) fn resolve_log_settings(
    args: &Args,
    file: &FileConfig,
    download_dir: &std::path::Path,
) -> LogSettings {
    let endpoint = args
        .log_endpoint
        .clone()
        .or_else(|| file.log_endpoint.clone());
    let spool = endpoint.as_ref().map(|_| {
        args.log_spool
            .clone()
            .or_else(|| file.log_spool.clone())
            .unwrap_or_else(|| default_spool_path(download_dir))
    });
    LogSettings {
        file: args.log_file.clone().or_else(|| file.log_file.clone()),
        endpoint,
        spool,
    }
}

/// Default stderr level from `-q` / `-v`.
pub(crate) fn resolve_default_log_level(args: &Args) -> &'static str {
    if args.quiet {
        return "error";
    }
    match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// An explicit `-q`/`-v` wins over `RUST_LOG`.
pub(crate) fn should_force_cli_log_level(args: &Args) -> bool {
    args.quiet || args.verbose > 0
}
