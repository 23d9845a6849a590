use std::fs::OpenOptions;
use std::sync::Arc;

use anyhow::{Context, Result};
use batchfetch_core::{LogSpooler, SpoolConfig, SpoolHandle};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use super::config_runtime::LogSettings;

/// Targets whose records must not reach the spool: the spooler's own
/// warnings and the HTTP stack it delivers through.
const SPOOL_EXCLUDED_TARGETS: &[&str] = &[
    "batchfetch_core::telemetry",
    "reqwest",
    "hyper",
    "hyper_util",
    "h2",
];

pub(crate) fn no_color_env_requested() -> bool {
    std::env::var_os("NO_COLOR").is_some_and(|value| !value.is_empty())
}

pub(crate) fn is_dumb_terminal() -> bool {
    std::env::var("TERM")
        .map(|value| value.eq_ignore_ascii_case("dumb"))
        .unwrap_or(false)
}

pub(crate) fn should_disable_color(
    no_color_flag: bool,
    no_color_env: bool,
    dumb_terminal: bool,
) -> bool {
    no_color_flag || no_color_env || dumb_terminal
}

pub(crate) fn should_use_progress_bars(
    stderr_is_terminal: bool,
    quiet: bool,
    dumb_terminal: bool,
) -> bool {
    stderr_is_terminal && !quiet && !dumb_terminal
}

/// Keeps the log spool worker reachable until the process exits.
#[must_use]
pub(crate) struct TracingGuard {
    spool: Option<SpoolHandle>,
}

impl TracingGuard {
    /// Delivers (or spools) queued log records before exit.
    pub(crate) async fn shutdown(self) {
        if let Some(spool) = self.spool {
            spool.shutdown().await;
        }
    }
}

fn spool_filter(default_level: &str) -> EnvFilter {
    let mut directives = default_level.to_string();
    for target in SPOOL_EXCLUDED_TARGETS {
        directives.push_str(&format!(",{target}=off"));
    }
    EnvFilter::new(directives)
}

/// Installs stderr logging plus the optional JSON file and collector sinks.
///
/// Must run inside the Tokio runtime when a log endpoint is configured.
pub(crate) fn init_tracing(
    default_level: &str,
    force_cli_level: bool,
    no_color: bool,
    logs: &LogSettings,
) -> Result<TracingGuard> {
    let stderr_filter = if force_cli_level {
        EnvFilter::new(default_level)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
    };
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(!no_color)
        .with_filter(stderr_filter);

    let file_layer = match &logs.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file '{}'", path.display()))?;
            Some(
                fmt::layer()
                    .json()
                    .with_writer(Arc::new(file))
                    .with_filter(EnvFilter::new(default_level)),
            )
        }
        None => None,
    };

    let (spool_layer, spool) = match (&logs.endpoint, &logs.spool) {
        (Some(endpoint), Some(spool_path)) => {
            let spooler = LogSpooler::new(SpoolConfig::new(endpoint.clone(), spool_path.clone()))
                .context("Failed to start log delivery")?;
            let (writer, handle) = spooler.spawn();
            let layer = fmt::layer()
                .json()
                .with_writer(writer)
                .with_filter(spool_filter(default_level));
            (Some(layer), Some(handle))
        }
        _ => (None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .with(spool_layer)
        .try_init();

    Ok(TracingGuard { spool })
}
