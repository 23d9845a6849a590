use std::io::{self, IsTerminal};
use std::sync::Arc;

use anyhow::{Context, Result};
use batchfetch_core::{
    DownloadConfig, DownloadEngine, DownloadObserver, HttpClient, ProbeResult, Prober,
};
use clap::Parser;
use futures_util::StreamExt;
use serde::Serialize;
use tracing::{debug, info};

use crate::ProcessExit;
use crate::app::{config_runtime, exit_handler, input_processor, progress_manager, terminal};
use crate::app_config;
use crate::cli::Args;

pub(crate) async fn run_batchfetch() -> Result<ProcessExit> {
    // Exit code 2 means partial success, so usage errors exit with 1.
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) if !err.use_stderr() => err.exit(),
        Err(err) => {
            let _ = err.print();
            return Ok(ProcessExit::Failure);
        }
    };

    let loaded = app_config::load_config(args.config.as_deref())?;
    let config = config_runtime::resolve_download_config(&args, &loaded.config);
    let logs = config_runtime::resolve_log_settings(&args, &loaded.config, &config.download_dir);

    let default_level = config_runtime::resolve_default_log_level(&args);
    let force_cli_log_level = config_runtime::should_force_cli_log_level(&args);
    let no_color = terminal::should_disable_color(
        args.no_color,
        terminal::no_color_env_requested(),
        terminal::is_dumb_terminal(),
    );
    let guard = terminal::init_tracing(default_level, force_cli_log_level, no_color, &logs)?;

    if loaded.loaded_from_file
        && let Some(path) = loaded.path.as_deref()
    {
        debug!(path = %path.display(), "loaded config file");
    }
    debug!(?config, "configuration resolved");

    let outcome = execute(&args, config).await;
    guard.shutdown().await;
    outcome
}

async fn execute(args: &Args, config: DownloadConfig) -> Result<ProcessExit> {
    let urls = input_processor::collect_urls(&args.urls)?;
    if urls.is_empty() {
        info!("No input provided. Pipe URLs via stdin or pass them as arguments.");
        info!("Example: echo 'https://example.com/file.pdf' | batchfetch");
        return Ok(ProcessExit::Success);
    }

    if args.probe {
        run_probe(&urls, &config, args.json).await
    } else {
        run_download(urls, config, args.quiet).await
    }
}

/// One probe verdict as printed by `--probe --json`.
#[derive(Debug, Serialize)]
struct ProbeLine<'a> {
    url: &'a str,
    #[serde(flatten)]
    verdict: &'a ProbeResult,
}

/// Prints one verdict per URL, in input order.
async fn run_probe(urls: &[String], config: &DownloadConfig, json: bool) -> Result<ProcessExit> {
    config.validate().context("Invalid probe configuration")?;
    let client = HttpClient::try_with_timeouts(config.connect_timeout, config.request_timeout)
        .context("Failed to build HTTP client")?;
    let prober = Prober::new(client, &config.blocked_hosts, config.request_timeout);

    let verdicts: Vec<_> = futures_util::stream::iter(urls)
        .map(|url| {
            let prober = &prober;
            async move { (url, prober.probe(url).await) }
        })
        .buffered(config.max_concurrent)
        .collect()
        .await;

    let mut downloadable = 0;
    for (url, verdict) in &verdicts {
        if verdict.downloadable {
            downloadable += 1;
        }
        if json {
            let line = ProbeLine { url, verdict };
            println!("{}", serde_json::to_string(&line)?);
        } else {
            let label = if verdict.downloadable {
                "downloadable"
            } else {
                "skipped"
            };
            println!("{label} {url} ({})", verdict.reason);
        }
    }

    info!(
        downloadable,
        skipped = verdicts.len() - downloadable,
        "probe complete"
    );
    Ok(exit_handler::determine_exit_outcome(
        downloadable,
        verdicts.len() - downloadable,
    ))
}

async fn run_download(
    urls: Vec<String>,
    config: DownloadConfig,
    quiet: bool,
) -> Result<ProcessExit> {
    let engine = DownloadEngine::new(config).context("Invalid download configuration")?;

    let use_bars = terminal::should_use_progress_bars(
        io::stderr().is_terminal(),
        quiet,
        terminal::is_dumb_terminal(),
    );
    let (observer, progress_ui) = if use_bars {
        let (observer, handle) = progress_manager::spawn_progress_ui(urls.len());
        (
            Some(Arc::new(observer) as Arc<dyn DownloadObserver>),
            Some(handle),
        )
    } else {
        (None, None)
    };

    let summary = engine
        .run(urls, observer)
        .await
        .context("Download run failed")?;

    if let Some(handle) = progress_ui {
        let _ = handle.await;
    }

    info!(
        successful = summary.successful(),
        failed = summary.failed(),
        retried = summary.retried(),
        total = summary.total(),
        dir = %engine.config().download_dir.display(),
        "Download complete"
    );

    Ok(exit_handler::determine_exit_outcome(
        summary.successful(),
        summary.failed(),
    ))
}
