//! Configuration file loading for CLI defaults.
//!
//! The file is a flat list of `key = value` lines with `#` comments:
//!
//! ```text
//! download_dir = "/data/incoming"
//! max_concurrent = 8
//! backoff_base_secs = 0.5
//! blocked_hosts = ["youtube.com", "vimeo.com"]
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};

/// Upper bounds shared with the CLI value parsers.
pub(crate) const MAX_CONCURRENT_LIMIT: u64 = 1024;
pub(crate) const MAX_CHUNK_SIZE: u64 = 64 * 1024 * 1024;
pub(crate) const MAX_RETRIES_LIMIT: u64 = 100;
pub(crate) const MAX_BACKOFF_BASE_SECS: f64 = 3600.0;
pub(crate) const MAX_TIMEOUT_SECS: u64 = 86_400;

/// Values read from the config file; `None` means "not set here".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileConfig {
    pub download_dir: Option<PathBuf>,
    pub max_concurrent: Option<usize>,
    pub chunk_size: Option<usize>,
    pub max_retries: Option<u32>,
    pub backoff_base_secs: Option<f64>,
    pub timeout_secs: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
    /// Replaces the built-in blocklist when set.
    pub blocked_hosts: Option<Vec<String>>,
    /// JSON log file path.
    pub log_file: Option<PathBuf>,
    /// Collector URL for log delivery.
    pub log_endpoint: Option<String>,
    /// Spool file for undelivered log records.
    pub log_spool: Option<PathBuf>,
}

/// Loaded config metadata.
#[derive(Debug, Clone, Default)]
pub struct LoadedConfig {
    /// Path that was consulted, if any.
    pub path: Option<PathBuf>,
    /// Parsed config; default when no file was found.
    pub config: FileConfig,
    /// Whether a file was actually read.
    pub loaded_from_file: bool,
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/batchfetch/config.toml`
/// 2. `$HOME/.config/batchfetch/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("batchfetch")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("batchfetch")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads `explicit` (which must exist), or the default path if present.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    if let Some(path) = explicit {
        let config = load_file_config(path)?;
        return Ok(LoadedConfig {
            path: Some(path.to_path_buf()),
            config,
            loaded_from_file: true,
        });
    }

    let path = resolve_default_config_path();
    match path.as_deref() {
        Some(path_ref) if path_ref.exists() => {
            let config = load_file_config(path_ref)?;
            Ok(LoadedConfig {
                path,
                config,
                loaded_from_file: true,
            })
        }
        _ => Ok(LoadedConfig {
            path,
            config: FileConfig::default(),
            loaded_from_file: false,
        }),
    }
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

pub(crate) fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line_no = line_index + 1;
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_no}: expected key = value");
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let invalid = || format!("Invalid `{key}` value on line {line_no}");

        match key {
            "download_dir" => {
                cfg.download_dir = Some(PathBuf::from(
                    parse_string_literal(value).with_context(invalid)?,
                ));
            }
            "max_concurrent" => {
                let parsed = parse_integer_in(value, 1, MAX_CONCURRENT_LIMIT).with_context(invalid)?;
                cfg.max_concurrent = Some(to_usize(parsed)?);
            }
            "chunk_size" => {
                let parsed = parse_integer_in(value, 1, MAX_CHUNK_SIZE).with_context(invalid)?;
                cfg.chunk_size = Some(to_usize(parsed)?);
            }
            "max_retries" => {
                let parsed = parse_integer_in(value, 0, MAX_RETRIES_LIMIT).with_context(invalid)?;
                cfg.max_retries = Some(u32::try_from(parsed)?);
            }
            "backoff_base_secs" => {
                cfg.backoff_base_secs =
                    Some(parse_seconds(value, MAX_BACKOFF_BASE_SECS).with_context(invalid)?);
            }
            "timeout_secs" => {
                cfg.timeout_secs =
                    Some(parse_integer_in(value, 1, MAX_TIMEOUT_SECS).with_context(invalid)?);
            }
            "connect_timeout_secs" => {
                cfg.connect_timeout_secs =
                    Some(parse_integer_in(value, 1, MAX_TIMEOUT_SECS).with_context(invalid)?);
            }
            "blocked_hosts" => {
                cfg.blocked_hosts = Some(parse_string_array(value).with_context(invalid)?);
            }
            "log_file" => {
                cfg.log_file = Some(PathBuf::from(
                    parse_string_literal(value).with_context(invalid)?,
                ));
            }
            "log_endpoint" => {
                let parsed = parse_string_literal(value).with_context(invalid)?;
                url::Url::parse(&parsed)
                    .map_err(|e| anyhow!("{e}"))
                    .with_context(invalid)?;
                cfg.log_endpoint = Some(parsed);
            }
            "log_spool" => {
                cfg.log_spool = Some(PathBuf::from(
                    parse_string_literal(value).with_context(invalid)?,
                ));
            }
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_no}");
            }
        }
    }
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    let raw_value = raw_value.trim();
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    let inner = &raw_value[1..raw_value.len() - 1];
    if inner.contains('"') {
        bail!("Unexpected quote inside string");
    }
    Ok(inner.to_string())
}

fn parse_string_array(raw_value: &str) -> Result<Vec<String>> {
    let Some(inner) = raw_value
        .trim()
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
    else {
        bail!("Expected array of strings like [\"a\", \"b\"]");
    };
    inner
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(parse_string_literal)
        .collect()
}

fn parse_integer_in(raw_value: &str, min: u64, max: u64) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < i128::from(min) || value > i128::from(max) {
        bail!("Expected range: {min}..={max}");
    }
    u64::try_from(value).map_err(|_| anyhow!("Integer value out of range for u64"))
}

fn parse_seconds(raw_value: &str, max: f64) -> Result<f64> {
    let value = raw_value.trim().parse::<f64>()?;
    if !value.is_finite() || !(0.0..=max).contains(&value) {
        bail!("Expected seconds in range 0..={max}");
    }
    Ok(value)
}

fn to_usize(value: u64) -> Result<usize> {
    usize::try_from(value).map_err(|_| anyhow!("Integer value out of range for usize"))
}
