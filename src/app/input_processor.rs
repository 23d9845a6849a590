//! Assembly of the URL list from positional arguments and/or stdin.

use std::io::{self, IsTerminal, Read};

use anyhow::{Context, Result};

/// URLs from `urls`, or from stdin when none were given and stdin is piped.
pub(crate) fn collect_urls(urls: &[String]) -> Result<Vec<String>> {
    if !urls.is_empty() {
        return Ok(parse_url_lines(&urls.join("\n")));
    }
    if io::stdin().is_terminal() {
        return Ok(Vec::new());
    }

    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("Failed to read URLs from stdin")?;
    Ok(parse_url_lines(&buffer))
}

/// One URL per line; blank lines and `#` comments are skipped.
pub(crate) fn parse_url_lines(input: &str) -> Vec<String> {
    input
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(ToString::to_string)
        .collect()
}
