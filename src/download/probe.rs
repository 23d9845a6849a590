//! Downloadability probing: is a URL a file, or a web page?
//!
//! A probe never writes to disk. It first checks the host blocklist, then
//! asks with `HEAD`, and when the headers are not decisive falls back to a
//! single-byte ranged `GET`.

use std::time::Duration;

use reqwest::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE, HeaderMap, RANGE};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use super::HttpClient;

/// Outcome of a probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    /// Whether the URL looks like fetchable content.
    pub downloadable: bool,
    /// Short human-readable explanation.
    pub reason: String,
}

impl ProbeResult {
    fn downloadable(reason: impl Into<String>) -> Self {
        Self {
            downloadable: true,
            reason: reason.into(),
        }
    }

    fn skipped(reason: impl Into<String>) -> Self {
        Self {
            downloadable: false,
            reason: reason.into(),
        }
    }
}

/// Result of classifying HEAD response headers.
#[derive(Debug, PartialEq, Eq)]
enum HeadVerdict {
    Decided(ProbeResult),
    /// Fall through to the ranged GET.
    Inconclusive(&'static str),
}

/// Classifies URLs as downloadable content or not.
#[derive(Debug, Clone)]
pub struct Prober {
    client: HttpClient,
    blocked_hosts: Vec<String>,
    timeout: Duration,
}

impl Prober {
    /// Creates a prober. Blocklist entries are domain suffixes, matched
    /// case-insensitively on whole labels.
    #[must_use]
    pub fn new<I, S>(client: HttpClient, blocked_hosts: I, timeout: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let blocked_hosts = blocked_hosts
            .into_iter()
            .map(|host| host.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|host| !host.is_empty())
            .collect();
        Self {
            client,
            blocked_hosts,
            timeout,
        }
    }

    /// True when `host` equals a blocklist entry or is a subdomain of one.
    #[must_use]
    pub fn is_blocked(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        self.blocked_hosts
            .iter()
            .any(|suffix| host_matches(&host, suffix))
    }

    /// Probes one URL.
    #[instrument(skip(self))]
    pub async fn probe(&self, url: &str) -> ProbeResult {
        let Some(parsed) = Url::parse(url).ok().filter(|u| u.host_str().is_some()) else {
            return ProbeResult::skipped("invalid URL");
        };
        if let Some(host) = parsed.host_str()
            && self.is_blocked(host)
        {
            debug!(host, "host is blocklisted");
            return ProbeResult::skipped("blocked host");
        }

        let fallback_reason = match self.send(Method::HEAD, &parsed).await {
            Ok(response) => match classify_head(response.status(), response.headers()) {
                HeadVerdict::Decided(result) => return result,
                HeadVerdict::Inconclusive(reason) => reason,
            },
            Err(error) if error.is_timeout() => "HEAD timed out",
            Err(error) => {
                debug!(error = %error, "HEAD request failed");
                "HEAD failed"
            }
        };

        debug!(reason = fallback_reason, "falling back to ranged GET");
        match self.send(Method::GET, &parsed).await {
            Ok(response) => classify_range_probe(response.status(), response.headers()),
            Err(error) => ProbeResult::skipped(format!("request failed: {error}")),
        }
    }

    async fn send(&self, method: Method, url: &Url) -> Result<reqwest::Response, reqwest::Error> {
        let mut request = self
            .client
            .inner()
            .request(method.clone(), url.clone())
            .timeout(self.timeout);
        if method == Method::GET {
            request = request.header(RANGE, "bytes=0-0");
        }
        request.send().await
    }
}

fn host_matches(host: &str, suffix: &str) -> bool {
    host == suffix
        || host
            .strip_suffix(suffix)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

fn classify_head(status: StatusCode, headers: &HeaderMap) -> HeadVerdict {
    if matches!(
        status,
        StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED
    ) {
        return HeadVerdict::Inconclusive("HEAD not allowed");
    }
    if status.as_u16() >= 400 {
        return HeadVerdict::Decided(ProbeResult::skipped(format!("HTTP {}", status.as_u16())));
    }
    if headers.contains_key(CONTENT_DISPOSITION) {
        return HeadVerdict::Decided(ProbeResult::downloadable("content-disposition present"));
    }
    // hyper reports `content-length: 0` for bodiless HEAD replies; only a
    // positive length says anything about the resource. A zero length falls
    // through to the content-type check and, for HTML, to the ranged GET.
    if declared_length(headers).is_some_and(|len| len > 0) {
        return HeadVerdict::Decided(ProbeResult::downloadable("content-length present"));
    }
    match content_type(headers) {
        Some(ct) if !is_html(&ct) => {
            HeadVerdict::Decided(ProbeResult::downloadable(format!("content-type {ct}")))
        }
        _ => HeadVerdict::Inconclusive("no decisive header"),
    }
}

fn classify_range_probe(status: StatusCode, headers: &HeaderMap) -> ProbeResult {
    if status.as_u16() >= 400 {
        return ProbeResult::skipped(format!("HTTP {}", status.as_u16()));
    }
    if headers.contains_key(CONTENT_DISPOSITION) {
        return ProbeResult::downloadable("content-disposition present");
    }
    match content_type(headers) {
        Some(ct) if !is_html(&ct) => ProbeResult::downloadable(format!("content-type {ct}")),
        _ => ProbeResult::skipped("HTML page"),
    }
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

fn content_type(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(CONTENT_TYPE)?.to_str().ok()?.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Compares the media type essence, ignoring parameters like `charset`.
fn is_html(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case("text/html"))
}
