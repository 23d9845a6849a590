//! HTTP client wrapper and the per-resource transfer engine.
//!
//! [`HttpClient::fetch`] drives one resource through its attempt loop:
//! read the on-disk size, ask for the remaining range, stream the body to
//! disk in bounded chunks while reporting progress, and on any failure back
//! off and try again until the retry policy gives up. Partial files are
//! never deleted; the next attempt (or the next run) resumes from them.

use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, HeaderMap, RANGE};
use reqwest::{Client, StatusCode};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, DEFAULT_CHUNK_SIZE, REQUEST_TIMEOUT_SECS};
use super::error::DownloadError;
use super::filename::{Destination, resolve_destination};
use super::observer::{DownloadObserver, ProgressReporter};
use super::request::{Outcome, ResourceRequest, TransferResult};
use super::retry::{RetryDecision, RetryPolicy, classify_error};
use crate::user_agent;

/// Streaming and retry settings for one transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOptions {
    /// Largest slice written to disk between progress reports (≥ 1).
    pub chunk_size: usize,
    /// Attempt budget and backoff.
    pub retry_policy: RetryPolicy,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            retry_policy: RetryPolicy::default(),
        }
    }
}

/// HTTP client for resumable, streaming transfers.
///
/// Clones share one connection pool, so a dispatcher run builds a single
/// client and hands a clone to every task.
///
/// # Example
///
/// ```no_run
/// use batchfetch_core::{HttpClient, ResourceRequest, TransferOptions};
/// use std::path::Path;
///
/// # async fn example() {
/// let client = HttpClient::new();
/// let result = client
///     .fetch(
///         &ResourceRequest::new("https://example.com/file.pdf"),
///         Path::new("./downloads"),
///         &TransferOptions::default(),
///         None,
///     )
///     .await;
/// println!("{} after {} attempt(s)", result.filename, result.attempts);
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a client with the default timeouts (30s connect, 5min request).
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        Self::try_with_timeouts(
            Duration::from_secs(CONNECT_TIMEOUT_SECS),
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        )
        .expect("failed to build HTTP client with static configuration")
    }

    /// Creates a client with explicit timeouts.
    ///
    /// `request_timeout` bounds a whole request, body included.
    ///
    /// # Errors
    ///
    /// Returns the reqwest builder error (for example, when the TLS backend
    /// cannot be initialised).
    pub fn try_with_timeouts(
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .gzip(true)
            .cookie_store(true)
            .user_agent(user_agent::default_user_agent())
            .build()?;
        Ok(Self { client })
    }

    /// Returns a reference to the underlying reqwest client.
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Fetches one resource into `download_dir`.
    ///
    /// Never fails as a whole: every error ends up in
    /// [`TransferResult::outcome`]. The directory must already exist.
    #[instrument(skip(self, download_dir, options, observer), fields(url = %request.url()))]
    pub async fn fetch(
        &self,
        request: &ResourceRequest,
        download_dir: &Path,
        options: &TransferOptions,
        observer: Option<&dyn DownloadObserver>,
    ) -> TransferResult {
        let destination = resolve_destination(download_dir, request);
        self.fetch_to(request.url(), destination, options, observer)
            .await
    }

    /// Attempt loop for an already-resolved destination.
    pub(crate) async fn fetch_to(
        &self,
        url: &str,
        destination: Destination,
        options: &TransferOptions,
        observer: Option<&dyn DownloadObserver>,
    ) -> TransferResult {
        let Ok(parsed) = Url::parse(url) else {
            warn!(url, filename = %destination.filename, "invalid URL; not attempting transfer");
            let bytes_on_disk = file_len(&destination.path).await;
            return TransferResult {
                url: url.to_string(),
                filename: destination.filename,
                attempts: 0,
                bytes_on_disk,
                outcome: Outcome::Failure(DownloadError::invalid_url(url)),
            };
        };

        let chunk_size = options.chunk_size.max(1);
        let policy = &options.retry_policy;
        let mut reporter = ProgressReporter::new(observer, &destination.filename);
        let mut attempt = 0_u32;

        let outcome = loop {
            attempt += 1;
            debug!(attempt, "starting transfer attempt");

            let error = match self
                .attempt_transfer(&parsed, url, &destination, chunk_size, &mut reporter)
                .await
            {
                Ok(()) => break Outcome::Success(destination.path.clone()),
                Err(error) => error,
            };

            match policy.should_retry(classify_error(&error), attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next_attempt,
                } => {
                    info!(
                        url,
                        filename = %destination.filename,
                        attempt = next_attempt,
                        max_attempts = policy.max_attempts(),
                        delay_ms = delay.as_millis(),
                        error = %error,
                        "retrying transfer"
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::DoNotRetry { reason } => {
                    warn!(
                        url,
                        filename = %destination.filename,
                        attempt,
                        error = %error,
                        %reason,
                        "transfer failed"
                    );
                    break Outcome::Failure(error);
                }
            }
        };

        let bytes_on_disk = file_len(&destination.path).await;
        if outcome.is_success() {
            info!(
                url,
                filename = %destination.filename,
                path = %destination.path.display(),
                bytes = bytes_on_disk,
                attempt,
                "transfer complete"
            );
        }

        TransferResult {
            url: url.to_string(),
            filename: destination.filename,
            attempts: attempt,
            bytes_on_disk,
            outcome,
        }
    }

    /// One GET, resuming from whatever is already on disk.
    async fn attempt_transfer(
        &self,
        parsed: &Url,
        url: &str,
        destination: &Destination,
        chunk_size: usize,
        reporter: &mut ProgressReporter<'_>,
    ) -> Result<(), DownloadError> {
        let local_size = file_len(&destination.path).await;

        let mut request = self.client.get(parsed.clone());
        if local_size > 0 {
            debug!(offset = local_size, "requesting remaining range");
            request = request.header(RANGE, format!("bytes={local_size}-"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| DownloadError::from_reqwest(url, e))?;
        let status = response.status();

        if status == StatusCode::RANGE_NOT_SATISFIABLE
            && local_size > 0
            && content_range_total(response.headers()) == Some(local_size)
        {
            debug!(bytes = local_size, "server reports file already complete");
            reporter.finish(local_size);
            return Ok(());
        }

        if status.as_u16() >= 400 {
            return Err(DownloadError::http_status(url, status.as_u16()));
        }

        let resuming = local_size > 0 && status == StatusCode::PARTIAL_CONTENT;
        if local_size > 0 && !resuming {
            debug!(
                status = status.as_u16(),
                discarded = local_size,
                "server ignored range request; restarting from zero"
            );
        }

        let offset = if resuming { local_size } else { 0 };
        let declared_total =
            content_length(response.headers()).map(|remaining| remaining.saturating_add(offset));
        reporter.start(offset, declared_total);

        let file = open_destination(&destination.path, resuming).await?;
        let mut writer = BufWriter::new(file);
        let streamed = stream_to_file(&mut writer, response, url, destination, chunk_size, reporter)
            .await;
        // Flush even after a failed read so the partial bytes are kept.
        let flushed = writer
            .flush()
            .await
            .map_err(|e| DownloadError::io(destination.path.clone(), e));
        streamed?;
        flushed?;

        if let Some(total) = declared_total
            && reporter.position() > total
        {
            warn!(
                url,
                filename = %destination.filename,
                declared = total,
                bytes = reporter.position(),
                "received more bytes than declared; keeping them"
            );
        }

        Ok(())
    }
}

/// Appends when resuming, truncates otherwise.
async fn open_destination(path: &Path, resuming: bool) -> Result<File, DownloadError> {
    let opened = if resuming {
        OpenOptions::new().create(true).append(true).open(path).await
    } else {
        File::create(path).await
    };
    opened.map_err(|e| DownloadError::io(path.to_path_buf(), e))
}

/// Streams the response body into `writer` in slices of at most `chunk_size`.
async fn stream_to_file(
    writer: &mut BufWriter<File>,
    response: reqwest::Response,
    url: &str,
    destination: &Destination,
    chunk_size: usize,
    reporter: &mut ProgressReporter<'_>,
) -> Result<(), DownloadError> {
    let mut stream = response.bytes_stream();

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::from_reqwest(url, e))?;

        for piece in chunk.chunks(chunk_size) {
            writer
                .write_all(piece)
                .await
                .map_err(|e| DownloadError::io(destination.path.clone(), e))?;
            reporter.advance(piece.len() as u64);
        }
    }

    Ok(())
}

/// Size of `path`, or 0 when it does not exist.
async fn file_len(path: &Path) -> u64 {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.len())
        .unwrap_or(0)
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}

/// Complete length from `Content-Range: bytes */N` (or `bytes a-b/N`).
fn content_range_total(headers: &HeaderMap) -> Option<u64> {
    let value = headers.get(CONTENT_RANGE)?.to_str().ok()?;
    let (_, total) = value.trim().rsplit_once('/')?;
    total.trim().parse::<u64>().ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use reqwest::header::HeaderValue;
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, ResponseTemplate};

    use super::*;
    use crate::download::observer::ObserverError;
    use crate::test_support::socket_guard::start_mock_server_or_skip;

    fn fast_options(max_retries: u32) -> TransferOptions {
        TransferOptions {
            chunk_size: DEFAULT_CHUNK_SIZE,
            retry_policy: RetryPolicy::new(max_retries, Duration::from_millis(1)),
        }
    }

    #[derive(Default)]
    struct Recorder {
        progress: Mutex<Vec<(u64, Option<u64>)>>,
    }

    impl DownloadObserver for Recorder {
        fn on_progress(
            &self,
            _filename: &str,
            downloaded: u64,
            total: Option<u64>,
        ) -> Result<(), ObserverError> {
            self.progress.lock().unwrap().push((downloaded, total));
            Ok(())
        }
    }

    #[test]
    fn test_content_range_total_parses_unsatisfied_form() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_RANGE, HeaderValue::from_static("bytes */1234"));
        assert_eq!(content_range_total(&headers), Some(1234));

        headers.insert(CONTENT_RANGE, HeaderValue::from_static("bytes 0-9/10"));
        assert_eq!(content_range_total(&headers), Some(10));

        headers.insert(CONTENT_RANGE, HeaderValue::from_static("bytes */*"));
        assert_eq!(content_range_total(&headers), None);
    }

    #[test]
    fn test_content_length_ignores_garbage() {
        let mut headers = HeaderMap::new();
        assert_eq!(content_length(&headers), None);
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("abc"));
        assert_eq!(content_length(&headers), None);
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("42"));
        assert_eq!(content_length(&headers), Some(42));
    }

    #[test]
    fn test_transfer_options_default() {
        let options = TransferOptions::default();
        assert_eq!(options.chunk_size, 8192);
        assert_eq!(options.retry_policy.max_retries(), 3);
    }

    #[tokio::test]
    async fn test_fetch_invalid_url_makes_no_attempt() {
        let temp_dir = TempDir::new().unwrap();
        let client = HttpClient::new();
        let result = client
            .fetch(
                &ResourceRequest::new("not a url").with_filename("x.bin"),
                temp_dir.path(),
                &fast_options(3),
                None,
            )
            .await;
        assert_eq!(result.attempts, 0);
        assert!(matches!(
            result.outcome,
            Outcome::Failure(DownloadError::InvalidUrl { .. })
        ));
        assert!(!temp_dir.path().join("x.bin").exists());
    }

    #[tokio::test]
    async fn test_fetch_round_trip_reports_progress_in_chunks() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/hello.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello world".to_vec()))
            .mount(&mock_server)
            .await;

        let temp_dir = TempDir::new().unwrap();
        let recorder = Recorder::default();
        let options = TransferOptions {
            chunk_size: 4,
            ..fast_options(0)
        };
        let result = HttpClient::new()
            .fetch(
                &ResourceRequest::new(format!("{}/hello.txt", mock_server.uri())),
                temp_dir.path(),
                &options,
                Some(&recorder),
            )
            .await;

        assert!(result.outcome.is_success(), "{:?}", result.outcome);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.bytes_on_disk, 11);
        assert_eq!(
            std::fs::read(temp_dir.path().join("hello.txt")).unwrap(),
            b"hello world"
        );
        let progress = recorder.progress.lock().unwrap().clone();
        assert_eq!(progress.last(), Some(&(11, Some(11))));
        let mut previous = 0;
        for (downloaded, total) in progress {
            assert_eq!(total, Some(11));
            assert!(downloaded > previous && downloaded - previous <= 4);
            previous = downloaded;
        }
    }

    #[tokio::test]
    async fn test_fetch_404_is_retried_then_fails_without_deleting() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/missing.bin"))
            .respond_with(ResponseTemplate::new(404))
            .expect(2)
            .mount(&mock_server)
            .await;

        let temp_dir = TempDir::new().unwrap();
        let result = HttpClient::new()
            .fetch(
                &ResourceRequest::new(format!("{}/missing.bin", mock_server.uri())),
                temp_dir.path(),
                &fast_options(1),
                None,
            )
            .await;

        assert_eq!(result.attempts, 2);
        assert!(matches!(
            result.outcome,
            Outcome::Failure(DownloadError::HttpStatus { status: 404, .. })
        ));
        mock_server.verify().await;
    }

    #[tokio::test]
    async fn test_fetch_sends_range_for_existing_partial_file() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/digits.txt"))
            .and(header("Range", "bytes=4-"))
            .respond_with(
                ResponseTemplate::new(206)
                    .insert_header("Content-Range", "bytes 4-9/10")
                    .set_body_bytes(b"456789".to_vec()),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("digits.txt"), b"0123").unwrap();

        let result = HttpClient::new()
            .fetch(
                &ResourceRequest::new(format!("{}/digits.txt", mock_server.uri())),
                temp_dir.path(),
                &fast_options(0),
                None,
            )
            .await;

        assert!(result.outcome.is_success(), "{:?}", result.outcome);
        assert_eq!(
            std::fs::read(temp_dir.path().join("digits.txt")).unwrap(),
            b"0123456789"
        );
    }
}
