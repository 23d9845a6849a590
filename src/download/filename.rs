//! Filename derivation, sanitization, and destination containment.
//!
//! Names come from an explicit hint or the last path segment of the
//! originally requested URL. Every name is percent-decoded, stripped of
//! separators and filesystem-hostile characters, and checked to stay inside
//! the download directory before use.

use std::path::{Component, Path, PathBuf};

use rand::Rng;
use tracing::{debug, warn};
use url::Url;

use super::ResourceRequest;

/// Prefix for randomly generated names.
const FALLBACK_PREFIX: &str = "download_";

/// Longest name kept before stripping (most filesystems cap at 255 bytes).
const MAX_FILENAME_CHARS: usize = 200;

/// Resolved local target for one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    /// Sanitized filename, used for observer callbacks.
    pub filename: String,
    /// `download_dir.join(filename)`; always a direct child of the directory.
    pub path: PathBuf,
}

/// Sanitizes a raw name or URL path segment into a safe, non-empty filename.
///
/// Percent-encoding is decoded first, then `/ \ : * ? " < > |` and control
/// characters become `_`, and leading/trailing whitespace and dots are
/// stripped. Degenerate input yields [`fallback_filename`].
#[must_use]
pub fn sanitize_filename(raw: &str) -> String {
    let decoded = match urlencoding::decode(raw) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => String::from_utf8_lossy(&urlencoding::decode_binary(raw.as_bytes())).into_owned(),
    };

    let replaced: String = decoded
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .take(MAX_FILENAME_CHARS)
        .collect();

    let stripped = replaced.trim_matches(|c: char| c.is_whitespace() || c == '.');
    if stripped.is_empty() {
        return fallback_filename();
    }
    stripped.to_string()
}

/// Random `download_xxxxxxxx` name (8 lowercase hex characters).
#[must_use]
pub fn fallback_filename() -> String {
    let token: u32 = rand::thread_rng().r#gen();
    format!("{FALLBACK_PREFIX}{token:08x}")
}

/// Filename derived from the last path segment of `url`.
///
/// Query strings and fragments are ignored. URLs that don't parse or end in
/// `/` produce a random fallback.
#[must_use]
pub fn filename_from_url(url: &str) -> String {
    let Ok(parsed) = Url::parse(url) else {
        return fallback_filename();
    };
    match parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
    {
        Some(last) if !last.is_empty() => sanitize_filename(last),
        _ => fallback_filename(),
    }
}

/// Resolves the sanitized filename and destination path for a request.
///
/// Uses the explicit filename when present, otherwise the URL's last path
/// segment. If the joined path would not be a direct child of `download_dir`
/// the name is replaced by a random fallback.
#[must_use]
pub fn resolve_destination(download_dir: &Path, request: &ResourceRequest) -> Destination {
    let filename = match request.filename() {
        Some(hint) if !hint.trim().is_empty() => sanitize_filename(hint),
        _ => filename_from_url(request.url()),
    };

    let filename = if is_contained(download_dir, &filename) {
        filename
    } else {
        let fallback = fallback_filename();
        warn!(
            url = %request.url(),
            rejected = %filename,
            filename = %fallback,
            "sanitized filename escapes download directory; using fallback"
        );
        fallback
    };

    let path = download_dir.join(&filename);
    debug!(filename = %filename, path = %path.display(), "resolved destination");
    Destination { filename, path }
}

/// True when `dir.join(name)` is a direct child of `dir`.
pub(crate) fn is_contained(dir: &Path, name: &str) -> bool {
    let mut components = Path::new(name).components();
    let single_normal = matches!(components.next(), Some(Component::Normal(_)))
        && components.next().is_none();
    single_normal && dir.join(name).parent() == Some(dir)
}
