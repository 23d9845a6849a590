//! Retry logic with exponential backoff for failed transfers.
//!
//! Transport failures, error statuses and local I/O errors are all
//! [`FailureType::Transient`]: the same policy governs every one of them.
//! Only errors that no further request could fix (an unparsable URL, a
//! request that reqwest refuses to build, a lost task) are
//! [`FailureType::Permanent`].
//!
//! # Example
//!
//! ```
//! use batchfetch_core::download::{
//!     DownloadError, RetryPolicy, RetryDecision, classify_error
//! };
//!
//! let policy = RetryPolicy::default();
//! let error = DownloadError::http_status("https://example.com/file.pdf", 503);
//!
//! match policy.should_retry(classify_error(&error), 1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         println!("Retrying in {:?} (attempt {})", delay, attempt);
//!     }
//!     RetryDecision::DoNotRetry { reason } => {
//!         println!("Not retrying: {}", reason);
//!     }
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument};

use super::DownloadError;
use super::constants::DEFAULT_MAX_BACKOFF;

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay for exponential backoff (1 second).
const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Jitter bounds applied multiplicatively to every delay.
const JITTER_MIN: f64 = 0.8;
const JITTER_MAX: f64 = 1.2;

/// Exponent ceiling; 2^30 seconds is already far beyond any sane cap.
const MAX_EXPONENT: u32 = 30;

/// Classification of transfer failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// May succeed on another attempt: transport errors, timeouts, HTTP
    /// error statuses, local write failures.
    Transient,

    /// Will not succeed regardless of retries.
    Permanent,
}

/// Decision on whether to retry a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for `delay`, then make attempt number `attempt`.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number comes next (1-indexed, so the first retry is 2).
        attempt: u32,
    },

    /// Give up.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Exponential backoff policy with multiplicative jitter.
///
/// ```text
/// delay(n) = min(backoff_base * 2^(n-1) * uniform[0.8, 1.2], max_delay)
/// ```
///
/// where `n` is the attempt that just failed. With defaults the sleeps are
/// roughly 1s, 2s, 4s before the fourth and final attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff_base: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
            max_delay: DEFAULT_MAX_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy allowing `max_retries` retries after the first attempt.
    #[must_use]
    pub fn new(max_retries: u32, backoff_base: Duration) -> Self {
        Self {
            max_retries,
            backoff_base,
            max_delay: DEFAULT_MAX_BACKOFF,
        }
    }

    /// Overrides the upper bound for a single sleep.
    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Retries allowed after the first attempt.
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Total attempts allowed, including the first.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    #[must_use]
    pub fn backoff_base(&self) -> Duration {
        self.backoff_base
    }

    #[must_use]
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Decides whether to retry after attempt number `attempt` (1-indexed) failed.
    #[instrument(skip(self), fields(max_retries = self.max_retries))]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        if failure_type == FailureType::Permanent {
            return RetryDecision::DoNotRetry {
                reason: "permanent failure - retry would not help".to_string(),
            };
        }

        if attempt > self.max_retries {
            debug!(attempt, max = self.max_retries, "max retries reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max retries ({}) exhausted", self.max_retries),
            };
        }

        let delay = self.calculate_delay(attempt);

        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = delay.as_millis(),
            "will retry"
        );

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    /// Delay after attempt `attempt` failed, before jitter, capped at `max_delay`.
    #[must_use]
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(MAX_EXPONENT);
        self.backoff_base
            .saturating_mul(1_u32 << exponent)
            .min(self.max_delay)
    }

    fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(MAX_EXPONENT);
        let raw = self.backoff_base.saturating_mul(1_u32 << exponent);
        let jitter = rand::thread_rng().gen_range(JITTER_MIN..=JITTER_MAX);
        Duration::try_from_secs_f64(raw.as_secs_f64() * jitter)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Classifies a transfer error for retry decisions.
///
/// | Error | Type |
/// |-------|------|
/// | HttpStatus (any) | Transient |
/// | Timeout | Transient |
/// | Network (builder) | Permanent |
/// | Network (other) | Transient |
/// | Io | Transient |
/// | InvalidUrl | Permanent |
/// | Aborted | Permanent |
#[instrument(level = "trace")]
pub fn classify_error(error: &DownloadError) -> FailureType {
    match error {
        DownloadError::HttpStatus { .. }
        | DownloadError::Timeout { .. }
        | DownloadError::Io { .. } => FailureType::Transient,

        DownloadError::Network { source, .. } => {
            if source.is_builder() {
                FailureType::Permanent
            } else {
                FailureType::Transient
            }
        }

        DownloadError::InvalidUrl { .. } | DownloadError::Aborted { .. } => {
            FailureType::Permanent
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_retry_policy_default_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries(), 3);
        assert_eq!(policy.max_attempts(), 4);
        assert_eq!(policy.backoff_base(), Duration::from_secs(1));
        assert_eq!(policy.max_delay(), Duration::from_secs(60));
    }

    #[test]
    fn test_retry_policy_zero_retries_means_single_attempt() {
        let policy = RetryPolicy::new(0, Duration::from_millis(10));
        assert_eq!(policy.max_attempts(), 1);
        assert!(matches!(
            policy.should_retry(FailureType::Transient, 1),
            RetryDecision::DoNotRetry { .. }
        ));
    }

    #[test]
    fn test_should_retry_transient_until_exhausted() {
        let policy = RetryPolicy::new(2, Duration::from_millis(10));

        match policy.should_retry(FailureType::Transient, 1) {
            RetryDecision::Retry { attempt, .. } => assert_eq!(attempt, 2),
            other => panic!("expected retry, got {other:?}"),
        }
        match policy.should_retry(FailureType::Transient, 2) {
            RetryDecision::Retry { attempt, .. } => assert_eq!(attempt, 3),
            other => panic!("expected retry, got {other:?}"),
        }
        match policy.should_retry(FailureType::Transient, 3) {
            RetryDecision::DoNotRetry { reason } => {
                assert!(reason.contains("exhausted"), "{reason}");
            }
            other => panic!("expected give-up, got {other:?}"),
        }
    }

    #[test]
    fn test_should_retry_permanent_never_retries() {
        let policy = RetryPolicy::default();
        assert!(matches!(
            policy.should_retry(FailureType::Permanent, 1),
            RetryDecision::DoNotRetry { .. }
        ));
    }

    #[test]
    fn test_delay_doubles_within_jitter_bounds() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100));
        for (attempt, base_ms) in [(1_u32, 100_u64), (2, 200), (3, 400), (4, 800)] {
            for _ in 0..20 {
                let RetryDecision::Retry { delay, .. } =
                    policy.should_retry(FailureType::Transient, attempt)
                else {
                    panic!("expected retry");
                };
                let ms = delay.as_secs_f64() * 1000.0;
                let base = base_ms as f64;
                assert!(
                    ms >= base * 0.8 - 1.0 && ms <= base * 1.2 + 1.0,
                    "attempt {attempt}: {ms}ms outside [{}, {}]",
                    base * 0.8,
                    base * 1.2
                );
            }
        }
    }

    #[test]
    fn test_delay_is_capped_at_max_delay() {
        let policy =
            RetryPolicy::new(50, Duration::from_secs(1)).with_max_delay(Duration::from_secs(5));
        for attempt in [4, 10, 40] {
            let RetryDecision::Retry { delay, .. } =
                policy.should_retry(FailureType::Transient, attempt)
            else {
                panic!("expected retry");
            };
            assert!(delay <= Duration::from_secs(5), "{delay:?}");
        }
        assert_eq!(policy.base_delay_for(40), Duration::from_secs(5));
    }

    #[test]
    fn test_base_delay_for_sequence() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        assert_eq!(policy.base_delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.base_delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.base_delay_for(3), Duration::from_secs(4));
    }

    #[test]
    fn test_zero_backoff_base_gives_zero_delay() {
        let policy = RetryPolicy::new(3, Duration::ZERO);
        let RetryDecision::Retry { delay, .. } = policy.should_retry(FailureType::Transient, 2)
        else {
            panic!("expected retry");
        };
        assert_eq!(delay, Duration::ZERO);
    }

    #[test]
    fn test_classify_error_status_and_timeout_are_transient() {
        for status in [400, 404, 416, 429, 500, 503] {
            let error = DownloadError::http_status("https://example.com", status);
            assert_eq!(classify_error(&error), FailureType::Transient, "{status}");
        }
        let error = DownloadError::timeout("https://example.com");
        assert_eq!(classify_error(&error), FailureType::Transient);
    }

    #[test]
    fn test_classify_error_io_is_transient() {
        let error = DownloadError::io(
            PathBuf::from("/tmp/x"),
            std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        );
        assert_eq!(classify_error(&error), FailureType::Transient);
    }

    #[test]
    fn test_classify_error_invalid_url_and_aborted_are_permanent() {
        assert_eq!(
            classify_error(&DownloadError::invalid_url("nope")),
            FailureType::Permanent
        );
        assert_eq!(
            classify_error(&DownloadError::aborted("https://example.com", "panic")),
            FailureType::Permanent
        );
    }
}
