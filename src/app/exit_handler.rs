//! Maps a batch summary to the process exit outcome.

use crate::ProcessExit;

/// Exit outcome from good and bad item counts.
///
/// Downloads pass (successful, failed) transfers; probe runs pass
/// (downloadable, skipped) verdicts.
pub(crate) fn determine_exit_outcome(successful: usize, failed: usize) -> ProcessExit {
    if failed == 0 {
        ProcessExit::Success
    } else if successful > 0 {
        ProcessExit::Partial
    } else {
        ProcessExit::Failure
    }
}

#[cfg(test)]
mod tests {
    use super::determine_exit_outcome;
    use crate::ProcessExit;

    #[test]
    fn test_download_summary_exit_codes() {
        let cases = [((4, 0), 0), ((0, 0), 0), ((3, 1), 2), ((0, 5), 1)];
        for ((successful, failed), code) in cases {
            assert_eq!(
                determine_exit_outcome(successful, failed).code(),
                code,
                "{successful} ok / {failed} failed"
            );
        }
    }

    #[test]
    fn test_probe_all_downloadable_exits_zero() {
        assert_eq!(determine_exit_outcome(2, 0), ProcessExit::Success);
    }

    #[test]
    fn test_probe_single_blocked_url_exits_one() {
        // `batchfetch --probe https://www.youtube.com/...` has one skipped verdict.
        assert_eq!(determine_exit_outcome(0, 1), ProcessExit::Failure);
    }

    #[test]
    fn test_probe_mixed_verdicts_exit_partial() {
        assert_eq!(determine_exit_outcome(1, 3), ProcessExit::Partial);
    }
}
