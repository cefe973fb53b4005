//! Reconnect slicing of a client's total session time.

use std::time::Duration;
use tokio::time::Instant;

/// Deadlines are never scheduled further out than this.
const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

/// `start + after` without overflow; very long durations clamp to a far-future instant.
pub fn deadline_after(start: Instant, after: Duration) -> Instant {
    start
        .checked_add(after.min(FAR_FUTURE))
        .unwrap_or(start + Duration::from_secs(24 * 60 * 60))
}

/// Split `total` into consecutive slices of at most `slice_len`.
///
/// Every slice equals `slice_len` except possibly the last one, and the slices
/// add up to `total` exactly. A zero `slice_len` yields `total` as one slice.
pub fn slices(total: Duration, slice_len: Duration) -> Slices {
    Slices {
        remaining: total,
        slice_len,
    }
}

/// Iterator returned by [`slices`].
#[derive(Debug, Clone)]
pub struct Slices {
    remaining: Duration,
    slice_len: Duration,
}

impl Iterator for Slices {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.remaining.is_zero() {
            return None;
        }
        let slice = if self.slice_len.is_zero() {
            self.remaining
        } else {
            self.remaining.min(self.slice_len)
        };
        self.remaining -= slice;
        Some(slice)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = if self.remaining.is_zero() {
            0
        } else if self.slice_len.is_zero() {
            1
        } else {
            let full = self.remaining.as_nanos() / self.slice_len.as_nanos();
            let partial = u128::from(self.remaining.as_nanos() % self.slice_len.as_nanos() != 0);
            (full + partial) as usize
        };
        (n, Some(n))
    }
}

impl ExactSizeIterator for Slices {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_after_clamps() {
        let now = Instant::now();
        assert_eq!(deadline_after(now, secs(5)), now + secs(5));
        assert_eq!(deadline_after(now, Duration::MAX), now + FAR_FUTURE);
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_uneven_split() {
        let plan: Vec<_> = slices(secs(150), secs(60)).collect();
        assert_eq!(plan, vec![secs(60), secs(60), secs(30)]);
    }

    #[test]
    fn test_even_split() {
        let plan: Vec<_> = slices(secs(180), secs(60)).collect();
        assert_eq!(plan, vec![secs(60); 3]);
    }

    #[test]
    fn test_shorter_than_slice() {
        let plan: Vec<_> = slices(secs(20), secs(60)).collect();
        assert_eq!(plan, vec![secs(20)]);
    }

    #[test]
    fn test_zero_total() {
        assert_eq!(slices(Duration::ZERO, secs(60)).count(), 0);
    }

    #[test]
    fn test_zero_slice_len_is_single_slice() {
        let plan: Vec<_> = slices(secs(90), Duration::ZERO).collect();
        assert_eq!(plan, vec![secs(90)]);
    }

    #[test]
    fn test_sum_and_shape_hold_for_many_inputs() {
        for total_ms in [1u64, 999, 1_000, 59_999, 60_000, 60_001, 123_456, 660_000] {
            for slice_ms in [1u64, 7, 1_000, 60_000, 90_000] {
                let total = Duration::from_millis(total_ms);
                let slice_len = Duration::from_millis(slice_ms);
                let iter = slices(total, slice_len);
                let expected_len = iter.len();
                let plan: Vec<_> = iter.collect();

                assert_eq!(plan.len(), expected_len);
                assert_eq!(plan.iter().sum::<Duration>(), total);
                let (last, rest) = plan.split_last().unwrap();
                assert!(rest.iter().all(|s| *s == slice_len));
                assert!(!last.is_zero() && *last <= slice_len);
            }
        }
    }
}
