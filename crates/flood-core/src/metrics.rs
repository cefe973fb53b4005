//! Metrics collection and check bookkeeping.
//!
//! A single [`RunMetrics`] is shared by every virtual user. Counters are
//! atomics; latency distributions sit behind a mutex each. The collector is
//! read once at the end of the run via [`RunMetrics::snapshot`].

use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Name of the per-attempt handshake check.
pub const HANDSHAKE_CHECK: &str = "handshake status 101";

/// Pass/fail tally for one named check.
#[derive(Debug, Default)]
struct CheckTally {
    passes: AtomicU64,
    fails: AtomicU64,
}

/// Aggregates session outcomes across all virtual users.
pub struct RunMetrics {
    connecting: Mutex<Histogram<u64>>,
    session_duration: Mutex<Histogram<u64>>,
    sessions: AtomicU64,
    stream_errors: AtomicU64,
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
    handshake: CheckTally,
    started: Instant,
}

fn new_histogram() -> Histogram<u64> {
    Histogram::new(3).expect("Failed to create histogram")
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl RunMetrics {
    pub fn new() -> Self {
        Self {
            connecting: Mutex::new(new_histogram()),
            session_duration: Mutex::new(new_histogram()),
            sessions: AtomicU64::new(0),
            stream_errors: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            handshake: CheckTally::default(),
            started: Instant::now(),
        }
    }

    /// Record the outcome of one upgrade attempt.
    ///
    /// `connecting` is the time to a completed handshake and is only sampled
    /// for successful attempts.
    pub fn record_handshake(&self, passed: bool, connecting: Option<Duration>) {
        if passed {
            self.handshake.passes.fetch_add(1, Ordering::Relaxed);
            self.sessions.fetch_add(1, Ordering::Relaxed);
        } else {
            self.handshake.fails.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(latency) = connecting {
            lock(&self.connecting)
                .record(latency.as_micros() as u64)
                .ok();
        }
    }

    pub fn record_frame_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record how long an opened session stayed up and whether it ended in error.
    ///
    /// Only sessions that got past the upgrade reach here, so `stream_errors`
    /// excludes connect failures; those show up as failed handshake checks.
    pub fn record_session_end(&self, duration: Duration, errored: bool) {
        if errored {
            self.stream_errors.fetch_add(1, Ordering::Relaxed);
        }
        lock(&self.session_duration)
            .record(duration.as_millis() as u64)
            .ok();
    }

    pub fn sessions(&self) -> u64 {
        self.sessions.load(Ordering::Relaxed)
    }

    pub fn check_passes(&self) -> u64 {
        self.handshake.passes.load(Ordering::Relaxed)
    }

    pub fn check_fails(&self) -> u64 {
        self.handshake.fails.load(Ordering::Relaxed)
    }

    /// Fold another collector into this one.
    pub fn absorb(&self, other: &RunMetrics) {
        self.sessions.fetch_add(other.sessions(), Ordering::Relaxed);
        self.stream_errors
            .fetch_add(other.stream_errors.load(Ordering::Relaxed), Ordering::Relaxed);
        self.frames_sent
            .fetch_add(other.frames_sent.load(Ordering::Relaxed), Ordering::Relaxed);
        self.frames_received
            .fetch_add(other.frames_received.load(Ordering::Relaxed), Ordering::Relaxed);
        self.handshake
            .passes
            .fetch_add(other.check_passes(), Ordering::Relaxed);
        self.handshake
            .fails
            .fetch_add(other.check_fails(), Ordering::Relaxed);

        let theirs = lock(&other.connecting).clone();
        lock(&self.connecting).add(&theirs).ok();
        let theirs = lock(&other.session_duration).clone();
        lock(&self.session_duration).add(&theirs).ok();
    }

    /// Point-in-time summary of everything recorded so far.
    pub fn snapshot(&self) -> RunSummary {
        let connecting = lock(&self.connecting);
        let durations = lock(&self.session_duration);

        let passes = self.check_passes();
        let fails = self.check_fails();
        let mut checks = BTreeMap::new();
        checks.insert(
            HANDSHAKE_CHECK.to_string(),
            CheckSummary {
                passes,
                fails,
                rate: ratio(passes, fails),
            },
        );

        RunSummary {
            timestamp: chrono::Utc::now().to_rfc3339(),
            elapsed_secs: self.started.elapsed().as_secs_f64(),
            sessions: self.sessions(),
            stream_errors: self.stream_errors.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            connecting: LatencySummary::from_micros(&connecting),
            session_duration_avg_secs: if durations.is_empty() {
                0.0
            } else {
                durations.mean() / 1000.0
            },
            session_duration_max_secs: durations.max() as f64 / 1000.0,
            checks_passed: passes,
            checks_failed: fails,
            check_rate: ratio(passes, fails),
            checks,
        }
    }
}

impl Default for RunMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn ratio(passes: u64, fails: u64) -> f64 {
    let total = passes + fails;
    if total == 0 {
        0.0
    } else {
        passes as f64 / total as f64
    }
}

/// Connecting-latency percentiles in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub samples: u64,
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

impl LatencySummary {
    fn from_micros(h: &Histogram<u64>) -> Self {
        if h.is_empty() {
            return Self::default();
        }
        Self {
            samples: h.len(),
            p50: h.value_at_percentile(50.0) as f64 / 1000.0,
            p90: h.value_at_percentile(90.0) as f64 / 1000.0,
            p95: h.value_at_percentile(95.0) as f64 / 1000.0,
            p99: h.value_at_percentile(99.0) as f64 / 1000.0,
            min: h.min() as f64 / 1000.0,
            max: h.max() as f64 / 1000.0,
            avg: h.mean() / 1000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckSummary {
    pub passes: u64,
    pub fails: u64,
    pub rate: f64,
}

/// Final run results, consumed by threshold evaluation and reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub timestamp: String,
    pub elapsed_secs: f64,

    /// Successfully opened sessions.
    pub sessions: u64,
    /// Opened sessions that ended in a transport error.
    pub stream_errors: u64,
    pub frames_sent: u64,
    pub frames_received: u64,

    pub connecting: LatencySummary,
    pub session_duration_avg_secs: f64,
    pub session_duration_max_secs: f64,

    pub checks_passed: u64,
    pub checks_failed: u64,
    pub check_rate: f64,
    pub checks: BTreeMap<String, CheckSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_failed_handshake_does_not_count_session() {
        let metrics = RunMetrics::new();
        metrics.record_handshake(false, None);
        let summary = metrics.snapshot();
        assert_eq!(summary.sessions, 0);
        assert_eq!(summary.checks_failed, 1);
        assert_eq!(summary.check_rate, 0.0);
        assert_eq!(summary.connecting.samples, 0);
    }

    #[test]
    fn test_percentiles_in_ms() {
        let metrics = RunMetrics::new();
        for ms in 1..=100u64 {
            metrics.record_handshake(true, Some(Duration::from_millis(ms)));
        }
        let summary = metrics.snapshot();
        assert_eq!(summary.sessions, 100);
        assert_eq!(summary.connecting.samples, 100);
        test_utils::assert_approx_eq!(summary.connecting.p95, 95.0, 0.5);
        test_utils::assert_approx_eq!(summary.connecting.max, 100.0, 0.5);
        assert_eq!(summary.check_rate, 1.0);
        assert_eq!(summary.checks[HANDSHAKE_CHECK].passes, 100);
    }

    #[test]
    fn test_absorb_is_associative_over_counts() {
        let build = |passes: u64, fails: u64| {
            let m = RunMetrics::new();
            for _ in 0..passes {
                m.record_handshake(true, Some(Duration::from_millis(10)));
                m.record_frame_sent();
            }
            for _ in 0..fails {
                m.record_handshake(false, None);
            }
            m
        };

        // (a + b) + c
        let left = build(3, 1);
        left.absorb(&build(2, 2));
        left.absorb(&build(5, 0));

        // a + (b + c)
        let right = build(3, 1);
        let bc = build(2, 2);
        bc.absorb(&build(5, 0));
        right.absorb(&bc);

        let (l, r) = (left.snapshot(), right.snapshot());
        assert_eq!(l.sessions, r.sessions);
        assert_eq!(l.checks_passed, 10);
        assert_eq!(l.checks_failed, 3);
        assert_eq!(l.frames_sent, r.frames_sent);
        assert_eq!(l.connecting.samples, r.connecting.samples);
    }

    #[test]
    fn test_concurrent_recording() {
        let metrics = Arc::new(RunMetrics::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let metrics = metrics.clone();
                std::thread::spawn(move || {
                    for _ in 0..1_000 {
                        metrics.record_handshake(i % 4 != 0, Some(Duration::from_millis(5)));
                        metrics.record_frame_received();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let summary = metrics.snapshot();
        assert_eq!(summary.checks_passed + summary.checks_failed, 8_000);
        assert_eq!(summary.checks_failed, 2_000);
        assert_eq!(summary.frames_received, 8_000);
        assert!((summary.check_rate - 0.75).abs() < 1e-9);
    }
}
