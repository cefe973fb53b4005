//! Run-level pass/fail thresholds.

use flood_core::RunSummary;
use serde::Serialize;
use std::fmt;

/// Exit code when at least one threshold fails.
pub const THRESHOLDS_FAILED_EXIT_CODE: i32 = 99;

/// A single pass/fail rule over the final summary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Threshold {
    /// p95 connecting latency strictly below the given milliseconds.
    ConnectingP95BelowMs(f64),
    /// Opened-session count strictly above the given value.
    SessionsAbove(u64),
    /// Check pass rate strictly above the given ratio.
    CheckRateAbove(f64),
}

impl Threshold {
    pub fn metric(&self) -> &'static str {
        match self {
            Threshold::ConnectingP95BelowMs(_) => "ws_connecting",
            Threshold::SessionsAbove(_) => "ws_sessions",
            Threshold::CheckRateAbove(_) => "checks",
        }
    }

    fn observe(&self, summary: &RunSummary) -> (f64, bool) {
        match *self {
            Threshold::ConnectingP95BelowMs(limit) => {
                let p95 = summary.connecting.p95;
                (p95, p95 < limit)
            }
            Threshold::SessionsAbove(min) => (summary.sessions as f64, summary.sessions > min),
            Threshold::CheckRateAbove(min) => (summary.check_rate, summary.check_rate > min),
        }
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Threshold::ConnectingP95BelowMs(limit) => write!(f, "p(95)<{}", limit),
            Threshold::SessionsAbove(min) => write!(f, "count>{}", min),
            Threshold::CheckRateAbove(min) => write!(f, "rate>{}", min),
        }
    }
}

/// Outcome of one threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdResult {
    pub metric: &'static str,
    pub expression: String,
    pub observed: f64,
    pub passed: bool,
}

/// ws_connecting p(95)<1500, ws_sessions count>0, checks rate>0.99.
pub fn default_thresholds() -> Vec<Threshold> {
    vec![
        Threshold::ConnectingP95BelowMs(1500.0),
        Threshold::SessionsAbove(0),
        Threshold::CheckRateAbove(0.99),
    ]
}

pub fn evaluate(thresholds: &[Threshold], summary: &RunSummary) -> Vec<ThresholdResult> {
    thresholds
        .iter()
        .map(|t| {
            let (observed, passed) = t.observe(summary);
            ThresholdResult {
                metric: t.metric(),
                expression: t.to_string(),
                observed,
                passed,
            }
        })
        .collect()
}

pub fn all_passed(results: &[ThresholdResult]) -> bool {
    results.iter().all(|r| r.passed)
}
