//! Shared test utilities for the ws-flood workspace.
//!
//! This crate provides common testing infrastructure including:
//! - In-process WebSocket servers that record client frames
//! - Scenario path helpers
//! - Common test fixtures
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Then import in your tests:
//!
//! ```ignore
//! use test_utils::{RecordingServer, ServerBehavior};
//! ```

pub mod fixtures;
pub mod paths;
pub mod ws_server;

// Re-export commonly used items at the crate root
pub use paths::*;
pub use ws_server::*;

/// Macro for approximate floating-point equality assertions.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_approx_eq;
///
/// assert_approx_eq!(0.9901_f64, 0.99_f64, 0.001_f64); // passes
/// assert_approx_eq!(1.1_f32, 1.0_f32, 0.001_f32);     // fails
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left: f64 = $left as f64;
        let right: f64 = $right as f64;
        let epsilon: f64 = $epsilon as f64;
        let diff = (left - right).abs();
        if diff > epsilon {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`,\n right: `{:?}`,\n  diff: `{:?}` > epsilon `{:?}`",
                left, right, diff, epsilon
            );
        }
    }};
}

/// Macro asserting a duration lies within `[low, high]`.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_duration_between;
///
/// assert_duration_between!(elapsed, Duration::from_secs(2), Duration::from_secs(3));
/// ```
#[macro_export]
macro_rules! assert_duration_between {
    ($actual:expr, $low:expr, $high:expr) => {{
        let actual: std::time::Duration = $actual;
        let low: std::time::Duration = $low;
        let high: std::time::Duration = $high;
        if actual < low || actual > high {
            panic!(
                "assertion failed: `{:?}` not within [`{:?}`, `{:?}`]",
                actual, low, high
            );
        }
    }};
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    #[test]
    fn test_assert_approx_eq_passes() {
        assert_approx_eq!(1.0001, 1.0, 0.001);
        assert_approx_eq!(0.0, 0.0, 0.0001);
        assert_approx_eq!(-5.5, -5.500001, 0.0001);
    }

    #[test]
    #[should_panic(expected = "assertion failed")]
    fn test_assert_approx_eq_fails() {
        assert_approx_eq!(1.1, 1.0, 0.001);
    }

    #[test]
    fn test_assert_duration_between_passes() {
        assert_duration_between!(
            Duration::from_millis(1500),
            Duration::from_secs(1),
            Duration::from_secs(2)
        );
    }

    #[test]
    #[should_panic(expected = "not within")]
    fn test_assert_duration_between_fails() {
        assert_duration_between!(
            Duration::from_secs(3),
            Duration::from_secs(1),
            Duration::from_secs(2)
        );
    }
}
