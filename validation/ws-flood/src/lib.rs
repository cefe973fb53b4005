//! WebSocket flood load tester.
//!
//! This crate provides tools to:
//! - Resolve a run configuration from scenario files, flags and environment
//! - Ramp virtual users up and down against a stream endpoint
//! - Evaluate run-level thresholds over the collected metrics
//! - Output results in multiple formats (console, JSON, CSV)

pub mod config;
pub mod executor;
pub mod report;
pub mod runner;
pub mod thresholds;

pub use config::{resolve, ConfigOverrides};
pub use executor::{ExecutionStats, RampingExecutor, TimelinePoint};
pub use report::{ResultsReport, RunReport};
pub use runner::LoadRunner;
pub use thresholds::{
    all_passed, default_thresholds, evaluate, Threshold, ThresholdResult,
    THRESHOLDS_FAILED_EXIT_CODE,
};
