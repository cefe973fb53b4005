//! Core of the WebSocket flood tester.
//!
//! This crate models a single simulated client's connection lifecycle:
//! - Target concurrency curve (`ramp`)
//! - Reconnect slicing of a session budget (`schedule`)
//! - Connect / hello / heartbeat / hold / teardown (`session`)
//! - Per-iteration driver across slices (`vu`)
//! - Shared check and latency bookkeeping (`metrics`)
//!
//! It consumes a fully-resolved [`RunConfig`]; spawning virtual users to
//! follow the ramp is left to the caller.

pub mod config;
pub mod error;
pub mod frames;
pub mod metrics;
pub mod ramp;
pub mod schedule;
pub mod session;
pub mod vu;

pub use config::{client_id, ConnectionParams, RunConfig, Scheme};
pub use error::{FloodError, FloodResult};
pub use frames::{ClientFrame, Hello};
pub use metrics::{CheckSummary, LatencySummary, RunMetrics, RunSummary, HANDSHAKE_CHECK};
pub use ramp::{RampController, Stage};
pub use schedule::{deadline_after, slices, Slices};
pub use session::{ConnectionSession, Phase, SessionEnd, SessionOutcome, SessionState};
pub use vu::{IterationReport, SessionDriver, SliceReport, VirtualUser, WsSessionDriver};
