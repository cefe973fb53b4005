//! Virtual user: one simulated client iteration across reconnect slices.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info_span, Instrument};

use crate::config::{client_id, RunConfig};
use crate::metrics::RunMetrics;
use crate::schedule::{deadline_after, slices};
use crate::session::{ConnectionSession, SessionEnd, SessionOutcome};

/// Runs one connection attempt for a given client and hold duration.
#[async_trait]
pub trait SessionDriver: Send + Sync {
    async fn run_session(&self, client_id: &str, hold: Duration) -> SessionOutcome;
}

/// Drives real WebSocket sessions.
pub struct WsSessionDriver {
    config: Arc<RunConfig>,
    metrics: Arc<RunMetrics>,
}

impl WsSessionDriver {
    pub fn new(config: Arc<RunConfig>, metrics: Arc<RunMetrics>) -> Self {
        Self { config, metrics }
    }
}

#[async_trait]
impl SessionDriver for WsSessionDriver {
    async fn run_session(&self, client_id: &str, hold: Duration) -> SessionOutcome {
        let mut session =
            ConnectionSession::new(self.config.clone(), self.metrics.clone(), client_id);
        session.run(hold).await
    }
}

/// Outcome of one slice.
#[derive(Debug, Clone)]
pub struct SliceReport {
    pub planned: Duration,
    pub outcome: SessionOutcome,
}

/// Everything one iteration did.
#[derive(Debug, Clone)]
pub struct IterationReport {
    pub client_id: String,
    pub total: Duration,
    pub slices: Vec<SliceReport>,
}

impl IterationReport {
    pub fn opened_sessions(&self) -> usize {
        self.slices.iter().filter(|s| s.outcome.opened()).count()
    }
}

/// One iteration of one simulated client.
pub struct VirtualUser {
    index: u32,
    iteration: u64,
    config: Arc<RunConfig>,
    driver: Arc<dyn SessionDriver>,
}

impl VirtualUser {
    /// `index` is 1-based, `iteration` counts from 0 per VU.
    pub fn new(
        index: u32,
        iteration: u64,
        config: Arc<RunConfig>,
        driver: Arc<dyn SessionDriver>,
    ) -> Self {
        Self {
            index,
            iteration,
            config,
            driver,
        }
    }

    pub fn client_id(&self) -> String {
        client_id(&self.config.client_prefix, self.index, self.iteration)
    }

    /// Slice lengths this iteration will run.
    pub fn plan(&self) -> Vec<Duration> {
        let total = self.config.total_session();
        if self.config.reconnect {
            slices(total, self.config.slice_len()).collect()
        } else {
            vec![total]
        }
    }

    pub async fn run(&self) -> IterationReport {
        let client_id = self.client_id();
        let span = info_span!("vu", vu = self.index, iter = self.iteration);
        self.run_slices(client_id).instrument(span).await
    }

    async fn run_slices(&self, client_id: String) -> IterationReport {
        let plan = self.plan();
        let delay = self.config.reconnect_delay();
        let mut reports = Vec::with_capacity(plan.len());

        for (idx, planned) in plan.iter().copied().enumerate() {
            let slice_start = Instant::now();
            debug!(%client_id, slice = idx, hold_secs = planned.as_secs_f64(), "starting slice");

            let outcome = self.driver.run_session(&client_id, planned).await;

            // A failed connect still uses up its slice; no early retry.
            if matches!(outcome.end, SessionEnd::ConnectFailed(_)) {
                tokio::time::sleep_until(deadline_after(slice_start, planned)).await;
            }
            reports.push(SliceReport { planned, outcome });

            if idx + 1 < plan.len() {
                tokio::time::sleep(delay).await;
            }
        }

        IterationReport {
            client_id,
            total: self.config.total_session(),
            slices: reports,
        }
    }
}
