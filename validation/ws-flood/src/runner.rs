//! Load test orchestration: executor, metrics and threshold evaluation.

use crate::executor::RampingExecutor;
use crate::report::RunReport;
use crate::thresholds::{all_passed, default_thresholds, evaluate};
use flood_core::{RunConfig, RunMetrics, SessionDriver, WsSessionDriver};
use std::future::Future;
use std::sync::Arc;
use tracing::info;

/// Runs one load test against a WebSocket endpoint.
pub struct LoadRunner {
    name: String,
    config: Arc<RunConfig>,
    metrics: Arc<RunMetrics>,
    driver: Arc<dyn SessionDriver>,
    progress: bool,
}

impl LoadRunner {
    /// Create a runner that opens real WebSocket sessions.
    pub fn new(name: impl Into<String>, config: RunConfig) -> Self {
        let config = Arc::new(config);
        let metrics = Arc::new(RunMetrics::new());
        let driver = Arc::new(WsSessionDriver::new(config.clone(), metrics.clone()));
        Self {
            name: name.into(),
            config,
            metrics,
            driver,
            progress: false,
        }
    }

    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.progress = enabled;
        self
    }

    pub fn metrics(&self) -> Arc<RunMetrics> {
        self.metrics.clone()
    }

    /// Run until the ramp completes.
    pub async fn run(&self) -> RunReport {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Run until the ramp completes or `shutdown` resolves.
    ///
    /// A summary is produced either way.
    pub async fn run_until<F>(&self, shutdown: F) -> RunReport
    where
        F: Future<Output = ()>,
    {
        let target = self.config.url_for("{clientId}");
        info!(
            scenario = %self.name,
            target = %target,
            target_vus = self.config.target_vus,
            ramp_secs = self.config.ramp_secs,
            hold_secs = self.config.hold_secs,
            rampdown_secs = self.config.rampdown_secs,
            reconnect = self.config.reconnect,
            "Starting load test"
        );

        let executor = RampingExecutor::new(self.config.clone(), self.driver.clone())
            .with_progress(self.progress);
        let execution = executor.run_until(shutdown).await;

        let summary = self.metrics.snapshot();
        let thresholds = evaluate(&default_thresholds(), &summary);
        let passed = all_passed(&thresholds);

        info!(
            sessions = summary.sessions,
            checks_failed = summary.checks_failed,
            peak_vus = execution.peak_vus,
            passed,
            "Load test finished"
        );

        RunReport {
            name: self.name.clone(),
            target,
            summary,
            execution,
            thresholds,
            passed,
        }
    }
}
