//! Ramping VU executor.
//!
//! Every tick the executor compares the number of active virtual users with
//! the ramp target and starts or retires VU tasks to match it. A retired VU
//! finishes its current iteration within the graceful ramp-down window and
//! is aborted after that.

use flood_core::{deadline_after, RampController, RunConfig, SessionDriver, VirtualUser};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How often the executor reconciles active VUs with the target.
pub const TICK: Duration = Duration::from_millis(100);

/// Active VU count observed whenever the target changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimelinePoint {
    pub elapsed_ms: u64,
    pub target: u32,
    pub active: u32,
}

/// What the executor did over the whole run.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionStats {
    pub peak_vus: u32,
    /// Iterations that ran to completion.
    pub iterations: u64,
    /// VU tasks aborted after the grace window or by shutdown.
    pub interrupted: u64,
    /// True when the run was cut short by the shutdown signal.
    pub aborted: bool,
    pub elapsed_secs: f64,
    #[serde(skip)]
    pub timeline: Vec<TimelinePoint>,
}

struct ActiveVu {
    stop: CancellationToken,
    handle: JoinHandle<()>,
}

struct RetiringVu {
    index: u32,
    deadline: Instant,
    handle: JoinHandle<()>,
}

/// VU slots and their tasks.
struct VuPool {
    config: Arc<RunConfig>,
    driver: Arc<dyn SessionDriver>,
    slots: Vec<Option<ActiveVu>>,
    /// Per-slot iteration counters; they survive deactivation.
    iterations: Vec<Arc<AtomicU64>>,
    retiring: Vec<RetiringVu>,
    completed: Arc<AtomicU64>,
    interrupted: u64,
    peak: u32,
}

impl VuPool {
    fn new(config: Arc<RunConfig>, driver: Arc<dyn SessionDriver>) -> Self {
        Self {
            config,
            driver,
            slots: Vec::new(),
            iterations: Vec::new(),
            retiring: Vec::new(),
            completed: Arc::new(AtomicU64::new(0)),
            interrupted: 0,
            peak: 0,
        }
    }

    fn active(&self) -> u32 {
        self.slots.iter().filter(|s| s.is_some()).count() as u32
    }

    fn reconcile(&mut self, target: u32) {
        let mut active = self.active();
        while active < target {
            self.activate();
            active += 1;
        }
        while active > target {
            self.retire_highest();
            active -= 1;
        }
        self.peak = self.peak.max(active);
    }

    /// Start a VU in the lowest free slot whose previous occupant has exited.
    fn activate(&mut self) {
        let free = self.slots.iter().enumerate().position(|(slot, vu)| {
            vu.is_none() && !self.retiring.iter().any(|r| r.index == slot as u32 + 1)
        });
        let slot = match free {
            Some(free) => free,
            None => {
                self.slots.push(None);
                self.iterations.push(Arc::new(AtomicU64::new(0)));
                self.slots.len() - 1
            }
        };
        let index = slot as u32 + 1;
        let stop = CancellationToken::new();
        let handle = tokio::spawn(vu_loop(
            index,
            self.iterations[slot].clone(),
            self.completed.clone(),
            self.config.clone(),
            self.driver.clone(),
            stop.clone(),
        ));
        debug!(vu = index, "VU started");
        self.slots[slot] = Some(ActiveVu { stop, handle });
    }

    fn retire_highest(&mut self) {
        let Some(slot) = self.slots.iter().rposition(Option::is_some) else {
            return;
        };
        if let Some(vu) = self.slots[slot].take() {
            self.retire(slot as u32 + 1, vu);
        }
    }

    fn retire(&mut self, index: u32, vu: ActiveVu) {
        vu.stop.cancel();
        debug!(vu = index, "VU retiring");
        self.retiring.push(RetiringVu {
            index,
            deadline: deadline_after(Instant::now(), self.config.graceful_rampdown()),
            handle: vu.handle,
        });
    }

    fn retire_all(&mut self) {
        for slot in 0..self.slots.len() {
            if let Some(vu) = self.slots[slot].take() {
                self.retire(slot as u32 + 1, vu);
            }
        }
    }

    /// Drop finished retirees and abort the ones past their grace window.
    fn reap(&mut self, now: Instant) {
        let mut interrupted = 0;
        self.retiring.retain(|vu| {
            if vu.handle.is_finished() {
                return false;
            }
            if now >= vu.deadline {
                warn!(vu = vu.index, "Grace period elapsed, interrupting iteration");
                vu.handle.abort();
                interrupted += 1;
                return false;
            }
            true
        });
        self.interrupted += interrupted;
    }

    fn abort_all(&mut self) {
        for vu in self.slots.iter_mut().filter_map(Option::take) {
            vu.handle.abort();
            self.interrupted += 1;
        }
        for vu in self.retiring.drain(..) {
            if !vu.handle.is_finished() {
                vu.handle.abort();
                self.interrupted += 1;
            }
        }
    }
}

impl Drop for VuPool {
    fn drop(&mut self) {
        for vu in self.slots.iter().flatten() {
            vu.handle.abort();
        }
        for vu in &self.retiring {
            vu.handle.abort();
        }
    }
}

/// Run iterations back to back until told to stop.
async fn vu_loop(
    index: u32,
    iterations: Arc<AtomicU64>,
    completed: Arc<AtomicU64>,
    config: Arc<RunConfig>,
    driver: Arc<dyn SessionDriver>,
    stop: CancellationToken,
) {
    while !stop.is_cancelled() {
        let iteration = iterations.fetch_add(1, Ordering::Relaxed);
        let report = VirtualUser::new(index, iteration, config.clone(), driver.clone())
            .run()
            .await;
        completed.fetch_add(1, Ordering::Relaxed);
        debug!(
            client_id = %report.client_id,
            opened = report.opened_sessions(),
            slices = report.slices.len(),
            "Iteration complete"
        );
    }
}

/// Follows a [`RampController`] curve with a pool of virtual users.
pub struct RampingExecutor {
    config: Arc<RunConfig>,
    ramp: RampController,
    driver: Arc<dyn SessionDriver>,
    tick: Duration,
    progress: bool,
}

impl RampingExecutor {
    pub fn new(config: Arc<RunConfig>, driver: Arc<dyn SessionDriver>) -> Self {
        let ramp = RampController::from_config(&config);
        Self {
            config,
            ramp,
            driver,
            tick: TICK,
            progress: false,
        }
    }

    /// Follow `ramp` instead of the curve derived from the config.
    pub fn with_ramp(mut self, ramp: RampController) -> Self {
        self.ramp = ramp;
        self
    }

    /// Show an indicatif progress bar on stderr.
    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.progress = enabled;
        self
    }

    pub fn ramp(&self) -> &RampController {
        &self.ramp
    }

    /// Run the full curve.
    pub async fn run(&self) -> ExecutionStats {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Run the full curve, aborting every VU as soon as `shutdown` resolves.
    pub async fn run_until<F>(&self, shutdown: F) -> ExecutionStats
    where
        F: Future<Output = ()>,
    {
        let started = Instant::now();
        let pb = self.progress_bar();
        let mut pool = VuPool::new(self.config.clone(), self.driver.clone());
        let mut timeline = Vec::new();

        let graceful = tokio::select! {
            _ = async {
                self.follow_ramp(&mut pool, &mut timeline, &pb, started).await;
                pb.set_message("graceful stop");
                self.drain(&mut pool).await;
            } => true,
            _ = shutdown => false,
        };

        if !graceful {
            warn!(active = pool.active(), "Shutdown requested, aborting all VUs");
            pool.abort_all();
        }
        pb.finish_and_clear();

        ExecutionStats {
            peak_vus: pool.peak,
            iterations: pool.completed.load(Ordering::Relaxed),
            interrupted: pool.interrupted,
            aborted: !graceful,
            elapsed_secs: started.elapsed().as_secs_f64(),
            timeline,
        }
    }

    async fn follow_ramp(
        &self,
        pool: &mut VuPool,
        timeline: &mut Vec<TimelinePoint>,
        pb: &ProgressBar,
        started: Instant,
    ) {
        let total = self.ramp.total_duration();
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut stage = None;
        let mut last_target = None;

        loop {
            ticker.tick().await;
            let elapsed = started.elapsed();
            let target = self.ramp.target(elapsed);

            let current = self.ramp.stage_at(elapsed);
            if current.map(|(i, _)| i) != stage.map(|(i, _)| i) {
                if let Some((_, name)) = current {
                    info!(stage = name, target, active = pool.active(), "Entering stage");
                }
                stage = current;
            }

            pool.reap(Instant::now());
            pool.reconcile(target);

            if last_target != Some(target) {
                timeline.push(TimelinePoint {
                    elapsed_ms: elapsed.as_millis() as u64,
                    target,
                    active: pool.active(),
                });
                last_target = Some(target);
            }

            pb.set_position(elapsed.as_secs().min(total.as_secs()));
            pb.set_message(format!(
                "{} vus={}",
                stage.map(|(_, name)| name).unwrap_or("done"),
                pool.active()
            ));

            if elapsed >= total {
                break;
            }
        }
    }

    /// Give every remaining VU the grace window, then abort stragglers.
    async fn drain(&self, pool: &mut VuPool) {
        pool.retire_all();
        if !pool.retiring.is_empty() {
            info!(
                remaining = pool.retiring.len(),
                grace_secs = self.config.graceful_rampdown_secs,
                "Ramp finished, waiting for running iterations"
            );
        }
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        while !pool.retiring.is_empty() {
            ticker.tick().await;
            pool.reap(Instant::now());
        }
    }

    fn progress_bar(&self) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(self.ramp.total_duration().as_secs());
        let style = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len}s {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-");
        pb.set_style(style);
        pb
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use flood_core::{SessionEnd, SessionOutcome, Stage};
    use std::sync::Mutex;

    /// Holds every session for its full duration and records client ids.
    #[derive(Default)]
    struct HoldingDriver {
        ids: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SessionDriver for HoldingDriver {
        async fn run_session(&self, client_id: &str, hold: Duration) -> SessionOutcome {
            self.ids.lock().unwrap().push(client_id.to_string());
            tokio::time::sleep(hold).await;
            SessionOutcome {
                status: Some(101),
                connecting: Some(Duration::from_millis(1)),
                open_for: hold,
                end: SessionEnd::HoldExpired,
            }
        }
    }

    fn config(target_vus: u32, session_secs: u64) -> RunConfig {
        RunConfig {
            target_vus,
            ramp_secs: 4,
            hold_secs: 4,
            rampdown_secs: 4,
            session_secs,
            graceful_rampdown_secs: 30,
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_active_follows_target() {
        let driver = Arc::new(HoldingDriver::default());
        let executor = RampingExecutor::new(Arc::new(config(4, 1)), driver);

        let stats = executor.run().await;

        assert!(!stats.aborted);
        assert_eq!(stats.peak_vus, 4);
        assert!(!stats.timeline.is_empty());
        for point in &stats.timeline {
            assert_eq!(point.active, point.target, "at {}ms", point.elapsed_ms);
        }
        assert_eq!(stats.timeline.last().map(|p| p.target), Some(0));
        assert_eq!(stats.interrupted, 0);
        assert!(stats.iterations > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_iteration_numbers_are_per_vu() {
        let driver = Arc::new(HoldingDriver::default());
        let cfg = RunConfig {
            ramp_secs: 0,
            hold_secs: 10,
            rampdown_secs: 0,
            ..config(1, 3)
        };
        let executor = RampingExecutor::new(Arc::new(cfg), driver.clone());

        executor.run().await;

        let ids = driver.ids.lock().unwrap().clone();
        assert!(ids.len() >= 3);
        for (iter, id) in ids.iter().enumerate() {
            assert_eq!(id, &format!("flood-1-{}", iter));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_window_interrupts_long_iterations() {
        let driver = Arc::new(HoldingDriver::default());
        let cfg = RunConfig {
            graceful_rampdown_secs: 1,
            ..config(2, 600)
        };
        let executor = RampingExecutor::new(Arc::new(cfg), driver);

        let started = Instant::now();
        let stats = executor.run().await;

        assert_eq!(stats.peak_vus, 2);
        assert_eq!(stats.iterations, 0);
        assert_eq!(stats.interrupted, 2);
        // Curve is 12s, each retiree gets at most one more second.
        assert!(started.elapsed() <= Duration::from_secs(14));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_aborts_immediately() {
        let driver = Arc::new(HoldingDriver::default());
        let executor = RampingExecutor::new(Arc::new(config(4, 600)), driver);

        let started = Instant::now();
        let stats = executor
            .run_until(tokio::time::sleep(Duration::from_secs(6)))
            .await;

        assert!(stats.aborted);
        assert_eq!(stats.interrupted, 4);
        assert!(started.elapsed() < Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slot_of_retiring_vu_is_not_reused() {
        let driver = Arc::new(HoldingDriver::default());
        let stage = |name, secs, target| Stage {
            name,
            duration: Duration::from_secs(secs),
            target,
        };
        // 2 VUs, dip to 1 while the retiree is still in its grace window, back to 2.
        let ramp = RampController::new(
            0,
            vec![
                stage("up", 0, 2),
                stage("hold", 2, 2),
                stage("dip", 0, 1),
                stage("dip-hold", 1, 1),
                stage("back", 0, 2),
                stage("hold-again", 2, 2),
                stage("down", 0, 0),
            ],
        );
        let executor =
            RampingExecutor::new(Arc::new(config(2, 600)), driver.clone()).with_ramp(ramp);

        let stats = executor.run().await;

        let mut ids = driver.ids.lock().unwrap().clone();
        ids.sort();
        assert_eq!(ids, vec!["flood-1-0", "flood-2-0", "flood-3-0"]);
        assert_eq!(stats.peak_vus, 2);
        assert_eq!(stats.interrupted, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_target_spawns_nothing() {
        let driver = Arc::new(HoldingDriver::default());
        let executor = RampingExecutor::new(Arc::new(config(0, 1)), driver.clone());

        let stats = executor.run().await;

        assert_eq!(stats.peak_vus, 0);
        assert!(driver.ids.lock().unwrap().is_empty());
    }
}
