//! Target concurrency curve.
//!
//! The curve is a sequence of linear stages starting from zero VUs. Each stage
//! moves from the previous stage's target to its own over its duration. This
//! only describes *how many* VUs should be active; the executor that spawns
//! and retires them lives outside this crate.

use serde::Serialize;
use std::time::Duration;

use crate::config::RunConfig;

/// One linear segment of the ramp curve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stage {
    pub name: &'static str,
    pub duration: Duration,
    pub target: u32,
}

/// Piecewise-linear target curve.
#[derive(Debug, Clone)]
pub struct RampController {
    start: u32,
    stages: Vec<Stage>,
}

impl RampController {
    /// Build a curve from explicit stages, starting at `start` VUs.
    pub fn new(start: u32, stages: Vec<Stage>) -> Self {
        Self { start, stages }
    }

    /// Ramp-up, hold, ramp-down.
    pub fn from_config(config: &RunConfig) -> Self {
        Self::new(
            0,
            vec![
                Stage {
                    name: "ramp-up",
                    duration: Duration::from_secs(config.ramp_secs),
                    target: config.target_vus,
                },
                Stage {
                    name: "hold",
                    duration: Duration::from_secs(config.hold_secs),
                    target: config.target_vus,
                },
                Stage {
                    name: "ramp-down",
                    duration: Duration::from_secs(config.rampdown_secs),
                    target: 0,
                },
            ],
        )
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Sum of all stage durations.
    pub fn total_duration(&self) -> Duration {
        self.stages
            .iter()
            .fold(Duration::ZERO, |total, s| total.saturating_add(s.duration))
    }

    /// Target VU count at `elapsed` since the start of the run.
    pub fn target(&self, elapsed: Duration) -> u32 {
        let mut from = self.start;
        let mut stage_start = Duration::ZERO;

        for stage in &self.stages {
            let stage_end = stage_start.saturating_add(stage.duration);
            // Zero-length stages fall through and jump straight to their target.
            if elapsed < stage_end {
                let progress = (elapsed - stage_start).as_secs_f64() / stage.duration.as_secs_f64();
                return interpolate(from, stage.target, progress);
            }
            from = stage.target;
            stage_start = stage_end;
        }

        from
    }

    /// Index and name of the stage active at `elapsed`, or `None` once the curve is over.
    pub fn stage_at(&self, elapsed: Duration) -> Option<(usize, &'static str)> {
        let mut stage_end = Duration::ZERO;
        for (idx, stage) in self.stages.iter().enumerate() {
            stage_end = stage_end.saturating_add(stage.duration);
            if elapsed < stage_end {
                return Some((idx, stage.name));
            }
        }
        None
    }
}

fn interpolate(from: u32, to: u32, progress: f64) -> u32 {
    let progress = progress.clamp(0.0, 1.0);
    let value = from as f64 + (to as f64 - from as f64) * progress;
    value.round() as u32
}
