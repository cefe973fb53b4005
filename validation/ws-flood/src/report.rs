//! Results reporting and formatting.

use crate::executor::ExecutionStats;
use crate::thresholds::ThresholdResult;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};
use flood_core::{slices, RampController, RunConfig, RunSummary};
use serde::Serialize;

/// Everything a finished run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub name: String,
    pub target: String,
    pub summary: RunSummary,
    pub execution: ExecutionStats,
    pub thresholds: Vec<ThresholdResult>,
    pub passed: bool,
}

/// Formats run reports for output.
pub struct ResultsReport;

impl ResultsReport {
    /// Format results as a console table.
    pub fn format_table(report: &RunReport) -> String {
        let s = &report.summary;
        let e = &report.execution;
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![format!("WebSocket Flood Results: {}", report.name)]);

        table.add_row(vec!["Target:", &report.target]);
        table.add_row(vec!["Duration:", &format!("{:.1}s", e.elapsed_secs)]);
        table.add_row(vec!["Peak VUs:", &format!("{}", e.peak_vus)]);
        table.add_row(vec![
            "Iterations:",
            &format!("{} complete / {} interrupted", e.iterations, e.interrupted),
        ]);

        table.add_row(vec!["", ""]);
        table.add_row(vec!["Sessions Opened:", &format!("{}", s.sessions)]);
        table.add_row(vec!["Stream Errors:", &format!("{}", s.stream_errors)]);
        table.add_row(vec![
            "Checks:",
            &format!(
                "{:.2}% ({} passed / {} failed)",
                s.check_rate * 100.0,
                s.checks_passed,
                s.checks_failed
            ),
        ]);
        table.add_row(vec![
            "Frames:",
            &format!("{} sent / {} received", s.frames_sent, s.frames_received),
        ]);
        table.add_row(vec![
            "Session Length:",
            &format!(
                "avg {:.1}s / max {:.1}s",
                s.session_duration_avg_secs, s.session_duration_max_secs
            ),
        ]);

        table.add_row(vec!["", ""]);
        table.add_row(vec!["Connecting (ms)", "p50 / p90 / p95 / p99 / max"]);
        table.add_row(vec![
            "",
            &format!(
                "{:.1} / {:.1} / {:.1} / {:.1} / {:.1}",
                s.connecting.p50, s.connecting.p90, s.connecting.p95, s.connecting.p99, s.connecting.max
            ),
        ]);

        table.add_row(vec!["", ""]);
        for t in &report.thresholds {
            let mark = if t.passed { "✓" } else { "✗" };
            table.add_row(vec![
                format!("{} {}", mark, t.metric),
                format!("{} (observed {:.3})", t.expression, t.observed),
            ]);
        }

        table.to_string()
    }

    /// Format results as JSON.
    pub fn format_json(report: &RunReport) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(report)?)
    }

    /// Format results as CSV row.
    pub fn format_csv(report: &RunReport) -> String {
        let s = &report.summary;
        format!(
            "{},{},{:.1},{},{},{},{:.4},{:.1},{:.1},{:.1},{}",
            s.timestamp,
            report.name,
            report.execution.elapsed_secs,
            report.execution.peak_vus,
            s.sessions,
            s.stream_errors,
            s.check_rate,
            s.connecting.p50,
            s.connecting.p95,
            s.connecting.p99,
            report.passed
        )
    }

    /// CSV header row.
    pub fn csv_header() -> &'static str {
        "timestamp,scenario,duration,peak_vus,sessions,stream_errors,check_rate,p50,p95,p99,passed"
    }

    /// Dry-run description of the ramp curve and per-iteration slice plan.
    pub fn format_plan(config: &RunConfig) -> String {
        let ramp = RampController::from_config(config);
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec!["Stage", "Duration", "Target VUs"]);
        for stage in ramp.stages() {
            table.add_row(vec![
                stage.name.to_string(),
                format!("{}s", stage.duration.as_secs()),
                stage.target.to_string(),
            ]);
        }
        table.add_row(vec![
            "total".to_string(),
            format!("{}s", ramp.total_duration().as_secs()),
            String::new(),
        ]);

        let total = config.total_session();
        let plan: Vec<String> = if config.reconnect {
            slices(total, config.slice_len())
                .map(|d| d.as_secs().to_string())
                .collect()
        } else {
            vec![total.as_secs().to_string()]
        };

        let mut out = format!("Target: {}\n{}\n", config.url_for("{clientId}"), table);
        out.push_str(&format!("Session per iteration: {}s\n", total.as_secs()));
        out.push_str(&format!("Slices (s): [{}]\n", plan.join(", ")));
        if config.reconnect && plan.len() > 1 {
            out.push_str(&format!(
                "Reconnect delay: {}ms x {}\n",
                config.reconnect_delay().as_millis(),
                plan.len() - 1
            ));
        }
        out.push_str(&format!(
            "Heartbeat: {}ms, hello: {}\n",
            config.heartbeat_ms,
            if config.hello { "on" } else { "off" }
        ));
        out
    }
}
