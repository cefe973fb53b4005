//! WebSocket flood CLI.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};
use ws_flood::{resolve, ConfigOverrides, LoadRunner, ResultsReport, THRESHOLDS_FAILED_EXIT_CODE};

#[derive(Parser)]
#[command(name = "ws-flood")]
#[command(about = "Ramping WebSocket connection flood for client stream endpoints", long_about = None)]
struct Cli {
    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a load test
    Run {
        /// Path to scenario YAML file
        #[arg(short, long)]
        scenario: Option<PathBuf>,

        #[command(flatten)]
        overrides: ConfigOverrides,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,

        /// Disable the progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// Print the ramp curve and slice plan without connecting
    Plan {
        /// Path to scenario YAML file
        #[arg(short, long)]
        scenario: Option<PathBuf>,

        #[command(flatten)]
        overrides: ConfigOverrides,
    },

    /// List available scenarios
    List {
        /// Scenarios directory
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn scenario_name(scenario: Option<&Path>) -> String {
    scenario
        .and_then(|p| p.file_stem())
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "env".to_string())
}

fn default_scenarios_dir() -> PathBuf {
    let in_workspace = Path::new("validation/ws-flood/scenarios");
    if in_workspace.exists() {
        in_workspace.to_path_buf()
    } else {
        PathBuf::from("scenarios")
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_json);

    match cli.command {
        Commands::Run {
            scenario,
            overrides,
            output,
            no_progress,
        } => {
            let config = resolve(scenario.as_deref(), overrides)
                .context("Invalid run configuration")?;

            let runner = LoadRunner::new(scenario_name(scenario.as_deref()), config)
                .with_progress(!no_progress);

            let report = runner
                .run_until(async {
                    tokio::signal::ctrl_c().await.ok();
                    info!("Received shutdown signal");
                })
                .await;

            match output {
                OutputFormat::Json => println!("{}", ResultsReport::format_json(&report)?),
                OutputFormat::Csv => {
                    println!("{}", ResultsReport::csv_header());
                    println!("{}", ResultsReport::format_csv(&report));
                }
                OutputFormat::Table => println!("{}", ResultsReport::format_table(&report)),
            }

            if !report.passed {
                eprintln!("Thresholds failed");
                std::process::exit(THRESHOLDS_FAILED_EXIT_CODE);
            }
            Ok(())
        }
        Commands::Plan {
            scenario,
            overrides,
        } => {
            let config = resolve(scenario.as_deref(), overrides)
                .context("Invalid run configuration")?;
            print!("{}", ResultsReport::format_plan(&config));
            Ok(())
        }
        Commands::List { dir } => {
            let dir = dir.unwrap_or_else(default_scenarios_dir);
            println!("Available scenarios in {}:", dir.display());
            println!();

            let entries = std::fs::read_dir(&dir)
                .with_context(|| format!("Failed to read {}", dir.display()))?;

            let mut scenarios = Vec::new();
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|s| s.to_str()) != Some("yaml") {
                    continue;
                }
                let name = scenario_name(Some(&path));
                match flood_core::RunConfig::from_file(&path) {
                    Ok(config) => scenarios.push((
                        name,
                        format!(
                            "{} VUs, {}s/{}s/{}s, reconnect {}",
                            config.target_vus,
                            config.ramp_secs,
                            config.hold_secs,
                            config.rampdown_secs,
                            if config.reconnect { "on" } else { "off" }
                        ),
                    )),
                    Err(e) => scenarios.push((name, format!("invalid: {}", e))),
                }
            }
            scenarios.sort();

            if scenarios.is_empty() {
                println!("No scenario files found");
            } else {
                for (name, desc) in scenarios {
                    println!("  {} - {}", name, desc);
                }
            }
            Ok(())
        }
    }
}
