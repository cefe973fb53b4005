//! Configuration resolution: scenario file, then flag/env overrides.

use clap::{ArgAction, Args};
use flood_core::{RunConfig, Scheme};
use std::path::Path;

/// Parse on/off style values such as `1`, `true`, `0`, `false`.
pub fn parse_switch(value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(format!("expected 1/0 or true/false, got '{}'", other)),
    }
}

/// `HELLO` stays on for anything but `0`.
pub fn parse_hello(value: &str) -> Result<bool, String> {
    Ok(value.trim() != "0")
}

/// Per-field overrides, each settable by flag or environment variable.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Target host
    #[arg(long, env = "HOST")]
    pub host: Option<String>,

    /// Target port
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// ws or wss
    #[arg(long, env = "SCHEME")]
    pub scheme: Option<Scheme>,

    /// Value of the `role` query parameter
    #[arg(long, env = "ROLE")]
    pub role: Option<String>,

    /// Prefix of generated client ids
    #[arg(long, env = "CLIENT_PREFIX")]
    pub client_prefix: Option<String>,

    /// Sent as X-Agent-Token when non-empty
    #[arg(long, env = "AGENT_TOKEN", hide_env_values = true)]
    pub agent_token: Option<String>,

    /// Skip TLS certificate verification
    #[arg(long, env = "TLS_INSECURE", value_parser = parse_switch, action = ArgAction::Set)]
    pub tls_insecure: Option<bool>,

    /// Heartbeat ping interval in milliseconds
    #[arg(long, env = "HEARTBEAT_MS")]
    pub heartbeat_ms: Option<u64>,

    /// Send a hello frame before the first ping
    #[arg(long, env = "HELLO", value_parser = parse_hello, action = ArgAction::Set)]
    pub hello: Option<bool>,

    /// Split each session into reconnecting slices
    #[arg(long, env = "RECONNECT", value_parser = parse_switch, action = ArgAction::Set)]
    pub reconnect: Option<bool>,

    /// Pause between slices in milliseconds (negative means none)
    #[arg(long, env = "RECONNECT_DELAY_MS", allow_negative_numbers = true)]
    pub reconnect_delay_ms: Option<i64>,

    /// Total session seconds per iteration (0 = hold + 60)
    #[arg(long, env = "SESSION_SEC")]
    pub session_secs: Option<u64>,

    /// Slice length in seconds when reconnecting
    #[arg(long, env = "SLICE_SEC")]
    pub slice_secs: Option<u64>,

    /// Peak number of virtual users
    #[arg(long, env = "TARGET_VUS")]
    pub target_vus: Option<u32>,

    /// Ramp-up seconds
    #[arg(long, env = "RAMP_SEC")]
    pub ramp_secs: Option<u64>,

    /// Hold seconds
    #[arg(long, env = "HOLD_SEC")]
    pub hold_secs: Option<u64>,

    /// Ramp-down seconds
    #[arg(long, env = "RAMPDOWN_SEC")]
    pub rampdown_secs: Option<u64>,

    /// Seconds a retired VU may keep running its current iteration
    #[arg(long, env = "GRACEFUL_RAMPDOWN_SEC")]
    pub graceful_rampdown_secs: Option<u64>,
}

impl ConfigOverrides {
    /// Apply every set override on top of `base`.
    pub fn apply(self, mut base: RunConfig) -> RunConfig {
        macro_rules! set {
            ($($field:ident),* $(,)?) => {
                $(if let Some(v) = self.$field { base.$field = v; })*
            };
        }
        set!(
            host,
            port,
            scheme,
            role,
            client_prefix,
            tls_insecure,
            heartbeat_ms,
            hello,
            reconnect,
            reconnect_delay_ms,
            session_secs,
            slice_secs,
            target_vus,
            ramp_secs,
            hold_secs,
            rampdown_secs,
            graceful_rampdown_secs,
        );
        if let Some(token) = self.agent_token {
            base.agent_token = if token.is_empty() { None } else { Some(token) };
        }
        base
    }
}

/// Load the scenario (or defaults), apply overrides, and validate.
pub fn resolve(scenario: Option<&Path>, overrides: ConfigOverrides) -> anyhow::Result<RunConfig> {
    let base = match scenario {
        Some(path) => RunConfig::from_file(path)
            .map_err(|e| anyhow::anyhow!("{}: {}", path.display(), e))?,
        None => RunConfig::default(),
    };
    let config = overrides.apply(base);
    config.validate()?;
    Ok(config)
}
