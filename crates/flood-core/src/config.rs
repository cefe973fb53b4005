//! Run configuration and connection parameter resolution.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::error::{FloodError, FloodResult};

/// Extra time a single-session client stays connected past the global hold stage.
pub const SESSION_SAFETY_MARGIN_SECS: u64 = 60;

/// Upper bound for any configured duration: one year.
pub const MAX_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

/// Header carrying the agent token on the upgrade request.
pub const AGENT_TOKEN_HEADER: &str = "X-Agent-Token";

/// WebSocket URL scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Ws,
    #[default]
    Wss,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Ws => write!(f, "ws"),
            Scheme::Wss => write!(f, "wss"),
        }
    }
}

impl std::str::FromStr for Scheme {
    type Err = FloodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ws" => Ok(Scheme::Ws),
            "wss" => Ok(Scheme::Wss),
            other => Err(FloodError::invalid_config(
                "scheme",
                format!("expected 'ws' or 'wss', got '{}'", other),
            )),
        }
    }
}

/// Fully-resolved run configuration.
///
/// Built once at process start and shared read-only (usually as
/// `Arc<RunConfig>`) with every component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub host: String,
    pub port: u16,
    pub scheme: Scheme,
    pub role: String,
    pub client_prefix: String,
    pub agent_token: Option<String>,
    pub tls_insecure: bool,

    pub heartbeat_ms: u64,
    pub hello: bool,
    pub reconnect: bool,
    /// Negative values are treated as zero.
    pub reconnect_delay_ms: i64,
    /// 0 derives the session length from `hold_secs`.
    pub session_secs: u64,
    pub slice_secs: u64,

    pub target_vus: u32,
    pub ramp_secs: u64,
    pub hold_secs: u64,
    pub rampdown_secs: u64,
    pub graceful_rampdown_secs: u64,

    pub poll_interval_ms: u64,
    pub connect_timeout_secs: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5173,
            scheme: Scheme::Wss,
            role: "client".to_string(),
            client_prefix: "flood".to_string(),
            agent_token: None,
            tls_insecure: false,
            heartbeat_ms: 15_000,
            hello: true,
            reconnect: false,
            reconnect_delay_ms: 2_000,
            session_secs: 0,
            slice_secs: 60,
            target_vus: 10_000,
            ramp_secs: 300,
            hold_secs: 600,
            rampdown_secs: 120,
            graceful_rampdown_secs: 30,
            poll_interval_ms: 1_000,
            connect_timeout_secs: 30,
        }
    }
}

impl RunConfig {
    /// Load configuration from a YAML scenario file.
    pub fn from_file(path: impl AsRef<Path>) -> FloodResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text. Missing fields keep their defaults.
    pub fn from_yaml(content: &str) -> FloodResult<Self> {
        let config: RunConfig = serde_yaml::from_str(content)?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> FloodResult<()> {
        if self.host.trim().is_empty() {
            return Err(FloodError::invalid_config("host", "must not be empty"));
        }
        if self.heartbeat_ms == 0 {
            return Err(FloodError::invalid_config("heartbeat_ms", "must be > 0"));
        }
        if self.reconnect && self.slice_secs == 0 {
            return Err(FloodError::invalid_config(
                "slice_secs",
                "must be > 0 when reconnect is enabled",
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(FloodError::invalid_config("poll_interval_ms", "must be > 0"));
        }
        for (field, secs) in [
            ("ramp_secs", self.ramp_secs),
            ("hold_secs", self.hold_secs),
            ("rampdown_secs", self.rampdown_secs),
            ("session_secs", self.session_secs),
            ("slice_secs", self.slice_secs),
            ("graceful_rampdown_secs", self.graceful_rampdown_secs),
            ("connect_timeout_secs", self.connect_timeout_secs),
            ("heartbeat_ms", self.heartbeat_ms / 1000),
            ("poll_interval_ms", self.poll_interval_ms / 1000),
            ("reconnect_delay_ms", self.reconnect_delay_ms.max(0) as u64 / 1000),
        ] {
            if secs > MAX_DURATION_SECS {
                return Err(FloodError::invalid_config(
                    field,
                    format!("must not exceed {} seconds", MAX_DURATION_SECS),
                ));
            }
        }
        let curve = self
            .ramp_secs
            .checked_add(self.hold_secs)
            .and_then(|s| s.checked_add(self.rampdown_secs))
            .ok_or_else(|| FloodError::invalid_config("hold_secs", "ramp duration overflows"))?;
        if self.target_vus > 0 && curve == 0 {
            return Err(FloodError::invalid_config(
                "hold_secs",
                "ramp, hold and ramp-down durations are all zero",
            ));
        }
        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }

    /// Pause between reconnect slices, clamped to be non-negative.
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms.max(0) as u64)
    }

    pub fn slice_len(&self) -> Duration {
        Duration::from_secs(self.slice_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn graceful_rampdown(&self) -> Duration {
        Duration::from_secs(self.graceful_rampdown_secs)
    }

    /// Total time one virtual user keeps a connection (or slices of one) alive.
    pub fn total_session(&self) -> Duration {
        if self.session_secs > 0 {
            Duration::from_secs(self.session_secs)
        } else {
            Duration::from_secs(self.hold_secs.saturating_add(SESSION_SAFETY_MARGIN_SECS))
        }
    }

    /// Stream endpoint for one client.
    pub fn url_for(&self, client_id: &str) -> String {
        format!(
            "{}://{}:{}/api/clients/{}/stream/ws?role={}",
            self.scheme, self.host, self.port, client_id, self.role
        )
    }

    /// Resolve URL and headers for one client.
    pub fn connection_params(&self, client_id: &str) -> ConnectionParams {
        let mut headers = Vec::new();
        if let Some(token) = self.agent_token.as_deref().filter(|t| !t.is_empty()) {
            headers.push((AGENT_TOKEN_HEADER.to_string(), token.to_string()));
        }
        ConnectionParams {
            url: self.url_for(client_id),
            headers,
            tls_insecure: self.tls_insecure,
            connect_timeout: self.connect_timeout(),
        }
    }
}

/// Everything needed to open one connection.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionParams {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub tls_insecure: bool,
    pub connect_timeout: Duration,
}

/// Deterministic client identity: `{prefix}-{vu}-{iteration}`.
pub fn client_id(prefix: &str, vu_index: u32, iteration: u64) -> String {
    format!("{}-{}-{}", prefix, vu_index, iteration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_surface() {
        let config = RunConfig::default();
        assert_eq!(config.heartbeat_ms, 15_000);
        assert!(config.hello);
        assert!(!config.reconnect);
        assert_eq!(config.reconnect_delay_ms, 2_000);
        assert_eq!(config.slice_secs, 60);
        assert_eq!(config.target_vus, 10_000);
        assert_eq!((config.ramp_secs, config.hold_secs, config.rampdown_secs), (300, 600, 120));
        config.validate().unwrap();
    }

    #[test]
    fn test_total_session_derived_from_hold() {
        let config = RunConfig {
            session_secs: 0,
            hold_secs: 600,
            ..Default::default()
        };
        assert_eq!(config.total_session(), Duration::from_secs(660));
    }

    #[test]
    fn test_total_session_explicit() {
        let config = RunConfig {
            session_secs: 150,
            ..Default::default()
        };
        assert_eq!(config.total_session(), Duration::from_secs(150));
    }

    #[test]
    fn test_negative_reconnect_delay_clamped() {
        let config = RunConfig {
            reconnect_delay_ms: -500,
            ..Default::default()
        };
        assert_eq!(config.reconnect_delay(), Duration::ZERO);
    }

    #[test]
    fn test_url_for() {
        let config = RunConfig {
            host: "example.test".into(),
            port: 8443,
            role: "viewer".into(),
            ..Default::default()
        };
        assert_eq!(
            config.url_for("flood-3-7"),
            "wss://example.test:8443/api/clients/flood-3-7/stream/ws?role=viewer"
        );
    }

    #[test]
    fn test_connection_params_token_header() {
        let mut config = RunConfig::default();
        assert!(config.connection_params("a").headers.is_empty());

        config.agent_token = Some(String::new());
        assert!(config.connection_params("a").headers.is_empty());

        config.agent_token = Some("s3cret".into());
        let params = config.connection_params("a");
        assert_eq!(
            params.headers,
            vec![("X-Agent-Token".to_string(), "s3cret".to_string())]
        );
    }

    #[test]
    fn test_client_id() {
        assert_eq!(client_id("flood", 12, 0), "flood-12-0");
    }

    #[test]
    fn test_validate_rejects_zero_slice_with_reconnect() {
        let config = RunConfig {
            reconnect: true,
            slice_secs: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(FloodError::InvalidConfig { ref field, .. }) if field == "slice_secs"
        ));

        let config = RunConfig {
            reconnect: false,
            slice_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_heartbeat() {
        let config = RunConfig {
            heartbeat_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_huge_durations() {
        let config = RunConfig {
            ramp_secs: u64::MAX,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(FloodError::InvalidConfig { ref field, .. }) if field == "ramp_secs"
        ));

        let config = RunConfig {
            graceful_rampdown_secs: MAX_DURATION_SECS + 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = RunConfig {
            reconnect_delay_ms: i64::MAX,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = RunConfig {
            hold_secs: MAX_DURATION_SECS,
            ramp_secs: MAX_DURATION_SECS,
            rampdown_secs: MAX_DURATION_SECS,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_total_session_saturates() {
        let config = RunConfig {
            session_secs: 0,
            hold_secs: u64::MAX,
            ..Default::default()
        };
        assert_eq!(config.total_session(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_from_yaml_partial() {
        let config = RunConfig::from_yaml(
            "host: ws.internal\nscheme: ws\nreconnect: true\nslice_secs: 30\ntarget_vus: 50\n",
        )
        .unwrap();
        assert_eq!(config.host, "ws.internal");
        assert_eq!(config.scheme, Scheme::Ws);
        assert!(config.reconnect);
        assert_eq!(config.slice_secs, 30);
        assert_eq!(config.target_vus, 50);
        assert_eq!(config.heartbeat_ms, 15_000);
    }

    #[test]
    fn test_from_yaml_rejects_non_numeric() {
        assert!(matches!(
            RunConfig::from_yaml("hold_secs: forever\n"),
            Err(FloodError::Scenario(_))
        ));
    }

    #[test]
    fn test_scheme_parse() {
        assert_eq!("WSS".parse::<Scheme>().unwrap(), Scheme::Wss);
        assert_eq!("ws".parse::<Scheme>().unwrap(), Scheme::Ws);
        assert!("http".parse::<Scheme>().is_err());
    }
}
