//! Common test fixtures for ws-flood tests.

/// YAML scenario snippets.
pub mod scenarios {
    /// Small plain-ws run against localhost.
    pub const LOCAL_SMOKE: &str = "\
host: 127.0.0.1
scheme: ws
target_vus: 5
ramp_secs: 2
hold_secs: 3
rampdown_secs: 1
heartbeat_ms: 500
";

    /// Reconnecting run with short slices.
    pub const RECONNECT: &str = "\
scheme: ws
reconnect: true
reconnect_delay_ms: 2000
session_secs: 150
slice_secs: 60
";

    /// Invalid: reconnect with zero-length slices.
    pub const ZERO_SLICE: &str = "\
reconnect: true
slice_secs: 0
";

    /// Invalid: non-numeric duration.
    pub const NON_NUMERIC: &str = "\
hold_secs: ten
";
}

/// Timing constants for tests that hit a real socket.
pub mod timing {
    use std::time::Duration;

    /// Heartbeat short enough to observe several pings in a test.
    pub const FAST_HEARTBEAT_MS: u64 = 200;

    /// Hold-deadline poll tick used by the session.
    pub const POLL_TICK: Duration = Duration::from_secs(1);

    /// Slack for scheduler jitter on top of the poll tick.
    pub const JITTER: Duration = Duration::from_millis(500);
}
