//! Error types for the flood core.

use thiserror::Error;

/// Result type alias using FloodError.
pub type FloodResult<T> = Result<T, FloodError>;

/// Primary error type for flood operations.
#[derive(Debug, Error)]
pub enum FloodError {
    // === Configuration Errors ===
    #[error("Invalid configuration value for '{field}': {message}")]
    InvalidConfig { field: String, message: String },

    #[error("Failed to parse scenario: {0}")]
    Scenario(String),

    // === Connection Errors ===
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Handshake rejected with HTTP status {status}")]
    Handshake { status: u16 },

    #[error("Connection timed out after {0}s")]
    ConnectTimeout(u64),

    #[error("Transport error: {0}")]
    Transport(String),

    // === Encoding Errors ===
    #[error("Failed to encode frame: {0}")]
    Frame(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl FloodError {
    /// Build an `InvalidConfig` error.
    pub fn invalid_config(field: &str, message: impl Into<String>) -> Self {
        FloodError::InvalidConfig {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// HTTP status observed during the upgrade, if the server answered at all.
    pub fn handshake_status(&self) -> Option<u16> {
        match self {
            FloodError::Handshake { status } => Some(*status),
            _ => None,
        }
    }
}

impl From<std::io::Error> for FloodError {
    fn from(err: std::io::Error) -> Self {
        FloodError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for FloodError {
    fn from(err: serde_json::Error) -> Self {
        FloodError::Frame(err.to_string())
    }
}

impl From<serde_yaml::Error> for FloodError {
    fn from(err: serde_yaml::Error) -> Self {
        FloodError::Scenario(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for FloodError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::Http(response) => FloodError::Handshake {
                status: response.status().as_u16(),
            },
            WsError::Io(e) => FloodError::Connect(e.to_string()),
            WsError::Tls(e) => FloodError::Connect(format!("TLS: {}", e)),
            WsError::Url(e) => FloodError::Connect(format!("URL: {}", e)),
            other => FloodError::Transport(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_status() {
        let err = FloodError::Handshake { status: 403 };
        assert_eq!(err.handshake_status(), Some(403));
        assert_eq!(FloodError::Transport("reset".into()).handshake_status(), None);
    }

    #[test]
    fn test_invalid_config_message() {
        let err = FloodError::invalid_config("slice_secs", "must be > 0 when reconnect is enabled");
        assert_eq!(
            err.to_string(),
            "Invalid configuration value for 'slice_secs': must be > 0 when reconnect is enabled"
        );
    }
}
