//! Outbound text frames.

use serde::{Deserialize, Serialize};

/// Frames sent by a simulated client. Serialized as `{"type": ..., ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Hello(Hello),
    Ping { ts: i64 },
}

/// Identity announcement sent once, before the first ping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hello {
    pub id: String,
    pub host: String,
    pub os: String,
    pub arch: String,
    pub version: String,
    pub user: String,
    pub monitors: u32,
    pub country: String,
}

impl Hello {
    /// Static descriptors used for every flood client.
    pub fn for_client(client_id: &str) -> Self {
        Self {
            id: client_id.to_string(),
            host: "flood".to_string(),
            os: "test".to_string(),
            arch: "x64".to_string(),
            version: "ws-flood".to_string(),
            user: "ws-flood".to_string(),
            monitors: 1,
            country: "ZZ".to_string(),
        }
    }
}

impl ClientFrame {
    pub fn hello(client_id: &str) -> Self {
        ClientFrame::Hello(Hello::for_client(client_id))
    }

    /// Ping stamped with the current wall-clock time in epoch milliseconds.
    pub fn ping_now() -> Self {
        ClientFrame::Ping {
            ts: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_hello_shape() {
        let text = ClientFrame::hello("flood-1-0").to_json().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "hello",
                "id": "flood-1-0",
                "host": "flood",
                "os": "test",
                "arch": "x64",
                "version": "ws-flood",
                "user": "ws-flood",
                "monitors": 1,
                "country": "ZZ",
            })
        );
    }

    #[test]
    fn test_ping_shape() {
        let text = ClientFrame::Ping { ts: 1_700_000_000_000 }.to_json().unwrap();
        assert_eq!(text, r#"{"type":"ping","ts":1700000000000}"#);
    }

    #[test]
    fn test_ping_now_is_recent() {
        let before = chrono::Utc::now().timestamp_millis();
        let ClientFrame::Ping { ts } = ClientFrame::ping_now() else {
            panic!("expected ping");
        };
        assert!(ts >= before);
    }
}
