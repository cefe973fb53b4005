//! One WebSocket connection: handshake, hello/ping, heartbeat, drain, teardown.
//!
//! A session moves `Connecting -> Open -> Streaming -> Closed`. Once open it
//! sends the optional hello frame and an immediate ping, then hands the write
//! half to a heartbeat task that pings every `heartbeat_ms`. The read half is
//! drained and discarded until the server closes, an error occurs, or the hold
//! deadline passes. The heartbeat task is owned by a guard and is cancelled on
//! every exit path, including when the session future itself is dropped.

use futures::{Sink, SinkExt, Stream, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{ConnectionParams, RunConfig};
use crate::error::{FloodError, FloodResult};
use crate::frames::ClientFrame;
use crate::metrics::RunMetrics;
use crate::schedule::deadline_after;

/// Status code of a successful WebSocket upgrade.
pub const SWITCHING_PROTOCOLS: u16 = 101;

/// How long teardown waits for the heartbeat task to hand back the write half.
const STOP_TIMEOUT: Duration = Duration::from_millis(100);

/// How long teardown waits for the close frame to flush.
const CLOSE_TIMEOUT: Duration = Duration::from_millis(300);

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Open a WebSocket connection and return it with the upgrade status.
pub async fn connect(params: &ConnectionParams) -> FloodResult<(WsStream, u16)> {
    let mut request = params.url.as_str().into_client_request()?;
    for (name, value) in &params.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| FloodError::invalid_config("headers", e.to_string()))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| FloodError::invalid_config("agent_token", e.to_string()))?;
        request.headers_mut().insert(name, value);
    }

    let connector = if params.tls_insecure {
        let tls = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .build()
            .map_err(|e| FloodError::Connect(format!("TLS: {}", e)))?;
        Some(Connector::NativeTls(tls))
    } else {
        None
    };

    let handshake = connect_async_tls_with_config(request, None, false, connector);
    let (stream, response) = tokio::time::timeout(params.connect_timeout, handshake)
        .await
        .map_err(|_| FloodError::ConnectTimeout(params.connect_timeout.as_secs()))??;

    Ok((stream, response.status().as_u16()))
}

/// Shared per-session status.
///
/// `closed` only ever goes from false to true.
#[derive(Debug, Default)]
pub struct SessionState {
    closed: AtomicBool,
    opened_at: OnceLock<Instant>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the session closed. Returns true if this call did the transition.
    pub fn close(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn mark_open(&self) {
        let _ = self.opened_at.set(Instant::now());
    }

    pub fn opened_at(&self) -> Option<Instant> {
        self.opened_at.get().copied()
    }

    /// Time since the connection opened; zero if it never did.
    pub fn elapsed(&self) -> Duration {
        self.opened_at()
            .map(|t| t.elapsed())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseKind {
    Normal,
    Error,
    HoldExpired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connecting,
    Open,
    Streaming,
    Closed(CloseKind),
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// Server sent a close frame or ended the stream.
    Normal,
    /// Transport error after the connection opened.
    Error(String),
    /// Held for the full duration and torn down locally.
    HoldExpired,
    /// Never opened: refused, timed out, or upgrade rejected.
    ConnectFailed(String),
}

impl SessionEnd {
    fn kind(&self) -> CloseKind {
        match self {
            SessionEnd::Normal => CloseKind::Normal,
            SessionEnd::HoldExpired => CloseKind::HoldExpired,
            SessionEnd::Error(_) | SessionEnd::ConnectFailed(_) => CloseKind::Error,
        }
    }
}

/// Result of one connect attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOutcome {
    /// Upgrade status, when the server answered.
    pub status: Option<u16>,
    pub connecting: Option<Duration>,
    pub open_for: Duration,
    pub end: SessionEnd,
}

impl SessionOutcome {
    pub fn opened(&self) -> bool {
        self.status == Some(SWITCHING_PROTOCOLS)
    }
}

/// Periodic ping task bound to a session's lifetime.
///
/// Dropping the guard aborts the task. [`Heartbeat::stop`] cancels it, even
/// mid-send on a stalled connection, and hands the write half back for a
/// clean close.
struct Heartbeat<K> {
    cancel: CancellationToken,
    task: Option<JoinHandle<K>>,
}

impl<K> Heartbeat<K>
where
    K: Sink<Message, Error = WsError> + Unpin + Send + 'static,
{
    fn spawn(
        mut sink: K,
        period: Duration,
        state: Arc<SessionState>,
        metrics: Arc<RunMetrics>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let ping = ClientFrame::ping_now();
                let sent = tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    sent = send_frame(&mut sink, &ping) => sent,
                };
                if let Err(e) = sent {
                    warn!(error = %e, "heartbeat send failed");
                    state.close();
                    break;
                }
                metrics.record_frame_sent();
            }
            sink
        });

        Self {
            cancel,
            task: Some(task),
        }
    }

    async fn stop(mut self) -> Option<K> {
        self.cancel.cancel();
        let mut task = self.task.take()?;
        match tokio::time::timeout(STOP_TIMEOUT, &mut task).await {
            Ok(joined) => joined.ok(),
            Err(_) => {
                task.abort();
                None
            }
        }
    }
}

impl<K> Drop for Heartbeat<K> {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn send_frame<K>(sink: &mut K, frame: &ClientFrame) -> FloodResult<()>
where
    K: Sink<Message, Error = WsError> + Unpin,
{
    let text = frame.to_json()?;
    sink.send(Message::Text(text)).await?;
    Ok(())
}

/// A single connect attempt and, if it opens, the held connection.
pub struct ConnectionSession {
    client_id: String,
    config: Arc<RunConfig>,
    metrics: Arc<RunMetrics>,
    state: Arc<SessionState>,
    phase: Phase,
}

impl ConnectionSession {
    pub fn new(
        config: Arc<RunConfig>,
        metrics: Arc<RunMetrics>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            config,
            metrics,
            state: Arc::new(SessionState::new()),
            phase: Phase::Connecting,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn state(&self) -> Arc<SessionState> {
        self.state.clone()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn transition(&mut self, next: Phase) {
        debug!(client_id = %self.client_id, from = ?self.phase, to = ?next, "session transition");
        self.phase = next;
    }

    /// Connect, then hold the connection open for at most `hold`.
    ///
    /// Always records exactly one handshake check.
    pub async fn run(&mut self, hold: Duration) -> SessionOutcome {
        let params = self.config.connection_params(&self.client_id);
        let started = Instant::now();

        let (ws, status) = match connect(&params).await {
            Ok(pair) => pair,
            Err(err) => {
                self.metrics.record_handshake(false, None);
                warn!(client_id = %self.client_id, url = %params.url, error = %err, "connect failed");
                self.state.close();
                self.transition(Phase::Closed(CloseKind::Error));
                return SessionOutcome {
                    status: err.handshake_status(),
                    connecting: None,
                    open_for: Duration::ZERO,
                    end: SessionEnd::ConnectFailed(err.to_string()),
                };
            }
        };

        let connecting = started.elapsed();
        let passed = status == SWITCHING_PROTOCOLS;
        self.metrics.record_handshake(passed, Some(connecting));
        if !passed {
            self.state.close();
            self.transition(Phase::Closed(CloseKind::Error));
            return SessionOutcome {
                status: Some(status),
                connecting: Some(connecting),
                open_for: Duration::ZERO,
                end: SessionEnd::ConnectFailed(format!("unexpected status {}", status)),
            };
        }

        let end = self.stream(ws, hold).await;
        SessionOutcome {
            status: Some(status),
            connecting: Some(connecting),
            open_for: self.state.elapsed(),
            end,
        }
    }

    /// Drive an already-open connection until close, error, or `hold` elapses.
    pub async fn stream<S>(&mut self, ws: S, hold: Duration) -> SessionEnd
    where
        S: Stream<Item = Result<Message, WsError>>
            + Sink<Message, Error = WsError>
            + Unpin
            + Send
            + 'static,
    {
        self.state.mark_open();
        self.transition(Phase::Open);

        let (mut sink, mut source) = ws.split();
        let deadline = deadline_after(Instant::now(), hold);

        let greeted = match tokio::time::timeout_at(deadline, self.greet(&mut sink)).await {
            Ok(sent) => sent,
            Err(_) => Err(FloodError::Transport(
                "opening frames not flushed before the hold deadline".to_string(),
            )),
        };
        let end = match greeted {
            Ok(()) => {
                self.transition(Phase::Streaming);
                let heartbeat = Heartbeat::spawn(
                    sink,
                    self.config.heartbeat_interval(),
                    self.state.clone(),
                    self.metrics.clone(),
                );
                let end = self.drain(&mut source, deadline).await;
                self.state.close();

                if let Some(mut sink) = heartbeat.stop().await {
                    if !matches!(end, SessionEnd::Error(_)) {
                        let _ = tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await;
                    }
                }
                end
            }
            Err(e) => {
                warn!(client_id = %self.client_id, error = %e, "failed to send opening frames");
                SessionEnd::Error(e.to_string())
            }
        };

        self.state.close();
        self.metrics
            .record_session_end(self.state.elapsed(), matches!(end, SessionEnd::Error(_)));
        self.transition(Phase::Closed(end.kind()));
        end
    }

    /// Hello (if enabled) strictly before the first ping.
    async fn greet<K>(&self, sink: &mut K) -> FloodResult<()>
    where
        K: Sink<Message, Error = WsError> + Unpin,
    {
        if self.config.hello {
            send_frame(sink, &ClientFrame::hello(&self.client_id)).await?;
            self.metrics.record_frame_sent();
        }
        send_frame(sink, &ClientFrame::ping_now()).await?;
        self.metrics.record_frame_sent();
        Ok(())
    }

    async fn drain<R>(&self, source: &mut R, deadline: Instant) -> SessionEnd
    where
        R: Stream<Item = Result<Message, WsError>> + Unpin,
    {
        let mut poll = tokio::time::interval(self.config.poll_interval());
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let expiry = tokio::time::sleep_until(deadline);
        tokio::pin!(expiry);

        loop {
            tokio::select! {
                frame = source.next() => match frame {
                    Some(Ok(Message::Close(reason))) => {
                        debug!(client_id = %self.client_id, ?reason, "server closed connection");
                        return SessionEnd::Normal;
                    }
                    Some(Ok(_)) => self.metrics.record_frame_received(),
                    Some(Err(e)) => {
                        warn!(client_id = %self.client_id, error = %e, "ws error");
                        return SessionEnd::Error(e.to_string());
                    }
                    None => return SessionEnd::Normal,
                },
                _ = &mut expiry => {
                    debug!(client_id = %self.client_id, "hold expired");
                    return SessionEnd::HoldExpired;
                }
                _ = poll.tick() => {
                    if self.state.is_closed() {
                        return SessionEnd::Error("heartbeat send failed".to_string());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_flag_is_monotonic() {
        let state = SessionState::new();
        assert!(!state.is_closed());
        assert!(state.close());
        assert!(!state.close());
        assert!(state.is_closed());
    }

    #[test]
    fn test_elapsed_zero_before_open() {
        let state = SessionState::new();
        assert_eq!(state.elapsed(), Duration::ZERO);
        assert!(state.opened_at().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_after_open() {
        let state = SessionState::new();
        state.mark_open();
        tokio::time::sleep(Duration::from_secs(5)).await;
        let elapsed = state.elapsed();
        assert!(elapsed >= Duration::from_secs(5) && elapsed < Duration::from_secs(6));
    }

    #[test]
    fn test_outcome_opened() {
        let outcome = SessionOutcome {
            status: Some(403),
            connecting: None,
            open_for: Duration::ZERO,
            end: SessionEnd::ConnectFailed("rejected".into()),
        };
        assert!(!outcome.opened());
        assert_eq!(outcome.end.kind(), CloseKind::Error);
    }
}
