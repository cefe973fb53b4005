//! In-process WebSocket servers for integration tests.
//!
//! [`RecordingServer`] accepts upgrades, records every inbound text frame in
//! arrival order, and behaves according to a [`ServerBehavior`].
//! [`RejectingServer`] answers every upgrade with a plain HTTP error.

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

/// What the server does with each accepted connection.
#[derive(Debug, Clone, Copy)]
pub enum ServerBehavior {
    /// Keep the connection open and drain frames.
    Hold,
    /// Send a close frame after the given delay.
    CloseAfter(Duration),
    /// Drop the TCP stream without a close handshake after the given delay.
    DropAfter(Duration),
    /// Push a text frame to the client at the given interval.
    Chatter(Duration),
}

/// One inbound text frame.
#[derive(Debug, Clone)]
pub struct RecordedFrame {
    pub connection: usize,
    pub text: String,
    pub at: Instant,
}

impl RecordedFrame {
    /// The `"type"` field of a JSON frame, if present.
    pub fn frame_type(&self) -> Option<String> {
        serde_json::from_str::<Value>(&self.text)
            .ok()?
            .get("type")?
            .as_str()
            .map(str::to_string)
    }
}

/// Upgrade request as seen by the server.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path_and_query: String,
    pub agent_token: Option<String>,
}

#[derive(Default)]
struct Recorder {
    frames: Mutex<Vec<RecordedFrame>>,
    requests: Mutex<Vec<RecordedRequest>>,
    accepted: AtomicUsize,
    finished: AtomicUsize,
}

/// WebSocket server that records everything clients send.
pub struct RecordingServer {
    addr: SocketAddr,
    recorder: Arc<Recorder>,
    task: JoinHandle<()>,
}

impl RecordingServer {
    pub async fn start(behavior: ServerBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("local addr");
        let recorder = Arc::new(Recorder::default());

        let rec = recorder.clone();
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let rec = rec.clone();
                tokio::spawn(async move {
                    let req_rec = rec.clone();
                    let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                        let agent_token = req
                            .headers()
                            .get("x-agent-token")
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_string);
                        let path_and_query = req
                            .uri()
                            .path_and_query()
                            .map(|p| p.as_str().to_string())
                            .unwrap_or_default();
                        req_rec.requests.lock().unwrap().push(RecordedRequest {
                            path_and_query,
                            agent_token,
                        });
                        Ok(resp)
                    };
                    let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
                        return;
                    };
                    let connection = rec.accepted.fetch_add(1, Ordering::SeqCst);
                    serve(ws, connection, behavior, &rec).await;
                    rec.finished.fetch_add(1, Ordering::SeqCst);
                });
            }
        });

        Self {
            addr,
            recorder,
            task,
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn frames(&self) -> Vec<RecordedFrame> {
        self.recorder.frames.lock().unwrap().clone()
    }

    /// Frames from a single connection, in arrival order.
    pub fn frames_for(&self, connection: usize) -> Vec<RecordedFrame> {
        self.frames()
            .into_iter()
            .filter(|f| f.connection == connection)
            .collect()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.recorder.requests.lock().unwrap().clone()
    }

    pub fn accepted(&self) -> usize {
        self.recorder.accepted.load(Ordering::SeqCst)
    }

    /// Connections whose server side has ended.
    pub fn finished(&self) -> usize {
        self.recorder.finished.load(Ordering::SeqCst)
    }
}

impl Drop for RecordingServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve<S>(
    ws: tokio_tungstenite::WebSocketStream<S>,
    connection: usize,
    behavior: ServerBehavior,
    rec: &Recorder,
) where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut sink, mut source) = ws.split();
    let action_at = match behavior {
        ServerBehavior::Hold => None,
        ServerBehavior::CloseAfter(d) | ServerBehavior::DropAfter(d) => Some(Instant::now() + d),
        ServerBehavior::Chatter(_) => None,
    };
    let chatter = match behavior {
        ServerBehavior::Chatter(every) => every,
        _ => Duration::from_secs(3600),
    };
    let mut chatter_tick = tokio::time::interval_at(Instant::now() + chatter, chatter);

    loop {
        let action = async {
            match action_at {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            msg = source.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    rec.frames.lock().unwrap().push(RecordedFrame {
                        connection,
                        text: text.to_string(),
                        at: Instant::now(),
                    });
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                Some(Ok(_)) => {}
            },
            _ = chatter_tick.tick(), if matches!(behavior, ServerBehavior::Chatter(_)) => {
                if sink.send(Message::Text("{\"type\":\"event\"}".into())).await.is_err() {
                    return;
                }
            }
            _ = action => {
                if matches!(behavior, ServerBehavior::CloseAfter(_)) {
                    let _ = sink.close().await;
                    // Wait for the client's close reply.
                    let _ = tokio::time::timeout(Duration::from_secs(2), async {
                        while let Some(Ok(_)) = source.next().await {}
                    })
                    .await;
                }
                return;
            }
        }
    }
}

/// Server that answers every request with `403 Forbidden`.
pub struct RejectingServer {
    addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl RejectingServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("local addr");
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        let task = tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    let mut read = 0;
                    // Read until the end of the request head.
                    while read < buf.len() {
                        match stream.read(&mut buf[read..]).await {
                            Ok(0) | Err(_) => break,
                            Ok(n) => read += n,
                        }
                        if buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                            break;
                        }
                    }
                    let _ = stream
                        .write_all(
                            b"HTTP/1.1 403 Forbidden\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                        )
                        .await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        Self { addr, hits, task }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

impl Drop for RejectingServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// A local port with nothing listening on it.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    listener.local_addr().expect("local addr").port()
}
