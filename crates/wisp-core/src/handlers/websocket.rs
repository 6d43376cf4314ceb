//! WebSocket echo handler
//!
//! Handshake validation and the 101 response are done here on top of hyper; framing
//! after the upgrade belongs to tungstenite. Every open connection gets a process-wide
//! sequential id, a welcome message, and one echo per inbound data message.

use crate::{Request, Response, ResponseBuilder};
use futures_util::{SinkExt, StreamExt};
use http::{Method, StatusCode};
use hyper::upgrade::Upgraded;
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use serde::Serialize;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Role};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

/// Reason sent with the 1001 close frame at shutdown
pub const SHUTDOWN_REASON: &str = "Exiting server";

/// Sequential per-process connection identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Messages the server sends
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage<'a> {
    Welcome { id: ConnectionId },
    Echo { id: ConnectionId, data: Cow<'a, str> },
}

impl ServerMessage<'_> {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Why an upgrade request was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    Method,
    UpgradeHeader,
    MissingKey,
    Version,
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeError::Method => write!(f, "WebSocket upgrade requires GET"),
            HandshakeError::UpgradeHeader => write!(f, "Unsupported upgrade protocol"),
            HandshakeError::MissingKey => write!(f, "Missing Sec-WebSocket-Key"),
            HandshakeError::Version => write!(f, "Unsupported Sec-WebSocket-Version"),
        }
    }
}

/// Check if the request asks for a protocol upgrade at all
pub fn is_upgrade_request(req: &Request) -> bool {
    let connection = req.header("connection").unwrap_or("");
    req.header("upgrade").is_some()
        && connection
            .split(',')
            .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
}

/// Validate a WebSocket handshake and compute the accept key
pub fn accept_key(req: &Request) -> Result<String, HandshakeError> {
    if req.method != Method::GET {
        return Err(HandshakeError::Method);
    }
    if !req
        .header("upgrade")
        .is_some_and(|u| u.trim().eq_ignore_ascii_case("websocket"))
    {
        return Err(HandshakeError::UpgradeHeader);
    }
    let key = match req.header("sec-websocket-key").map(str::trim) {
        Some(key) if !key.is_empty() => key,
        _ => return Err(HandshakeError::MissingKey),
    };
    if !matches!(req.header("sec-websocket-version").map(str::trim), Some("13" | "8")) {
        return Err(HandshakeError::Version);
    }

    Ok(derive_accept_key(key.as_bytes()))
}

/// Create the 101 Switching Protocols response
pub fn upgrade_response(accept: &str) -> Response {
    ResponseBuilder::new(StatusCode::SWITCHING_PROTOCOLS)
        .header("Upgrade", "websocket")
        .header("Connection", "Upgrade")
        .header("Sec-WebSocket-Accept", accept)
        .build()
}

/// Registry of open WebSocket connections
///
/// Owns the id counter, a count of running sessions and a close trigger for each.
/// Once [`Sessions::close_all`] has run, sessions registered later start out closing.
#[derive(Debug, Default)]
pub struct Sessions {
    last_id: AtomicU64,
    running: AtomicUsize,
    triggers: Mutex<Triggers>,
}

#[derive(Debug, Default)]
struct Triggers {
    closed: bool,
    pending: HashMap<ConnectionId, oneshot::Sender<()>>,
}

impl Sessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign the next id and register its close trigger
    pub fn register(&self) -> (ConnectionId, oneshot::Receiver<()>) {
        let id = ConnectionId(self.last_id.fetch_add(1, Ordering::SeqCst) + 1);
        let (tx, rx) = oneshot::channel();
        self.running.fetch_add(1, Ordering::SeqCst);

        let mut triggers = self.triggers.lock();
        if triggers.closed {
            let _ = tx.send(());
        } else {
            triggers.pending.insert(id, tx);
        }
        (id, rx)
    }

    /// Mark a session finished
    pub fn remove(&self, id: ConnectionId) {
        self.triggers.lock().pending.remove(&id);
        self.running.fetch_sub(1, Ordering::SeqCst);
    }

    /// Number of sessions still running
    pub fn len(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ask every open connection to close. Returns how many were signalled.
    pub fn close_all(&self) -> usize {
        let triggers: Vec<_> = {
            let mut triggers = self.triggers.lock();
            triggers.closed = true;
            triggers.pending.drain().collect()
        };
        let count = triggers.len();
        for (_, tx) in triggers {
            let _ = tx.send(());
        }
        count
    }

    /// Wait until every session has finished, or `timeout` passes.
    /// Returns true if all drained.
    pub async fn wait_closed(&self, timeout: Duration) -> bool {
        let start = Instant::now();
        loop {
            if self.is_empty() {
                return true;
            }
            if start.elapsed() >= timeout {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

/// Finish the upgrade on `upgraded` and run the echo loop until the socket closes
pub async fn serve_upgraded(
    upgraded: Upgraded,
    remote: Option<SocketAddr>,
    sessions: &Sessions,
) {
    let ws = WebSocketStream::from_raw_socket(TokioIo::new(upgraded), Role::Server, None).await;
    run_session(ws, remote, sessions).await;
}

/// Echo loop for one connection
pub async fn run_session<S>(
    mut ws: WebSocketStream<S>,
    remote: Option<SocketAddr>,
    sessions: &Sessions,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (id, mut close_rx) = sessions.register();
    match remote {
        Some(addr) => tracing::info!(%id, remote = %addr.ip(), "websocket connected"),
        None => tracing::info!(%id, "websocket connected"),
    }

    send_message(&mut ws, id, &ServerMessage::Welcome { id }).await;

    let mut closing = false;
    loop {
        tokio::select! {
            signal = &mut close_rx, if !closing => {
                closing = true;
                if signal.is_ok() {
                    let frame = CloseFrame {
                        code: CloseCode::Away,
                        reason: SHUTDOWN_REASON.into(),
                    };
                    if let Err(e) = ws.close(Some(frame)).await {
                        tracing::debug!(%id, error = %e, "websocket close failed");
                        break;
                    }
                }
            }
            msg = ws.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    echo(&mut ws, id, Cow::Borrowed(text.as_str())).await;
                }
                Some(Ok(Message::Binary(data))) => {
                    echo(&mut ws, id, String::from_utf8_lossy(&data)).await;
                }
                // Pings are answered and close replies queued by tungstenite itself
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(%id, error = %e, "websocket error");
                    break;
                }
                None => break,
            }
        }
    }

    sessions.remove(id);
    tracing::info!(%id, "websocket closed");
}

async fn echo<S>(ws: &mut WebSocketStream<S>, id: ConnectionId, data: Cow<'_, str>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    send_message(ws, id, &ServerMessage::Echo { id, data }).await;
}

/// Serialize and send; failures are logged and the message dropped
async fn send_message<S>(ws: &mut WebSocketStream<S>, id: ConnectionId, msg: &ServerMessage<'_>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let json = match msg.to_json() {
        Ok(json) => json,
        Err(e) => {
            tracing::warn!(%id, error = %e, "failed to encode websocket message");
            return;
        }
    };
    if let Err(e) = ws.send(Message::text(json)).await {
        tracing::warn!(%id, error = %e, "websocket send error");
    }
}
