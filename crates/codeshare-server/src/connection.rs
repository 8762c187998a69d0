use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame, Message as WsMessage, Utf8Bytes, WebSocket};
use codeshare_core::errors::ConnectionError;
use codeshare_core::ids::{ConnectionId, SessionId};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::registry::SessionRegistry;
use crate::relay;

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// How long the writer gets to finish the close handshake once the reader has stopped.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Per-connection lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

/// Tracks one connection's state. `close` reports `true` exactly once, which is what
/// gates the single registry `leave`.
#[derive(Debug)]
pub struct Lifecycle {
    state: ConnectionState,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Connecting,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// `Connecting → Open`. Returns false from any other state.
    pub fn open(&mut self) -> bool {
        if self.state == ConnectionState::Connecting {
            self.state = ConnectionState::Open;
            true
        } else {
            false
        }
    }

    /// Enter `Closed`. Returns true only on the first call.
    pub fn close(&mut self) -> bool {
        if self.state == ConnectionState::Closed {
            false
        } else {
            self.state = ConnectionState::Closed;
            true
        }
    }
}

/// Why a connection ended.
#[derive(Debug)]
pub enum CloseReason {
    /// The peer sent a close frame.
    PeerClosed,
    /// The underlying stream ended without a close frame.
    StreamEnded,
    ReceiveFailed(ConnectionError),
    SendFailed(ConnectionError),
    /// The outbound side was shut down.
    OutboundClosed,
    /// The registry evicted this connection after it missed a delivery.
    Evicted,
    /// A connection task panicked or was cancelled.
    TaskAborted(String),
}

impl CloseReason {
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::ReceiveFailed(_) | Self::SendFailed(_) | Self::Evicted | Self::TaskAborted(_)
        )
    }
}

/// Drive an upgraded WebSocket until it closes.
pub async fn handle_socket(
    socket: WebSocket,
    session_id: SessionId,
    registry: Arc<SessionRegistry>,
) -> CloseReason {
    let (ws_tx, ws_rx) = socket.split();
    run_connection(ws_rx, ws_tx, session_id, registry, HEARTBEAT_INTERVAL).await
}

/// Register, pump messages in both directions, and deregister.
///
/// The reader relays every inbound text frame to the rest of the session; the writer
/// drains this connection's outbound queue and sends heartbeat pings. Whichever side
/// finishes first ends the connection. When the reader stops, the writer is told to close
/// the socket so the close handshake is flushed. Every exit path goes through the one
/// `leave` at the bottom.
pub async fn run_connection<R, W>(
    reader: R,
    writer: W,
    session_id: SessionId,
    registry: Arc<SessionRegistry>,
    heartbeat: Duration,
) -> CloseReason
where
    R: Stream<Item = Result<WsMessage, axum::Error>> + Unpin + Send + 'static,
    W: Sink<WsMessage, Error = axum::Error> + Unpin + Send + 'static,
{
    let mut lifecycle = Lifecycle::new();
    let (member, outbound) = registry.register(&session_id);
    let connection_id = member.id().clone();
    let evicted = member.evicted().clone();
    drop(member);
    lifecycle.open();
    tracing::info!(
        session_id = %session_id,
        connection_id = %connection_id,
        members = registry.member_count(&session_id),
        "connection open"
    );

    let stop = CancellationToken::new();
    let mut writer_task = tokio::spawn(write_loop(
        writer,
        outbound,
        connection_id.clone(),
        heartbeat,
        evicted,
        stop.clone(),
    ));
    let mut reader_task = tokio::spawn(read_loop(
        reader,
        session_id.clone(),
        connection_id.clone(),
        Arc::clone(&registry),
    ));

    let reason = tokio::select! {
        res = &mut reader_task => {
            stop.cancel();
            if tokio::time::timeout(CLOSE_GRACE, &mut writer_task).await.is_err() {
                writer_task.abort();
            }
            res.unwrap_or_else(|e| CloseReason::TaskAborted(e.to_string()))
        }
        res = &mut writer_task => {
            reader_task.abort();
            res.unwrap_or_else(|e| CloseReason::TaskAborted(e.to_string()))
        }
    };

    if lifecycle.close() {
        registry.leave(&session_id, &connection_id);
    }

    if reason.is_error() {
        tracing::warn!(
            session_id = %session_id,
            connection_id = %connection_id,
            reason = ?reason,
            "connection closed with error"
        );
    } else {
        tracing::info!(
            session_id = %session_id,
            connection_id = %connection_id,
            reason = ?reason,
            "connection closed"
        );
    }
    reason
}

async fn read_loop<R>(
    mut reader: R,
    session_id: SessionId,
    connection_id: ConnectionId,
    registry: Arc<SessionRegistry>,
) -> CloseReason
where
    R: Stream<Item = Result<WsMessage, axum::Error>> + Unpin,
{
    while let Some(msg) = reader.next().await {
        match msg {
            Ok(WsMessage::Text(text)) => {
                relay::relay(&registry, &session_id, &connection_id, text);
            }
            Ok(WsMessage::Binary(bytes)) => match Utf8Bytes::try_from(bytes) {
                Ok(text) => {
                    relay::relay(&registry, &session_id, &connection_id, text);
                }
                Err(_) => {
                    tracing::debug!(connection_id = %connection_id, "ignoring non-UTF-8 binary frame");
                }
            },
            Ok(WsMessage::Close(_)) => return CloseReason::PeerClosed,
            Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) => {} // answered by axum
            Err(e) => {
                return CloseReason::ReceiveFailed(ConnectionError::Receive {
                    connection_id,
                    reason: e.to_string(),
                })
            }
        }
    }
    CloseReason::StreamEnded
}

async fn write_loop<W>(
    mut writer: W,
    mut outbound: mpsc::Receiver<Utf8Bytes>,
    connection_id: ConnectionId,
    heartbeat: Duration,
    evicted: CancellationToken,
    stop: CancellationToken,
) -> CloseReason
where
    W: Sink<WsMessage, Error = axum::Error> + Unpin,
{
    let mut ping_interval = tokio::time::interval(heartbeat);
    ping_interval.tick().await; // consume first immediate tick

    loop {
        let frame = tokio::select! {
            biased;

            _ = evicted.cancelled() => {
                let frame = CloseFrame {
                    code: close_code::AGAIN,
                    reason: "send queue overflow".into(),
                };
                if writer.send(WsMessage::Close(Some(frame))).await.is_ok() {
                    close_sink(&mut writer, &connection_id).await;
                }
                return CloseReason::Evicted;
            }
            _ = stop.cancelled() => {
                close_sink(&mut writer, &connection_id).await;
                return CloseReason::OutboundClosed;
            }
            msg = outbound.recv() => match msg {
                Some(text) => WsMessage::Text(text),
                None => {
                    close_sink(&mut writer, &connection_id).await;
                    return CloseReason::OutboundClosed;
                }
            },
            _ = ping_interval.tick() => {
                tracing::trace!(connection_id = %connection_id, "sending ping");
                WsMessage::Ping(Default::default())
            }
        };

        if let Err(e) = writer.send(frame).await {
            return CloseReason::SendFailed(ConnectionError::Send {
                connection_id,
                reason: e.to_string(),
            });
        }
    }
}

/// Flush whatever the transport has queued (including a close reply) and close.
async fn close_sink<W>(writer: &mut W, connection_id: &ConnectionId)
where
    W: Sink<WsMessage, Error = axum::Error> + Unpin,
{
    if let Err(e) = writer.close().await {
        tracing::debug!(connection_id = %connection_id, error = %e, "socket close failed");
    }
}
