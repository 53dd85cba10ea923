//! Per-connection handler: frame decoding and forwarding to the engine.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Register an outbox with the engine actor
//!   2. Spawn a writer task that drains the outbox into the socket
//!   3. Loop: receive frames → decode → forward to the engine
//!   4. On close, error, or idle timeout: disconnect from the engine

use std::sync::Arc;
use std::time::Duration;

use crewsync_protocol::{
    AckFrame, Codec, ErrorBody, ErrorCode, JsonCodec, ProtocolError, ServerEvent, ServerFrame,
};
use crewsync_room::{ConnectionSender, EngineHandle};
use crewsync_transport::{Connection, ConnectionId, WebSocketConnection};
use tokio::sync::mpsc;

use crate::server::ServerState;
use crate::CrewsyncError;

/// How long queued frames get to reach the socket after the read loop ends.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Drop guard that tells the engine the connection is gone.
///
/// This ensures the player leaves their room even if the handler panics.
/// `Drop` is synchronous, so the disconnect is queued without waiting.
struct DisconnectGuard {
    conn_id: ConnectionId,
    engine: EngineHandle,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        self.engine.disconnect_later(self.conn_id);
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection(
    conn: WebSocketConnection,
    state: Arc<ServerState>,
) -> Result<(), CrewsyncError> {
    let conn = Arc::new(conn);
    let conn_id = conn.id();
    let peer = conn.peer_addr();
    tracing::info!(%conn_id, ?peer, "connection opened");

    let (outbox, frames) = mpsc::unbounded_channel();
    state.engine.connect(conn_id, outbox.clone()).await?;
    let guard = DisconnectGuard {
        conn_id,
        engine: state.engine.clone(),
    };

    let writer = tokio::spawn(write_frames(Arc::clone(&conn), frames, state.codec));
    let result = read_frames(&conn, &state, &outbox).await;

    // The writer finishes once the engine has dropped its copy of the
    // outbox, which happens when it processes the disconnect.
    drop(outbox);
    drop(guard);
    let abort = writer.abort_handle();
    if tokio::time::timeout(FLUSH_TIMEOUT, writer).await.is_err() {
        abort.abort();
    }
    if let Err(e) = conn.close().await {
        tracing::trace!(%conn_id, error = %e, "close after disconnect");
    }

    tracing::info!(%conn_id, "connection closed");
    result
}

/// Reads frames until the peer closes, errors, or idles out.
async fn read_frames(
    conn: &WebSocketConnection,
    state: &ServerState,
    outbox: &ConnectionSender,
) -> Result<(), CrewsyncError> {
    let conn_id = conn.id();

    loop {
        let data = match tokio::time::timeout(state.idle_timeout, conn.recv()).await {
            Ok(Ok(Some(data))) => data,
            Ok(Ok(None)) => {
                tracing::debug!(%conn_id, "peer closed the connection");
                return Ok(());
            }
            Ok(Err(e)) => {
                tracing::debug!(%conn_id, error = %e, "recv error");
                return Ok(());
            }
            Err(_) => {
                tracing::info!(%conn_id, "connection idle, closing");
                return Ok(());
            }
        };

        match state.codec.decode_client(&data) {
            Ok((event, ack)) => {
                tracing::trace!(%conn_id, event = event.name(), ?ack, "frame received");
                state.engine.send_event(conn_id, event, ack).await?;
            }
            Err((err, ack)) => {
                tracing::warn!(%conn_id, error = %err, "malformed frame");
                reject_frame(outbox, &err, ack);
            }
        }
    }
}

/// Answers a frame that never reached the engine.
fn reject_frame(outbox: &ConnectionSender, err: &ProtocolError, ack: Option<u64>) {
    let code = match err {
        ProtocolError::UnknownEvent(_) => ErrorCode::UnknownEvent,
        _ => ErrorCode::InvalidPayload,
    };
    let body = ErrorBody {
        code,
        message: err.to_string(),
    };
    let ack = ack.map(|ack| AckFrame::rejected(ack, &body));

    let _ = outbox.send(ServerFrame::Event(ServerEvent::Error(body)));
    if let Some(ack) = ack {
        let _ = outbox.send(ServerFrame::Ack(ack));
    }
}

/// Drains the outbox into the socket until every sender is gone or a send
/// fails.
async fn write_frames(
    conn: Arc<WebSocketConnection>,
    mut frames: mpsc::UnboundedReceiver<ServerFrame>,
    codec: JsonCodec,
) {
    let conn_id = conn.id();
    while let Some(frame) = frames.recv().await {
        let bytes = match codec.encode(&frame) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(%conn_id, error = %e, "failed to encode frame");
                continue;
            }
        };
        if let Err(e) = conn.send(&bytes).await {
            tracing::warn!(%conn_id, error = %e, "send failed, stopping writer");
            break;
        }
    }
}
