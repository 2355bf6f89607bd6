// ── Dispatcher ──
//
// One read loop per transport generation, and the only reader of that
// transport. Each inbound document is classified by `type`, matched to
// its registered handler, and handed to the handler off the read path.
// Nothing that goes wrong with a single frame ends the loop; only a
// close, a read failure, or an abort does.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::connection::Connection;
use crate::event::parse_time_fired;
use crate::frame::{Message, MessageType};
use crate::transport::{FrameStream, TransportError};

/// Why a read loop ended.
#[derive(Debug)]
pub(crate) enum ReadOutcome {
    /// Normal, going-away or no-status close.
    Graceful(Option<u16>),
    /// Abnormal close code or read failure.
    Failed(TransportError),
    /// The connection abandoned the session.
    Aborted,
}

pub(crate) async fn read_loop(
    conn: &Connection,
    mut stream: FrameStream,
    abort: &CancellationToken,
) -> ReadOutcome {
    loop {
        let frame = tokio::select! {
            biased;
            () = abort.cancelled() => return ReadOutcome::Aborted,
            frame = stream.next() => frame,
        };

        match frame {
            Some(Ok(text)) => dispatch_frame(conn, &text).await,
            Some(Err(err)) if err.is_graceful() => {
                let code = match err {
                    TransportError::Closed { code, .. } => code,
                    TransportError::Io(_) => None,
                };
                return ReadOutcome::Graceful(code);
            }
            Some(Err(err)) => return ReadOutcome::Failed(err),
            // Stream ended without a close frame
            None => return ReadOutcome::Graceful(None),
        }
    }
}

/// Route one inbound document.
pub(crate) async fn dispatch_frame(conn: &Connection, text: &str) {
    let message: Message = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!(error = %e, "Dropping malformed frame");
            return;
        }
    };

    match message.message_type() {
        MessageType::Result => deliver_result(conn, message).await,
        MessageType::Event => deliver_event(conn, message).await,
        MessageType::Pong => deliver_pong(conn, message.id).await,
        MessageType::AuthRequired | MessageType::AuthOk | MessageType::AuthInvalid => {
            tracing::warn!(kind = %message.kind, "Handshake frame on an authenticated session, ignoring");
        }
        MessageType::Other => {
            tracing::warn!(kind = %message.kind, id = message.id, "Unknown message type, ignoring");
        }
    }
}

async fn deliver_result(conn: &Connection, message: Message) {
    let id = message.id;
    let Some(handler) = conn.resolve_terminal(id).await else {
        tracing::debug!(id, "No handler registered for result");
        return;
    };

    let reply = message.into_reply();
    let unresolved = Arc::clone(&handler);
    let spawned = conn
        .spawn_handler(move |conn| match handler.as_result() {
            Some(h) => h.handle_result(conn, reply),
            None => tracing::warn!(id, "Handler registered for this id cannot take results"),
        })
        .await;
    // Already out of the registry, so teardown will not reach it.
    if !spawned {
        conn.notify_close(id, unresolved);
    }
}

async fn deliver_event(conn: &Connection, message: Message) {
    let id = message.id;
    let Some(event) = message.event else {
        tracing::warn!(id, "Event frame without an event payload");
        return;
    };

    let fired_at = match parse_time_fired(&event.time_fired) {
        Ok(fired_at) => fired_at,
        Err(e) => {
            tracing::warn!(id, error = %e, "Dropping event with unparseable time_fired");
            return;
        }
    };

    let Some(handler) = conn.lookup(id).await else {
        tracing::debug!(id, event_type = %event.event_type, "No handler registered for event");
        return;
    };

    conn.spawn_handler(move |conn| match handler.as_event() {
        Some(h) => h.handle_event(conn, id, &event.origin, fired_at, &event),
        None => tracing::warn!(id, "Handler registered for this id cannot take events"),
    })
    .await;
}

async fn deliver_pong(conn: &Connection, id: u64) {
    let Some(handler) = conn.resolve_terminal(id).await else {
        tracing::debug!(id, "No handler registered for pong");
        return;
    };

    let unresolved = Arc::clone(&handler);
    let spawned = conn
        .spawn_handler(move |conn| match handler.as_pong() {
            Some(h) => h.handle_pong(conn, id),
            None => tracing::warn!(id, "Handler registered for this id cannot take pongs"),
        })
        .await;
    if !spawned {
        conn.notify_close(id, unresolved);
    }
}
