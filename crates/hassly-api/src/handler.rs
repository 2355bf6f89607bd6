//! Handler capabilities and the built-in handlers behind the awaitable API.
//!
//! A [`Handler`] is registered per request identifier and exposes any
//! subset of four capabilities: close, pong, result and event. The
//! dispatcher asks for the capability a frame needs through the `as_*`
//! accessors and logs, rather than fails, when it is missing.
//!
//! ```rust,ignore
//! struct Printer;
//!
//! impl ResultHandler for Printer {
//!     fn handle_result(&self, _conn: &Connection, reply: Reply) {
//!         println!("{} -> {}", reply.id, reply.success);
//!     }
//! }
//!
//! impl Handler for Printer {
//!     fn as_result(&self) -> Option<&dyn ResultHandler> {
//!         Some(self)
//!     }
//! }
//! ```
//!
//! Every invocation happens on a blocking-pool thread, so a handler may
//! block without stalling the read loop.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;

use crate::connection::Connection;
use crate::error::Error;
use crate::event::Event;
use crate::frame::Reply;

// ── Capabilities ─────────────────────────────────────────────────────

/// Called once if the connection drops while the handler is registered.
pub trait CloseHandler: Send + Sync {
    fn handle_close(&self, conn: &Connection, id: u64);
}

/// Called when the `pong` for a `ping` arrives.
pub trait PongHandler: Send + Sync {
    fn handle_pong(&self, conn: &Connection, id: u64);
}

/// Called with the `result` frame of a request.
pub trait ResultHandler: Send + Sync {
    fn handle_result(&self, conn: &Connection, reply: Reply);
}

/// Called for every event delivered to a subscription.
pub trait EventHandler: Send + Sync {
    fn handle_event(
        &self,
        conn: &Connection,
        id: u64,
        origin: &str,
        fired_at: DateTime<Utc>,
        event: &Event,
    );
}

/// The capability set registered for one identifier.
///
/// Implement the accessors for the capabilities the handler supports.
/// A handler exposing [`as_event`](Self::as_event) is a subscription: its
/// registration survives the acknowledging `result` frame.
pub trait Handler: Send + Sync + 'static {
    fn as_close(&self) -> Option<&dyn CloseHandler> {
        None
    }

    fn as_pong(&self) -> Option<&dyn PongHandler> {
        None
    }

    fn as_result(&self) -> Option<&dyn ResultHandler> {
        None
    }

    fn as_event(&self) -> Option<&dyn EventHandler> {
        None
    }
}

// ── One-shot reply ───────────────────────────────────────────────────

type ReplySender = oneshot::Sender<Result<Reply, Error>>;

/// Completes a oneshot channel with the first terminal frame.
pub(crate) struct ReplySlot {
    tx: Mutex<Option<ReplySender>>,
}

impl ReplySlot {
    pub(crate) fn new() -> (Self, oneshot::Receiver<Result<Reply, Error>>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx: Mutex::new(Some(tx)) }, rx)
    }

    fn complete(&self, outcome: Result<Reply, Error>) {
        let sender = self.tx.lock().ok().and_then(|mut slot| slot.take());
        if let Some(tx) = sender {
            // Receiver gone means the caller stopped waiting.
            let _ = tx.send(outcome);
        }
    }
}

impl Handler for ReplySlot {
    fn as_close(&self) -> Option<&dyn CloseHandler> {
        Some(self)
    }

    fn as_pong(&self) -> Option<&dyn PongHandler> {
        Some(self)
    }

    fn as_result(&self) -> Option<&dyn ResultHandler> {
        Some(self)
    }
}

impl CloseHandler for ReplySlot {
    fn handle_close(&self, _conn: &Connection, _id: u64) {
        self.complete(Err(Error::Disconnected));
    }
}

impl PongHandler for ReplySlot {
    fn handle_pong(&self, _conn: &Connection, id: u64) {
        self.complete(Ok(Reply {
            id,
            success: true,
            result: None,
            error: None,
        }));
    }
}

impl ResultHandler for ReplySlot {
    fn handle_result(&self, _conn: &Connection, reply: Reply) {
        self.complete(Ok(reply));
    }
}

// ── Subscriptions ────────────────────────────────────────────────────

/// An event received on a subscription, with its timestamp parsed.
#[derive(Debug, Clone)]
pub struct FiredEvent {
    /// Identifier of the `subscribe_events` request.
    pub subscription: u64,
    pub origin: String,
    pub fired_at: DateTime<Utc>,
    pub event: Event,
}

/// Acknowledges the subscribe request and forwards events into a channel.
///
/// The channel closes when the registration is dropped, i.e. after
/// unsubscribing or losing the connection. Events that arrive while the
/// channel is full are dropped with a warning.
pub(crate) struct EventForwarder {
    ack: ReplySlot,
    events: mpsc::Sender<FiredEvent>,
    dropped: AtomicU64,
}

impl EventForwarder {
    pub(crate) fn new(
        capacity: usize,
    ) -> (
        Self,
        oneshot::Receiver<Result<Reply, Error>>,
        mpsc::Receiver<FiredEvent>,
    ) {
        let (ack, ack_rx) = ReplySlot::new();
        let (events, events_rx) = mpsc::channel(capacity);
        (
            Self {
                ack,
                events,
                dropped: AtomicU64::new(0),
            },
            ack_rx,
            events_rx,
        )
    }
}

impl Handler for EventForwarder {
    fn as_close(&self) -> Option<&dyn CloseHandler> {
        Some(self)
    }

    fn as_result(&self) -> Option<&dyn ResultHandler> {
        Some(self)
    }

    fn as_event(&self) -> Option<&dyn EventHandler> {
        Some(self)
    }
}

impl CloseHandler for EventForwarder {
    fn handle_close(&self, conn: &Connection, id: u64) {
        self.ack.handle_close(conn, id);
    }
}

impl ResultHandler for EventForwarder {
    fn handle_result(&self, conn: &Connection, reply: Reply) {
        self.ack.handle_result(conn, reply);
    }
}

impl EventHandler for EventForwarder {
    fn handle_event(
        &self,
        _conn: &Connection,
        id: u64,
        origin: &str,
        fired_at: DateTime<Utc>,
        event: &Event,
    ) {
        let fired = FiredEvent {
            subscription: id,
            origin: origin.to_owned(),
            fired_at,
            event: event.clone(),
        };
        // Never waits: a reader that falls behind loses events, not the session.
        match self.events.try_send(fired) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(
                    subscription = id,
                    dropped,
                    "subscription buffer full, dropping event"
                );
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(subscription = id, "subscription receiver dropped, discarding event");
            }
        }
    }
}

/// Receiving side of an event subscription.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    events: mpsc::Receiver<FiredEvent>,
}

impl Subscription {
    pub(crate) fn new(id: u64, events: mpsc::Receiver<FiredEvent>) -> Self {
        Self { id, events }
    }

    /// Identifier of the `subscribe_events` request; pass it to
    /// [`Connection::unsubscribe`].
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next event, or `None` once the subscription has ended.
    pub async fn next(&mut self) -> Option<FiredEvent> {
        self.events.recv().await
    }

    /// Convert into a `Stream` for use with `StreamExt` combinators.
    pub fn into_stream(self) -> ReceiverStream<FiredEvent> {
        ReceiverStream::new(self.events)
    }
}
