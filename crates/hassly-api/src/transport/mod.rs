//! Transport seam between the engine and the socket.
//!
//! The engine never touches a socket directly. A [`Dialer`] opens one
//! transport per generation and hands back a [`FrameSink`] for whole
//! outbound documents and a [`FrameStream`] of inbound documents. Close
//! frames and read failures surface as [`TransportError`] items on the
//! stream; a stream that simply ends counts as a close without status.

use std::pin::Pin;

use futures_util::future::BoxFuture;
use futures_util::{Sink, Stream};
use thiserror::Error;
use url::Url;

mod memory;
mod websocket;

pub use memory::{MemoryDialer, ServerEnd};
pub use websocket::WebSocketDialer;

// ── Close codes ──────────────────────────────────────────────────────

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;
/// Endpoint going away (server restart, browser navigation).
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// Close frame carried no status code.
pub const CLOSE_NO_STATUS: u16 = 1005;

// ── Frames ───────────────────────────────────────────────────────────

/// One outbound unit handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    /// A complete JSON document.
    Text(String),
    /// A close control frame.
    Close { code: u16, reason: String },
}

impl Outgoing {
    /// Normal-closure control frame with an empty reason.
    pub fn normal_close() -> Self {
        Self::Close {
            code: CLOSE_NORMAL,
            reason: String::new(),
        }
    }
}

/// Failure reported by the transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The peer closed the socket. `code` is `None` when no status was sent.
    #[error("socket closed (code {code:?}): {reason}")]
    Closed { code: Option<u16>, reason: String },

    /// Dial, read or write failure below the WebSocket layer.
    #[error("{0}")]
    Io(String),
}

impl TransportError {
    /// Whether this is an orderly shutdown rather than an abrupt failure.
    ///
    /// Only normal, going-away and no-status closes qualify.
    pub fn is_graceful(&self) -> bool {
        match self {
            Self::Closed { code, .. } => matches!(
                code,
                None | Some(CLOSE_NORMAL | CLOSE_GOING_AWAY | CLOSE_NO_STATUS)
            ),
            Self::Io(_) => false,
        }
    }
}

pub type FrameSink = Pin<Box<dyn Sink<Outgoing, Error = TransportError> + Send + Sync>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

/// Opens transports to an endpoint.
pub trait Dialer: Send + Sync + 'static {
    fn dial(&self, url: &Url) -> BoxFuture<'static, Result<(FrameSink, FrameStream), TransportError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graceful_close_codes() {
        for code in [None, Some(1000), Some(1001), Some(1005)] {
            let err = TransportError::Closed {
                code,
                reason: String::new(),
            };
            assert!(err.is_graceful(), "{code:?} should be graceful");
        }
    }

    #[test]
    fn abnormal_close_and_io_are_not_graceful() {
        let abnormal = TransportError::Closed {
            code: Some(1006),
            reason: "abnormal".into(),
        };
        assert!(!abnormal.is_graceful());
        assert!(!TransportError::Io("reset by peer".into()).is_graceful());
    }
}
