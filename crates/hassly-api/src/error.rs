use thiserror::Error;

use crate::transport::TransportError;

/// Top-level error type for the `hassly-api` crate.
///
/// Covers every failure mode the engine can report to a caller:
/// endpoint construction, transport faults, the auth handshake,
/// caller misuse, and server-side command errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Endpoint ────────────────────────────────────────────────────
    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ── Transport ───────────────────────────────────────────────────
    /// Dial, read or write failure on the socket.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    // ── Authentication ──────────────────────────────────────────────
    /// The server answered the handshake with `auth_invalid`.
    #[error("Authentication rejected: {message}")]
    AuthRejected { message: String },

    /// No `auth_ok`/`auth_invalid` arrived in time.
    #[error("Authentication timed out after {timeout_secs}s")]
    AuthTimeout { timeout_secs: u64 },

    /// The socket closed or misbehaved before the handshake finished.
    #[error("Handshake failed: {0}")]
    Handshake(String),

    // ── Connection state ────────────────────────────────────────────
    /// A command was submitted while no authenticated session exists.
    #[error("Connection is not open")]
    NotConnected,

    /// The session dropped before the awaited response arrived.
    #[error("Connection closed before a response was delivered")]
    Disconnected,

    /// The supervisor gave up (retry limit or fatal auth policy).
    #[error("Connection failed permanently: {reason}")]
    ConnectionFailed { reason: String },

    // ── Data ────────────────────────────────────────────────────────
    /// Outbound command or inbound payload could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A `result` frame with `success: false`.
    #[error("Home Assistant error ({code}): {message}")]
    Remote { code: String, message: String },
}

impl Error {
    /// Returns `true` if the server rejected the access token.
    pub fn is_auth_rejected(&self) -> bool {
        matches!(self, Self::AuthRejected { .. })
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_)
            | Self::AuthTimeout { .. }
            | Self::Handshake(_)
            | Self::NotConnected
            | Self::Disconnected => true,
            Self::AuthRejected { .. }
            | Self::InvalidUrl(_)
            | Self::ConnectionFailed { .. }
            | Self::Serialization(_)
            | Self::Remote { .. } => false,
        }
    }
}
