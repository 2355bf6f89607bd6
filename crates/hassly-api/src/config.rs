// ── Runtime connection configuration ──
//
// Describes *where* to connect and *how* the supervisor behaves.
// Carries the access token but never touches disk: `hassly-config`
// (or any other caller) builds a `ConnectionConfig` and hands it in.

use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::error::Error;
use crate::reconnect::ReconnectConfig;

/// Path of the WebSocket API on every Home Assistant instance.
pub const WEBSOCKET_PATH: &str = "/api/websocket";

const DEFAULT_MAX_INFLIGHT_HANDLERS: usize = 256;

/// What the supervisor does when the server answers `auth_invalid`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthFailurePolicy {
    /// Back off and redial; the token may be refreshed externally.
    #[default]
    Retry,
    /// Stop the supervisor and surface the rejection.
    Fatal,
}

/// Configuration for one long-lived connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Host name or address of the Home Assistant instance.
    pub host: String,
    /// Port; `None` uses the scheme default.
    pub port: Option<u16>,
    /// Use `wss` instead of `ws`.
    pub secure: bool,
    /// Long-lived access token sent in the `auth` frame.
    pub access_token: SecretString,
    /// Backoff applied to failed dial/auth attempts.
    pub reconnect: ReconnectConfig,
    /// Reaction to `auth_invalid`.
    pub auth_failure: AuthFailurePolicy,
    /// Pause before redialing after an established session drops.
    pub cooldown: Duration,
    /// Upper bound on the auth handshake.
    pub auth_timeout: Duration,
    /// How long `close()` waits for the read loop to finish.
    pub close_timeout: Duration,
    /// Handler invocations allowed to run at once before the read loop waits.
    pub max_inflight_handlers: usize,
}

impl ConnectionConfig {
    /// Configuration with default tuning for the given host and token.
    pub fn new(host: impl Into<String>, access_token: SecretString) -> Self {
        Self {
            host: host.into(),
            port: None,
            secure: false,
            access_token,
            reconnect: ReconnectConfig::default(),
            auth_failure: AuthFailurePolicy::default(),
            cooldown: Duration::from_secs(1),
            auth_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(1),
            max_inflight_handlers: DEFAULT_MAX_INFLIGHT_HANDLERS,
        }
    }

    /// `ws[s]://host[:port]/api/websocket`
    pub fn endpoint(&self) -> Result<Url, Error> {
        let scheme = if self.secure { "wss" } else { "ws" };
        let authority = match self.port {
            Some(port) => format!("{}:{port}", self.host),
            None => self.host.clone(),
        };
        let url = Url::parse(&format!("{scheme}://{authority}{WEBSOCKET_PATH}"))?;
        Ok(url)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn config(host: &str) -> ConnectionConfig {
        ConnectionConfig::new(host, SecretString::from("token".to_string()))
    }

    #[test]
    fn plain_endpoint_without_port() {
        let url = config("homeassistant.local").endpoint().unwrap();
        assert_eq!(url.as_str(), "ws://homeassistant.local/api/websocket");
    }

    #[test]
    fn secure_endpoint_with_port() {
        let mut cfg = config("10.0.0.5");
        cfg.secure = true;
        cfg.port = Some(8123);
        let url = cfg.endpoint().unwrap();
        assert_eq!(url.as_str(), "wss://10.0.0.5:8123/api/websocket");
    }

    #[test]
    fn empty_host_is_rejected() {
        assert!(matches!(config("").endpoint(), Err(Error::InvalidUrl(_))));
    }

    #[test]
    fn defaults() {
        let cfg = config("ha");
        assert_eq!(cfg.auth_failure, AuthFailurePolicy::Retry);
        assert_eq!(cfg.close_timeout, Duration::from_secs(1));
        assert_eq!(cfg.max_inflight_handlers, 256);
    }
}
