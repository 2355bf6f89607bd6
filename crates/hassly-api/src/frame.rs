//! Wire model for inbound and outbound documents.
//!
//! Every inbound document is decoded into a [`Message`] envelope and
//! classified by its `type` field. Result payloads stay raw JSON so
//! callers decide how to interpret them.

use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::value::RawValue;

use crate::error::Error;
use crate::event::Event;

// ── Message classification ───────────────────────────────────────────

/// The `type` field of an inbound document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    AuthRequired,
    AuthOk,
    AuthInvalid,
    Result,
    Event,
    Pong,
    Other,
}

impl MessageType {
    pub fn parse(kind: &str) -> Self {
        match kind {
            "auth_required" => Self::AuthRequired,
            "auth_ok" => Self::AuthOk,
            "auth_invalid" => Self::AuthInvalid,
            "result" => Self::Result,
            "event" => Self::Event,
            "pong" => Self::Pong,
            _ => Self::Other,
        }
    }

    /// Frames that only belong to the auth handshake.
    pub fn is_handshake(self) -> bool {
        matches!(self, Self::AuthRequired | Self::AuthOk | Self::AuthInvalid)
    }
}

// ── Inbound envelope ─────────────────────────────────────────────────

/// Generic inbound envelope.
///
/// Absent fields take their defaults so that any of the server's frame
/// shapes decodes into the same struct.
#[derive(Debug, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub id: u64,

    #[serde(rename = "type")]
    pub kind: String,

    /// Server version, sent with `auth_required` and `auth_ok`.
    #[serde(default)]
    pub ha_version: Option<String>,

    /// Human-readable reason, sent with `auth_invalid`.
    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub success: bool,

    #[serde(default)]
    pub result: Option<Box<RawValue>>,

    #[serde(default)]
    pub event: Option<Event>,

    #[serde(default)]
    pub error: Option<ErrorPayload>,
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        MessageType::parse(&self.kind)
    }

    /// Split a `result` frame into the caller-facing [`Reply`].
    pub fn into_reply(self) -> Reply {
        Reply {
            id: self.id,
            success: self.success,
            result: self.result,
            error: self.error,
        }
    }
}

/// Structured error carried by an unsuccessful `result`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Machine-readable code, e.g. `"not_found"` or `"unknown_command"`.
    pub code: String,
    #[serde(default)]
    pub message: String,
}

// ── Reply ────────────────────────────────────────────────────────────

/// A delivered `result` frame.
#[derive(Debug)]
pub struct Reply {
    pub id: u64,
    pub success: bool,
    /// Raw `result` payload, exactly as received.
    pub result: Option<Box<RawValue>>,
    pub error: Option<ErrorPayload>,
}

impl Reply {
    /// The raw payload on success, [`Error::Remote`] otherwise.
    pub fn into_result(self) -> Result<Option<Box<RawValue>>, Error> {
        if self.success {
            return Ok(self.result);
        }
        let error = self.error.unwrap_or_else(|| ErrorPayload {
            code: "unknown_error".into(),
            message: String::new(),
        });
        Err(Error::Remote {
            code: error.code,
            message: error.message,
        })
    }

    /// Deserialize a successful payload. A missing payload decodes as `null`.
    pub fn parse<T: DeserializeOwned>(self) -> Result<T, Error> {
        match self.into_result()? {
            Some(raw) => Ok(serde_json::from_str(raw.get())?),
            None => Ok(serde_json::from_value(serde_json::Value::Null)?),
        }
    }
}

// ── Outbound handshake ───────────────────────────────────────────────

/// `{"type":"auth","access_token":...}`
#[derive(Debug, Serialize)]
pub struct AuthFrame<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(serialize_with = "expose")]
    access_token: &'a SecretString,
}

impl<'a> AuthFrame<'a> {
    pub fn new(access_token: &'a SecretString) -> Self {
        Self {
            kind: "auth",
            access_token,
        }
    }
}

fn expose<S: Serializer>(token: &&SecretString, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(token.expose_secret())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn classifies_known_and_unknown_types() {
        assert_eq!(MessageType::parse("auth_required"), MessageType::AuthRequired);
        assert_eq!(MessageType::parse("result"), MessageType::Result);
        assert_eq!(MessageType::parse("pong"), MessageType::Pong);
        assert_eq!(MessageType::parse("zeroconf"), MessageType::Other);
        assert!(MessageType::AuthOk.is_handshake());
        assert!(!MessageType::Event.is_handshake());
    }

    #[test]
    fn decodes_auth_ok() {
        let msg: Message =
            serde_json::from_str(r#"{"type":"auth_ok","ha_version":"2024.6.1"}"#).unwrap();
        assert_eq!(msg.message_type(), MessageType::AuthOk);
        assert_eq!(msg.id, 0);
        assert_eq!(msg.ha_version.as_deref(), Some("2024.6.1"));
    }

    #[test]
    fn result_payload_is_kept_raw() {
        let msg: Message = serde_json::from_str(
            r#"{"id":7,"type":"result","success":true,"result":[{"entity_id":"sun.sun"}]}"#,
        )
        .unwrap();
        let reply = msg.into_reply();
        assert_eq!(reply.id, 7);
        assert!(reply.success);
        assert_eq!(
            reply.result.as_deref().map(RawValue::get),
            Some(r#"[{"entity_id":"sun.sun"}]"#)
        );
    }

    #[test]
    fn failed_reply_maps_to_remote_error() {
        let msg: Message = serde_json::from_str(
            r#"{"id":3,"type":"result","success":false,"error":{"code":"not_found","message":"Service not found."}}"#,
        )
        .unwrap();
        match msg.into_reply().into_result() {
            Err(Error::Remote { code, message }) => {
                assert_eq!(code, "not_found");
                assert_eq!(message, "Service not found.");
            }
            other => panic!("expected remote error, got {other:?}"),
        }
    }

    #[test]
    fn parse_null_result() {
        let msg: Message =
            serde_json::from_str(r#"{"id":2,"type":"result","success":true,"result":null}"#)
                .unwrap();
        let value: Option<serde_json::Value> = msg.into_reply().parse().unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn auth_frame_exposes_token_on_the_wire_only() {
        let token = SecretString::from("s3cr3t".to_string());
        let frame = AuthFrame::new(&token);
        assert_eq!(
            serde_json::to_string(&frame).unwrap(),
            r#"{"type":"auth","access_token":"s3cr3t"}"#
        );
        assert!(!format!("{frame:?}").contains("s3cr3t"));
    }
}
