// ── Outbound commands ──
//
// One struct + type constant per operation. The identifier is stamped
// by the connection immediately before the frame is written, never by
// the caller, so every constructor leaves `id` at zero.

use serde::Serialize;

pub const CALL_SERVICE: &str = "call_service";
pub const GET_CONFIG: &str = "get_config";
pub const GET_STATES: &str = "get_states";
pub const GET_PANELS: &str = "get_panels";
pub const GET_SERVICES: &str = "get_services";
pub const MEDIA_PLAYER_THUMBNAIL: &str = "media_player_thumbnail";
pub const PING: &str = "ping";
pub const SUBSCRIBE_EVENTS: &str = "subscribe_events";
pub const UNSUBSCRIBE_EVENTS: &str = "unsubscribe_events";

/// A request that can be sent over a connection.
pub trait Command: Serialize + Send {
    /// Assign the correlation identifier.
    fn set_id(&mut self, id: u64);

    /// The command's `type` string.
    fn kind(&self) -> &'static str;
}

/// Implements [`Command`] for a struct with `id` and `kind` fields.
macro_rules! impl_command {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Command for $ty {
                fn set_id(&mut self, id: u64) {
                    self.id = id;
                }

                fn kind(&self) -> &'static str {
                    self.kind
                }
            }
        )*
    };
}

impl_command!(
    CallService,
    GetConfig,
    GetStates,
    GetPanels,
    GetServices,
    GetMediaPlayerThumbnail,
    Ping,
    SubscribeEvents,
    UnsubscribeEvents,
);

// ── Requests with no arguments ───────────────────────────────────────

/// `get_config`: core configuration (location, units, version).
#[derive(Debug, Clone, Serialize)]
pub struct GetConfig {
    id: u64,
    #[serde(rename = "type")]
    kind: &'static str,
}

impl Default for GetConfig {
    fn default() -> Self {
        Self { id: 0, kind: GET_CONFIG }
    }
}

/// `get_states`: every entity's current state.
#[derive(Debug, Clone, Serialize)]
pub struct GetStates {
    id: u64,
    #[serde(rename = "type")]
    kind: &'static str,
}

impl Default for GetStates {
    fn default() -> Self {
        Self { id: 0, kind: GET_STATES }
    }
}

/// `get_panels`: registered frontend panels.
#[derive(Debug, Clone, Serialize)]
pub struct GetPanels {
    id: u64,
    #[serde(rename = "type")]
    kind: &'static str,
}

impl Default for GetPanels {
    fn default() -> Self {
        Self { id: 0, kind: GET_PANELS }
    }
}

/// `get_services`: service descriptions per domain.
#[derive(Debug, Clone, Serialize)]
pub struct GetServices {
    id: u64,
    #[serde(rename = "type")]
    kind: &'static str,
}

impl Default for GetServices {
    fn default() -> Self {
        Self { id: 0, kind: GET_SERVICES }
    }
}

/// `ping`: answered with a `pong` frame instead of a `result`.
#[derive(Debug, Clone, Serialize)]
pub struct Ping {
    id: u64,
    #[serde(rename = "type")]
    kind: &'static str,
}

impl Default for Ping {
    fn default() -> Self {
        Self { id: 0, kind: PING }
    }
}

// ── Requests with arguments ──────────────────────────────────────────

/// `call_service`: invoke `domain.service` with optional service data.
#[derive(Debug, Clone, Serialize)]
pub struct CallService {
    id: u64,
    #[serde(rename = "type")]
    kind: &'static str,
    pub domain: String,
    pub service: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_data: Option<serde_json::Value>,
}

impl CallService {
    pub fn new(
        domain: impl Into<String>,
        service: impl Into<String>,
        service_data: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id: 0,
            kind: CALL_SERVICE,
            domain: domain.into(),
            service: service.into(),
            service_data,
        }
    }
}

/// `media_player_thumbnail`: base64 artwork of a media player entity.
#[derive(Debug, Clone, Serialize)]
pub struct GetMediaPlayerThumbnail {
    id: u64,
    #[serde(rename = "type")]
    kind: &'static str,
    pub entity_id: String,
}

impl GetMediaPlayerThumbnail {
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            id: 0,
            kind: MEDIA_PLAYER_THUMBNAIL,
            entity_id: entity_id.into(),
        }
    }
}

/// `subscribe_events`: stream events of one type, or all when `None`.
#[derive(Debug, Clone, Serialize)]
pub struct SubscribeEvents {
    id: u64,
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
}

impl SubscribeEvents {
    pub fn new(event_type: Option<String>) -> Self {
        Self {
            id: 0,
            kind: SUBSCRIBE_EVENTS,
            event_type,
        }
    }
}

/// `unsubscribe_events`: cancel the subscription created by request `subscription`.
#[derive(Debug, Clone, Serialize)]
pub struct UnsubscribeEvents {
    id: u64,
    #[serde(rename = "type")]
    kind: &'static str,
    pub subscription: u64,
}

impl UnsubscribeEvents {
    pub fn new(subscription: u64) -> Self {
        Self {
            id: 0,
            kind: UNSUBSCRIBE_EVENTS,
            subscription,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn wire<C: Command>(mut cmd: C, id: u64) -> serde_json::Value {
        cmd.set_id(id);
        serde_json::to_value(&cmd).unwrap()
    }

    #[test]
    fn bare_commands_carry_their_own_type() {
        assert_eq!(wire(GetConfig::default(), 1), json!({"id": 1, "type": "get_config"}));
        assert_eq!(wire(GetStates::default(), 2), json!({"id": 2, "type": "get_states"}));
        assert_eq!(wire(GetPanels::default(), 3), json!({"id": 3, "type": "get_panels"}));
        assert_eq!(wire(GetServices::default(), 4), json!({"id": 4, "type": "get_services"}));
        assert_eq!(wire(Ping::default(), 5), json!({"id": 5, "type": "ping"}));
    }

    #[test]
    fn call_service_envelope() {
        let cmd = CallService::new("light", "turn_on", Some(json!({"entity_id": "light.kitchen"})));
        assert_eq!(cmd.kind(), CALL_SERVICE);
        assert_eq!(
            wire(cmd, 9),
            json!({
                "id": 9,
                "type": "call_service",
                "domain": "light",
                "service": "turn_on",
                "service_data": {"entity_id": "light.kitchen"}
            })
        );
    }

    #[test]
    fn call_service_without_data_omits_field() {
        let value = wire(CallService::new("homeassistant", "restart", None), 1);
        assert!(value.get("service_data").is_none());
    }

    #[test]
    fn subscription_commands() {
        assert_eq!(
            wire(SubscribeEvents::new(Some("state_changed".into())), 10),
            json!({"id": 10, "type": "subscribe_events", "event_type": "state_changed"})
        );
        assert_eq!(
            wire(SubscribeEvents::new(None), 11),
            json!({"id": 11, "type": "subscribe_events"})
        );
        assert_eq!(
            wire(UnsubscribeEvents::new(10), 12),
            json!({"id": 12, "type": "unsubscribe_events", "subscription": 10})
        );
    }

    #[test]
    fn thumbnail_command() {
        assert_eq!(
            wire(GetMediaPlayerThumbnail::new("media_player.living_room"), 6),
            json!({"id": 6, "type": "media_player_thumbnail", "entity_id": "media_player.living_room"})
        );
    }
}
