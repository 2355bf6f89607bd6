//! Event payloads pushed by the server.
//!
//! The `time_fired` field arrives as text in one of two layouts: RFC 3339
//! with an explicit offset (`2024-03-01T10:15:30.123456+00:00`) or a naive
//! ISO-8601 timestamp without offset that the server means as UTC
//! (`2024-03-01T10:15:30.123456`). [`parse_time_fired`] normalizes both.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Naive layout accepted when the RFC 3339 parse fails.
pub const NAIVE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Read a text field the server may send as `null` or as a non-string.
///
/// `null` becomes the empty string and other scalars their JSON text, so
/// one odd field never costs the whole frame.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

fn lenient_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

/// Decode `null` as the type's default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Who caused a change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub parent_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub user_id: Option<String>,
}

/// Snapshot of one entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    #[serde(deserialize_with = "lenient_string")]
    pub entity_id: String,
    #[serde(deserialize_with = "lenient_string")]
    pub state: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub attributes: HashMap<String, Value>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub last_changed: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub last_updated: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub context: Context,
}

/// Body of a `state_changed` style event.
///
/// `old_state` is absent for newly added entities, `new_state` for removed ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    #[serde(default, deserialize_with = "lenient_string")]
    pub entity_id: String,
    #[serde(default)]
    pub old_state: Option<State>,
    #[serde(default)]
    pub new_state: Option<State>,
}

/// An event delivered to a subscription.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: EventData,
    #[serde(default, deserialize_with = "lenient_string")]
    pub origin: String,
    pub time_fired: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub context: Context,
}

impl Event {
    /// The fired-at instant, if `time_fired` is in an accepted layout.
    pub fn fired_at(&self) -> Option<DateTime<Utc>> {
        parse_time_fired(&self.time_fired).ok()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {} ({})", self.event_type, self.time_fired, self.origin)?;
        if !self.data.entity_id.is_empty() {
            write!(f, " {}", self.data.entity_id)?;
        }
        let old = self.data.old_state.as_ref().map(|s| s.state.as_str());
        let new = self.data.new_state.as_ref().map(|s| s.state.as_str());
        match (old, new) {
            (Some(old), Some(new)) => write!(f, ": {old} -> {new}"),
            (None, Some(new)) => write!(f, ": -> {new}"),
            (Some(old), None) => write!(f, ": {old} ->"),
            (None, None) => Ok(()),
        }
    }
}

/// Failure to read a `time_fired` value in either layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeFiredError {
    pub value: String,
    pub rfc3339: chrono::ParseError,
    pub naive: chrono::ParseError,
}

impl fmt::Display for TimeFiredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unrecognized time_fired {:?} (rfc3339: {}; naive: {})",
            self.value, self.rfc3339, self.naive
        )
    }
}

impl std::error::Error for TimeFiredError {}

/// Parse `time_fired`, trying RFC 3339 first and the naive UTC layout second.
pub fn parse_time_fired(value: &str) -> Result<DateTime<Utc>, TimeFiredError> {
    let rfc3339 = match DateTime::parse_from_rfc3339(value) {
        Ok(parsed) => return Ok(parsed.with_timezone(&Utc)),
        Err(e) => e,
    };
    match NaiveDateTime::parse_from_str(value, NAIVE_TIME_FORMAT) {
        Ok(naive) => Ok(naive.and_utc()),
        Err(naive) => Err(TimeFiredError {
            value: value.to_owned(),
            rfc3339,
            naive,
        }),
    }
}
