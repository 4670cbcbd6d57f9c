//! Wire protocol for the realtime event channel.
//!
//! Every frame, in both directions, is a JSON text frame of the shape
//! `{ "type": "<event-name>", "payload": { ... }, "timestamp": "<ISO-8601>" }`.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::EnvelopeError;

/// Path of the event endpoint on the primary application server.
pub const WS_PATH: &str = "/ws";

/// Close code sent on an explicit, user-requested disconnect.
pub const CLOSE_NORMAL: u16 = 1000;

/// Event type names understood by the server.
pub mod event_types {
    pub const ISSUE_CREATED: &str = "issue_created";
    pub const ISSUE_UPDATED: &str = "issue_updated";
    pub const ISSUE_DELETED: &str = "issue_deleted";
    pub const COMMENT_ADDED: &str = "comment_added";
    pub const STATUS_CHANGED: &str = "status_changed";
    pub const REPAIR_SCHEDULED: &str = "repair_scheduled";
    pub const REPAIR_RESCHEDULED: &str = "repair_rescheduled";
    pub const REPAIR_COMPLETED: &str = "repair_completed";
    pub const LOCATION_ADDED: &str = "location_added";
    pub const MACHINE_ADDED: &str = "machine_added";
    pub const USER_LOGGED_IN: &str = "user_logged_in";
    pub const USER_LOGGED_OUT: &str = "user_logged_out";
    pub const MESSAGE: &str = "message";
    pub const MESSAGE_RECEIVED: &str = "message_received";
    pub const CONVERSATION_UPDATED: &str = "conversation_updated";
    pub const DATA_REFRESH: &str = "data_refresh";
    pub const ISSUE_NOTIFICATION: &str = "issue_notification";
    pub const ISSUE_STATUS_CHANGED: &str = "issue_status_changed";
    pub const MACHINE_UPDATED: &str = "machine_updated";
    pub const MACHINE_REMOVED: &str = "machine_removed";
    pub const LOCATION_REMOVED: &str = "location_removed";
    pub const CATEGORY_ADDED: &str = "category_added";
    pub const USER_LOGIN: &str = "user_login";
    pub const USER_LOGOUT: &str = "user_logout";
    pub const USER_REGISTER: &str = "user_register";
    pub const ROLE_CHANGED: &str = "role_changed";
    pub const USER_NAVIGATION: &str = "user_navigation";

    /// Outbound heartbeat command.
    pub const PING: &str = "ping";

    /// Every business event the server may push.
    pub const ALL: &[&str] = &[
        ISSUE_CREATED,
        ISSUE_UPDATED,
        ISSUE_DELETED,
        COMMENT_ADDED,
        STATUS_CHANGED,
        REPAIR_SCHEDULED,
        REPAIR_RESCHEDULED,
        REPAIR_COMPLETED,
        LOCATION_ADDED,
        MACHINE_ADDED,
        USER_LOGGED_IN,
        USER_LOGGED_OUT,
        MESSAGE,
        MESSAGE_RECEIVED,
        CONVERSATION_UPDATED,
        DATA_REFRESH,
        ISSUE_NOTIFICATION,
        ISSUE_STATUS_CHANGED,
        MACHINE_UPDATED,
        MACHINE_REMOVED,
        LOCATION_REMOVED,
        CATEGORY_ADDED,
        USER_LOGIN,
        USER_LOGOUT,
        USER_REGISTER,
        ROLE_CHANGED,
        USER_NAVIGATION,
    ];

    pub fn is_known(event_type: &str) -> bool {
        ALL.contains(&event_type)
    }
}

/// The user that caused a server-side event, when the server attaches one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventSender {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// Wrapper for every message on the realtime channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub payload: Value,
    /// Missing or unreadable timestamps become `None`; they never reject the frame.
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(
        default,
        deserialize_with = "lenient_sender",
        skip_serializing_if = "Option::is_none"
    )]
    pub sender: Option<EventSender>,
}

/// Offset-less forms some producers emit; read as UTC.
const LOCAL_TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    LOCAL_TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(raw)) => parse_timestamp(&raw),
        // Epoch milliseconds, as `Date.now()` produces.
        Some(Value::Number(millis)) => millis.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    })
}

fn lenient_sender<'de, D>(deserializer: D) -> Result<Option<EventSender>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?
        .and_then(|value| serde_json::from_value(value).ok()))
}

impl Envelope {
    /// Build an outbound envelope stamped with the current time.
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
            timestamp: Some(Utc::now()),
            sender: None,
        }
    }

    /// Parse a text frame. A frame without a non-empty `type` is rejected.
    pub fn parse(text: &str) -> Result<Self, EnvelopeError> {
        // Parse into a Value first so a missing `type` is reported as such
        // rather than as a generic serde error.
        let value: Value = serde_json::from_str(text)?;
        match value.get("type") {
            Some(Value::String(t)) if !t.is_empty() => {}
            _ => return Err(EnvelopeError::MissingType),
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Parse a binary frame by decoding it as UTF-8 text first.
    pub fn parse_bytes(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        let text = std::str::from_utf8(bytes).map_err(|_| EnvelopeError::InvalidUtf8)?;
        Self::parse(text)
    }

    /// Serialize for the wire. Timestamps use millisecond precision with a
    /// `Z` suffix, matching what browsers produce.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let mut value = serde_json::to_value(self)?;
        if let (Some(ts), Some(obj)) = (self.timestamp, value.as_object_mut()) {
            obj.insert(
                "timestamp".to_string(),
                Value::String(ts.to_rfc3339_opts(SecondsFormat::Millis, true)),
            );
        }
        serde_json::to_string(&value)
    }
}
