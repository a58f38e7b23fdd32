//! Event wire shape
//!
//! Every message pushed to a participant is `{type, data, timestamp}` with
//! an RFC 3339 timestamp. `data` is free-form JSON whose layout depends on
//! `type`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Connection,
    Ping,
    Status,
    Location,
    Chat,
    Notification,
    Quote,
    /// Direct reply carrying a delivery record.
    Delivery,
    /// Direct reply carrying a driver roster entry.
    Driver,
    Error,
}

impl EventKind {
    /// Events a slow consumer may lose under back-pressure: a newer one of
    /// the same kind supersedes them.
    pub fn is_droppable(&self) -> bool {
        matches!(self, EventKind::Location | EventKind::Ping)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(kind: EventKind, data: Value) -> Self {
        Self {
            kind,
            data,
            timestamp: Utc::now(),
        }
    }

    pub fn ping() -> Self {
        Self::new(EventKind::Ping, json!({}))
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(EventKind::Error, json!({ "message": message.into() }))
    }
}
