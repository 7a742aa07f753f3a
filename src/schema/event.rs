use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    DispatchDelivered,
    DispatchFailed,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::DispatchDelivered => "dispatch_delivered",
            EventType::DispatchFailed => "dispatch_failed",
        }
    }
}

impl FromStr for EventType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dispatch_delivered" => Ok(EventType::DispatchDelivered),
            "dispatch_failed" => Ok(EventType::DispatchFailed),
            other => Err(anyhow::anyhow!("unknown event type: {other}")),
        }
    }
}

/// Append-only audit row. Never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutreachEvent {
    pub id: Uuid,
    pub message_id: Uuid,
    pub thread_id: Uuid,
    pub lead_id: Option<Uuid>,
    pub provider: String,
    pub event_type: EventType,
    pub payload: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

/// Insert shape for the event log; the store assigns id and timestamp.
#[derive(Debug, Clone)]
pub struct NewOutreachEvent {
    pub message_id: Uuid,
    pub thread_id: Uuid,
    pub lead_id: Option<Uuid>,
    pub provider: String,
    pub event_type: EventType,
    pub payload: serde_json::Value,
}
