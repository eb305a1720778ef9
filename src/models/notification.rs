use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    RideCreated,
    RideRequested,
    RideAccepted,
    Otp,
    RideStarted,
    RideCancelled,
    RideCompleted,
    CommandRejected,
    QueryResult,
}

/// Wire shape published to the notification topic, keyed by recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(rename = "userId")]
    pub recipient_id: String,
    pub payload: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        event_type: EventType,
        recipient_id: impl ToString,
        payload: Value,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let payload = match payload {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        Self {
            event_type,
            recipient_id: recipient_id.to_string(),
            payload,
            timestamp,
        }
    }
}
