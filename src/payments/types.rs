//! Payment-provider event types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A verified provider notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Provider-assigned event id; the idempotency key.
    pub id: String,
    /// Event type, e.g. `customer.subscription.updated`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// The event's `data` member.
    #[serde(default, rename = "data")]
    pub payload: Value,
}

impl Event {
    /// The object the event is about (`data.object`), if present.
    pub fn object(&self) -> Option<&Value> {
        self.payload.get("object")
    }
}
