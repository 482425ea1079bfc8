//! Event — an immutable record of something that happened.
//!
//! Events are produced when entities appear, change or disappear, and when a
//! command to a device fails (the hub surfaces those as warnings).

use serde::{Deserialize, Serialize};

use crate::id::{EntityId, EventId};
use crate::time::{Timestamp, now};

/// Kind of event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    EntityCreated,
    StateChanged,
    EntityRemoved,
    CommandFailed,
}

/// A published event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub event_type: EventType,
    pub entity_id: Option<EntityId>,
    pub data: serde_json::Value,
    pub timestamp: Timestamp,
}

impl Event {
    /// Create an event stamped with the current time.
    #[must_use]
    pub fn new(event_type: EventType, entity_id: Option<EntityId>, data: serde_json::Value) -> Self {
        Self {
            id: EventId::new(),
            event_type,
            entity_id,
            data,
            timestamp: now(),
        }
    }
}
