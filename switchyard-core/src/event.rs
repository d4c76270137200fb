//! Coordination events: immutable records of cross-agent communication.

use crate::{AgentRole, EntityId, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// EVENT TYPE ENUM
// ============================================================================

/// Kind of cross-agent communication an event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// An agent asked another role for work
    WorkRequest,
    /// A work request was accepted
    WorkAccepted,
    /// Two agents completed an initial handshake
    HandshakeComplete,
    /// Periodic progress report on a claimed task
    StatusUpdate,
    /// A task needs attention beyond normal reassignment
    Escalation,
}

impl EventType {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            EventType::WorkRequest => "WorkRequest",
            EventType::WorkAccepted => "WorkAccepted",
            EventType::HandshakeComplete => "HandshakeComplete",
            EventType::StatusUpdate => "StatusUpdate",
            EventType::Escalation => "Escalation",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, EventTypeParseError> {
        match s {
            "WorkRequest" => Ok(EventType::WorkRequest),
            "WorkAccepted" => Ok(EventType::WorkAccepted),
            "HandshakeComplete" => Ok(EventType::HandshakeComplete),
            "StatusUpdate" => Ok(EventType::StatusUpdate),
            "Escalation" => Ok(EventType::Escalation),
            _ => Err(EventTypeParseError(s.to_string())),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for EventType {
    type Err = EventTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid event type string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTypeParseError(pub String);

impl fmt::Display for EventTypeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid event type: {}", self.0)
    }
}

impl std::error::Error for EventTypeParseError {}

// ============================================================================
// COORDINATION EVENT RECORD
// ============================================================================

/// An immutable, append-only record of a cross-agent communication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinationEvent {
    /// Unique identifier for this event
    pub event_id: EntityId,
    /// Kind of communication
    pub event_type: EventType,
    /// Role that emitted the event
    pub source_role: AgentRole,
    /// Addressed role, if any; None means broadcast
    pub target_role: Option<AgentRole>,
    /// Free-form structured payload
    pub payload: serde_json::Value,
    /// When the event was emitted
    pub emitted_at: Timestamp,
}

impl CoordinationEvent {
    /// Create a broadcast event stamped with the current time.
    pub fn broadcast(event_type: EventType, source_role: AgentRole) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            event_type,
            source_role,
            target_role: None,
            payload: serde_json::Value::Null,
            emitted_at: Utc::now(),
        }
    }

    /// Create an event addressed to a specific role.
    pub fn to_role(event_type: EventType, source_role: AgentRole, target_role: AgentRole) -> Self {
        Self {
            target_role: Some(target_role),
            ..Self::broadcast(event_type, source_role)
        }
    }

    /// Attach a structured payload.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Check if the event is addressed to (or broadcast at) a role.
    pub fn is_for_role(&self, role: AgentRole) -> bool {
        match self.target_role {
            Some(target) => target == role,
            None => true,
        }
    }
}

// ============================================================================
// QUERY FILTER
// ============================================================================

/// Filter parameters for coordination event queries.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub event_type: Option<EventType>,
    pub source_role: Option<AgentRole>,
    pub target_role: Option<AgentRole>,
    pub since: Option<Timestamp>,
    pub until: Option<Timestamp>,
    /// Maximum records to return; None means unbounded
    pub limit: Option<usize>,
}

impl EventFilter {
    /// Check whether an event matches this filter.
    pub fn matches(&self, event: &CoordinationEvent) -> bool {
        if let Some(event_type) = self.event_type {
            if event.event_type != event_type {
                return false;
            }
        }
        if let Some(source) = self.source_role {
            if event.source_role != source {
                return false;
            }
        }
        if let Some(target) = self.target_role {
            if event.target_role != Some(target) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if event.emitted_at < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if event.emitted_at >= until {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_roundtrip() {
        for event_type in [
            EventType::WorkRequest,
            EventType::WorkAccepted,
            EventType::HandshakeComplete,
            EventType::StatusUpdate,
            EventType::Escalation,
        ] {
            let parsed = EventType::from_db_str(event_type.as_db_str()).unwrap();
            assert_eq!(event_type, parsed);
        }
    }

    #[test]
    fn test_broadcast_reaches_every_role() {
        let event = CoordinationEvent::broadcast(EventType::WorkRequest, AgentRole::Scout);
        assert!(event.target_role.is_none());
        assert!(event.is_for_role(AgentRole::Builder));
        assert!(event.is_for_role(AgentRole::Curator));
    }

    #[test]
    fn test_targeted_event_reaches_only_target() {
        let event =
            CoordinationEvent::to_role(EventType::WorkAccepted, AgentRole::Builder, AgentRole::Scout);
        assert!(event.is_for_role(AgentRole::Scout));
        assert!(!event.is_for_role(AgentRole::Reviewer));
    }

    #[test]
    fn test_filter_by_type_and_source() {
        let event = CoordinationEvent::broadcast(EventType::StatusUpdate, AgentRole::Builder)
            .with_payload(serde_json::json!({"progress": 0.5}));

        let filter = EventFilter {
            event_type: Some(EventType::StatusUpdate),
            source_role: Some(AgentRole::Builder),
            ..Default::default()
        };
        assert!(filter.matches(&event));

        let wrong_type = EventFilter {
            event_type: Some(EventType::Escalation),
            ..Default::default()
        };
        assert!(!wrong_type.matches(&event));
    }
}
