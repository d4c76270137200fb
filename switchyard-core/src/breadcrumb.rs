//! Breadcrumbs: immutable execution trace records.
//!
//! A breadcrumb records a single agent action for audit and downstream
//! learning. Breadcrumbs are append-only: never mutated, never deleted.

use crate::{AgentRole, EntityId, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// BREADCRUMB TYPE ENUM
// ============================================================================

/// Kind of action a breadcrumb records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BreadcrumbType {
    /// An agent started working a claimed task
    ActionStarted,
    /// An agent finished working a claimed task
    ActionCompleted,
    /// A claim transaction committed for this agent
    ClaimWon,
    /// A claim lost the race to another agent
    ClaimLost,
    /// A stored claim was observed past its expiry
    LeaseExpired,
    /// A completion arrived after lease expiry; the result was discarded
    ResultDiscarded,
    /// A task crossed the abandonment ceiling
    TaskAbandoned,
    /// Free-form observation worth keeping for learning
    Observation,
}

impl BreadcrumbType {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            BreadcrumbType::ActionStarted => "ActionStarted",
            BreadcrumbType::ActionCompleted => "ActionCompleted",
            BreadcrumbType::ClaimWon => "ClaimWon",
            BreadcrumbType::ClaimLost => "ClaimLost",
            BreadcrumbType::LeaseExpired => "LeaseExpired",
            BreadcrumbType::ResultDiscarded => "ResultDiscarded",
            BreadcrumbType::TaskAbandoned => "TaskAbandoned",
            BreadcrumbType::Observation => "Observation",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, BreadcrumbTypeParseError> {
        match s {
            "ActionStarted" => Ok(BreadcrumbType::ActionStarted),
            "ActionCompleted" => Ok(BreadcrumbType::ActionCompleted),
            "ClaimWon" => Ok(BreadcrumbType::ClaimWon),
            "ClaimLost" => Ok(BreadcrumbType::ClaimLost),
            "LeaseExpired" => Ok(BreadcrumbType::LeaseExpired),
            "ResultDiscarded" => Ok(BreadcrumbType::ResultDiscarded),
            "TaskAbandoned" => Ok(BreadcrumbType::TaskAbandoned),
            "Observation" => Ok(BreadcrumbType::Observation),
            _ => Err(BreadcrumbTypeParseError(s.to_string())),
        }
    }
}

impl fmt::Display for BreadcrumbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for BreadcrumbType {
    type Err = BreadcrumbTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid breadcrumb type string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreadcrumbTypeParseError(pub String);

impl fmt::Display for BreadcrumbTypeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid breadcrumb type: {}", self.0)
    }
}

impl std::error::Error for BreadcrumbTypeParseError {}

// ============================================================================
// BREADCRUMB RECORD
// ============================================================================

/// An immutable trace record of a single agent action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breadcrumb {
    /// Unique identifier for this breadcrumb
    pub breadcrumb_id: EntityId,
    /// Role of the agent that performed the action
    pub agent_role: AgentRole,
    /// Session the action belongs to (one agent process run)
    pub session_id: EntityId,
    /// Kind of action recorded
    pub breadcrumb_type: BreadcrumbType,
    /// When the action was recorded
    pub recorded_at: Timestamp,
    /// Free-form structured context for the learning layer
    pub metadata: serde_json::Value,
}

impl Breadcrumb {
    /// Create a new breadcrumb stamped with the current time.
    pub fn new(agent_role: AgentRole, session_id: EntityId, breadcrumb_type: BreadcrumbType) -> Self {
        Self {
            breadcrumb_id: Uuid::now_v7(),
            agent_role,
            session_id,
            breadcrumb_type,
            recorded_at: Utc::now(),
            metadata: serde_json::Value::Null,
        }
    }

    /// Attach structured metadata.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

// ============================================================================
// QUERY FILTER
// ============================================================================

/// Filter parameters for breadcrumb queries.
///
/// All fields are optional; an empty filter matches everything up to `limit`.
#[derive(Debug, Clone, Default)]
pub struct BreadcrumbFilter {
    pub session_id: Option<EntityId>,
    pub agent_role: Option<AgentRole>,
    pub breadcrumb_type: Option<BreadcrumbType>,
    pub since: Option<Timestamp>,
    pub until: Option<Timestamp>,
    /// Maximum records to return; None means unbounded
    pub limit: Option<usize>,
}

impl BreadcrumbFilter {
    /// Check whether a breadcrumb matches this filter.
    pub fn matches(&self, crumb: &Breadcrumb) -> bool {
        if let Some(session_id) = self.session_id {
            if crumb.session_id != session_id {
                return false;
            }
        }
        if let Some(role) = self.agent_role {
            if crumb.agent_role != role {
                return false;
            }
        }
        if let Some(breadcrumb_type) = self.breadcrumb_type {
            if crumb.breadcrumb_type != breadcrumb_type {
                return false;
            }
        }
        if let Some(since) = self.since {
            if crumb.recorded_at < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if crumb.recorded_at >= until {
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
    fn test_breadcrumb_type_roundtrip() {
        for breadcrumb_type in [
            BreadcrumbType::ActionStarted,
            BreadcrumbType::ActionCompleted,
            BreadcrumbType::ClaimWon,
            BreadcrumbType::ClaimLost,
            BreadcrumbType::LeaseExpired,
            BreadcrumbType::ResultDiscarded,
            BreadcrumbType::TaskAbandoned,
            BreadcrumbType::Observation,
        ] {
            let parsed = BreadcrumbType::from_db_str(breadcrumb_type.as_db_str()).unwrap();
            assert_eq!(breadcrumb_type, parsed);
        }
    }

    #[test]
    fn test_breadcrumb_new_stamps_id_and_time() {
        let session = Uuid::now_v7();
        let crumb = Breadcrumb::new(AgentRole::Builder, session, BreadcrumbType::ClaimWon);
        assert_eq!(crumb.session_id, session);
        assert_eq!(crumb.metadata, serde_json::Value::Null);
        assert!(crumb.recorded_at <= Utc::now());
    }

    #[test]
    fn test_filter_by_session_and_role() {
        let session = Uuid::now_v7();
        let crumb = Breadcrumb::new(AgentRole::Builder, session, BreadcrumbType::ClaimWon);

        let filter = BreadcrumbFilter {
            session_id: Some(session),
            agent_role: Some(AgentRole::Builder),
            ..Default::default()
        };
        assert!(filter.matches(&crumb));

        let wrong_role = BreadcrumbFilter {
            agent_role: Some(AgentRole::Scout),
            ..Default::default()
        };
        assert!(!wrong_role.matches(&crumb));
    }

    #[test]
    fn test_filter_time_range_is_half_open() {
        let crumb = Breadcrumb::new(AgentRole::Curator, Uuid::now_v7(), BreadcrumbType::Observation);

        let inclusive = BreadcrumbFilter {
            since: Some(crumb.recorded_at),
            ..Default::default()
        };
        assert!(inclusive.matches(&crumb));

        let exclusive = BreadcrumbFilter {
            until: Some(crumb.recorded_at),
            ..Default::default()
        };
        assert!(!exclusive.matches(&crumb));
    }
}
