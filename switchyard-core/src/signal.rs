//! Collaboration signals: ephemeral, TTL-scoped availability broadcasts.
//!
//! Signals are advisory only. The contract manager never treats them as
//! authoritative for mutual exclusion; they exist so agents can pick likely
//! collaborators and unclaimed work without extra round trips.

use crate::{AgentRole, Timestamp};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// SIGNAL KIND ENUM
// ============================================================================

/// Availability state an agent broadcasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalKind {
    /// Ready to pick up work in the scope
    Available,
    /// Working and not accepting more
    Busy,
    /// Alive but not actively working the scope
    Idle,
}

impl SignalKind {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            SignalKind::Available => "Available",
            SignalKind::Busy => "Busy",
            SignalKind::Idle => "Idle",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, SignalKindParseError> {
        match s.to_lowercase().as_str() {
            "available" => Ok(SignalKind::Available),
            "busy" => Ok(SignalKind::Busy),
            "idle" => Ok(SignalKind::Idle),
            _ => Err(SignalKindParseError(s.to_string())),
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for SignalKind {
    type Err = SignalKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid signal kind string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalKindParseError(pub String);

impl fmt::Display for SignalKindParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid signal kind: {}", self.0)
    }
}

impl std::error::Error for SignalKindParseError {}

// ============================================================================
// COLLABORATION SIGNAL RECORD
// ============================================================================

/// An ephemeral availability broadcast, last-write-wins per
/// `(agent_role, scope)`.
///
/// A signal logically expires at `published_at + ttl_seconds`. Expired
/// signals are excluded from queries at read time; physical deletion is an
/// optimization, never a correctness requirement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollaborationSignal {
    /// Broadcasting role
    pub agent_role: AgentRole,
    /// Scope the availability applies to (e.g. a queue segment or topic)
    pub scope: String,
    /// Availability state
    pub signal_kind: SignalKind,
    /// Time-to-live in seconds
    pub ttl_seconds: i64,
    /// When the signal was published
    pub published_at: Timestamp,
}

impl CollaborationSignal {
    /// Create a new signal stamped with the current time.
    pub fn new(agent_role: AgentRole, scope: &str, signal_kind: SignalKind, ttl_seconds: i64) -> Self {
        Self {
            agent_role,
            scope: scope.to_string(),
            signal_kind,
            ttl_seconds,
            published_at: Utc::now(),
        }
    }

    /// The instant this signal logically expires.
    pub fn expires_at(&self) -> Timestamp {
        self.published_at + Duration::seconds(self.ttl_seconds)
    }

    /// Whether the signal is still live at `now`.
    pub fn is_active(&self, now: Timestamp) -> bool {
        now < self.expires_at()
    }

    /// Upsert key: signals are last-write-wins per role and scope.
    pub fn key(&self) -> (AgentRole, &str) {
        (self.agent_role, self.scope.as_str())
    }
}
