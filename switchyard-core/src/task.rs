//! Autonomous tasks: discovered units of work awaiting assignment.

use crate::{dedupe_hash, AgentRole, EntityId, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// TASK STATUS ENUM
// ============================================================================

/// Lifecycle status of an autonomous task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Discovered, waiting for an agent to claim it
    Discovered,
    /// A contract holds an active claim
    Assigned,
    /// The claim holder has started work
    InProgress,
    /// Completed successfully
    Done,
    /// Crossed the retry ceiling; needs escalation, not reassignment
    Abandoned,
}

impl TaskStatus {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            TaskStatus::Discovered => "Discovered",
            TaskStatus::Assigned => "Assigned",
            TaskStatus::InProgress => "InProgress",
            TaskStatus::Done => "Done",
            TaskStatus::Abandoned => "Abandoned",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, TaskStatusParseError> {
        match s {
            "Discovered" => Ok(TaskStatus::Discovered),
            "Assigned" => Ok(TaskStatus::Assigned),
            "InProgress" => Ok(TaskStatus::InProgress),
            "Done" => Ok(TaskStatus::Done),
            "Abandoned" => Ok(TaskStatus::Abandoned),
            _ => Err(TaskStatusParseError(s.to_string())),
        }
    }

    /// Whether a task in this status can accept a new claim.
    pub fn is_claimable(&self) -> bool {
        matches!(self, TaskStatus::Discovered)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for TaskStatus {
    type Err = TaskStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid task status string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskStatusParseError(pub String);

impl fmt::Display for TaskStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid task status: {}", self.0)
    }
}

impl std::error::Error for TaskStatusParseError {}

// ============================================================================
// TASK PRIORITY ENUM
// ============================================================================

/// Claim ordering priority. Ordered: `Critical > High > Normal > Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TaskPriority {
    Low,
    Normal,
    High,
    Critical,
}

impl TaskPriority {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "Low",
            TaskPriority::Normal => "Normal",
            TaskPriority::High => "High",
            TaskPriority::Critical => "Critical",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, TaskPriorityParseError> {
        match s.to_lowercase().as_str() {
            "low" => Ok(TaskPriority::Low),
            "normal" => Ok(TaskPriority::Normal),
            "high" => Ok(TaskPriority::High),
            "critical" => Ok(TaskPriority::Critical),
            _ => Err(TaskPriorityParseError(s.to_string())),
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for TaskPriority {
    type Err = TaskPriorityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid task priority string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskPriorityParseError(pub String);

impl fmt::Display for TaskPriorityParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid task priority: {}", self.0)
    }
}

impl std::error::Error for TaskPriorityParseError {}

// ============================================================================
// AUTONOMOUS TASK RECORD
// ============================================================================

/// A discovered unit of work. Owns zero or one currently-active contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutonomousTask {
    /// Unique identifier for this task
    pub task_id: EntityId,
    /// Human-readable description of the work
    pub description: String,
    /// SHA-256 of the normalized description, used for discovery dedupe
    pub dedupe_hash: String,
    /// Role that discovered the task
    pub discovered_by: AgentRole,
    /// Claim ordering priority
    pub priority: TaskPriority,
    /// Lifecycle status
    pub status: TaskStatus,
    /// Number of times a claim on this task expired without completion
    pub retry_count: i32,
    /// When the task was discovered
    pub created_at: Timestamp,
}

impl AutonomousTask {
    /// Create a newly-discovered task stamped with the current time.
    pub fn discover(description: &str, priority: TaskPriority, discovered_by: AgentRole) -> Self {
        Self {
            task_id: Uuid::now_v7(),
            description: description.to_string(),
            dedupe_hash: dedupe_hash(description),
            discovered_by,
            priority,
            status: TaskStatus::Discovered,
            retry_count: 0,
            created_at: Utc::now(),
        }
    }

    /// Record one lease-expiry reassignment. Returns the new count.
    pub fn record_expiry(&mut self) -> i32 {
        self.retry_count += 1;
        self.retry_count
    }

    /// Whether the retry count has crossed the abandonment ceiling.
    pub fn past_retry_ceiling(&self, ceiling: i32) -> bool {
        self.retry_count >= ceiling
    }
}
