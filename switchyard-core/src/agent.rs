//! Agent roles and capability profiles.
//!
//! Agents are distinguished only by role, never by the identity of the
//! underlying process or model. Roles are a closed enumeration: a typo in a
//! role string is a parse error, not a silently-minted phantom agent.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// AGENT ROLE ENUM (replaces free-form strings)
// ============================================================================

/// Role of an agent process on the coordination bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentRole {
    /// Discovers work items (code-health scans, violation detection)
    Scout,
    /// Claims and executes tasks
    Builder,
    /// Reviews and validates completed work
    Reviewer,
    /// Maintains the corpus: migrations, audits, trace analysis
    Curator,
}

impl AgentRole {
    /// All roles, in declaration order.
    pub const ALL: [AgentRole; 4] = [
        AgentRole::Scout,
        AgentRole::Builder,
        AgentRole::Reviewer,
        AgentRole::Curator,
    ];

    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            AgentRole::Scout => "Scout",
            AgentRole::Builder => "Builder",
            AgentRole::Reviewer => "Reviewer",
            AgentRole::Curator => "Curator",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, AgentRoleParseError> {
        match s.to_lowercase().as_str() {
            "scout" => Ok(AgentRole::Scout),
            "builder" => Ok(AgentRole::Builder),
            "reviewer" => Ok(AgentRole::Reviewer),
            "curator" => Ok(AgentRole::Curator),
            _ => Err(AgentRoleParseError(s.to_string())),
        }
    }

    /// The capability profile associated with this role.
    pub fn profile(&self) -> RoleProfile {
        match self {
            AgentRole::Scout => RoleProfile {
                capabilities: &["discovery", "signal"],
                may_discover: true,
                may_claim: false,
            },
            AgentRole::Builder => RoleProfile {
                capabilities: &["execution", "signal"],
                may_discover: false,
                may_claim: true,
            },
            AgentRole::Reviewer => RoleProfile {
                capabilities: &["review", "execution", "signal"],
                may_discover: false,
                may_claim: true,
            },
            AgentRole::Curator => RoleProfile {
                capabilities: &["discovery", "migration", "audit", "signal"],
                may_discover: true,
                may_claim: true,
            },
        }
    }

    /// Check if the role carries a specific capability.
    pub fn has_capability(&self, capability: &str) -> bool {
        self.profile().capabilities.iter().any(|c| *c == capability)
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for AgentRole {
    type Err = AgentRoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid agent role string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRoleParseError(pub String);

impl fmt::Display for AgentRoleParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid agent role: {}", self.0)
    }
}

impl std::error::Error for AgentRoleParseError {}

// ============================================================================
// ROLE PROFILE
// ============================================================================

/// Capability profile for an agent role.
///
/// Profiles are pure capability data. Numeric policy (per-role lease
/// defaults, backoff) lives in `BusConfig`, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleProfile {
    /// Capabilities this role carries
    pub capabilities: &'static [&'static str],
    /// Whether this role may insert tasks into the queue
    pub may_discover: bool,
    /// Whether this role may claim contracts
    pub may_claim: bool,
}
