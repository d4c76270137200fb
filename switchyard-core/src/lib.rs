//! Switchyard Core - Entity Types
//!
//! Pure data structures for the agent coordination bus. All other crates
//! depend on this. This crate contains ONLY data types - no business logic
//! and no IO.

use sha2::{Digest, Sha256};
use uuid::Uuid;

pub mod agent;
pub mod breadcrumb;
pub mod config;
pub mod contract;
pub mod error;
pub mod event;
pub mod signal;
pub mod task;

pub use agent::{AgentRole, AgentRoleParseError, RoleProfile};
pub use breadcrumb::{Breadcrumb, BreadcrumbFilter, BreadcrumbType};
pub use config::{BusConfig, LeaseDefaults, RetryConfig};
pub use contract::{Contract, ContractStatus, Held, Lease, LeaseStateError, StoredContract};
pub use error::{
    BusError, BusResult, ConfigError, ContractError, MigrationError, SignalError, StoreError,
    TaskError,
};
pub use event::{CoordinationEvent, EventFilter, EventType};
pub use signal::{CollaborationSignal, SignalKind};
pub use task::{AutonomousTask, TaskPriority, TaskStatus};

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Entity identifier using UUIDv7 for timestamp-sortable IDs.
/// UUIDv7 embeds a Unix timestamp, making IDs naturally sortable by creation time.
pub type EntityId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Generate a new UUIDv7 EntityId (timestamp-sortable).
pub fn new_entity_id() -> EntityId {
    Uuid::now_v7()
}

/// Compute the dedupe hash for a task description.
///
/// Descriptions are normalized (trimmed, lowercased, inner whitespace
/// collapsed) before hashing so that trivially-reworded rediscoveries of the
/// same work collapse to the same key.
pub fn dedupe_hash(description: &str) -> String {
    let normalized = description
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}
