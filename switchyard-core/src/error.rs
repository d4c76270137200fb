//! Error types for coordination bus operations

use crate::{EntityId, Timestamp};
use thiserror::Error;

/// Persistence store errors.
///
/// `Unavailable` is fatal for callers: every higher component must fail
/// closed on it and never assume an optimistic outcome (a swallowed store
/// failure on the claim path could mean duplicate execution).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Record not found in {collection}: {id}")]
    NotFound { collection: &'static str, id: EntityId },

    #[error("Duplicate key in {collection}: {key}")]
    DuplicateKey { collection: &'static str, key: String },

    #[error("Corrupt record in {collection}: {reason}")]
    CorruptRecord { collection: &'static str, reason: String },
}

/// Contract lifecycle errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContractError {
    /// Expected contention outcome, not a fault. The caller should pick a
    /// different task or retry with bounded backoff.
    #[error("Task {task_id} already claimed until {expires_at}")]
    AlreadyClaimed {
        task_id: EntityId,
        expires_at: Timestamp,
    },

    /// The caller lost its claim window. Any result is discarded and the
    /// task is reopened for another claim.
    #[error("Lease on contract {contract_id} expired at {expired_at}")]
    LeaseExpired {
        contract_id: EntityId,
        expired_at: Timestamp,
    },

    #[error("Invalid lease duration: {requested_seconds}s (leases must be positive and finite)")]
    InvalidLease { requested_seconds: i64 },

    #[error("Contract {contract_id} is {status}, expected an active claim")]
    NotActive {
        contract_id: EntityId,
        status: &'static str,
    },
}

/// Task queue errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskError {
    #[error("Task not found: {task_id}")]
    NotFound { task_id: EntityId },

    /// A task with the same normalized description was discovered inside the
    /// dedupe window. Repeated discovery scans must not flood the queue.
    #[error("Duplicate task description (existing task {existing_task_id})")]
    DuplicateDescription { existing_task_id: EntityId },

    #[error("Task {task_id} is not claimable: {reason}")]
    NotClaimable { task_id: EntityId, reason: String },

    #[error("Agent role {role} lacks the {capability} capability")]
    CapabilityDenied { role: String, capability: &'static str },

    #[error("Invalid task description: {reason}")]
    InvalidDescription { reason: &'static str },
}

/// Collaboration signal errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignalError {
    #[error("Invalid signal TTL: {ttl_seconds}s (TTLs must be positive and finite)")]
    InvalidTtl { ttl_seconds: i64 },
}

/// Legacy corpus migration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MigrationError {
    /// One malformed legacy record. Skipped and counted in the
    /// reconciliation report, never silently dropped.
    #[error("Malformed record #{index} in {collection}: {reason}")]
    MalformedRecord {
        collection: &'static str,
        index: usize,
        reason: String,
    },

    #[error("Legacy corpus file unreadable: {path}: {reason}")]
    CorpusUnreadable { path: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: &'static str },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: &'static str,
        value: String,
        reason: String,
    },
}

/// Master error type for all coordination bus errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BusError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Contract error: {0}")]
    Contract(#[from] ContractError),

    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    #[error("Signal error: {0}")]
    Signal(#[from] SignalError),

    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl BusError {
    /// Whether this error is an expected contention outcome that the caller
    /// may retry locally, as opposed to a fault.
    pub fn is_contention(&self) -> bool {
        matches!(self, BusError::Contract(ContractError::AlreadyClaimed { .. }))
    }

    /// Whether the store itself failed. Callers must fail closed: assume no
    /// ownership was acquired and do not proceed.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, BusError::Store(_))
    }
}

/// Result type alias for coordination bus operations.
pub type BusResult<T> = Result<T, BusError>;

// =============================================================================
// TESTS
// =============================================================================
