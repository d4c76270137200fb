//! Switchyard Store - Persistence Abstraction
//!
//! Defines the store abstraction the coordination components are written
//! against, plus the two adapters and the legacy corpus importer:
//!
//! - `Store` / `StoreTx` traits: atomic multi-collection transactions and
//!   the independent single-row operations
//! - `MemoryStore`: embedded in-process adapter (tests, single process)
//! - `PostgresStore`: transactional networked adapter (production)
//! - `migrate`: one-time importer for the legacy flat-file corpus
//!
//! The claim path is the only operation requiring true mutual exclusion and
//! runs entirely inside `Store::transaction`. Everything else (breadcrumbs,
//! events, signal publishes) is an independent single-row write.

pub mod memory;
pub mod migrate;
pub mod postgres;

pub use memory::MemoryStore;
pub use migrate::{import_legacy_corpus, MigrationReport};
pub use postgres::{PgConfig, PostgresStore};

use switchyard_core::{
    AutonomousTask, Breadcrumb, BreadcrumbFilter, BusResult, CollaborationSignal, Contract,
    ContractStatus, CoordinationEvent, EntityId, EventFilter, TaskStatus, Timestamp,
};

// ============================================================================
// UPDATE TYPES
// ============================================================================

/// Update payload for tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    /// New status
    pub status: Option<TaskStatus>,
    /// New retry count
    pub retry_count: Option<i32>,
}

/// Update payload for contracts.
#[derive(Debug, Clone, Default)]
pub struct ContractUpdate {
    /// New status
    pub status: Option<ContractStatus>,
    /// New lease expiry
    pub expires_at: Option<Timestamp>,
    /// Completion result
    pub result: Option<serde_json::Value>,
}

// ============================================================================
// TRANSACTION SURFACE
// ============================================================================

/// Operations available inside one store transaction.
///
/// A transaction sees its own writes (read-your-writes isolation) and either
/// fully commits or fully rolls back. Adapters serialize conflicting
/// transactions: in the embedded adapter via a process-wide mutex, in
/// PostgreSQL via row locks taken by `task_get`.
pub trait StoreTx {
    /// Get a task by ID, locking it against concurrent claim transactions.
    fn task_get(&mut self, task_id: EntityId) -> BusResult<Option<AutonomousTask>>;

    /// Insert a new task.
    fn task_insert(&mut self, task: &AutonomousTask) -> BusResult<()>;

    /// Apply an update to a task.
    fn task_update(&mut self, task_id: EntityId, update: TaskUpdate) -> BusResult<()>;

    /// Find a task with the same dedupe hash discovered at or after `since`.
    /// Used by the discovery dedupe window.
    fn task_find_recent_by_dedupe(
        &mut self,
        dedupe_hash: &str,
        since: Timestamp,
    ) -> BusResult<Option<AutonomousTask>>;

    /// Get a contract by ID.
    fn contract_get(&mut self, contract_id: EntityId) -> BusResult<Option<Contract>>;

    /// List all contracts ever created for a task.
    fn contract_list_by_task(&mut self, task_id: EntityId) -> BusResult<Vec<Contract>>;

    /// Conditionally insert a claimed contract.
    ///
    /// This is the mutual-exclusion primitive: the insert is keyed uniquely
    /// on `(task_id, status = Claimed)`, so when another claimed row for the
    /// task already exists the insert fails with
    /// `StoreError::DuplicateKey` instead of silently succeeding. Whichever
    /// transaction commits first wins.
    fn contract_insert_claimed(&mut self, contract: &Contract) -> BusResult<()>;

    /// Insert a contract that does not carry an active claim (completed,
    /// released, or expired rows replayed by the legacy importer). Keyed on
    /// contract_id only.
    fn contract_insert_plain(&mut self, contract: &Contract) -> BusResult<()>;

    /// Apply an update to a contract.
    fn contract_update(&mut self, contract_id: EntityId, update: ContractUpdate) -> BusResult<()>;
}

// ============================================================================
// STORE TRAIT
// ============================================================================

/// The persistence store: single source of truth for all five collections.
///
/// Implementations must surface backend failures as
/// `StoreError::Unavailable`; callers fail closed on it (assume no
/// ownership, never proceed as if a claim succeeded).
pub trait Store: Send + Sync {
    /// Run `f` inside one atomic transaction.
    ///
    /// The closure may be invoked at most once. If it returns `Ok` the
    /// transaction commits; any `Err` rolls back every write made through
    /// the `StoreTx`. Results are returned through the closure's captures.
    fn transaction(
        &self,
        f: &mut dyn FnMut(&mut dyn StoreTx) -> BusResult<()>,
    ) -> BusResult<()>;

    // === Breadcrumbs (append-only) ===

    /// Append a breadcrumb.
    fn breadcrumb_insert(&self, crumb: &Breadcrumb) -> BusResult<()>;

    /// Query breadcrumbs in append order.
    fn breadcrumb_query(&self, filter: &BreadcrumbFilter) -> BusResult<Vec<Breadcrumb>>;

    // === Coordination events (append-only) ===

    /// Append a coordination event.
    fn event_insert(&self, event: &CoordinationEvent) -> BusResult<()>;

    /// Query events in append order.
    fn event_query(&self, filter: &EventFilter) -> BusResult<Vec<CoordinationEvent>>;

    // === Collaboration signals (last-write-wins) ===

    /// Upsert a signal keyed by `(agent_role, scope)`.
    fn signal_upsert(&self, signal: &CollaborationSignal) -> BusResult<()>;

    /// List all signals for a scope, expired ones included. Expiry is
    /// filtered at the bus layer so correctness never depends on cleanup.
    fn signal_list_by_scope(&self, scope: &str) -> BusResult<Vec<CollaborationSignal>>;

    // === Tasks (reads outside transactions) ===

    /// Get a task by ID.
    fn task_get(&self, task_id: EntityId) -> BusResult<Option<AutonomousTask>>;

    /// List tasks in a status.
    fn task_list_by_status(&self, status: TaskStatus) -> BusResult<Vec<AutonomousTask>>;

    // === Contracts (reads outside transactions) ===

    /// Get a contract by ID.
    fn contract_get(&self, contract_id: EntityId) -> BusResult<Option<Contract>>;

    /// List all contracts ever created for a task.
    fn contract_list_by_task(&self, task_id: EntityId) -> BusResult<Vec<Contract>>;
}
