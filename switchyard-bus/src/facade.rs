//! Coordination facade: the thin surface agent runtimes call.
//!
//! Composes the contract manager, signal bus, trace logs, and task queue
//! over one shared store handle. One facade per agent process run; the
//! facade's session id attributes every breadcrumb the process leaves.

use std::path::Path;
use std::sync::Arc;
use switchyard_core::{
    new_entity_id, AgentRole, AutonomousTask, Breadcrumb, BreadcrumbFilter, BreadcrumbType,
    BusConfig, BusResult, CollaborationSignal, Contract, CoordinationEvent, EntityId, EventFilter,
    EventType, Held, Lease, SignalKind, TaskPriority,
};
use switchyard_store::{import_legacy_corpus, MigrationReport, Store};

use crate::contracts::ContractManager;
use crate::queue::TaskQueue;
use crate::signals::SignalBus;
use crate::trace::{BreadcrumbRecorder, EventLog};

/// The coordination bus as seen by an agent runtime.
pub struct CoordinationBus {
    store: Arc<dyn Store>,
    contracts: ContractManager,
    signals: SignalBus,
    breadcrumbs: BreadcrumbRecorder,
    events: EventLog,
    queue: TaskQueue,
    config: BusConfig,
    session_id: EntityId,
}

impl CoordinationBus {
    /// Create a facade with a fresh session id. Validates the configuration
    /// before anything touches the store.
    pub fn new(store: Arc<dyn Store>, config: BusConfig) -> BusResult<Self> {
        Self::with_session(store, config, new_entity_id())
    }

    /// Create a facade resuming an existing session id.
    pub fn with_session(
        store: Arc<dyn Store>,
        config: BusConfig,
        session_id: EntityId,
    ) -> BusResult<Self> {
        config.validate()?;
        Ok(Self {
            contracts: ContractManager::new(Arc::clone(&store), config.clone(), session_id),
            signals: SignalBus::new(Arc::clone(&store)),
            breadcrumbs: BreadcrumbRecorder::new(Arc::clone(&store), session_id),
            events: EventLog::new(Arc::clone(&store)),
            queue: TaskQueue::new(Arc::clone(&store), config.clone()),
            store,
            config,
            session_id,
        })
    }

    /// This process run's session id.
    pub fn session_id(&self) -> EntityId {
        self.session_id
    }

    // ========================================================================
    // CONTRACTS
    // ========================================================================

    /// Claim a task exclusively for `lease_seconds`.
    pub fn claim_task(
        &self,
        task_id: EntityId,
        agent_role: AgentRole,
        lease_seconds: i64,
    ) -> BusResult<Lease<Held>> {
        self.contracts.claim_task(task_id, agent_role, lease_seconds)
    }

    /// Claim using the role's configured default lease.
    pub fn claim_task_with_role_default(
        &self,
        task_id: EntityId,
        agent_role: AgentRole,
    ) -> BusResult<Lease<Held>> {
        let lease_seconds = self.config.lease_defaults.for_role(agent_role);
        self.contracts.claim_task(task_id, agent_role, lease_seconds)
    }

    /// Claim with the configured bounded backoff on contention.
    pub fn claim_with_backoff(
        &self,
        task_id: EntityId,
        agent_role: AgentRole,
        lease_seconds: i64,
    ) -> BusResult<Lease<Held>> {
        self.contracts.claim_with_backoff(task_id, agent_role, lease_seconds)
    }

    /// Extend a held lease.
    pub fn renew_lease(&self, lease: Lease<Held>, extra_seconds: i64) -> BusResult<Lease<Held>> {
        self.contracts.renew_lease(lease, extra_seconds)
    }

    /// Mark the claimed task as actively being worked.
    pub fn begin_work(&self, lease: &Lease<Held>) -> BusResult<()> {
        self.contracts.begin_work(lease)
    }

    /// Voluntarily release a held lease.
    pub fn release_contract(&self, lease: Lease<Held>) -> BusResult<()> {
        self.contracts.release_contract(lease)
    }

    /// Complete a held lease with a result.
    pub fn complete_contract(
        &self,
        lease: Lease<Held>,
        result: serde_json::Value,
    ) -> BusResult<Contract> {
        self.contracts.complete_contract(lease, result)
    }

    // ========================================================================
    // SIGNALS
    // ========================================================================

    /// Broadcast this role's availability for a scope.
    pub fn publish_signal(
        &self,
        agent_role: AgentRole,
        scope: &str,
        signal_kind: SignalKind,
        ttl_seconds: i64,
    ) -> BusResult<CollaborationSignal> {
        self.signals.publish_signal(agent_role, scope, signal_kind, ttl_seconds)
    }

    /// Live signals for a scope.
    pub fn query_active_signals(&self, scope: &str) -> BusResult<Vec<CollaborationSignal>> {
        self.signals.query_active_signals(scope)
    }

    // ========================================================================
    // TRACES
    // ========================================================================

    /// Append a breadcrumb for this session.
    pub fn record_breadcrumb(
        &self,
        agent_role: AgentRole,
        breadcrumb_type: BreadcrumbType,
        metadata: serde_json::Value,
    ) -> BusResult<Breadcrumb> {
        self.breadcrumbs.record_breadcrumb(agent_role, breadcrumb_type, metadata)
    }

    /// Query breadcrumbs across sessions.
    pub fn query_breadcrumbs(&self, filter: &BreadcrumbFilter) -> BusResult<Vec<Breadcrumb>> {
        self.breadcrumbs.query_breadcrumbs(filter)
    }

    /// Append a cross-agent event.
    pub fn record_event(
        &self,
        event_type: EventType,
        source_role: AgentRole,
        target_role: Option<AgentRole>,
        payload: serde_json::Value,
    ) -> BusResult<CoordinationEvent> {
        self.events.record_event(event_type, source_role, target_role, payload)
    }

    /// Query events.
    pub fn query_events(&self, filter: &EventFilter) -> BusResult<Vec<CoordinationEvent>> {
        self.events.query_events(filter)
    }

    // ========================================================================
    // TASK QUEUE
    // ========================================================================

    /// Insert a newly-discovered task.
    pub fn discover_task(
        &self,
        description: &str,
        priority: TaskPriority,
        discovered_by: AgentRole,
    ) -> BusResult<AutonomousTask> {
        self.queue.discover_task(description, priority, discovered_by)
    }

    /// Open tasks, highest priority first, oldest first within a priority.
    pub fn list_open_tasks(&self) -> BusResult<Vec<AutonomousTask>> {
        self.queue.list_open_tasks()
    }

    // ========================================================================
    // MIGRATION
    // ========================================================================

    /// One-time import of the legacy flat-file corpus.
    pub fn import_legacy_corpus(&self, dir: &Path) -> BusResult<MigrationReport> {
        import_legacy_corpus(self.store.as_ref(), dir)
    }
}
