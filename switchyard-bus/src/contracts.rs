//! Contract manager: atomic task-claim, lease, release, and completion.
//!
//! The claim path is the one place in the bus that needs true mutual
//! exclusion, and it runs entirely inside a single store transaction. Expiry
//! is lazy: a stored `Claimed` row past its `expires_at` is not an active
//! claim, and the next transaction that touches the task retires it to
//! `Expired` while updating the task's retry accounting. There is no
//! background sweeper.

use chrono::Utc;
use std::sync::Arc;
use switchyard_core::{
    AgentRole, AutonomousTask, Breadcrumb, BreadcrumbType, BusConfig, BusError, BusResult,
    Contract, ContractError, ContractStatus, EntityId, Held, Lease, StoreError, TaskError,
    TaskStatus, Timestamp,
};
use switchyard_store::{ContractUpdate, Store, StoreTx, TaskUpdate};
use tracing::{debug, info, warn};

enum ClaimOutcome {
    Claimed(Contract),
    /// The stale claim we retired pushed the task over the retry ceiling.
    Abandoned { retry_count: i32 },
}

enum CloseOutcome {
    Closed(Contract),
    /// The lease lapsed before the operation; the claim was retired.
    LostRace { expired_at: Timestamp },
}

/// Atomic claim/lease/release/complete logic over the store.
pub struct ContractManager {
    store: Arc<dyn Store>,
    config: BusConfig,
    session_id: EntityId,
}

impl ContractManager {
    /// Create a manager bound to one agent session.
    pub fn new(store: Arc<dyn Store>, config: BusConfig, session_id: EntityId) -> Self {
        Self {
            store,
            config,
            session_id,
        }
    }

    // ========================================================================
    // CLAIM
    // ========================================================================

    /// Claim a task exclusively for `lease_seconds`.
    ///
    /// Exactly one of two racing claims wins; the loser gets
    /// `ContractError::AlreadyClaimed`, never a silent no-op. Zero and
    /// negative leases are rejected, out-of-bounds leases are clamped.
    pub fn claim_task(
        &self,
        task_id: EntityId,
        agent_role: AgentRole,
        lease_seconds: i64,
    ) -> BusResult<Lease<Held>> {
        if !agent_role.profile().may_claim {
            return Err(TaskError::CapabilityDenied {
                role: agent_role.to_string(),
                capability: "execution",
            }
            .into());
        }
        if lease_seconds <= 0 {
            return Err(ContractError::InvalidLease {
                requested_seconds: lease_seconds,
            }
            .into());
        }
        let lease_seconds = self.config.clamp_lease_seconds(lease_seconds);

        let mut outcome: Option<ClaimOutcome> = None;
        let result = self.store.transaction(&mut |tx| {
            let mut task = tx
                .task_get(task_id)?
                .ok_or(TaskError::NotFound { task_id })?;
            if matches!(task.status, TaskStatus::Done | TaskStatus::Abandoned) {
                return Err(TaskError::NotClaimable {
                    task_id,
                    reason: format!("task is {}", task.status),
                }
                .into());
            }

            let now = Utc::now();
            let contracts = tx.contract_list_by_task(task_id)?;
            // At most one Claimed row can exist per task
            if let Some(claimed) = contracts.iter().find(|c| c.status == ContractStatus::Claimed) {
                if claimed.is_active_claim(now) {
                    return Err(ContractError::AlreadyClaimed {
                        task_id,
                        expires_at: claimed.expires_at,
                    }
                    .into());
                }
                if Self::retire_stale_claim(tx, &self.config, &mut task, claimed)? {
                    outcome = Some(ClaimOutcome::Abandoned {
                        retry_count: task.retry_count,
                    });
                    // Commit the retire and the abandonment flag
                    return Ok(());
                }
            }

            let contract = Contract::claim(task_id, agent_role, lease_seconds);
            tx.contract_insert_claimed(&contract)?;
            tx.task_update(
                task_id,
                TaskUpdate {
                    status: Some(TaskStatus::Assigned),
                    retry_count: Some(task.retry_count),
                },
            )?;
            outcome = Some(ClaimOutcome::Claimed(contract));
            Ok(())
        });

        match result {
            Ok(()) => match outcome {
                Some(ClaimOutcome::Claimed(contract)) => {
                    info!(%task_id, role = %agent_role, contract_id = %contract.contract_id,
                        expires_at = %contract.expires_at, "claim won");
                    self.trace(
                        agent_role,
                        BreadcrumbType::ClaimWon,
                        serde_json::json!({
                            "task_id": task_id,
                            "contract_id": contract.contract_id,
                            "lease_seconds": lease_seconds,
                        }),
                    );
                    Ok(Lease::new(contract))
                }
                Some(ClaimOutcome::Abandoned { retry_count }) => {
                    warn!(%task_id, retry_count, "task abandoned after repeated lease expiry");
                    self.trace(
                        agent_role,
                        BreadcrumbType::TaskAbandoned,
                        serde_json::json!({ "task_id": task_id, "retry_count": retry_count }),
                    );
                    Err(TaskError::NotClaimable {
                        task_id,
                        reason: "abandoned after repeated lease expiry".to_string(),
                    }
                    .into())
                }
                None => Err(StoreError::TransactionFailed {
                    reason: "claim transaction committed without an outcome".to_string(),
                }
                .into()),
            },
            // A concurrent claimant inserted between our read and our insert;
            // surface it as the normal contention outcome.
            Err(BusError::Store(StoreError::DuplicateKey {
                collection: "contracts",
                ..
            })) => {
                let expires_at = self.winning_claim_expiry(task_id)?;
                debug!(%task_id, role = %agent_role, "claim lost to concurrent transaction");
                self.trace(
                    agent_role,
                    BreadcrumbType::ClaimLost,
                    serde_json::json!({ "task_id": task_id }),
                );
                Err(ContractError::AlreadyClaimed { task_id, expires_at }.into())
            }
            Err(e @ BusError::Contract(ContractError::AlreadyClaimed { .. })) => {
                debug!(%task_id, role = %agent_role, "claim lost, task already held");
                self.trace(
                    agent_role,
                    BreadcrumbType::ClaimLost,
                    serde_json::json!({ "task_id": task_id }),
                );
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Claim with bounded retry-with-backoff on contention.
    ///
    /// `AlreadyClaimed` is an expected outcome, not a fault; this helper
    /// applies the configured backoff between attempts and gives up after
    /// `max_retries`, returning the last contention error.
    pub fn claim_with_backoff(
        &self,
        task_id: EntityId,
        agent_role: AgentRole,
        lease_seconds: i64,
    ) -> BusResult<Lease<Held>> {
        let retry = &self.config.claim_retry;
        let mut attempt: u32 = 0;
        loop {
            match self.claim_task(task_id, agent_role, lease_seconds) {
                Err(e) if e.is_contention() && (attempt as i32) < retry.max_retries => {
                    let backoff = retry.backoff_for_attempt(attempt);
                    debug!(%task_id, attempt, backoff_ms = backoff.as_millis() as u64,
                        "claim contended, backing off");
                    std::thread::sleep(backoff);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    // ========================================================================
    // LEASE LIFECYCLE
    // ========================================================================

    /// Extend a held lease by `extra_seconds`.
    ///
    /// Fails with `LeaseExpired` if the lease already lapsed; the stale
    /// claim is retired in the same transaction so the task reopens.
    pub fn renew_lease(&self, lease: Lease<Held>, extra_seconds: i64) -> BusResult<Lease<Held>> {
        if extra_seconds <= 0 {
            return Err(ContractError::InvalidLease {
                requested_seconds: extra_seconds,
            }
            .into());
        }
        let extra_seconds = extra_seconds.min(self.config.max_lease_seconds);
        let contract_id = lease.contract_id();

        let mut lost: Option<Timestamp> = None;
        self.store.transaction(&mut |tx| {
            let contract = Self::load_claimed(tx, contract_id)?;
            let now = Utc::now();
            if contract.is_expired(now) {
                let mut task = tx
                    .task_get(contract.task_id)?
                    .ok_or(TaskError::NotFound { task_id: contract.task_id })?;
                Self::retire_stale_claim(tx, &self.config, &mut task, &contract)?;
                lost = Some(contract.expires_at);
                return Ok(());
            }
            tx.contract_update(
                contract_id,
                ContractUpdate {
                    expires_at: Some(contract.expires_at + chrono::Duration::seconds(extra_seconds)),
                    ..Default::default()
                },
            )?;
            Ok(())
        })?;

        if let Some(expired_at) = lost {
            self.trace_lease_expired(lease.agent_role(), lease.task_id(), contract_id, expired_at);
            return Err(ContractError::LeaseExpired {
                contract_id,
                expired_at,
            }
            .into());
        }
        debug!(%contract_id, extra_seconds, "lease renewed");
        Ok(lease.renewed(extra_seconds))
    }

    /// Mark the claimed task as actively being worked.
    pub fn begin_work(&self, lease: &Lease<Held>) -> BusResult<()> {
        let contract_id = lease.contract_id();
        let mut lost: Option<Timestamp> = None;
        self.store.transaction(&mut |tx| {
            let contract = Self::load_claimed(tx, contract_id)?;
            let now = Utc::now();
            if contract.is_expired(now) {
                let mut task = tx
                    .task_get(contract.task_id)?
                    .ok_or(TaskError::NotFound { task_id: contract.task_id })?;
                Self::retire_stale_claim(tx, &self.config, &mut task, &contract)?;
                lost = Some(contract.expires_at);
                return Ok(());
            }
            tx.task_update(
                contract.task_id,
                TaskUpdate {
                    status: Some(TaskStatus::InProgress),
                    ..Default::default()
                },
            )?;
            Ok(())
        })?;

        if let Some(expired_at) = lost {
            self.trace_lease_expired(lease.agent_role(), lease.task_id(), contract_id, expired_at);
            return Err(ContractError::LeaseExpired {
                contract_id,
                expired_at,
            }
            .into());
        }
        self.trace(
            lease.agent_role(),
            BreadcrumbType::ActionStarted,
            serde_json::json!({ "task_id": lease.task_id(), "contract_id": contract_id }),
        );
        Ok(())
    }

    /// Voluntarily release a held lease. The task becomes reclaimable
    /// immediately, with no retry-count penalty for a live release.
    pub fn release_contract(&self, lease: Lease<Held>) -> BusResult<()> {
        let contract_id = lease.contract_id();
        self.store.transaction(&mut |tx| {
            let contract = Self::load_claimed(tx, contract_id)?;
            let now = Utc::now();
            if contract.is_expired(now) {
                // The lease lapsed before the release arrived; the retire
                // path already reopens (or abandons) the task.
                let mut task = tx
                    .task_get(contract.task_id)?
                    .ok_or(TaskError::NotFound { task_id: contract.task_id })?;
                Self::retire_stale_claim(tx, &self.config, &mut task, &contract)?;
                return Ok(());
            }
            tx.contract_update(
                contract_id,
                ContractUpdate {
                    status: Some(ContractStatus::Released),
                    ..Default::default()
                },
            )?;
            tx.task_update(
                contract.task_id,
                TaskUpdate {
                    status: Some(TaskStatus::Discovered),
                    ..Default::default()
                },
            )?;
            Ok(())
        })?;

        info!(%contract_id, task_id = %lease.task_id(), "contract released");
        self.trace(
            lease.agent_role(),
            BreadcrumbType::ActionCompleted,
            serde_json::json!({
                "task_id": lease.task_id(),
                "contract_id": contract_id,
                "released": true,
            }),
        );
        Ok(())
    }

    /// Complete a held lease with a result.
    ///
    /// If the lease lapsed first, the result is discarded (and recorded as a
    /// `ResultDiscarded` breadcrumb for the learning layer), the task is
    /// reopened for another claim, and `LeaseExpired` is returned.
    pub fn complete_contract(
        &self,
        lease: Lease<Held>,
        result: serde_json::Value,
    ) -> BusResult<Contract> {
        let contract_id = lease.contract_id();
        let agent_role = lease.agent_role();
        let task_id = lease.task_id();

        let mut outcome: Option<CloseOutcome> = None;
        self.store.transaction(&mut |tx| {
            let contract = Self::load_claimed(tx, contract_id)?;
            let now = Utc::now();
            if contract.is_expired(now) {
                let mut task = tx
                    .task_get(contract.task_id)?
                    .ok_or(TaskError::NotFound { task_id: contract.task_id })?;
                Self::retire_stale_claim(tx, &self.config, &mut task, &contract)?;
                outcome = Some(CloseOutcome::LostRace {
                    expired_at: contract.expires_at,
                });
                return Ok(());
            }
            tx.contract_update(
                contract_id,
                ContractUpdate {
                    status: Some(ContractStatus::Completed),
                    result: Some(result.clone()),
                    ..Default::default()
                },
            )?;
            tx.task_update(
                contract.task_id,
                TaskUpdate {
                    status: Some(TaskStatus::Done),
                    ..Default::default()
                },
            )?;
            let mut completed = contract;
            completed.status = ContractStatus::Completed;
            completed.result = Some(result.clone());
            outcome = Some(CloseOutcome::Closed(completed));
            Ok(())
        })?;

        match outcome {
            Some(CloseOutcome::Closed(contract)) => {
                info!(%contract_id, %task_id, "contract completed");
                self.trace(
                    agent_role,
                    BreadcrumbType::ActionCompleted,
                    serde_json::json!({ "task_id": task_id, "contract_id": contract_id }),
                );
                Ok(contract)
            }
            Some(CloseOutcome::LostRace { expired_at }) => {
                warn!(%contract_id, %task_id, %expired_at,
                    "completion arrived after lease expiry, result discarded");
                self.trace(
                    agent_role,
                    BreadcrumbType::ResultDiscarded,
                    serde_json::json!({
                        "task_id": task_id,
                        "contract_id": contract_id,
                        "discarded_result": result,
                    }),
                );
                Err(ContractError::LeaseExpired {
                    contract_id,
                    expired_at,
                }
                .into())
            }
            None => Err(StoreError::TransactionFailed {
                reason: "completion transaction committed without an outcome".to_string(),
            }
            .into()),
        }
    }

    // ========================================================================
    // INTERNAL HELPERS
    // ========================================================================

    /// Load a contract that is expected to be in `Claimed` status.
    fn load_claimed(tx: &mut dyn StoreTx, contract_id: EntityId) -> BusResult<Contract> {
        let contract = tx.contract_get(contract_id)?.ok_or(StoreError::NotFound {
            collection: "contracts",
            id: contract_id,
        })?;
        if contract.status != ContractStatus::Claimed {
            return Err(ContractError::NotActive {
                contract_id,
                status: contract.status.as_db_str(),
            }
            .into());
        }
        Ok(contract)
    }

    /// Retire a stale `Claimed` row: mark it `Expired`, bump the task's
    /// retry count, and either reopen the task or flag it `Abandoned` once
    /// the ceiling is crossed. Returns whether the task was abandoned.
    fn retire_stale_claim(
        tx: &mut dyn StoreTx,
        config: &BusConfig,
        task: &mut AutonomousTask,
        stale: &Contract,
    ) -> BusResult<bool> {
        tx.contract_update(
            stale.contract_id,
            ContractUpdate {
                status: Some(ContractStatus::Expired),
                ..Default::default()
            },
        )?;
        task.record_expiry();
        let abandoned = task.past_retry_ceiling(config.abandon_retry_ceiling);
        tx.task_update(
            task.task_id,
            TaskUpdate {
                status: Some(if abandoned {
                    TaskStatus::Abandoned
                } else {
                    TaskStatus::Discovered
                }),
                retry_count: Some(task.retry_count),
            },
        )?;
        Ok(abandoned)
    }

    fn winning_claim_expiry(&self, task_id: EntityId) -> BusResult<Timestamp> {
        let now = Utc::now();
        let contracts = self.store.contract_list_by_task(task_id)?;
        Ok(contracts
            .iter()
            .find(|c| c.is_active_claim(now))
            .map(|c| c.expires_at)
            .unwrap_or(now))
    }

    fn trace_lease_expired(
        &self,
        agent_role: AgentRole,
        task_id: EntityId,
        contract_id: EntityId,
        expired_at: Timestamp,
    ) {
        warn!(%contract_id, %task_id, %expired_at, "lease expired under its holder");
        self.trace(
            agent_role,
            BreadcrumbType::LeaseExpired,
            serde_json::json!({
                "task_id": task_id,
                "contract_id": contract_id,
                "expired_at": expired_at.to_rfc3339(),
            }),
        );
    }

    /// Best-effort trace write. The coordination outcome has already
    /// committed; a trace failure must not retroactively fail it, so the
    /// error is logged instead of propagated.
    fn trace(&self, agent_role: AgentRole, breadcrumb_type: BreadcrumbType, metadata: serde_json::Value) {
        let crumb =
            Breadcrumb::new(agent_role, self.session_id, breadcrumb_type).with_metadata(metadata);
        if let Err(e) = self.store.breadcrumb_insert(&crumb) {
            warn!(breadcrumb_type = %crumb.breadcrumb_type, error = %e, "breadcrumb write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use switchyard_core::{LeaseDefaults, RetryConfig, TaskPriority};
    use switchyard_store::MemoryStore;

    fn test_config() -> BusConfig {
        BusConfig {
            min_lease_seconds: 1,
            max_lease_seconds: 3600,
            abandon_retry_ceiling: 2,
            dedupe_window_seconds: 600,
            lease_defaults: LeaseDefaults {
                scout: 60,
                builder: 300,
                reviewer: 300,
                curator: 900,
            },
            claim_retry: RetryConfig {
                max_retries: 3,
                initial_backoff: std::time::Duration::from_millis(1),
                max_backoff: std::time::Duration::from_millis(4),
                backoff_multiplier: 2.0,
            },
        }
    }

    fn manager(store: &Arc<dyn Store>) -> ContractManager {
        ContractManager::new(Arc::clone(store), test_config(), switchyard_core::new_entity_id())
    }

    fn seed_task(store: &Arc<dyn Store>) -> AutonomousTask {
        let task = AutonomousTask::discover("index the corpus", TaskPriority::Normal, AgentRole::Scout);
        store
            .transaction(&mut |tx| tx.task_insert(&task))
            .unwrap();
        task
    }

    /// Insert an already-expired claimed contract, bypassing the manager.
    fn seed_expired_claim(store: &Arc<dyn Store>, task_id: EntityId, role: AgentRole) -> Contract {
        let mut contract = Contract::claim(task_id, role, 3600);
        contract.expires_at = Utc::now() - Duration::seconds(5);
        store
            .transaction(&mut |tx| {
                tx.contract_insert_claimed(&contract)?;
                tx.task_update(
                    task_id,
                    TaskUpdate {
                        status: Some(TaskStatus::Assigned),
                        ..Default::default()
                    },
                )
            })
            .unwrap();
        contract
    }

    #[test]
    fn test_claim_assigns_task() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let task = seed_task(&store);
        let manager = manager(&store);

        let lease = manager.claim_task(task.task_id, AgentRole::Builder, 60).unwrap();
        assert_eq!(lease.task_id(), task.task_id);
        assert_eq!(lease.agent_role(), AgentRole::Builder);

        let stored = store.task_get(task.task_id).unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Assigned);
    }

    #[test]
    fn test_second_claim_is_rejected() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let task = seed_task(&store);
        let manager = manager(&store);

        let _lease = manager.claim_task(task.task_id, AgentRole::Builder, 60).unwrap();
        let err = manager
            .claim_task(task.task_id, AgentRole::Reviewer, 60)
            .unwrap_err();
        assert!(matches!(
            err,
            BusError::Contract(ContractError::AlreadyClaimed { .. })
        ));
    }

    #[test]
    fn test_scout_may_not_claim() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let task = seed_task(&store);
        let manager = manager(&store);

        let err = manager.claim_task(task.task_id, AgentRole::Scout, 60).unwrap_err();
        assert!(matches!(err, BusError::Task(TaskError::CapabilityDenied { .. })));
    }

    #[test]
    fn test_zero_lease_is_rejected() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let task = seed_task(&store);
        let manager = manager(&store);

        for bad in [0, -5] {
            let err = manager.claim_task(task.task_id, AgentRole::Builder, bad).unwrap_err();
            assert!(matches!(err, BusError::Contract(ContractError::InvalidLease { .. })));
        }
    }

    #[test]
    fn test_oversized_lease_is_clamped() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let task = seed_task(&store);
        let manager = manager(&store);

        let lease = manager
            .claim_task(task.task_id, AgentRole::Builder, 1_000_000)
            .unwrap();
        let bound = Utc::now() + Duration::seconds(3600) + Duration::seconds(5);
        assert!(lease.expires_at() <= bound);
    }

    #[test]
    fn test_expired_claim_is_retired_and_reclaimed() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let task = seed_task(&store);
        let stale = seed_expired_claim(&store, task.task_id, AgentRole::Builder);
        let manager = manager(&store);

        let lease = manager.claim_task(task.task_id, AgentRole::Reviewer, 60).unwrap();
        assert_eq!(lease.agent_role(), AgentRole::Reviewer);

        let retired = store.contract_get(stale.contract_id).unwrap().unwrap();
        assert_eq!(retired.status, ContractStatus::Expired);

        let stored = store.task_get(task.task_id).unwrap().unwrap();
        assert_eq!(stored.retry_count, 1);
        assert_eq!(stored.status, TaskStatus::Assigned);
    }

    #[test]
    fn test_retry_ceiling_abandons_task() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let task = seed_task(&store);
        let manager = manager(&store);

        // Ceiling is 2: the first expiry reopens, the second abandons
        seed_expired_claim(&store, task.task_id, AgentRole::Builder);
        let _lease = manager.claim_task(task.task_id, AgentRole::Builder, 60).unwrap();
        store
            .transaction(&mut |tx| {
                let contracts = tx.contract_list_by_task(task.task_id)?;
                let live = contracts
                    .iter()
                    .find(|c| c.status == ContractStatus::Claimed)
                    .cloned()
                    .ok_or(TaskError::NotFound { task_id: task.task_id })?;
                tx.contract_update(
                    live.contract_id,
                    ContractUpdate {
                        expires_at: Some(Utc::now() - Duration::seconds(1)),
                        ..Default::default()
                    },
                )
            })
            .unwrap();

        let err = manager
            .claim_task(task.task_id, AgentRole::Reviewer, 60)
            .unwrap_err();
        assert!(matches!(err, BusError::Task(TaskError::NotClaimable { .. })));

        let stored = store.task_get(task.task_id).unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Abandoned);
        assert_eq!(stored.retry_count, 2);

        // Abandoned tasks stay unclaimable
        let err = manager.claim_task(task.task_id, AgentRole::Builder, 60).unwrap_err();
        assert!(matches!(err, BusError::Task(TaskError::NotClaimable { .. })));
    }

    #[test]
    fn test_release_reopens_task_without_penalty() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let task = seed_task(&store);
        let manager = manager(&store);

        let lease = manager.claim_task(task.task_id, AgentRole::Builder, 60).unwrap();
        let contract_id = lease.contract_id();
        manager.release_contract(lease).unwrap();

        let released = store.contract_get(contract_id).unwrap().unwrap();
        assert_eq!(released.status, ContractStatus::Released);

        let stored = store.task_get(task.task_id).unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Discovered);
        assert_eq!(stored.retry_count, 0);

        // Immediately reclaimable
        assert!(manager.claim_task(task.task_id, AgentRole::Reviewer, 60).is_ok());
    }

    #[test]
    fn test_complete_marks_task_done() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let task = seed_task(&store);
        let manager = manager(&store);

        let lease = manager.claim_task(task.task_id, AgentRole::Builder, 60).unwrap();
        let completed = manager
            .complete_contract(lease, serde_json::json!({"patch": "abc123"}))
            .unwrap();

        assert_eq!(completed.status, ContractStatus::Completed);
        assert_eq!(completed.result, Some(serde_json::json!({"patch": "abc123"})));

        let stored = store.task_get(task.task_id).unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Done);

        // Done tasks cannot be claimed again
        let err = manager.claim_task(task.task_id, AgentRole::Reviewer, 60).unwrap_err();
        assert!(matches!(err, BusError::Task(TaskError::NotClaimable { .. })));
    }

    #[test]
    fn test_late_completion_discards_result_and_reopens() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let task = seed_task(&store);
        let stale = seed_expired_claim(&store, task.task_id, AgentRole::Builder);
        let manager = manager(&store);

        // The holder still has a Lease handle for the now-expired contract
        let lease = Lease::new(stale.clone());
        let err = manager
            .complete_contract(lease, serde_json::json!({"late": true}))
            .unwrap_err();
        assert!(matches!(err, BusError::Contract(ContractError::LeaseExpired { .. })));

        let retired = store.contract_get(stale.contract_id).unwrap().unwrap();
        assert_eq!(retired.status, ContractStatus::Expired);
        assert_eq!(retired.result, None);

        let stored = store.task_get(task.task_id).unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Discovered);

        // A ResultDiscarded breadcrumb was left for the learning layer
        let crumbs = store
            .breadcrumb_query(&switchyard_core::BreadcrumbFilter {
                breadcrumb_type: Some(BreadcrumbType::ResultDiscarded),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(crumbs.len(), 1);

        // And a third agent can claim immediately
        assert!(manager.claim_task(task.task_id, AgentRole::Reviewer, 60).is_ok());
    }

    #[test]
    fn test_renew_extends_expiry() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let task = seed_task(&store);
        let manager = manager(&store);

        let lease = manager.claim_task(task.task_id, AgentRole::Builder, 60).unwrap();
        let before = lease.expires_at();
        let renewed = manager.renew_lease(lease, 120).unwrap();
        assert_eq!(renewed.expires_at(), before + Duration::seconds(120));

        let stored = store.contract_get(renewed.contract_id()).unwrap().unwrap();
        assert_eq!(stored.expires_at, renewed.expires_at());
    }

    #[test]
    fn test_renew_after_expiry_fails() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let task = seed_task(&store);
        let stale = seed_expired_claim(&store, task.task_id, AgentRole::Builder);
        let manager = manager(&store);

        let err = manager.renew_lease(Lease::new(stale), 60).unwrap_err();
        assert!(matches!(err, BusError::Contract(ContractError::LeaseExpired { .. })));
    }

    #[test]
    fn test_begin_work_marks_in_progress() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let task = seed_task(&store);
        let manager = manager(&store);

        let lease = manager.claim_task(task.task_id, AgentRole::Builder, 60).unwrap();
        manager.begin_work(&lease).unwrap();

        let stored = store.task_get(task.task_id).unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::InProgress);
    }

    #[test]
    fn test_claim_with_backoff_eventually_gives_up() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let task = seed_task(&store);
        let manager = manager(&store);

        let _held = manager.claim_task(task.task_id, AgentRole::Builder, 3600).unwrap();
        let err = manager
            .claim_with_backoff(task.task_id, AgentRole::Reviewer, 60)
            .unwrap_err();
        assert!(err.is_contention());
    }

    #[test]
    fn test_claim_records_breadcrumbs() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let task = seed_task(&store);
        let manager = manager(&store);

        let _lease = manager.claim_task(task.task_id, AgentRole::Builder, 60).unwrap();
        let _ = manager.claim_task(task.task_id, AgentRole::Reviewer, 60);

        let won = store
            .breadcrumb_query(&switchyard_core::BreadcrumbFilter {
                breadcrumb_type: Some(BreadcrumbType::ClaimWon),
                ..Default::default()
            })
            .unwrap();
        let lost = store
            .breadcrumb_query(&switchyard_core::BreadcrumbFilter {
                breadcrumb_type: Some(BreadcrumbType::ClaimLost),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(won.len(), 1);
        assert_eq!(lost.len(), 1);
    }
}
