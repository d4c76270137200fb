//! Embedded in-process store adapter.
//!
//! Collections live behind one mutex. A transaction takes the lock, runs the
//! closure against a snapshot clone, and swaps the snapshot in only on
//! success, so a failed transaction leaves no partial writes. Holding the
//! lock for the whole transaction serializes conflicting claims, which is
//! the same guarantee the networked adapter gets from row locks.

use crate::{ContractUpdate, Store, StoreTx, TaskUpdate};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use switchyard_core::{
    AgentRole, AutonomousTask, Breadcrumb, BreadcrumbFilter, BusResult, CollaborationSignal,
    Contract, ContractStatus, CoordinationEvent, EntityId, EventFilter, StoreError, TaskStatus,
    Timestamp,
};

#[derive(Debug, Clone, Default)]
struct Collections {
    breadcrumbs: Vec<Breadcrumb>,
    events: Vec<CoordinationEvent>,
    signals: HashMap<(AgentRole, String), CollaborationSignal>,
    tasks: HashMap<EntityId, AutonomousTask>,
    contracts: HashMap<EntityId, Contract>,
}

/// Embedded store adapter for tests and single-process deployments.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Collections>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> BusResult<MutexGuard<'_, Collections>> {
        self.inner.lock().map_err(|_| {
            StoreError::Unavailable {
                reason: "store mutex poisoned".to_string(),
            }
            .into()
        })
    }

    /// Clear all stored data.
    pub fn clear(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            *guard = Collections::default();
        }
    }

    /// Get count of stored breadcrumbs.
    pub fn breadcrumb_count(&self) -> usize {
        self.inner.lock().map(|g| g.breadcrumbs.len()).unwrap_or(0)
    }

    /// Get count of stored events.
    pub fn event_count(&self) -> usize {
        self.inner.lock().map(|g| g.events.len()).unwrap_or(0)
    }

    /// Get count of stored signals (live and expired).
    pub fn signal_count(&self) -> usize {
        self.inner.lock().map(|g| g.signals.len()).unwrap_or(0)
    }

    /// Get count of stored tasks.
    pub fn task_count(&self) -> usize {
        self.inner.lock().map(|g| g.tasks.len()).unwrap_or(0)
    }

    /// Get count of stored contracts.
    pub fn contract_count(&self) -> usize {
        self.inner.lock().map(|g| g.contracts.len()).unwrap_or(0)
    }
}

// ============================================================================
// TRANSACTION SNAPSHOT
// ============================================================================

struct MemoryTx<'a> {
    snapshot: &'a mut Collections,
}

impl StoreTx for MemoryTx<'_> {
    fn task_get(&mut self, task_id: EntityId) -> BusResult<Option<AutonomousTask>> {
        Ok(self.snapshot.tasks.get(&task_id).cloned())
    }

    fn task_insert(&mut self, task: &AutonomousTask) -> BusResult<()> {
        if self.snapshot.tasks.contains_key(&task.task_id) {
            return Err(StoreError::DuplicateKey {
                collection: "autonomous_tasks",
                key: task.task_id.to_string(),
            }
            .into());
        }
        self.snapshot.tasks.insert(task.task_id, task.clone());
        Ok(())
    }

    fn task_update(&mut self, task_id: EntityId, update: TaskUpdate) -> BusResult<()> {
        let task = self.snapshot.tasks.get_mut(&task_id).ok_or(StoreError::NotFound {
            collection: "autonomous_tasks",
            id: task_id,
        })?;
        if let Some(status) = update.status {
            task.status = status;
        }
        if let Some(retry_count) = update.retry_count {
            task.retry_count = retry_count;
        }
        Ok(())
    }

    fn task_find_recent_by_dedupe(
        &mut self,
        dedupe_hash: &str,
        since: Timestamp,
    ) -> BusResult<Option<AutonomousTask>> {
        Ok(self
            .snapshot
            .tasks
            .values()
            .filter(|t| t.dedupe_hash == dedupe_hash && t.created_at >= since)
            .max_by_key(|t| t.created_at)
            .cloned())
    }

    fn contract_get(&mut self, contract_id: EntityId) -> BusResult<Option<Contract>> {
        Ok(self.snapshot.contracts.get(&contract_id).cloned())
    }

    fn contract_list_by_task(&mut self, task_id: EntityId) -> BusResult<Vec<Contract>> {
        let mut contracts: Vec<Contract> = self
            .snapshot
            .contracts
            .values()
            .filter(|c| c.task_id == task_id)
            .cloned()
            .collect();
        contracts.sort_by_key(|c| c.created_at);
        Ok(contracts)
    }

    fn contract_insert_claimed(&mut self, contract: &Contract) -> BusResult<()> {
        // Uniqueness key: (task_id, status = Claimed)
        let conflicting = self
            .snapshot
            .contracts
            .values()
            .any(|c| c.task_id == contract.task_id && c.status == ContractStatus::Claimed);
        if conflicting {
            return Err(StoreError::DuplicateKey {
                collection: "contracts",
                key: format!("{}:Claimed", contract.task_id),
            }
            .into());
        }
        self.snapshot.contracts.insert(contract.contract_id, contract.clone());
        Ok(())
    }

    fn contract_insert_plain(&mut self, contract: &Contract) -> BusResult<()> {
        if self.snapshot.contracts.contains_key(&contract.contract_id) {
            return Err(StoreError::DuplicateKey {
                collection: "contracts",
                key: contract.contract_id.to_string(),
            }
            .into());
        }
        self.snapshot.contracts.insert(contract.contract_id, contract.clone());
        Ok(())
    }

    fn contract_update(&mut self, contract_id: EntityId, update: ContractUpdate) -> BusResult<()> {
        let contract = self
            .snapshot
            .contracts
            .get_mut(&contract_id)
            .ok_or(StoreError::NotFound {
                collection: "contracts",
                id: contract_id,
            })?;
        if let Some(status) = update.status {
            contract.status = status;
        }
        if let Some(expires_at) = update.expires_at {
            contract.expires_at = expires_at;
        }
        if let Some(result) = update.result {
            contract.result = Some(result);
        }
        Ok(())
    }
}

// ============================================================================
// STORE IMPLEMENTATION
// ============================================================================

impl Store for MemoryStore {
    fn transaction(
        &self,
        f: &mut dyn FnMut(&mut dyn StoreTx) -> BusResult<()>,
    ) -> BusResult<()> {
        let mut guard = self.lock()?;
        let mut snapshot = guard.clone();
        let mut tx = MemoryTx {
            snapshot: &mut snapshot,
        };
        f(&mut tx)?;
        *guard = snapshot;
        Ok(())
    }

    fn breadcrumb_insert(&self, crumb: &Breadcrumb) -> BusResult<()> {
        self.lock()?.breadcrumbs.push(crumb.clone());
        Ok(())
    }

    fn breadcrumb_query(&self, filter: &BreadcrumbFilter) -> BusResult<Vec<Breadcrumb>> {
        let guard = self.lock()?;
        let matched = guard.breadcrumbs.iter().filter(|c| filter.matches(c)).cloned();
        Ok(match filter.limit {
            Some(limit) => matched.take(limit).collect(),
            None => matched.collect(),
        })
    }

    fn event_insert(&self, event: &CoordinationEvent) -> BusResult<()> {
        self.lock()?.events.push(event.clone());
        Ok(())
    }

    fn event_query(&self, filter: &EventFilter) -> BusResult<Vec<CoordinationEvent>> {
        let guard = self.lock()?;
        let matched = guard.events.iter().filter(|e| filter.matches(e)).cloned();
        Ok(match filter.limit {
            Some(limit) => matched.take(limit).collect(),
            None => matched.collect(),
        })
    }

    fn signal_upsert(&self, signal: &CollaborationSignal) -> BusResult<()> {
        self.lock()?
            .signals
            .insert((signal.agent_role, signal.scope.clone()), signal.clone());
        Ok(())
    }

    fn signal_list_by_scope(&self, scope: &str) -> BusResult<Vec<CollaborationSignal>> {
        let guard = self.lock()?;
        let mut signals: Vec<CollaborationSignal> = guard
            .signals
            .values()
            .filter(|s| s.scope == scope)
            .cloned()
            .collect();
        signals.sort_by_key(|s| s.published_at);
        Ok(signals)
    }

    fn task_get(&self, task_id: EntityId) -> BusResult<Option<AutonomousTask>> {
        Ok(self.lock()?.tasks.get(&task_id).cloned())
    }

    fn task_list_by_status(&self, status: TaskStatus) -> BusResult<Vec<AutonomousTask>> {
        let guard = self.lock()?;
        Ok(guard.tasks.values().filter(|t| t.status == status).cloned().collect())
    }

    fn contract_get(&self, contract_id: EntityId) -> BusResult<Option<Contract>> {
        Ok(self.lock()?.contracts.get(&contract_id).cloned())
    }

    fn contract_list_by_task(&self, task_id: EntityId) -> BusResult<Vec<Contract>> {
        let guard = self.lock()?;
        let mut contracts: Vec<Contract> = guard
            .contracts
            .values()
            .filter(|c| c.task_id == task_id)
            .cloned()
            .collect();
        contracts.sort_by_key(|c| c.created_at);
        Ok(contracts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::{BreadcrumbType, BusError, SignalKind, TaskPriority};

    fn sample_task() -> AutonomousTask {
        AutonomousTask::discover("migrate flat files", TaskPriority::Normal, AgentRole::Scout)
    }

    #[test]
    fn test_transaction_commits_on_ok() {
        let store = MemoryStore::new();
        let task = sample_task();

        store
            .transaction(&mut |tx| tx.task_insert(&task))
            .unwrap();

        assert_eq!(store.task_count(), 1);
        assert_eq!(store.task_get(task.task_id).unwrap().unwrap().task_id, task.task_id);
    }

    #[test]
    fn test_transaction_rolls_back_on_err() {
        let store = MemoryStore::new();
        let task = sample_task();

        let result = store.transaction(&mut |tx| {
            tx.task_insert(&task)?;
            Err(StoreError::TransactionFailed {
                reason: "forced".to_string(),
            }
            .into())
        });

        assert!(result.is_err());
        assert_eq!(store.task_count(), 0);
    }

    #[test]
    fn test_transaction_reads_its_own_writes() {
        let store = MemoryStore::new();
        let task = sample_task();

        store
            .transaction(&mut |tx| {
                tx.task_insert(&task)?;
                let read_back = tx.task_get(task.task_id)?;
                assert!(read_back.is_some());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_contract_insert_claimed_conflicts() {
        let store = MemoryStore::new();
        let task = sample_task();
        let first = Contract::claim(task.task_id, AgentRole::Builder, 60);
        let second = Contract::claim(task.task_id, AgentRole::Reviewer, 60);

        store
            .transaction(&mut |tx| {
                tx.task_insert(&task)?;
                tx.contract_insert_claimed(&first)
            })
            .unwrap();

        let result = store.transaction(&mut |tx| tx.contract_insert_claimed(&second));
        assert!(matches!(
            result,
            Err(BusError::Store(StoreError::DuplicateKey { collection: "contracts", .. }))
        ));
        assert_eq!(store.contract_count(), 1);
    }

    #[test]
    fn test_contract_insert_allowed_after_status_rewrite() {
        let store = MemoryStore::new();
        let task = sample_task();
        let first = Contract::claim(task.task_id, AgentRole::Builder, 60);
        let second = Contract::claim(task.task_id, AgentRole::Reviewer, 60);

        store
            .transaction(&mut |tx| {
                tx.task_insert(&task)?;
                tx.contract_insert_claimed(&first)
            })
            .unwrap();

        store
            .transaction(&mut |tx| {
                tx.contract_update(
                    first.contract_id,
                    ContractUpdate {
                        status: Some(ContractStatus::Expired),
                        ..Default::default()
                    },
                )?;
                tx.contract_insert_claimed(&second)
            })
            .unwrap();

        assert_eq!(store.contract_count(), 2);
    }

    #[test]
    fn test_signal_upsert_is_last_write_wins() {
        let store = MemoryStore::new();
        let first = CollaborationSignal::new(AgentRole::Builder, "idle", SignalKind::Available, 5);
        let second = CollaborationSignal::new(AgentRole::Builder, "idle", SignalKind::Busy, 10);

        store.signal_upsert(&first).unwrap();
        store.signal_upsert(&second).unwrap();

        let signals = store.signal_list_by_scope("idle").unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].signal_kind, SignalKind::Busy);
    }

    #[test]
    fn test_breadcrumbs_append_in_order() {
        let store = MemoryStore::new();
        let session = switchyard_core::new_entity_id();
        for _ in 0..3 {
            let crumb = Breadcrumb::new(AgentRole::Builder, session, BreadcrumbType::Observation);
            store.breadcrumb_insert(&crumb).unwrap();
        }

        let crumbs = store.breadcrumb_query(&BreadcrumbFilter::default()).unwrap();
        assert_eq!(crumbs.len(), 3);
        assert!(crumbs.windows(2).all(|w| w[0].recorded_at <= w[1].recorded_at));
    }

    #[test]
    fn test_query_limit() {
        let store = MemoryStore::new();
        let session = switchyard_core::new_entity_id();
        for _ in 0..5 {
            let crumb = Breadcrumb::new(AgentRole::Scout, session, BreadcrumbType::Observation);
            store.breadcrumb_insert(&crumb).unwrap();
        }

        let filter = BreadcrumbFilter {
            limit: Some(2),
            ..Default::default()
        };
        assert_eq!(store.breadcrumb_query(&filter).unwrap().len(), 2);
    }

    #[test]
    fn test_dedupe_lookup_honors_window() {
        let store = MemoryStore::new();
        let task = sample_task();
        store.transaction(&mut |tx| tx.task_insert(&task)).unwrap();

        store
            .transaction(&mut |tx| {
                let hit = tx.task_find_recent_by_dedupe(&task.dedupe_hash, task.created_at)?;
                assert!(hit.is_some());
                let miss = tx.task_find_recent_by_dedupe(
                    &task.dedupe_hash,
                    task.created_at + chrono::Duration::seconds(1),
                )?;
                assert!(miss.is_none());
                Ok(())
            })
            .unwrap();
    }
}
