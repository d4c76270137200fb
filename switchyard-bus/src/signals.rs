//! Collaboration signal bus: ephemeral availability broadcasts.
//!
//! Signals are last-write-wins per `(agent_role, scope)` and expire by TTL.
//! Expired rows are filtered at query time; nothing depends on when (or
//! whether) they are physically deleted. Signals are advisory only and are
//! never consulted for mutual exclusion.

use chrono::Utc;
use std::sync::Arc;
use switchyard_core::{AgentRole, BusResult, CollaborationSignal, SignalError, SignalKind};
use switchyard_store::Store;
use tracing::debug;

/// TTL-scoped availability broadcast over the store.
pub struct SignalBus {
    store: Arc<dyn Store>,
}

impl SignalBus {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Publish (or overwrite) this role's signal for a scope.
    pub fn publish_signal(
        &self,
        agent_role: AgentRole,
        scope: &str,
        signal_kind: SignalKind,
        ttl_seconds: i64,
    ) -> BusResult<CollaborationSignal> {
        if ttl_seconds <= 0 {
            return Err(SignalError::InvalidTtl { ttl_seconds }.into());
        }
        let signal = CollaborationSignal::new(agent_role, scope, signal_kind, ttl_seconds);
        self.store.signal_upsert(&signal)?;
        debug!(role = %agent_role, scope, kind = %signal_kind, ttl_seconds, "signal published");
        Ok(signal)
    }

    /// All signals for a scope that are still live right now.
    pub fn query_active_signals(&self, scope: &str) -> BusResult<Vec<CollaborationSignal>> {
        let now = Utc::now();
        let signals = self.store.signal_list_by_scope(scope)?;
        Ok(signals.into_iter().filter(|s| s.is_active(now)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::BusError;
    use switchyard_store::MemoryStore;

    fn bus() -> SignalBus {
        SignalBus::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_publish_and_query() {
        let bus = bus();
        bus.publish_signal(AgentRole::Builder, "idle", SignalKind::Available, 30)
            .unwrap();

        let active = bus.query_active_signals("idle").unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].agent_role, AgentRole::Builder);
    }

    #[test]
    fn test_republish_overwrites() {
        let bus = bus();
        bus.publish_signal(AgentRole::Builder, "idle", SignalKind::Available, 30)
            .unwrap();
        bus.publish_signal(AgentRole::Builder, "idle", SignalKind::Busy, 30)
            .unwrap();

        let active = bus.query_active_signals("idle").unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].signal_kind, SignalKind::Busy);
    }

    #[test]
    fn test_distinct_roles_coexist_in_scope() {
        let bus = bus();
        bus.publish_signal(AgentRole::Builder, "idle", SignalKind::Available, 30)
            .unwrap();
        bus.publish_signal(AgentRole::Reviewer, "idle", SignalKind::Idle, 30)
            .unwrap();

        assert_eq!(bus.query_active_signals("idle").unwrap().len(), 2);
    }

    #[test]
    fn test_scopes_are_isolated() {
        let bus = bus();
        bus.publish_signal(AgentRole::Builder, "idle", SignalKind::Available, 30)
            .unwrap();

        assert!(bus.query_active_signals("review").unwrap().is_empty());
    }

    #[test]
    fn test_non_positive_ttl_is_rejected() {
        let bus = bus();
        for ttl in [0, -1] {
            let err = bus
                .publish_signal(AgentRole::Builder, "idle", SignalKind::Available, ttl)
                .unwrap_err();
            assert!(matches!(err, BusError::Signal(SignalError::InvalidTtl { .. })));
        }
    }
}
