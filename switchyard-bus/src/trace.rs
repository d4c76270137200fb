//! Breadcrumb recorder and coordination event log.
//!
//! Both are pure appends over the store: no read-modify-write, no conflicts
//! across agents, and the only failure mode is the store itself being
//! unavailable. The query side serves the (out-of-scope) learning and
//! analytics layer.

use std::sync::Arc;
use switchyard_core::{
    AgentRole, Breadcrumb, BreadcrumbFilter, BreadcrumbType, BusResult, CoordinationEvent,
    EntityId, EventFilter, EventType,
};
use switchyard_store::Store;
use tracing::debug;

// ============================================================================
// BREADCRUMB RECORDER
// ============================================================================

/// Append-only execution trace writer/reader, bound to one agent session.
pub struct BreadcrumbRecorder {
    store: Arc<dyn Store>,
    session_id: EntityId,
}

impl BreadcrumbRecorder {
    pub fn new(store: Arc<dyn Store>, session_id: EntityId) -> Self {
        Self { store, session_id }
    }

    /// The session every recorded breadcrumb is attributed to.
    pub fn session_id(&self) -> EntityId {
        self.session_id
    }

    /// Append one breadcrumb for this session.
    pub fn record_breadcrumb(
        &self,
        agent_role: AgentRole,
        breadcrumb_type: BreadcrumbType,
        metadata: serde_json::Value,
    ) -> BusResult<Breadcrumb> {
        let crumb =
            Breadcrumb::new(agent_role, self.session_id, breadcrumb_type).with_metadata(metadata);
        self.store.breadcrumb_insert(&crumb)?;
        debug!(role = %agent_role, breadcrumb_type = %breadcrumb_type, "breadcrumb recorded");
        Ok(crumb)
    }

    /// Query breadcrumbs across all sessions.
    pub fn query_breadcrumbs(&self, filter: &BreadcrumbFilter) -> BusResult<Vec<Breadcrumb>> {
        self.store.breadcrumb_query(filter)
    }
}

// ============================================================================
// COORDINATION EVENT LOG
// ============================================================================

/// Append-only inter-agent message/event writer/reader.
pub struct EventLog {
    store: Arc<dyn Store>,
}

impl EventLog {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Append one cross-agent event.
    pub fn record_event(
        &self,
        event_type: EventType,
        source_role: AgentRole,
        target_role: Option<AgentRole>,
        payload: serde_json::Value,
    ) -> BusResult<CoordinationEvent> {
        let event = match target_role {
            Some(target) => CoordinationEvent::to_role(event_type, source_role, target),
            None => CoordinationEvent::broadcast(event_type, source_role),
        }
        .with_payload(payload);
        self.store.event_insert(&event)?;
        debug!(event_type = %event_type, source = %source_role, "coordination event recorded");
        Ok(event)
    }

    /// Query events.
    pub fn query_events(&self, filter: &EventFilter) -> BusResult<Vec<CoordinationEvent>> {
        self.store.event_query(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::new_entity_id;
    use switchyard_store::MemoryStore;

    #[test]
    fn test_breadcrumbs_are_appended_unmutated() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let recorder = BreadcrumbRecorder::new(Arc::clone(&store), new_entity_id());

        let mut written = Vec::new();
        for i in 0..4 {
            let crumb = recorder
                .record_breadcrumb(
                    AgentRole::Builder,
                    BreadcrumbType::Observation,
                    serde_json::json!({"step": i}),
                )
                .unwrap();
            written.push(crumb);
        }

        let read_back = recorder.query_breadcrumbs(&BreadcrumbFilter::default()).unwrap();
        assert_eq!(read_back, written);
    }

    #[test]
    fn test_breadcrumb_session_scoping() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let first = BreadcrumbRecorder::new(Arc::clone(&store), new_entity_id());
        let second = BreadcrumbRecorder::new(Arc::clone(&store), new_entity_id());

        first
            .record_breadcrumb(AgentRole::Scout, BreadcrumbType::Observation, serde_json::Value::Null)
            .unwrap();
        second
            .record_breadcrumb(AgentRole::Scout, BreadcrumbType::Observation, serde_json::Value::Null)
            .unwrap();

        let filter = BreadcrumbFilter {
            session_id: Some(first.session_id()),
            ..Default::default()
        };
        let scoped = first.query_breadcrumbs(&filter).unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].session_id, first.session_id());
    }

    #[test]
    fn test_event_targeting_roundtrip() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let log = EventLog::new(Arc::clone(&store));

        log.record_event(
            EventType::WorkRequest,
            AgentRole::Scout,
            Some(AgentRole::Builder),
            serde_json::json!({"task": "refactor-x"}),
        )
        .unwrap();
        log.record_event(
            EventType::HandshakeComplete,
            AgentRole::Builder,
            None,
            serde_json::Value::Null,
        )
        .unwrap();

        let targeted = log
            .query_events(&EventFilter {
                target_role: Some(AgentRole::Builder),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(targeted.len(), 1);
        assert_eq!(targeted[0].event_type, EventType::WorkRequest);

        let all = log.query_events(&EventFilter::default()).unwrap();
        assert_eq!(all.len(), 2);
    }
}
