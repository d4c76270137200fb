//! Switchyard Test Utilities
//!
//! Centralized test infrastructure for the Switchyard workspace:
//! - An explicit test configuration (the library ships no defaults)
//! - Proptest generators for roles, priorities, leases, and descriptions
//! - A legacy flat-file corpus builder for migration tests
//! - Test logging setup

// Re-export the embedded store for convenience
pub use switchyard_store::MemoryStore;

// Re-export core types for convenience
pub use switchyard_core::{
    new_entity_id, AgentRole, AutonomousTask, Breadcrumb, BreadcrumbFilter, BreadcrumbType,
    BusConfig, BusError, BusResult, CollaborationSignal, Contract, ContractError, ContractStatus,
    CoordinationEvent, EntityId, EventFilter, EventType, Held, Lease, LeaseDefaults, RetryConfig,
    SignalKind, TaskPriority, TaskStatus,
};

use proptest::prelude::*;
use std::path::Path;
use std::sync::Once;
use std::time::Duration;

// ============================================================================
// TEST CONFIGURATION
// ============================================================================

/// Explicit configuration for tests. `BusConfig` has no `Default` on
/// purpose; every numeric policy here is a test decision, not a library one.
pub fn test_config() -> BusConfig {
    BusConfig {
        min_lease_seconds: 1,
        max_lease_seconds: 3600,
        abandon_retry_ceiling: 3,
        dedupe_window_seconds: 600,
        lease_defaults: LeaseDefaults {
            scout: 60,
            builder: 300,
            reviewer: 300,
            curator: 900,
        },
        claim_retry: RetryConfig {
            max_retries: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(8),
            backoff_multiplier: 2.0,
        },
    }
}

// ============================================================================
// TEST LOGGING
// ============================================================================

static INIT_LOGGING: Once = Once::new();

/// Initialize a tracing subscriber once per test binary. Honors `RUST_LOG`.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

// ============================================================================
// PROPTEST STRATEGIES
// ============================================================================

/// Strategy for generating agent roles.
pub fn role_strategy() -> impl Strategy<Value = AgentRole> {
    prop::sample::select(AgentRole::ALL.to_vec())
}

/// Strategy for roles whose profile allows claiming.
pub fn claiming_role_strategy() -> impl Strategy<Value = AgentRole> {
    prop::sample::select(
        AgentRole::ALL
            .into_iter()
            .filter(|r| r.profile().may_claim)
            .collect::<Vec<_>>(),
    )
}

/// Strategy for generating task priorities.
pub fn priority_strategy() -> impl Strategy<Value = TaskPriority> {
    prop::sample::select(vec![
        TaskPriority::Low,
        TaskPriority::Normal,
        TaskPriority::High,
        TaskPriority::Critical,
    ])
}

/// Strategy for generating signal kinds.
pub fn signal_kind_strategy() -> impl Strategy<Value = SignalKind> {
    prop::sample::select(vec![SignalKind::Available, SignalKind::Busy, SignalKind::Idle])
}

/// Strategy for lease durations inside the test configuration's bounds.
pub fn lease_seconds_strategy() -> impl Strategy<Value = i64> {
    1i64..3600
}

/// Strategy for plausible task descriptions.
pub fn description_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z]{4,12} the [a-z]{4,12}",
        "fix [a-z]{4,12} in [a-z]{4,12}",
        "review [a-z]{4,12}",
    ]
}

// ============================================================================
// LEGACY CORPUS BUILDER
// ============================================================================

/// Shape of a generated legacy flat-file corpus.
#[derive(Debug, Clone, Copy)]
pub struct CorpusShape {
    pub breadcrumb_sessions: usize,
    pub breadcrumbs_per_session: usize,
    pub events: usize,
    pub signals: usize,
    pub tasks: usize,
    pub contracts: usize,
}

impl CorpusShape {
    /// Total breadcrumb records the corpus holds.
    pub fn breadcrumb_records(&self) -> usize {
        self.breadcrumb_sessions * self.breadcrumbs_per_session
    }
}

fn role_str(i: usize) -> &'static str {
    // Legacy files stored lowercase role strings
    match AgentRole::ALL[i % AgentRole::ALL.len()] {
        AgentRole::Scout => "scout",
        AgentRole::Builder => "builder",
        AgentRole::Reviewer => "reviewer",
        AgentRole::Curator => "curator",
    }
}

fn legacy_timestamp(i: usize) -> String {
    let base = chrono::DateTime::parse_from_rfc3339("2025-10-01T00:00:00Z")
        .expect("valid base timestamp")
        .with_timezone(&chrono::Utc);
    (base + chrono::Duration::seconds(i as i64 * 37)).to_rfc3339()
}

/// Write a legacy flat-file corpus with the given shape into `dir`,
/// using the snake_case encodings the old flat files carried.
///
/// The generated records are well-formed; migration tests that need
/// malformed records inject them on top of this corpus.
pub fn write_legacy_corpus(dir: &Path, shape: &CorpusShape) {
    let sessions: Vec<String> = (0..shape.breadcrumb_sessions)
        .map(|_| uuid::Uuid::now_v7().to_string())
        .collect();

    let breadcrumbs: Vec<serde_json::Value> = (0..shape.breadcrumb_records())
        .map(|i| {
            serde_json::json!({
                "id": uuid::Uuid::now_v7().to_string(),
                "agent_role": role_str(i),
                "session_id": sessions[i % sessions.len().max(1)],
                "breadcrumb_type": (["observation", "claim_won", "action_completed"][i % 3]),
                "timestamp": legacy_timestamp(i),
                "metadata": {"step": i}
            })
        })
        .collect();

    let events: Vec<serde_json::Value> = (0..shape.events)
        .map(|i| {
            serde_json::json!({
                "id": uuid::Uuid::now_v7().to_string(),
                "event_type": (["work_request", "handshake_complete", "status_update"][i % 3]),
                "source_agent_role": role_str(i),
                "target_agent_role": if i % 2 == 0 { serde_json::Value::Null } else {
                    serde_json::Value::String(role_str(i + 1).to_string())
                },
                "payload": {"seq": i},
                "timestamp": legacy_timestamp(i)
            })
        })
        .collect();

    // Distinct (agent_role, scope) pairs so the upsert key keeps every record
    let signals: Vec<serde_json::Value> = (0..shape.signals)
        .map(|i| {
            serde_json::json!({
                "agent_role": role_str(i),
                "scope": format!("scope-{}", i / AgentRole::ALL.len()),
                "signal_type": (["available", "busy", "idle"][i % 3]),
                "ttl_seconds": 30 + (i as i64 % 90),
                "published_at": legacy_timestamp(i)
            })
        })
        .collect();

    let task_ids: Vec<String> = (0..shape.tasks)
        .map(|_| uuid::Uuid::now_v7().to_string())
        .collect();
    let tasks: Vec<serde_json::Value> = task_ids
        .iter()
        .enumerate()
        .map(|(i, task_id)| {
            serde_json::json!({
                "task_id": task_id,
                "description": format!("legacy task number {}", i),
                "discovered_by": (["scout", "curator"][i % 2]),
                "priority": (["low", "normal", "high", "critical"][i % 4]),
                "status": "discovered",
                "created_at": legacy_timestamp(i)
            })
        })
        .collect();

    let contracts: Vec<serde_json::Value> = (0..shape.contracts)
        .map(|i| {
            serde_json::json!({
                "contract_id": uuid::Uuid::now_v7().to_string(),
                "task_id": task_ids[i % task_ids.len().max(1)],
                "agent_role": "builder",
                "status": (["completed", "released"][i % 2]),
                "created_at": legacy_timestamp(i),
                "expires_at": legacy_timestamp(i + 10),
                "result": if i % 2 == 0 { serde_json::json!({"ok": true}) } else { serde_json::Value::Null }
            })
        })
        .collect();

    let write = |file: &str, records: Vec<serde_json::Value>| {
        std::fs::write(
            dir.join(file),
            serde_json::to_string_pretty(&serde_json::Value::Array(records))
                .expect("corpus serializes"),
        )
        .expect("corpus file writes");
    };
    write(switchyard_store::migrate::LEGACY_BREADCRUMBS, breadcrumbs);
    write(switchyard_store::migrate::LEGACY_EVENTS, events);
    write(switchyard_store::migrate::LEGACY_SIGNALS, signals);
    write(switchyard_store::migrate::LEGACY_TASKS, tasks);
    write(switchyard_store::migrate::LEGACY_CONTRACTS, contracts);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_is_valid() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_corpus_shape_counts() {
        let shape = CorpusShape {
            breadcrumb_sessions: 8,
            breadcrumbs_per_session: 3,
            events: 13,
            signals: 74,
            tasks: 10,
            contracts: 2,
        };
        assert_eq!(shape.breadcrumb_records(), 24);
    }
}
