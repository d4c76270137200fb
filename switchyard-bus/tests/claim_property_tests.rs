//! Property tests for the claim invariant.
//!
//! **Property: Mutual Exclusion**
//!
//! For any task, at any instant, at most one contract with
//! `status = Claimed` and `expires_at > now` exists, whatever sequence of
//! claims, renewals, releases, and completions agents throw at the bus, and
//! however many claim simultaneously.

use chrono::Utc;
use proptest::prelude::*;
use std::sync::{Arc, Barrier};
use std::thread;
use switchyard_bus::{
    AgentRole, BusError, ContractError, ContractManager, CoordinationBus, Held, Lease,
    TaskPriority,
};
use switchyard_core::EntityId;
use switchyard_store::{MemoryStore, Store};
use switchyard_test_utils::{
    claiming_role_strategy, init_test_logging, lease_seconds_strategy, test_config,
};

fn active_claims(store: &Arc<dyn Store>, task_id: EntityId) -> usize {
    let now = Utc::now();
    store
        .contract_list_by_task(task_id)
        .unwrap()
        .iter()
        .filter(|c| c.is_active_claim(now))
        .count()
}

// ============================================================================
// CONCURRENT RACE RESOLUTION
// ============================================================================

#[test]
fn exactly_one_of_two_simultaneous_claims_wins() {
    init_test_logging();
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let bus = CoordinationBus::new(Arc::clone(&store), test_config()).unwrap();
    let task = bus
        .discover_task("refactor-x", TaskPriority::High, AgentRole::Scout)
        .unwrap();

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = [AgentRole::Builder, AgentRole::Reviewer]
        .into_iter()
        .map(|role| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            let task_id = task.task_id;
            thread::spawn(move || {
                let bus = CoordinationBus::new(store, test_config()).unwrap();
                barrier.wait();
                bus.claim_task(task_id, role, 60)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let wins = results.iter().filter(|r| r.is_ok()).count();
    let losses = results
        .iter()
        .filter(|r| {
            matches!(
                r,
                Err(BusError::Contract(ContractError::AlreadyClaimed { .. }))
            )
        })
        .count();

    assert_eq!(wins, 1, "exactly one claim must win");
    assert_eq!(losses, 1, "the loser must get the explicit error");
    assert_eq!(active_claims(&store, task.task_id), 1);
}

#[test]
fn a_claim_stampede_produces_one_winner() {
    init_test_logging();
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let bus = CoordinationBus::new(Arc::clone(&store), test_config()).unwrap();
    let task = bus
        .discover_task("stampede target", TaskPriority::Critical, AgentRole::Scout)
        .unwrap();

    let contenders = 8;
    let barrier = Arc::new(Barrier::new(contenders));
    let handles: Vec<_> = (0..contenders)
        .map(|i| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            let task_id = task.task_id;
            thread::spawn(move || {
                let role = if i % 2 == 0 {
                    AgentRole::Builder
                } else {
                    AgentRole::Reviewer
                };
                let bus = CoordinationBus::new(store, test_config()).unwrap();
                barrier.wait();
                bus.claim_task(task_id, role, 60)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results.iter().all(|r| {
        r.is_ok()
            || matches!(
                r,
                Err(BusError::Contract(ContractError::AlreadyClaimed { .. }))
            )
    }));
    assert_eq!(active_claims(&store, task.task_id), 1);
}

// ============================================================================
// PROPERTY: INVARIANT UNDER ARBITRARY LIFECYCLES
// ============================================================================

#[derive(Debug, Clone)]
enum LifecycleOp {
    Claim { role: AgentRole, lease_seconds: i64 },
    Renew { extra_seconds: i64 },
    Release,
    Complete,
}

fn lifecycle_op_strategy() -> impl Strategy<Value = LifecycleOp> {
    prop_oneof![
        (claiming_role_strategy(), lease_seconds_strategy())
            .prop_map(|(role, lease_seconds)| LifecycleOp::Claim { role, lease_seconds }),
        (1i64..600).prop_map(|extra_seconds| LifecycleOp::Renew { extra_seconds }),
        Just(LifecycleOp::Release),
        Just(LifecycleOp::Complete),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn at_most_one_active_claim_under_any_lifecycle(
        ops in prop::collection::vec(lifecycle_op_strategy(), 1..40)
    ) {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let bus = CoordinationBus::new(Arc::clone(&store), test_config()).unwrap();
        let task = bus
            .discover_task("property target", TaskPriority::Normal, AgentRole::Scout)
            .unwrap();

        let manager = ContractManager::new(
            Arc::clone(&store),
            test_config(),
            switchyard_core::new_entity_id(),
        );

        let mut held: Option<Lease<Held>> = None;
        for op in ops {
            match op {
                LifecycleOp::Claim { role, lease_seconds } => {
                    match manager.claim_task(task.task_id, role, lease_seconds) {
                        Ok(lease) => {
                            // A second claim may only succeed once the first is gone
                            prop_assert!(held.is_none());
                            held = Some(lease);
                        }
                        Err(BusError::Contract(ContractError::AlreadyClaimed { .. })) => {
                            prop_assert!(held.is_some());
                        }
                        Err(BusError::Task(_)) => {
                            // Task finished or was abandoned earlier in the sequence
                            break;
                        }
                        Err(e) => return Err(TestCaseError::fail(format!("unexpected: {e}"))),
                    }
                }
                LifecycleOp::Renew { extra_seconds } => {
                    if let Some(lease) = held.take() {
                        match manager.renew_lease(lease, extra_seconds) {
                            Ok(renewed) => held = Some(renewed),
                            Err(BusError::Contract(ContractError::LeaseExpired { .. })) => {}
                            Err(e) => return Err(TestCaseError::fail(format!("unexpected: {e}"))),
                        }
                    }
                }
                LifecycleOp::Release => {
                    if let Some(lease) = held.take() {
                        manager.release_contract(lease).map_err(|e| {
                            TestCaseError::fail(format!("release failed: {e}"))
                        })?;
                    }
                }
                LifecycleOp::Complete => {
                    if let Some(lease) = held.take() {
                        match manager.complete_contract(lease, serde_json::json!({"done": true})) {
                            Ok(_) => break,
                            Err(BusError::Contract(ContractError::LeaseExpired { .. })) => {}
                            Err(e) => return Err(TestCaseError::fail(format!("unexpected: {e}"))),
                        }
                    }
                }
            }
            // The central invariant holds after every step
            prop_assert!(active_claims(&store, task.task_id) <= 1);
        }
        prop_assert!(active_claims(&store, task.task_id) <= 1);
    }

    #[test]
    fn claim_rejects_non_positive_leases(bad_lease in -3600i64..=0) {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let bus = CoordinationBus::new(Arc::clone(&store), test_config()).unwrap();
        let task = bus
            .discover_task("bad lease target", TaskPriority::Low, AgentRole::Scout)
            .unwrap();

        let result = bus.claim_task(task.task_id, AgentRole::Builder, bad_lease);
        let is_invalid_lease = matches!(
            result,
            Err(BusError::Contract(ContractError::InvalidLease { .. }))
        );
        prop_assert!(is_invalid_lease);
        prop_assert_eq!(active_claims(&store, task.task_id), 0);
    }

    #[test]
    fn clamped_leases_never_exceed_the_configured_maximum(
        lease_seconds in 1i64..10_000_000
    ) {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let bus = CoordinationBus::new(Arc::clone(&store), test_config()).unwrap();
        let task = bus
            .discover_task("clamp target", TaskPriority::Low, AgentRole::Scout)
            .unwrap();

        let lease = bus
            .claim_task(task.task_id, AgentRole::Builder, lease_seconds)
            .unwrap();
        let config = test_config();
        let ceiling = Utc::now() + chrono::Duration::seconds(config.max_lease_seconds + 5);
        prop_assert!(lease.expires_at() <= ceiling);
    }
}
