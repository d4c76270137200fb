//! One-time importer for the legacy flat-file corpus.
//!
//! The earlier design kept one JSON array per concern on disk. This module
//! reads those arrays and replays every record into the store. A malformed
//! record is skipped and counted in the reconciliation report, never
//! silently dropped; the acceptance criterion is record-count fidelity
//! between the legacy corpus and the imported collections.

use crate::{Store, StoreTx};
use std::fmt;
use std::path::Path;
use switchyard_core::{
    AgentRole, AutonomousTask, Breadcrumb, BreadcrumbType, BusResult, CollaborationSignal,
    Contract, ContractStatus, CoordinationEvent, EventType, MigrationError, SignalKind,
    TaskPriority, TaskStatus, Timestamp,
};
use tracing::warn;

/// Legacy corpus file names, one JSON array per collection.
pub const LEGACY_BREADCRUMBS: &str = "breadcrumbs.json";
pub const LEGACY_EVENTS: &str = "coordination_events.json";
pub const LEGACY_SIGNALS: &str = "collaboration_signals.json";
pub const LEGACY_TASKS: &str = "autonomous_tasks.json";
pub const LEGACY_CONTRACTS: &str = "contracts.json";

// ============================================================================
// RECONCILIATION REPORT
// ============================================================================

/// Outcome of a legacy corpus import.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MigrationReport {
    pub breadcrumbs_imported: usize,
    pub events_imported: usize,
    pub signals_imported: usize,
    pub tasks_imported: usize,
    pub contracts_imported: usize,
    /// Every skipped record, with its collection, index, and reason.
    pub skipped: Vec<MigrationError>,
}

impl MigrationReport {
    /// Total records imported across all collections.
    pub fn total_imported(&self) -> usize {
        self.breadcrumbs_imported
            + self.events_imported
            + self.signals_imported
            + self.tasks_imported
            + self.contracts_imported
    }

    /// Whether every legacy record made it across.
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }
}

impl fmt::Display for MigrationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "imported {} records ({} breadcrumbs, {} events, {} signals, {} tasks, {} contracts), {} skipped",
            self.total_imported(),
            self.breadcrumbs_imported,
            self.events_imported,
            self.signals_imported,
            self.tasks_imported,
            self.contracts_imported,
            self.skipped.len()
        )
    }
}

// ============================================================================
// LENIENT FIELD EXTRACTION
// ============================================================================

fn malformed(
    collection: &'static str,
    index: usize,
    reason: impl Into<String>,
) -> MigrationError {
    MigrationError::MalformedRecord {
        collection,
        index,
        reason: reason.into(),
    }
}

fn get_str<'a>(
    record: &'a serde_json::Value,
    keys: &[&str],
    collection: &'static str,
    index: usize,
) -> Result<&'a str, MigrationError> {
    keys.iter()
        .find_map(|k| record.get(k).and_then(|v| v.as_str()))
        .ok_or_else(|| malformed(collection, index, format!("missing field {:?}", keys[0])))
}

fn get_id(
    record: &serde_json::Value,
    keys: &[&str],
) -> switchyard_core::EntityId {
    keys.iter()
        .find_map(|k| record.get(k).and_then(|v| v.as_str()))
        .and_then(|s| uuid::Uuid::parse_str(s).ok())
        // Legacy ids were not always UUIDs; records keep their identity
        // through position, ids are opaque
        .unwrap_or_else(switchyard_core::new_entity_id)
}

fn get_timestamp(
    record: &serde_json::Value,
    keys: &[&str],
    collection: &'static str,
    index: usize,
) -> Result<Timestamp, MigrationError> {
    for key in keys {
        match record.get(key) {
            Some(serde_json::Value::String(s)) => {
                return chrono::DateTime::parse_from_rfc3339(s)
                    .map(|dt| dt.with_timezone(&chrono::Utc))
                    .map_err(|e| malformed(collection, index, format!("bad timestamp {}: {}", key, e)));
            }
            Some(serde_json::Value::Number(n)) => {
                let secs = n
                    .as_i64()
                    .or_else(|| n.as_f64().map(|f| f as i64))
                    .ok_or_else(|| malformed(collection, index, format!("bad timestamp {}", key)))?;
                return chrono::DateTime::from_timestamp(secs, 0)
                    .ok_or_else(|| malformed(collection, index, format!("bad epoch {}", key)));
            }
            _ => continue,
        }
    }
    Err(malformed(collection, index, format!("missing timestamp {:?}", keys[0])))
}

fn get_role(
    record: &serde_json::Value,
    keys: &[&str],
    collection: &'static str,
    index: usize,
) -> Result<AgentRole, MigrationError> {
    let s = get_str(record, keys, collection, index)?;
    AgentRole::from_db_str(s).map_err(|e| malformed(collection, index, e.to_string()))
}

/// Legacy enum strings were snake_case; convert to the PascalCase codec form.
fn pascal_case(s: &str) -> String {
    s.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

// ============================================================================
// PER-COLLECTION RECORD PARSERS
// ============================================================================

fn parse_breadcrumb(record: &serde_json::Value, index: usize) -> Result<Breadcrumb, MigrationError> {
    const C: &str = "breadcrumbs";
    let type_str = get_str(record, &["breadcrumb_type", "type"], C, index)?;
    let breadcrumb_type = BreadcrumbType::from_db_str(type_str)
        .or_else(|_| BreadcrumbType::from_db_str(&pascal_case(type_str)))
        .map_err(|e| malformed(C, index, e.to_string()))?;
    Ok(Breadcrumb {
        breadcrumb_id: get_id(record, &["id", "breadcrumb_id"]),
        agent_role: get_role(record, &["agent_role"], C, index)?,
        session_id: record
            .get("session_id")
            .and_then(|v| v.as_str())
            .and_then(|s| uuid::Uuid::parse_str(s).ok())
            .ok_or_else(|| malformed(C, index, "missing session_id"))?,
        breadcrumb_type,
        recorded_at: get_timestamp(record, &["timestamp", "recorded_at"], C, index)?,
        metadata: record.get("metadata").cloned().unwrap_or(serde_json::Value::Null),
    })
}

fn parse_event(record: &serde_json::Value, index: usize) -> Result<CoordinationEvent, MigrationError> {
    const C: &str = "coordination_events";
    let type_str = get_str(record, &["event_type", "type"], C, index)?;
    let event_type = EventType::from_db_str(type_str)
        .or_else(|_| EventType::from_db_str(&pascal_case(type_str)))
        .map_err(|e| malformed(C, index, e.to_string()))?;
    let target_role = match record.get("target_agent_role").or_else(|| record.get("target_role")) {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(
            AgentRole::from_db_str(s).map_err(|e| malformed(C, index, e.to_string()))?,
        ),
        Some(other) => return Err(malformed(C, index, format!("bad target role: {}", other))),
    };
    Ok(CoordinationEvent {
        event_id: get_id(record, &["id", "event_id"]),
        event_type,
        source_role: get_role(record, &["source_agent_role", "source_role"], C, index)?,
        target_role,
        payload: record.get("payload").cloned().unwrap_or(serde_json::Value::Null),
        emitted_at: get_timestamp(record, &["timestamp", "emitted_at"], C, index)?,
    })
}

fn parse_signal(record: &serde_json::Value, index: usize) -> Result<CollaborationSignal, MigrationError> {
    const C: &str = "collaboration_signals";
    let kind_str = get_str(record, &["signal_type", "signal_kind"], C, index)?;
    Ok(CollaborationSignal {
        agent_role: get_role(record, &["agent_role"], C, index)?,
        scope: get_str(record, &["scope"], C, index)?.to_string(),
        signal_kind: SignalKind::from_db_str(kind_str)
            .map_err(|e| malformed(C, index, e.to_string()))?,
        ttl_seconds: record
            .get("ttl_seconds")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| malformed(C, index, "missing ttl_seconds"))?,
        published_at: get_timestamp(record, &["published_at", "timestamp"], C, index)?,
    })
}

fn parse_task(record: &serde_json::Value, index: usize) -> Result<AutonomousTask, MigrationError> {
    const C: &str = "autonomous_tasks";
    let description = get_str(record, &["description"], C, index)?.to_string();
    let status_str = get_str(record, &["status"], C, index)?;
    let priority = match record.get("priority") {
        Some(serde_json::Value::String(s)) => TaskPriority::from_db_str(s)
            .map_err(|e| malformed(C, index, e.to_string()))?,
        // The flat files stored priority as a number in some eras
        Some(serde_json::Value::Number(n)) => match n.as_i64().unwrap_or(1) {
            i64::MIN..=0 => TaskPriority::Low,
            1 => TaskPriority::Normal,
            2 => TaskPriority::High,
            _ => TaskPriority::Critical,
        },
        _ => return Err(malformed(C, index, "missing priority")),
    };
    Ok(AutonomousTask {
        task_id: get_id(record, &["task_id", "id"]),
        dedupe_hash: switchyard_core::dedupe_hash(&description),
        description,
        discovered_by: get_role(record, &["discovered_by"], C, index)?,
        priority,
        status: TaskStatus::from_db_str(status_str)
            .or_else(|_| TaskStatus::from_db_str(&pascal_case(status_str)))
            .map_err(|e| malformed(C, index, e.to_string()))?,
        retry_count: record.get("retry_count").and_then(|v| v.as_i64()).unwrap_or(0) as i32,
        created_at: get_timestamp(record, &["created_at", "timestamp"], C, index)?,
    })
}

fn parse_contract(record: &serde_json::Value, index: usize) -> Result<Contract, MigrationError> {
    const C: &str = "contracts";
    let status_str = get_str(record, &["status"], C, index)?;
    Ok(Contract {
        contract_id: get_id(record, &["contract_id", "id"]),
        task_id: record
            .get("task_id")
            .and_then(|v| v.as_str())
            .and_then(|s| uuid::Uuid::parse_str(s).ok())
            .ok_or_else(|| malformed(C, index, "missing task_id"))?,
        agent_role: get_role(record, &["agent_role"], C, index)?,
        status: ContractStatus::from_db_str(status_str)
            .or_else(|_| ContractStatus::from_db_str(&pascal_case(status_str)))
            .map_err(|e| malformed(C, index, e.to_string()))?,
        created_at: get_timestamp(record, &["created_at", "timestamp"], C, index)?,
        expires_at: get_timestamp(record, &["expires_at"], C, index)?,
        result: match record.get("result") {
            None | Some(serde_json::Value::Null) => None,
            Some(value) => Some(value.clone()),
        },
    })
}

// ============================================================================
// CORPUS READING
// ============================================================================

fn read_collection(
    dir: &Path,
    file: &str,
) -> BusResult<Vec<serde_json::Value>> {
    let path = dir.join(file);
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        // A corpus may simply not have a collection yet
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(MigrationError::CorpusUnreadable {
                path: path.display().to_string(),
                reason: e.to_string(),
            }
            .into())
        }
    };
    let value: serde_json::Value =
        serde_json::from_str(&contents).map_err(|e| MigrationError::CorpusUnreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
    match value {
        serde_json::Value::Array(records) => Ok(records),
        _ => Err(MigrationError::CorpusUnreadable {
            path: path.display().to_string(),
            reason: "expected a JSON array".to_string(),
        }
        .into()),
    }
}

// ============================================================================
// IMPORT
// ============================================================================

/// Import a legacy flat-file corpus from `dir` into the store.
///
/// Tasks and contracts go through one transaction so the referential pair
/// lands atomically; append-only collections are replayed as plain inserts.
/// Returns the reconciliation report; callers decide whether a non-clean
/// report is acceptable.
pub fn import_legacy_corpus(store: &dyn Store, dir: &Path) -> BusResult<MigrationReport> {
    let mut report = MigrationReport::default();

    for (index, record) in read_collection(dir, LEGACY_BREADCRUMBS)?.iter().enumerate() {
        match parse_breadcrumb(record, index) {
            Ok(crumb) => {
                store.breadcrumb_insert(&crumb)?;
                report.breadcrumbs_imported += 1;
            }
            Err(e) => {
                warn!(collection = "breadcrumbs", index, error = %e, "skipping malformed legacy record");
                report.skipped.push(e);
            }
        }
    }

    for (index, record) in read_collection(dir, LEGACY_EVENTS)?.iter().enumerate() {
        match parse_event(record, index) {
            Ok(event) => {
                store.event_insert(&event)?;
                report.events_imported += 1;
            }
            Err(e) => {
                warn!(collection = "coordination_events", index, error = %e, "skipping malformed legacy record");
                report.skipped.push(e);
            }
        }
    }

    for (index, record) in read_collection(dir, LEGACY_SIGNALS)?.iter().enumerate() {
        match parse_signal(record, index) {
            Ok(signal) => {
                store.signal_upsert(&signal)?;
                report.signals_imported += 1;
            }
            Err(e) => {
                warn!(collection = "collaboration_signals", index, error = %e, "skipping malformed legacy record");
                report.skipped.push(e);
            }
        }
    }

    let mut tasks = Vec::new();
    for (index, record) in read_collection(dir, LEGACY_TASKS)?.iter().enumerate() {
        match parse_task(record, index) {
            Ok(task) => tasks.push(task),
            Err(e) => {
                warn!(collection = "autonomous_tasks", index, error = %e, "skipping malformed legacy record");
                report.skipped.push(e);
            }
        }
    }
    let mut contracts = Vec::new();
    for (index, record) in read_collection(dir, LEGACY_CONTRACTS)?.iter().enumerate() {
        match parse_contract(record, index) {
            Ok(contract) => contracts.push(contract),
            Err(e) => {
                warn!(collection = "contracts", index, error = %e, "skipping malformed legacy record");
                report.skipped.push(e);
            }
        }
    }

    let tasks_imported = tasks.len();
    let contracts_imported = contracts.len();
    store.transaction(&mut |tx: &mut dyn StoreTx| {
        for task in &tasks {
            tx.task_insert(task)?;
        }
        for contract in &contracts {
            import_contract(tx, contract)?;
        }
        Ok(())
    })?;
    report.tasks_imported = tasks_imported;
    report.contracts_imported = contracts_imported;

    tracing::info!(%report, "legacy corpus import finished");
    Ok(report)
}

/// Insert a legacy contract, downgrading a stale `Claimed` row so the
/// active-claim uniqueness key stays honest for already-expired corpora.
fn import_contract(tx: &mut dyn StoreTx, contract: &Contract) -> BusResult<()> {
    if contract.status == ContractStatus::Claimed && contract.is_expired(chrono::Utc::now()) {
        let mut expired = contract.clone();
        expired.status = ContractStatus::Expired;
        // Not an active claim; keep the record, keep the count
        return tx.contract_insert_plain(&expired);
    }
    match contract.status {
        ContractStatus::Claimed => tx.contract_insert_claimed(contract),
        _ => tx.contract_insert_plain(contract),
    }
}
