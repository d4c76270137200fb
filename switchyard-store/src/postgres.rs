//! Transactional networked store adapter backed by PostgreSQL.
//!
//! Claim serialization relies on two database mechanisms: `task_get` inside
//! a transaction takes `SELECT ... FOR UPDATE` on the task row, and a
//! partial unique index on `contracts(task_id) WHERE status = 'Claimed'`
//! backstops the `(task_id, Claimed)` uniqueness key, so of two racing
//! claim transactions exactly one commits and the other surfaces a
//! duplicate-key error.

use crate::{ContractUpdate, Store, StoreTx, TaskUpdate};
use postgres::error::SqlState;
use postgres::{Client, NoTls, Row, Transaction};
use std::sync::Mutex;
use std::time::Duration;
use switchyard_core::{
    AgentRole, AutonomousTask, Breadcrumb, BreadcrumbFilter, BreadcrumbType, BusResult,
    CollaborationSignal, Contract, ContractStatus, CoordinationEvent, EntityId, EventFilter,
    EventType, SignalKind, StoreError, TaskPriority, TaskStatus, Timestamp,
};

// ============================================================================
// CONNECTION CONFIGURATION
// ============================================================================

/// PostgreSQL connection configuration.
#[derive(Debug, Clone)]
pub struct PgConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Connection timeout
    pub connect_timeout: Duration,
}

impl Default for PgConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "switchyard".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

impl PgConfig {
    /// Create a configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("SWITCHYARD_DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("SWITCHYARD_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5432),
            dbname: std::env::var("SWITCHYARD_DB_NAME")
                .unwrap_or_else(|_| "switchyard".to_string()),
            user: std::env::var("SWITCHYARD_DB_USER")
                .unwrap_or_else(|_| "postgres".to_string()),
            password: std::env::var("SWITCHYARD_DB_PASSWORD").unwrap_or_default(),
            connect_timeout: Duration::from_secs(
                std::env::var("SWITCHYARD_DB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }

    fn connect(&self) -> BusResult<Client> {
        let mut config = postgres::Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .dbname(&self.dbname)
            .user(&self.user)
            .password(&self.password)
            .connect_timeout(self.connect_timeout);
        config.connect(NoTls).map_err(|e| {
            StoreError::Unavailable {
                reason: format!("connect failed: {}", e),
            }
            .into()
        })
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS breadcrumbs (
    breadcrumb_id   UUID PRIMARY KEY,
    agent_role      TEXT NOT NULL,
    session_id      UUID NOT NULL,
    breadcrumb_type TEXT NOT NULL,
    recorded_at     TIMESTAMPTZ NOT NULL,
    metadata        JSONB NOT NULL
);
CREATE INDEX IF NOT EXISTS breadcrumbs_session_idx ON breadcrumbs (session_id, recorded_at);

CREATE TABLE IF NOT EXISTS coordination_events (
    event_id    UUID PRIMARY KEY,
    event_type  TEXT NOT NULL,
    source_role TEXT NOT NULL,
    target_role TEXT,
    payload     JSONB NOT NULL,
    emitted_at  TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS coordination_events_emitted_idx ON coordination_events (emitted_at);

CREATE TABLE IF NOT EXISTS collaboration_signals (
    agent_role   TEXT NOT NULL,
    scope        TEXT NOT NULL,
    signal_kind  TEXT NOT NULL,
    ttl_seconds  BIGINT NOT NULL,
    published_at TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (agent_role, scope)
);

CREATE TABLE IF NOT EXISTS autonomous_tasks (
    task_id       UUID PRIMARY KEY,
    description   TEXT NOT NULL,
    dedupe_hash   TEXT NOT NULL,
    discovered_by TEXT NOT NULL,
    priority      TEXT NOT NULL,
    status        TEXT NOT NULL,
    retry_count   INTEGER NOT NULL,
    created_at    TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS autonomous_tasks_dedupe_idx ON autonomous_tasks (dedupe_hash, created_at);
CREATE INDEX IF NOT EXISTS autonomous_tasks_status_idx ON autonomous_tasks (status);

CREATE TABLE IF NOT EXISTS contracts (
    contract_id UUID PRIMARY KEY,
    task_id     UUID NOT NULL REFERENCES autonomous_tasks (task_id),
    agent_role  TEXT NOT NULL,
    status      TEXT NOT NULL,
    created_at  TIMESTAMPTZ NOT NULL,
    expires_at  TIMESTAMPTZ NOT NULL,
    result      JSONB
);
CREATE UNIQUE INDEX IF NOT EXISTS contracts_active_claim_idx
    ON contracts (task_id) WHERE status = 'Claimed';
CREATE INDEX IF NOT EXISTS contracts_task_idx ON contracts (task_id, created_at);
";

// ============================================================================
// ERROR MAPPING
// ============================================================================

fn map_pg_error(collection: &'static str, key: String, e: postgres::Error) -> switchyard_core::BusError {
    if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
        return StoreError::DuplicateKey { collection, key }.into();
    }
    if e.is_closed() {
        return StoreError::Unavailable {
            reason: format!("connection lost: {}", e),
        }
        .into();
    }
    StoreError::TransactionFailed {
        reason: format!("{}: {}", collection, e),
    }
    .into()
}

fn query_error(collection: &'static str, e: postgres::Error) -> switchyard_core::BusError {
    map_pg_error(collection, String::new(), e)
}

fn corrupt(collection: &'static str, reason: impl std::fmt::Display) -> switchyard_core::BusError {
    StoreError::CorruptRecord {
        collection,
        reason: reason.to_string(),
    }
    .into()
}

// ============================================================================
// ROW DECODING
// ============================================================================

fn task_from_row(row: &Row) -> BusResult<AutonomousTask> {
    Ok(AutonomousTask {
        task_id: row.get("task_id"),
        description: row.get("description"),
        dedupe_hash: row.get("dedupe_hash"),
        discovered_by: AgentRole::from_db_str(row.get("discovered_by"))
            .map_err(|e| corrupt("autonomous_tasks", e))?,
        priority: TaskPriority::from_db_str(row.get("priority"))
            .map_err(|e| corrupt("autonomous_tasks", e))?,
        status: TaskStatus::from_db_str(row.get("status"))
            .map_err(|e| corrupt("autonomous_tasks", e))?,
        retry_count: row.get("retry_count"),
        created_at: row.get("created_at"),
    })
}

fn contract_from_row(row: &Row) -> BusResult<Contract> {
    Ok(Contract {
        contract_id: row.get("contract_id"),
        task_id: row.get("task_id"),
        agent_role: AgentRole::from_db_str(row.get("agent_role"))
            .map_err(|e| corrupt("contracts", e))?,
        status: ContractStatus::from_db_str(row.get("status"))
            .map_err(|e| corrupt("contracts", e))?,
        created_at: row.get("created_at"),
        expires_at: row.get("expires_at"),
        result: row.get("result"),
    })
}

fn breadcrumb_from_row(row: &Row) -> BusResult<Breadcrumb> {
    Ok(Breadcrumb {
        breadcrumb_id: row.get("breadcrumb_id"),
        agent_role: AgentRole::from_db_str(row.get("agent_role"))
            .map_err(|e| corrupt("breadcrumbs", e))?,
        session_id: row.get("session_id"),
        breadcrumb_type: BreadcrumbType::from_db_str(row.get("breadcrumb_type"))
            .map_err(|e| corrupt("breadcrumbs", e))?,
        recorded_at: row.get("recorded_at"),
        metadata: row.get("metadata"),
    })
}

fn event_from_row(row: &Row) -> BusResult<CoordinationEvent> {
    let target_role: Option<&str> = row.get("target_role");
    Ok(CoordinationEvent {
        event_id: row.get("event_id"),
        event_type: EventType::from_db_str(row.get("event_type"))
            .map_err(|e| corrupt("coordination_events", e))?,
        source_role: AgentRole::from_db_str(row.get("source_role"))
            .map_err(|e| corrupt("coordination_events", e))?,
        target_role: target_role
            .map(AgentRole::from_db_str)
            .transpose()
            .map_err(|e| corrupt("coordination_events", e))?,
        payload: row.get("payload"),
        emitted_at: row.get("emitted_at"),
    })
}

fn signal_from_row(row: &Row) -> BusResult<CollaborationSignal> {
    Ok(CollaborationSignal {
        agent_role: AgentRole::from_db_str(row.get("agent_role"))
            .map_err(|e| corrupt("collaboration_signals", e))?,
        scope: row.get("scope"),
        signal_kind: SignalKind::from_db_str(row.get("signal_kind"))
            .map_err(|e| corrupt("collaboration_signals", e))?,
        ttl_seconds: row.get("ttl_seconds"),
        published_at: row.get("published_at"),
    })
}

// ============================================================================
// STORE ADAPTER
// ============================================================================

/// Networked store adapter over a blocking PostgreSQL client.
///
/// One client per agent process; the mutex serializes statements from the
/// process's own threads, while cross-process serialization is the
/// database's job.
pub struct PostgresStore {
    client: Mutex<Client>,
}

impl PostgresStore {
    /// Connect using the given configuration.
    pub fn connect(config: &PgConfig) -> BusResult<Self> {
        let client = config.connect()?;
        Ok(Self {
            client: Mutex::new(client),
        })
    }

    /// Connect using `SWITCHYARD_DB_*` environment variables.
    pub fn connect_from_env() -> BusResult<Self> {
        Self::connect(&PgConfig::from_env())
    }

    /// Create the five collections and their indexes if absent.
    pub fn init_schema(&self) -> BusResult<()> {
        let mut client = self.lock()?;
        client
            .batch_execute(SCHEMA)
            .map_err(|e| query_error("schema", e))?;
        Ok(())
    }

    fn lock(&self) -> BusResult<std::sync::MutexGuard<'_, Client>> {
        self.client.lock().map_err(|_| {
            StoreError::Unavailable {
                reason: "client mutex poisoned".to_string(),
            }
            .into()
        })
    }
}

// ============================================================================
// TRANSACTION SURFACE
// ============================================================================

struct PgTx<'a> {
    tx: Transaction<'a>,
}

impl StoreTx for PgTx<'_> {
    fn task_get(&mut self, task_id: EntityId) -> BusResult<Option<AutonomousTask>> {
        // FOR UPDATE serializes concurrent claim transactions on this task
        let row = self
            .tx
            .query_opt(
                "SELECT task_id, description, dedupe_hash, discovered_by, priority, status, \
                 retry_count, created_at FROM autonomous_tasks WHERE task_id = $1 FOR UPDATE",
                &[&task_id],
            )
            .map_err(|e| query_error("autonomous_tasks", e))?;
        row.as_ref().map(task_from_row).transpose()
    }

    fn task_insert(&mut self, task: &AutonomousTask) -> BusResult<()> {
        self.tx
            .execute(
                "INSERT INTO autonomous_tasks \
                 (task_id, description, dedupe_hash, discovered_by, priority, status, retry_count, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
                &[
                    &task.task_id,
                    &task.description,
                    &task.dedupe_hash,
                    &task.discovered_by.as_db_str(),
                    &task.priority.as_db_str(),
                    &task.status.as_db_str(),
                    &task.retry_count,
                    &task.created_at,
                ],
            )
            .map_err(|e| map_pg_error("autonomous_tasks", task.task_id.to_string(), e))?;
        Ok(())
    }

    fn task_update(&mut self, task_id: EntityId, update: TaskUpdate) -> BusResult<()> {
        let updated = self
            .tx
            .execute(
                "UPDATE autonomous_tasks SET \
                 status = COALESCE($2, status), \
                 retry_count = COALESCE($3, retry_count) \
                 WHERE task_id = $1",
                &[
                    &task_id,
                    &update.status.map(|s| s.as_db_str()),
                    &update.retry_count,
                ],
            )
            .map_err(|e| query_error("autonomous_tasks", e))?;
        if updated == 0 {
            return Err(StoreError::NotFound {
                collection: "autonomous_tasks",
                id: task_id,
            }
            .into());
        }
        Ok(())
    }

    fn task_find_recent_by_dedupe(
        &mut self,
        dedupe_hash: &str,
        since: Timestamp,
    ) -> BusResult<Option<AutonomousTask>> {
        let row = self
            .tx
            .query_opt(
                "SELECT task_id, description, dedupe_hash, discovered_by, priority, status, \
                 retry_count, created_at FROM autonomous_tasks \
                 WHERE dedupe_hash = $1 AND created_at >= $2 \
                 ORDER BY created_at DESC LIMIT 1",
                &[&dedupe_hash, &since],
            )
            .map_err(|e| query_error("autonomous_tasks", e))?;
        row.as_ref().map(task_from_row).transpose()
    }

    fn contract_get(&mut self, contract_id: EntityId) -> BusResult<Option<Contract>> {
        let row = self
            .tx
            .query_opt(
                "SELECT contract_id, task_id, agent_role, status, created_at, expires_at, result \
                 FROM contracts WHERE contract_id = $1 FOR UPDATE",
                &[&contract_id],
            )
            .map_err(|e| query_error("contracts", e))?;
        row.as_ref().map(contract_from_row).transpose()
    }

    fn contract_list_by_task(&mut self, task_id: EntityId) -> BusResult<Vec<Contract>> {
        let rows = self
            .tx
            .query(
                "SELECT contract_id, task_id, agent_role, status, created_at, expires_at, result \
                 FROM contracts WHERE task_id = $1 ORDER BY created_at",
                &[&task_id],
            )
            .map_err(|e| query_error("contracts", e))?;
        rows.iter().map(contract_from_row).collect()
    }

    fn contract_insert_claimed(&mut self, contract: &Contract) -> BusResult<()> {
        // The partial unique index on (task_id) WHERE status = 'Claimed'
        // turns a lost race into a duplicate-key error here.
        self.tx
            .execute(
                "INSERT INTO contracts \
                 (contract_id, task_id, agent_role, status, created_at, expires_at, result) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
                &[
                    &contract.contract_id,
                    &contract.task_id,
                    &contract.agent_role.as_db_str(),
                    &contract.status.as_db_str(),
                    &contract.created_at,
                    &contract.expires_at,
                    &contract.result,
                ],
            )
            .map_err(|e| map_pg_error("contracts", format!("{}:Claimed", contract.task_id), e))?;
        Ok(())
    }

    fn contract_insert_plain(&mut self, contract: &Contract) -> BusResult<()> {
        self.tx
            .execute(
                "INSERT INTO contracts \
                 (contract_id, task_id, agent_role, status, created_at, expires_at, result) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
                &[
                    &contract.contract_id,
                    &contract.task_id,
                    &contract.agent_role.as_db_str(),
                    &contract.status.as_db_str(),
                    &contract.created_at,
                    &contract.expires_at,
                    &contract.result,
                ],
            )
            .map_err(|e| map_pg_error("contracts", contract.contract_id.to_string(), e))?;
        Ok(())
    }

    fn contract_update(&mut self, contract_id: EntityId, update: ContractUpdate) -> BusResult<()> {
        let updated = self
            .tx
            .execute(
                "UPDATE contracts SET \
                 status = COALESCE($2, status), \
                 expires_at = COALESCE($3, expires_at), \
                 result = COALESCE($4, result) \
                 WHERE contract_id = $1",
                &[
                    &contract_id,
                    &update.status.map(|s| s.as_db_str()),
                    &update.expires_at,
                    &update.result,
                ],
            )
            .map_err(|e| query_error("contracts", e))?;
        if updated == 0 {
            return Err(StoreError::NotFound {
                collection: "contracts",
                id: contract_id,
            }
            .into());
        }
        Ok(())
    }
}

// ============================================================================
// STORE IMPLEMENTATION
// ============================================================================

impl Store for PostgresStore {
    fn transaction(
        &self,
        f: &mut dyn FnMut(&mut dyn StoreTx) -> BusResult<()>,
    ) -> BusResult<()> {
        let mut client = self.lock()?;
        let tx = client
            .transaction()
            .map_err(|e| query_error("transaction", e))?;
        let mut pg_tx = PgTx { tx };
        // Any Err drops the transaction un-committed, rolling it back.
        f(&mut pg_tx)?;
        pg_tx
            .tx
            .commit()
            .map_err(|e| query_error("transaction", e))?;
        Ok(())
    }

    fn breadcrumb_insert(&self, crumb: &Breadcrumb) -> BusResult<()> {
        let mut client = self.lock()?;
        client
            .execute(
                "INSERT INTO breadcrumbs \
                 (breadcrumb_id, agent_role, session_id, breadcrumb_type, recorded_at, metadata) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
                &[
                    &crumb.breadcrumb_id,
                    &crumb.agent_role.as_db_str(),
                    &crumb.session_id,
                    &crumb.breadcrumb_type.as_db_str(),
                    &crumb.recorded_at,
                    &crumb.metadata,
                ],
            )
            .map_err(|e| map_pg_error("breadcrumbs", crumb.breadcrumb_id.to_string(), e))?;
        Ok(())
    }

    fn breadcrumb_query(&self, filter: &BreadcrumbFilter) -> BusResult<Vec<Breadcrumb>> {
        let mut client = self.lock()?;
        let limit = filter.limit.map(|l| l as i64).unwrap_or(i64::MAX);
        let rows = client
            .query(
                "SELECT breadcrumb_id, agent_role, session_id, breadcrumb_type, recorded_at, metadata \
                 FROM breadcrumbs \
                 WHERE ($1::uuid IS NULL OR session_id = $1) \
                   AND ($2::text IS NULL OR agent_role = $2) \
                   AND ($3::text IS NULL OR breadcrumb_type = $3) \
                   AND ($4::timestamptz IS NULL OR recorded_at >= $4) \
                   AND ($5::timestamptz IS NULL OR recorded_at < $5) \
                 ORDER BY recorded_at, breadcrumb_id \
                 LIMIT $6",
                &[
                    &filter.session_id,
                    &filter.agent_role.map(|r| r.as_db_str()),
                    &filter.breadcrumb_type.map(|t| t.as_db_str()),
                    &filter.since,
                    &filter.until,
                    &limit,
                ],
            )
            .map_err(|e| query_error("breadcrumbs", e))?;
        rows.iter().map(breadcrumb_from_row).collect()
    }

    fn event_insert(&self, event: &CoordinationEvent) -> BusResult<()> {
        let mut client = self.lock()?;
        client
            .execute(
                "INSERT INTO coordination_events \
                 (event_id, event_type, source_role, target_role, payload, emitted_at) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
                &[
                    &event.event_id,
                    &event.event_type.as_db_str(),
                    &event.source_role.as_db_str(),
                    &event.target_role.map(|r| r.as_db_str()),
                    &event.payload,
                    &event.emitted_at,
                ],
            )
            .map_err(|e| map_pg_error("coordination_events", event.event_id.to_string(), e))?;
        Ok(())
    }

    fn event_query(&self, filter: &EventFilter) -> BusResult<Vec<CoordinationEvent>> {
        let mut client = self.lock()?;
        let limit = filter.limit.map(|l| l as i64).unwrap_or(i64::MAX);
        let rows = client
            .query(
                "SELECT event_id, event_type, source_role, target_role, payload, emitted_at \
                 FROM coordination_events \
                 WHERE ($1::text IS NULL OR event_type = $1) \
                   AND ($2::text IS NULL OR source_role = $2) \
                   AND ($3::text IS NULL OR target_role = $3) \
                   AND ($4::timestamptz IS NULL OR emitted_at >= $4) \
                   AND ($5::timestamptz IS NULL OR emitted_at < $5) \
                 ORDER BY emitted_at, event_id \
                 LIMIT $6",
                &[
                    &filter.event_type.map(|t| t.as_db_str()),
                    &filter.source_role.map(|r| r.as_db_str()),
                    &filter.target_role.map(|r| r.as_db_str()),
                    &filter.since,
                    &filter.until,
                    &limit,
                ],
            )
            .map_err(|e| query_error("coordination_events", e))?;
        rows.iter().map(event_from_row).collect()
    }

    fn signal_upsert(&self, signal: &CollaborationSignal) -> BusResult<()> {
        let mut client = self.lock()?;
        client
            .execute(
                "INSERT INTO collaboration_signals \
                 (agent_role, scope, signal_kind, ttl_seconds, published_at) \
                 VALUES ($1, $2, $3, $4, $5) \
                 ON CONFLICT (agent_role, scope) DO UPDATE SET \
                 signal_kind = EXCLUDED.signal_kind, \
                 ttl_seconds = EXCLUDED.ttl_seconds, \
                 published_at = EXCLUDED.published_at",
                &[
                    &signal.agent_role.as_db_str(),
                    &signal.scope,
                    &signal.signal_kind.as_db_str(),
                    &signal.ttl_seconds,
                    &signal.published_at,
                ],
            )
            .map_err(|e| query_error("collaboration_signals", e))?;
        Ok(())
    }

    fn signal_list_by_scope(&self, scope: &str) -> BusResult<Vec<CollaborationSignal>> {
        let mut client = self.lock()?;
        let rows = client
            .query(
                "SELECT agent_role, scope, signal_kind, ttl_seconds, published_at \
                 FROM collaboration_signals WHERE scope = $1 ORDER BY published_at",
                &[&scope],
            )
            .map_err(|e| query_error("collaboration_signals", e))?;
        rows.iter().map(signal_from_row).collect()
    }

    fn task_get(&self, task_id: EntityId) -> BusResult<Option<AutonomousTask>> {
        let mut client = self.lock()?;
        let row = client
            .query_opt(
                "SELECT task_id, description, dedupe_hash, discovered_by, priority, status, \
                 retry_count, created_at FROM autonomous_tasks WHERE task_id = $1",
                &[&task_id],
            )
            .map_err(|e| query_error("autonomous_tasks", e))?;
        row.as_ref().map(task_from_row).transpose()
    }

    fn task_list_by_status(&self, status: TaskStatus) -> BusResult<Vec<AutonomousTask>> {
        let mut client = self.lock()?;
        let rows = client
            .query(
                "SELECT task_id, description, dedupe_hash, discovered_by, priority, status, \
                 retry_count, created_at FROM autonomous_tasks WHERE status = $1",
                &[&status.as_db_str()],
            )
            .map_err(|e| query_error("autonomous_tasks", e))?;
        rows.iter().map(task_from_row).collect()
    }

    fn contract_get(&self, contract_id: EntityId) -> BusResult<Option<Contract>> {
        let mut client = self.lock()?;
        let row = client
            .query_opt(
                "SELECT contract_id, task_id, agent_role, status, created_at, expires_at, result \
                 FROM contracts WHERE contract_id = $1",
                &[&contract_id],
            )
            .map_err(|e| query_error("contracts", e))?;
        row.as_ref().map(contract_from_row).transpose()
    }

    fn contract_list_by_task(&self, task_id: EntityId) -> BusResult<Vec<Contract>> {
        let mut client = self.lock()?;
        let rows = client
            .query(
                "SELECT contract_id, task_id, agent_role, status, created_at, expires_at, result \
                 FROM contracts WHERE task_id = $1 ORDER BY created_at",
                &[&task_id],
            )
            .map_err(|e| query_error("contracts", e))?;
        rows.iter().map(contract_from_row).collect()
    }
}
