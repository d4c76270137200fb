//! Contract typestate for compile-time safety of the claim lifecycle.
//!
//! A contract is an exclusive, time-bounded claim granting one agent the
//! right to execute a specific task. The typestate wrapper makes invalid
//! transitions uncompilable: only a held lease can be renewed, completed,
//! or released, and completion/release consume the lease.
//!
//! # State Transition Diagram
//!
//! ```text
//! (unclaimed) ─── claim() ──→ Held ─── complete()/release() ──→ (closed)
//!                               │
//!                          renew() ↺
//! ```

use crate::{AgentRole, EntityId, Timestamp};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// CONTRACT STATUS ENUM
// ============================================================================

/// Lifecycle status of a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContractStatus {
    /// Created but not yet claimed. Live claims are created directly as
    /// `Claimed`; this state only occurs in legacy corpora.
    Open,
    /// Active exclusive claim, subject to lease expiry
    Claimed,
    /// Completed by the claim holder before expiry
    Completed,
    /// Observed past `expires_at` without completion
    Expired,
    /// Voluntarily released by the claim holder
    Released,
}

impl ContractStatus {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            ContractStatus::Open => "Open",
            ContractStatus::Claimed => "Claimed",
            ContractStatus::Completed => "Completed",
            ContractStatus::Expired => "Expired",
            ContractStatus::Released => "Released",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, ContractStatusParseError> {
        match s {
            "Open" => Ok(ContractStatus::Open),
            "Claimed" => Ok(ContractStatus::Claimed),
            "Completed" => Ok(ContractStatus::Completed),
            "Expired" => Ok(ContractStatus::Expired),
            "Released" => Ok(ContractStatus::Released),
            _ => Err(ContractStatusParseError(s.to_string())),
        }
    }
}

impl fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for ContractStatus {
    type Err = ContractStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid contract status string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractStatusParseError(pub String);

impl fmt::Display for ContractStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid contract status: {}", self.0)
    }
}

impl std::error::Error for ContractStatusParseError {}

// ============================================================================
// CONTRACT RECORD (internal storage, state-independent)
// ============================================================================

/// A contract as persisted, independent of typestate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    /// Unique identifier for this contract
    pub contract_id: EntityId,
    /// Task this contract claims
    pub task_id: EntityId,
    /// Role holding the claim
    pub agent_role: AgentRole,
    /// Lifecycle status
    pub status: ContractStatus,
    /// When the claim was created
    pub created_at: Timestamp,
    /// When the lease lapses
    pub expires_at: Timestamp,
    /// Completion result, present only on completed contracts
    pub result: Option<serde_json::Value>,
}

impl Contract {
    /// Create a new claimed contract with the given lease.
    pub fn claim(task_id: EntityId, agent_role: AgentRole, lease_seconds: i64) -> Self {
        let now = Utc::now();
        Self {
            contract_id: Uuid::now_v7(),
            task_id,
            agent_role,
            status: ContractStatus::Claimed,
            created_at: now,
            expires_at: now + Duration::seconds(lease_seconds),
            result: None,
        }
    }

    /// Check if the lease has lapsed at `now`.
    ///
    /// Expiry is lazy: a stored `Claimed` row past `expires_at` is not an
    /// active claim even before anything rewrites its status.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }

    /// Whether this contract holds the task's active claim at `now`.
    /// The bus-wide invariant: at most one contract per task satisfies this.
    pub fn is_active_claim(&self, now: Timestamp) -> bool {
        self.status == ContractStatus::Claimed && !self.is_expired(now)
    }

    /// Remaining lease duration at `now`, if any.
    pub fn remaining_lease(&self, now: Timestamp) -> Option<std::time::Duration> {
        if self.is_expired(now) {
            None
        } else {
            (self.expires_at - now).to_std().ok()
        }
    }
}

// ============================================================================
// TYPESTATE MARKERS
// ============================================================================

/// Marker trait for lease states.
pub trait LeaseState: private::Sealed + Send + Sync {}

/// The lease is currently held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Held;
impl LeaseState for Held {}

/// The lease has been closed (for documentation; leases in this state don't
/// exist at runtime because transitions consume the value).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Closed;
impl LeaseState for Closed {}

mod private {
    pub trait Sealed {}
    impl Sealed for super::Held {}
    impl Sealed for super::Closed {}
}

// ============================================================================
// LEASE TYPESTATE WRAPPER
// ============================================================================

/// A claim with compile-time state tracking.
///
/// The type parameter `S` indicates the current state of the lease:
/// - `Lease<Held>`: can be renewed, completed, or released
/// - `Lease<Closed>`: cannot be constructed (transitions consume the lease)
#[derive(Debug, Clone)]
pub struct Lease<S: LeaseState> {
    contract: Contract,
    _state: PhantomData<S>,
}

impl<S: LeaseState> Lease<S> {
    /// Access the underlying contract (read-only).
    pub fn contract(&self) -> &Contract {
        &self.contract
    }

    /// Get the contract ID.
    pub fn contract_id(&self) -> EntityId {
        self.contract.contract_id
    }

    /// Get the claimed task ID.
    pub fn task_id(&self) -> EntityId {
        self.contract.task_id
    }

    /// Get the role holding the claim.
    pub fn agent_role(&self) -> AgentRole {
        self.contract.agent_role
    }

    /// Get when the lease lapses.
    pub fn expires_at(&self) -> Timestamp {
        self.contract.expires_at
    }
}

impl Lease<Held> {
    /// Wrap a freshly-claimed contract.
    ///
    /// This should only be called by the contract manager when a claim
    /// transaction commits.
    pub fn new(contract: Contract) -> Self {
        Lease {
            contract,
            _state: PhantomData,
        }
    }

    /// Extend the lease by `extra_seconds`. Consumes and returns the lease
    /// so a stale copy cannot be renewed twice.
    pub fn renewed(mut self, extra_seconds: i64) -> Self {
        self.contract.expires_at = self.contract.expires_at + Duration::seconds(extra_seconds);
        self
    }

    /// Close the lease and return the underlying contract for the final
    /// store write. Consumes the lease.
    pub fn into_contract(self) -> Contract {
        self.contract
    }

    /// Check if the lease has lapsed.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.contract.is_expired(now)
    }

    /// Remaining lease duration at `now`, if any.
    pub fn remaining(&self, now: Timestamp) -> Option<std::time::Duration> {
        self.contract.remaining_lease(now)
    }
}

// ============================================================================
// DATABASE BOUNDARY: STORED CONTRACT
// ============================================================================

/// A contract as loaded from the store, state unknown at compile time.
///
/// Use `into_held` to validate and convert to a typed lease.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredContract(pub Contract);

impl StoredContract {
    /// Convert to a held lease if the contract is an active claim.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the contract is not in `Claimed` status or its
    /// lease has lapsed.
    pub fn into_held(self, now: Timestamp) -> Result<Lease<Held>, LeaseStateError> {
        if self.0.status != ContractStatus::Claimed {
            return Err(LeaseStateError::NotClaimed {
                contract_id: self.0.contract_id,
                status: self.0.status,
            });
        }
        if self.0.is_expired(now) {
            return Err(LeaseStateError::Expired {
                contract_id: self.0.contract_id,
                expired_at: self.0.expires_at,
            });
        }
        Ok(Lease::new(self.0))
    }

    /// Get the underlying contract without state validation.
    pub fn contract(&self) -> &Contract {
        &self.0
    }
}

/// Errors when converting a stored contract into a held lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseStateError {
    /// The contract is not in the Claimed status.
    NotClaimed {
        contract_id: EntityId,
        status: ContractStatus,
    },
    /// The lease has lapsed.
    Expired {
        contract_id: EntityId,
        expired_at: Timestamp,
    },
}

impl fmt::Display for LeaseStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeaseStateError::NotClaimed { contract_id, status } => {
                write!(f, "Contract {} is {}, not Claimed", contract_id, status)
            }
            LeaseStateError::Expired { contract_id, expired_at } => {
                write!(f, "Contract {} lease expired at {}", contract_id, expired_at)
            }
        }
    }
}

impl std::error::Error for LeaseStateError {}
