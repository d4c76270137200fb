//! Switchyard Bus - Coordination Components
//!
//! The coordination primitives independent agent processes use to avoid
//! duplicate or conflicting work:
//! - Contract manager: atomic claim / lease / release / complete
//! - Collaboration signal bus: TTL-scoped availability broadcasts
//! - Breadcrumb recorder and coordination event log: append-only traces
//! - Autonomous task queue: discovery and listing of work items
//! - Coordination facade: the surface agent runtimes call
//!
//! All shared state lives behind the store; nothing here caches
//! authoritative state past one transaction.

pub mod contracts;
pub mod facade;
pub mod queue;
pub mod signals;
pub mod trace;

pub use contracts::ContractManager;
pub use facade::CoordinationBus;
pub use queue::TaskQueue;
pub use signals::SignalBus;
pub use trace::{BreadcrumbRecorder, EventLog};

// Re-export the types callers handle at the API boundary
pub use switchyard_core::{
    AgentRole, AutonomousTask, Breadcrumb, BreadcrumbFilter, BreadcrumbType, BusConfig, BusError,
    BusResult, CollaborationSignal, Contract, ContractError, ContractStatus, CoordinationEvent,
    EntityId, EventFilter, EventType, Held, Lease, SignalKind, TaskPriority, TaskStatus,
};
pub use switchyard_store::{MigrationReport, Store};
