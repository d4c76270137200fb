//! Autonomous task queue: discovery and listing of work items.

use chrono::{Duration, Utc};
use std::sync::Arc;
use switchyard_core::{
    AgentRole, AutonomousTask, BusConfig, BusResult, TaskError, TaskPriority, TaskStatus,
};
use switchyard_store::Store;
use tracing::{debug, info};

/// Work-item discovery over the store.
pub struct TaskQueue {
    store: Arc<dyn Store>,
    config: BusConfig,
}

impl TaskQueue {
    pub fn new(store: Arc<dyn Store>, config: BusConfig) -> Self {
        Self { store, config }
    }

    /// Insert a newly-discovered task.
    ///
    /// Duplicate descriptions inside the dedupe window are rejected so
    /// repeated discovery scans cannot flood the queue. The dedupe check and
    /// the insert run in one transaction.
    pub fn discover_task(
        &self,
        description: &str,
        priority: TaskPriority,
        discovered_by: AgentRole,
    ) -> BusResult<AutonomousTask> {
        if !discovered_by.profile().may_discover {
            return Err(TaskError::CapabilityDenied {
                role: discovered_by.to_string(),
                capability: "discovery",
            }
            .into());
        }
        if description.trim().is_empty() {
            return Err(TaskError::InvalidDescription {
                reason: "description must not be empty",
            }
            .into());
        }

        let task = AutonomousTask::discover(description, priority, discovered_by);
        let window_start = Utc::now() - Duration::seconds(self.config.dedupe_window_seconds);
        self.store.transaction(&mut |tx| {
            if let Some(existing) = tx.task_find_recent_by_dedupe(&task.dedupe_hash, window_start)? {
                debug!(task_id = %existing.task_id, "duplicate discovery rejected");
                return Err(TaskError::DuplicateDescription {
                    existing_task_id: existing.task_id,
                }
                .into());
            }
            tx.task_insert(&task)
        })?;

        info!(task_id = %task.task_id, priority = %priority, role = %discovered_by, "task discovered");
        Ok(task)
    }

    /// Open (claimable) tasks, highest priority first, oldest first within a
    /// priority.
    pub fn list_open_tasks(&self) -> BusResult<Vec<AutonomousTask>> {
        let mut tasks = self.store.task_list_by_status(TaskStatus::Discovered)?;
        tasks.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(tasks)
    }
}
