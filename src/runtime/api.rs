//! API-facing response models.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::{CircuitState, PoolStats, Task, TaskKind, TaskOutput, TaskPayload, TaskStatus};
use crate::util::serde::{Priority, QueueName, TaskId};

/// Task as shown to a caller.
///
/// Payload and result are only included for the task's owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskView {
    /// Task identifier.
    pub id: TaskId,
    /// Search or apply.
    pub kind: TaskKind,
    /// Target platform.
    pub platform: String,
    /// Queue holding the task.
    pub queue: QueueName,
    /// Scheduling priority.
    pub priority: Priority,
    /// Current status.
    pub status: TaskStatus,
    /// Attempts started.
    pub attempts: u32,
    /// Attempt budget.
    pub max_attempts: u32,
    /// Submission time (ms since epoch).
    pub created_at_ms: u128,
    /// Latest attempt start (ms since epoch).
    pub last_attempt_at_ms: Option<u128>,
    /// Completion or terminal failure time (ms since epoch).
    pub finished_at_ms: Option<u128>,
    /// Latest error text.
    pub error: Option<String>,
    /// Submitted payload; owner only.
    pub payload: Option<TaskPayload>,
    /// Adapter output; owner only.
    pub result: Option<TaskOutput>,
}

impl TaskView {
    /// Build the view of `task` seen by `viewer_id`.
    #[must_use]
    pub fn for_viewer(task: &Task, viewer_id: &str) -> Self {
        let owner = task.owner_user_id == viewer_id;
        Self {
            id: task.id,
            kind: task.kind(),
            platform: task.platform.clone(),
            queue: task.queue.clone(),
            priority: task.priority,
            status: task.status,
            attempts: task.attempts,
            max_attempts: task.max_attempts,
            created_at_ms: task.created_at_ms,
            last_attempt_at_ms: task.last_attempt_at_ms,
            finished_at_ms: task.finished_at_ms,
            error: task.error.clone(),
            payload: owner.then(|| task.payload.clone()),
            result: if owner { task.result.clone() } else { None },
        }
    }

    /// True when payload and result were withheld.
    #[must_use]
    pub const fn is_redacted(&self) -> bool {
        self.payload.is_none()
    }
}

/// Health response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    /// False once the scheduler has shut down.
    pub ok: bool,
    /// Circuit state per known platform.
    pub circuits: BTreeMap<String, CircuitState>,
    /// Worker pool counters.
    pub pool: PoolStats,
}
