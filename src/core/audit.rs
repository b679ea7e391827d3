//! Task lifecycle audit trail.

use std::collections::VecDeque;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::util::clock::now_ms;
use crate::util::serde::{QueueName, TaskId};

/// Lifecycle step recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Accepted into a queue.
    Submitted,
    /// Refused by admission control.
    Rejected,
    /// Attempt started.
    Started,
    /// Attempt failed; another is scheduled.
    Retried,
    /// Finished successfully.
    Completed,
    /// Attempts exhausted.
    Failed,
}

/// Audit event structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Event identifier.
    pub event_id: uuid::Uuid,
    /// Related task; absent for rejected submissions.
    pub task_id: Option<TaskId>,
    /// Queue the task belongs to.
    pub queue: QueueName,
    /// Acting user.
    pub user_id: String,
    /// What happened.
    pub action: AuditAction,
    /// Timestamp milliseconds.
    pub created_at_ms: u128,
    /// Additional context (error text, denial reason).
    pub detail: Option<String>,
}

impl AuditEvent {
    /// Build an event stamped with the current time.
    pub fn new(
        task_id: Option<TaskId>,
        queue: QueueName,
        user_id: impl Into<String>,
        action: AuditAction,
        detail: Option<String>,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4(),
            task_id,
            queue,
            user_id: user_id.into(),
            action,
            created_at_ms: now_ms(),
            detail,
        }
    }
}

/// Audit sink abstraction.
pub trait AuditSink: Send + Sync {
    /// Record an audit event.
    fn record(&self, event: AuditEvent);
}

/// Bounded in-memory audit sink.
pub struct InMemoryAuditSink {
    events: Mutex<VecDeque<AuditEvent>>,
    max_events: usize,
}

impl InMemoryAuditSink {
    /// Create a sink keeping at most `max_events` events.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(max_events.min(1024))),
            max_events,
        }
    }

    /// Snapshot of stored events, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Events for one task, oldest first.
    #[must_use]
    pub fn events_for(&self, task_id: TaskId) -> Vec<AuditEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.task_id == Some(task_id))
            .cloned()
            .collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        let mut events = self.events.lock();
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_drops_oldest_when_full() {
        let sink = InMemoryAuditSink::new(2);
        for action in [AuditAction::Submitted, AuditAction::Started, AuditAction::Completed] {
            sink.record(AuditEvent::new(None, QueueName::General, "u1", action, None));
        }
        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].action, AuditAction::Started);
        assert_eq!(events[1].action, AuditAction::Completed);
        assert!(events[1].created_at_ms > 0);
    }
}
