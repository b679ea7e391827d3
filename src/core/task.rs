//! Task model: typed payloads, lifecycle status, and submission options.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::util::serde::{Priority, QueueName, TaskId};

/// Output returned by a platform adapter and stored on the task.
pub type TaskOutput = serde_json::Value;

/// Kind of automation a task performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Search a platform for matching job postings.
    Search,
    /// Submit an application to one posting.
    Apply,
}

/// Search parameters.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SearchPayload {
    /// Search keywords.
    pub keywords: Vec<String>,
    /// Location filter.
    pub location: Option<String>,
    /// Upper bound on postings collected.
    pub max_results: u32,
    /// Platform-specific filters (remote, experience level, ...).
    #[serde(default)]
    pub filters: BTreeMap<String, String>,
}

/// Application parameters.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ApplyPayload {
    /// Posting identifier on the platform.
    pub job_id: String,
    /// Posting URL.
    pub job_url: String,
    /// Resume to attach.
    pub resume_id: Option<String>,
    /// Cover letter text.
    pub cover_letter: Option<String>,
    /// Answers to screening questions keyed by question.
    #[serde(default)]
    pub answers: BTreeMap<String, String>,
}

/// Task payload tagged by task kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum TaskPayload {
    /// Search payload.
    Search(SearchPayload),
    /// Apply payload.
    Apply(ApplyPayload),
}

impl TaskPayload {
    /// Kind of task this payload drives.
    #[must_use]
    pub const fn kind(&self) -> TaskKind {
        match self {
            Self::Search(_) => TaskKind::Search,
            Self::Apply(_) => TaskKind::Apply,
        }
    }
}

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting to run, possibly delayed by backoff.
    Pending,
    /// Currently executing.
    Processing,
    /// Finished successfully.
    Completed,
    /// Attempts exhausted.
    Failed,
}

impl TaskStatus {
    /// Completed or failed.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// A unit of automation work owned by the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier.
    pub id: TaskId,
    /// Platform the work targets.
    pub platform: String,
    /// Queue partition holding the task.
    pub queue: QueueName,
    /// Lower values run first.
    pub priority: Priority,
    /// Typed payload.
    pub payload: TaskPayload,
    /// Attempts started so far.
    pub attempts: u32,
    /// Attempts allowed before the task fails terminally.
    pub max_attempts: u32,
    /// Lifecycle status.
    pub status: TaskStatus,
    /// Submitting user.
    pub owner_user_id: String,
    /// Submission time (ms since epoch).
    pub created_at_ms: u128,
    /// Start time of the latest attempt.
    pub last_attempt_at_ms: Option<u128>,
    /// Earliest time a pending task may start.
    pub available_at_ms: u128,
    /// Completion or terminal failure time.
    pub finished_at_ms: Option<u128>,
    /// Adapter output on success.
    pub result: Option<TaskOutput>,
    /// Message of the latest failure.
    pub error: Option<String>,
}

impl Task {
    /// Kind of task.
    #[must_use]
    pub const fn kind(&self) -> TaskKind {
        self.payload.kind()
    }

    /// Duration of the final attempt, once finished.
    #[must_use]
    pub fn latency_ms(&self) -> Option<u128> {
        match (self.last_attempt_at_ms, self.finished_at_ms) {
            (Some(start), Some(end)) => Some(end.saturating_sub(start)),
            _ => None,
        }
    }
}

/// Submission-time options for a task.
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    /// Submitting user.
    pub user_id: String,
    /// Explicit priority; defaults from the user's tier.
    pub priority: Option<Priority>,
    /// Attempt budget; defaults from the retry config.
    pub max_attempts: Option<u32>,
    /// Hold the task back before its first attempt.
    pub delay: Option<Duration>,
    /// Target queue; defaults to the platform's own queue.
    pub queue: Option<QueueName>,
}

impl EnqueueOptions {
    /// Options for a user with every other field defaulted.
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    /// Set an explicit priority.
    #[must_use]
    pub fn with_priority(mut self, priority: impl Into<Priority>) -> Self {
        self.priority = Some(priority.into());
        self
    }

    /// Set the attempt budget.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Delay the first attempt.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Route to a specific queue.
    #[must_use]
    pub fn in_queue(mut self, queue: QueueName) -> Self {
        self.queue = Some(queue);
        self
    }
}
