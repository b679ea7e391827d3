//! Error types for scheduler operations.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::task::TaskStatus;
use crate::util::serde::TaskId;

/// Why a submission was refused before it entered any queue.
///
/// Both variants mean "retry later"; a task that ran and exhausted its
/// attempts is reported through [`TaskStatus::Failed`] instead.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum AdmissionDenial {
    /// The user's quota for this platform is used up in the current window.
    #[error("rate limited on {platform} for user {user_id}; resets in {reset_in_secs}s")]
    RateLimited {
        /// Target platform.
        platform: String,
        /// Submitting user.
        user_id: String,
        /// Seconds until the window resets.
        reset_in_secs: u64,
    },
    /// The platform's circuit is open.
    #[error("circuit open for {platform}")]
    CircuitOpen {
        /// Target platform.
        platform: String,
        /// When the circuit will admit a probe (ms since epoch), if known.
        retry_at_ms: Option<u128>,
    },
}

/// Errors produced by scheduler components.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Submission refused by admission control.
    #[error("admission denied: {0}")]
    AdmissionDenied(#[from] AdmissionDenial),
    /// No task with this id in the requested queue.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),
    /// Operation not valid for the task's current status.
    #[error("task {id} is {status:?}")]
    InvalidState {
        /// Task identifier.
        id: TaskId,
        /// Status at the time of the call.
        status: TaskStatus,
    },
    /// State store failure surfaced to the caller.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    /// Collaborator failure with context.
    #[error("backend error: {0}")]
    Backend(String),
    /// Configuration rejected by validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SchedulerError {
    /// True when the caller should retry the submission later.
    #[must_use]
    pub const fn is_admission_denied(&self) -> bool {
        matches!(self, Self::AdmissionDenied(_))
    }
}

/// Failures of a state store backend.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Backend could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// Stored data could not be encoded or decoded.
    #[error("store codec error: {0}")]
    Codec(String),
    /// Underlying I/O failed.
    #[error("store io error: {0}")]
    Io(String),
}

/// Error returned by a platform adapter for one execution attempt.
#[derive(Debug, Clone, Error)]
pub enum AdapterError {
    /// Temporary failure, e.g. network or page load.
    #[error("transient failure: {0}")]
    Transient(String),
    /// The platform refused the action.
    #[error("rejected by platform: {0}")]
    Rejected(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
