//! Partitioned priority job queue with admission control and retry backoff.
//!
//! One [`JobQueue`] holds every partition: a queue per platform plus the
//! general queue. Within a partition pending tasks are ordered by
//! `(priority, created_at_ms, sequence)`. Tasks held back by a delay or retry
//! backoff sit in a separate due-time index until they become ready.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{QueueConfig, RetentionPolicy, RetryConfig, SchedulerConfig};
use crate::core::circuit_breaker::{CircuitBreakerRegistry, CircuitState};
use crate::core::error::{AdmissionDenial, SchedulerError};
use crate::core::rate_limiter::RateLimiter;
use crate::core::task::{EnqueueOptions, Task, TaskOutput, TaskPayload, TaskStatus};
use crate::util::clock::after;
use crate::util::serde::{new_task_id, Priority, QueueName, SubscriptionTier, TaskId};

/// Ordering key for ready tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct ReadyKey {
    priority: Priority,
    created_at_ms: u128,
    seq: u64,
    id: TaskId,
}

/// Ordering key for delayed tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct DelayedKey {
    available_at_ms: u128,
    seq: u64,
    id: TaskId,
}

struct Partition {
    config: QueueConfig,
    ready: BTreeSet<ReadyKey>,
    delayed: BTreeSet<DelayedKey>,
    active: usize,
}

impl Partition {
    const fn new(config: QueueConfig) -> Self {
        Self {
            config,
            ready: BTreeSet::new(),
            delayed: BTreeSet::new(),
            active: 0,
        }
    }

    fn has_capacity(&self) -> bool {
        self.active < self.config.concurrency
    }
}

struct Entry {
    task: Task,
    seq: u64,
}

impl Entry {
    const fn ready_key(&self) -> ReadyKey {
        ReadyKey {
            priority: self.task.priority,
            created_at_ms: self.task.created_at_ms,
            seq: self.seq,
            id: self.task.id,
        }
    }

    const fn delayed_key(&self) -> DelayedKey {
        DelayedKey {
            available_at_ms: self.task.available_at_ms,
            seq: self.seq,
            id: self.task.id,
        }
    }
}

struct QueueState {
    entries: HashMap<TaskId, Entry>,
    partitions: BTreeMap<QueueName, Partition>,
    inflight_by_platform: HashMap<String, usize>,
    next_seq: u64,
}

/// Per-status task counts for one queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    /// Ready to run.
    pub waiting: u64,
    /// Currently executing.
    pub active: u64,
    /// Held back by a delay or retry backoff.
    pub delayed: u64,
    /// Retained completed tasks.
    pub completed: u64,
    /// Retained failed tasks.
    pub failed: u64,
}

/// What happened to a task after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FailureOutcome {
    /// Returned to pending until `retry_at_ms`.
    Retrying {
        /// Attempts used so far.
        attempts: u32,
        /// Earliest next attempt (ms since epoch).
        retry_at_ms: u128,
    },
    /// Attempts exhausted; the task is terminally failed.
    Exhausted {
        /// Attempts used.
        attempts: u32,
    },
}

/// Summary of a retention pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    /// Completed tasks removed.
    pub removed_completed: usize,
    /// Failed tasks removed.
    pub removed_failed: usize,
}

/// Finished task summary used by metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinishedTask {
    /// Completed or failed.
    pub status: TaskStatus,
    /// Finish time (ms since epoch).
    pub finished_at_ms: u128,
    /// Duration of the final attempt.
    pub latency_ms: u128,
}

/// Partitioned priority queue gated by the circuit breaker and rate limiter.
pub struct JobQueue {
    state: Mutex<QueueState>,
    config: SchedulerConfig,
    breaker: Arc<CircuitBreakerRegistry>,
    limiter: Arc<RateLimiter>,
}

impl JobQueue {
    /// Create a queue. Partitions named in `config.queues` exist up front;
    /// others are created on first use with `config.default_queue`.
    pub fn new(
        config: SchedulerConfig,
        breaker: Arc<CircuitBreakerRegistry>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        let partitions = config
            .queues
            .iter()
            .map(|(key, cfg)| (QueueName::from_key(key), Partition::new(cfg.clone())))
            .collect();
        Self {
            state: Mutex::new(QueueState {
                entries: HashMap::new(),
                partitions,
                inflight_by_platform: HashMap::new(),
                next_seq: 0,
            }),
            config,
            breaker,
            limiter,
        }
    }

    /// Circuit breaker consulted for admission and dispatch.
    #[must_use]
    pub const fn breaker(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breaker
    }

    /// Rate limiter consulted for admission.
    #[must_use]
    pub const fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Retry policy.
    #[must_use]
    pub const fn retry_config(&self) -> &RetryConfig {
        &self.config.retry
    }

    /// Settings for a queue.
    #[must_use]
    pub fn queue_config(&self, queue: &QueueName) -> QueueConfig {
        let state = self.state.lock();
        state
            .partitions
            .get(queue)
            .map_or_else(|| self.config.queue(queue), |p| p.config.clone())
    }

    /// Known queue names.
    #[must_use]
    pub fn queue_names(&self) -> Vec<QueueName> {
        self.state.lock().partitions.keys().cloned().collect()
    }

    /// Admit and enqueue a task.
    ///
    /// Refused with [`SchedulerError::AdmissionDenied`] when the platform's
    /// circuit is open or the user's quota is spent; a refused task is never
    /// stored. Priority defaults from `tier` unless set in `options`.
    pub fn enqueue(
        &self,
        platform: &str,
        payload: TaskPayload,
        options: EnqueueOptions,
        tier: SubscriptionTier,
        now_ms: u128,
    ) -> Result<Task, SchedulerError> {
        let circuit = self.breaker.get_status(platform, now_ms);
        if circuit.is_open() {
            warn!(platform, user_id = %options.user_id, "submission refused: circuit open");
            return Err(AdmissionDenial::CircuitOpen {
                platform: platform.to_string(),
                retry_at_ms: circuit.next_reset_at_ms,
            }
            .into());
        }

        let quota = self.limiter.consume(platform, &options.user_id, tier, now_ms);
        if !quota.allowed {
            return Err(AdmissionDenial::RateLimited {
                platform: platform.to_string(),
                user_id: options.user_id,
                reset_in_secs: quota.reset_in_secs,
            }
            .into());
        }

        let queue = options
            .queue
            .unwrap_or_else(|| QueueName::platform(platform));
        let available_at_ms = options.delay.map_or(now_ms, |d| after(now_ms, d));
        let task = Task {
            id: new_task_id(),
            platform: platform.to_string(),
            queue: queue.clone(),
            priority: options.priority.unwrap_or_else(|| tier.default_priority()),
            payload,
            attempts: 0,
            max_attempts: options.max_attempts.unwrap_or(self.config.retry.max_attempts).max(1),
            status: TaskStatus::Pending,
            owner_user_id: options.user_id,
            created_at_ms: now_ms,
            last_attempt_at_ms: None,
            available_at_ms,
            finished_at_ms: None,
            result: None,
            error: None,
        };

        let mut state = self.state.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        let entry = Entry {
            task: task.clone(),
            seq,
        };
        let default_config = self.config.queue(&queue);
        let partition = state
            .partitions
            .entry(queue.clone())
            .or_insert_with(|| Partition::new(default_config));
        if available_at_ms > now_ms {
            partition.delayed.insert(entry.delayed_key());
        } else {
            partition.ready.insert(entry.ready_key());
        }
        state.entries.insert(task.id, entry);
        drop(state);

        debug!(
            task_id = %task.id,
            queue = %queue,
            platform,
            priority = %task.priority,
            "task enqueued"
        );
        Ok(task)
    }

    /// Start the most urgent admissible task across all queues.
    ///
    /// A queue is eligible while it has spare concurrency. Tasks for a
    /// platform whose circuit is open are skipped; while a circuit is
    /// half-open at most one task for that platform may be in flight. The
    /// returned task is `Processing` with its attempt counted.
    pub fn dequeue_next(&self, now_ms: u128) -> Option<Task> {
        let mut state = self.state.lock();
        promote_due(&mut state, now_ms);

        let mut circuits: HashMap<String, CircuitState> = HashMap::new();
        let mut best: Option<(ReadyKey, QueueName)> = None;

        for (name, partition) in &state.partitions {
            if !partition.has_capacity() {
                continue;
            }
            let candidate = partition.ready.iter().find(|key| {
                let Some(entry) = state.entries.get(&key.id) else {
                    return false;
                };
                let platform = &entry.task.platform;
                let circuit = *circuits
                    .entry(platform.clone())
                    .or_insert_with(|| self.breaker.get_status(platform, now_ms).state);
                match circuit {
                    CircuitState::Closed => true,
                    CircuitState::Open => false,
                    CircuitState::HalfOpen => {
                        state.inflight_by_platform.get(platform).copied().unwrap_or(0) == 0
                    }
                }
            });
            if let Some(key) = candidate {
                if best.as_ref().is_none_or(|(b, _)| key < b) {
                    best = Some((*key, name.clone()));
                }
            }
        }

        let (key, queue) = best?;
        let partition = state.partitions.get_mut(&queue)?;
        partition.ready.remove(&key);
        partition.active += 1;
        let entry = state.entries.get_mut(&key.id)?;
        entry.task.status = TaskStatus::Processing;
        entry.task.attempts += 1;
        entry.task.last_attempt_at_ms = Some(now_ms);
        let task = entry.task.clone();
        *state
            .inflight_by_platform
            .entry(task.platform.clone())
            .or_insert(0) += 1;
        drop(state);

        debug!(
            task_id = %task.id,
            queue = %queue,
            attempt = task.attempts,
            max_attempts = task.max_attempts,
            "task started"
        );
        Some(task)
    }

    /// Mark a processing task completed and report success to the breaker.
    pub fn complete_task(
        &self,
        id: TaskId,
        result: TaskOutput,
        now_ms: u128,
    ) -> Result<Task, SchedulerError> {
        let task = {
            let mut state = self.state.lock();
            let task = finish_processing(&mut state, id)?;
            task.status = TaskStatus::Completed;
            task.result = Some(result);
            task.error = None;
            task.finished_at_ms = Some(now_ms);
            task.clone()
        };
        self.breaker.record_success(&task.platform, now_ms);
        info!(task_id = %id, platform = %task.platform, attempts = task.attempts, "task completed");
        Ok(task)
    }

    /// Record a failed attempt.
    ///
    /// With attempts left the task returns to pending after
    /// `RetryConfig::backoff_delay(attempts)`; otherwise it fails terminally.
    /// Terminal failures are reported to the breaker, and so is any failure
    /// while the platform's circuit is half-open.
    pub fn fail_task(
        &self,
        id: TaskId,
        error: impl Into<String>,
        now_ms: u128,
    ) -> Result<(Task, FailureOutcome), SchedulerError> {
        let error = error.into();
        let (task, outcome) = {
            let mut state = self.state.lock();
            let task = finish_processing(&mut state, id)?;
            task.error = Some(error.clone());
            let outcome = if task.attempts < task.max_attempts {
                let retry_at_ms = after(now_ms, self.config.retry.backoff_delay(task.attempts));
                task.status = TaskStatus::Pending;
                task.available_at_ms = retry_at_ms;
                FailureOutcome::Retrying {
                    attempts: task.attempts,
                    retry_at_ms,
                }
            } else {
                task.status = TaskStatus::Failed;
                task.finished_at_ms = Some(now_ms);
                FailureOutcome::Exhausted {
                    attempts: task.attempts,
                }
            };
            let task = task.clone();
            if task.status == TaskStatus::Pending {
                if let Some(entry) = state.entries.get(&id) {
                    let key = entry.delayed_key();
                    if let Some(partition) = state.partitions.get_mut(&task.queue) {
                        partition.delayed.insert(key);
                    }
                }
            }
            // Reported under the queue lock so the released probe slot is not
            // handed out before a failed probe reopens the circuit.
            if self.reports_failure(&task.platform, &outcome, now_ms) {
                self.breaker.record_failure(&task.platform, now_ms);
            }
            (task, outcome)
        };

        match outcome {
            FailureOutcome::Retrying { retry_at_ms, .. } => {
                warn!(
                    task_id = %id,
                    platform = %task.platform,
                    attempts = task.attempts,
                    retry_in_ms = %retry_at_ms.saturating_sub(now_ms),
                    error = %error,
                    "task attempt failed, retrying"
                );
            }
            FailureOutcome::Exhausted { .. } => {
                warn!(
                    task_id = %id,
                    platform = %task.platform,
                    attempts = task.attempts,
                    error = %error,
                    "task failed permanently"
                );
            }
        }
        Ok((task, outcome))
    }

    fn reports_failure(&self, platform: &str, outcome: &FailureOutcome, now_ms: u128) -> bool {
        match outcome {
            FailureOutcome::Exhausted { .. } => true,
            FailureOutcome::Retrying { .. } => {
                self.breaker.config().count_retryable_failures
                    || self.breaker.get_status(platform, now_ms).state == CircuitState::HalfOpen
            }
        }
    }

    /// Look up a task within a queue.
    #[must_use]
    pub fn get_job(&self, queue: &QueueName, id: TaskId) -> Option<Task> {
        let state = self.state.lock();
        state
            .entries
            .get(&id)
            .filter(|e| &e.task.queue == queue)
            .map(|e| e.task.clone())
    }

    /// Tasks owned by a user in a queue, newest first.
    #[must_use]
    pub fn get_user_jobs(
        &self,
        queue: &QueueName,
        user_id: &str,
        status: Option<TaskStatus>,
    ) -> Vec<Task> {
        let state = self.state.lock();
        let mut tasks: Vec<Task> = state
            .entries
            .values()
            .map(|e| &e.task)
            .filter(|t| &t.queue == queue && t.owner_user_id == user_id)
            .filter(|t| status.is_none_or(|s| t.status == s))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| b.created_at_ms.cmp(&a.created_at_ms));
        tasks
    }

    /// Per-status counts for a queue.
    #[must_use]
    pub fn counts(&self, queue: &QueueName, now_ms: u128) -> QueueCounts {
        let state = self.state.lock();
        let Some(partition) = state.partitions.get(queue) else {
            return QueueCounts::default();
        };
        let due = partition
            .delayed
            .iter()
            .take_while(|k| k.available_at_ms <= now_ms)
            .count();
        let mut counts = QueueCounts {
            waiting: (partition.ready.len() + due) as u64,
            active: partition.active as u64,
            delayed: (partition.delayed.len() - due) as u64,
            completed: 0,
            failed: 0,
        };
        for entry in state.entries.values().filter(|e| &e.task.queue == queue) {
            match entry.task.status {
                TaskStatus::Completed => counts.completed += 1,
                TaskStatus::Failed => counts.failed += 1,
                TaskStatus::Pending | TaskStatus::Processing => {}
            }
        }
        counts
    }

    /// Tasks in flight for a platform across all queues.
    #[must_use]
    pub fn in_flight(&self, platform: &str) -> usize {
        self.state
            .lock()
            .inflight_by_platform
            .get(platform)
            .copied()
            .unwrap_or(0)
    }

    /// Finished tasks of a queue with `finished_at_ms >= since_ms`, newest first.
    #[must_use]
    pub fn finished_since(&self, queue: &QueueName, since_ms: u128) -> Vec<FinishedTask> {
        let state = self.state.lock();
        let mut finished: Vec<FinishedTask> = state
            .entries
            .values()
            .map(|e| &e.task)
            .filter(|t| &t.queue == queue && t.status.is_terminal())
            .filter_map(|t| {
                let finished_at_ms = t.finished_at_ms?;
                (finished_at_ms >= since_ms).then(|| FinishedTask {
                    status: t.status,
                    finished_at_ms,
                    latency_ms: t.latency_ms().unwrap_or(0),
                })
            })
            .collect();
        finished.sort_by(|a, b| b.finished_at_ms.cmp(&a.finished_at_ms));
        finished
    }

    /// Prune finished tasks beyond the retention policy.
    pub fn cleanup(&self, policy: &RetentionPolicy, now_ms: u128) -> CleanupReport {
        let mut state = self.state.lock();
        let mut report = CleanupReport::default();
        let queues: Vec<QueueName> = state.partitions.keys().cloned().collect();
        let max_age_cutoff = policy
            .failed_max_age_secs
            .map(|secs| now_ms.saturating_sub(u128::from(secs) * 1000));

        for queue in queues {
            let mut completed: Vec<(u128, TaskId)> = Vec::new();
            let mut failed: Vec<(u128, TaskId)> = Vec::new();
            for entry in state.entries.values().filter(|e| e.task.queue == queue) {
                let finished = entry.task.finished_at_ms.unwrap_or(entry.task.created_at_ms);
                match entry.task.status {
                    TaskStatus::Completed => completed.push((finished, entry.task.id)),
                    TaskStatus::Failed => failed.push((finished, entry.task.id)),
                    TaskStatus::Pending | TaskStatus::Processing => {}
                }
            }
            completed.sort_by(|a, b| b.cmp(a));
            failed.sort_by(|a, b| b.cmp(a));

            for (_, id) in completed.iter().skip(policy.keep_completed) {
                state.entries.remove(id);
                report.removed_completed += 1;
            }
            for (idx, (finished, id)) in failed.iter().enumerate() {
                let too_old = max_age_cutoff.is_some_and(|cutoff| *finished < cutoff);
                if idx >= policy.keep_failed || too_old {
                    state.entries.remove(id);
                    report.removed_failed += 1;
                }
            }
        }
        drop(state);

        if report.removed_completed + report.removed_failed > 0 {
            info!(
                removed_completed = report.removed_completed,
                removed_failed = report.removed_failed,
                "finished tasks pruned"
            );
        }
        report
    }
}

/// Move delayed tasks whose time has come into their ready sets.
fn promote_due(state: &mut QueueState, now_ms: u128) {
    let QueueState {
        entries,
        partitions,
        ..
    } = state;
    for partition in partitions.values_mut() {
        while let Some(key) = partition.delayed.first().copied() {
            if key.available_at_ms > now_ms {
                break;
            }
            partition.delayed.remove(&key);
            if let Some(entry) = entries.get(&key.id) {
                partition.ready.insert(entry.ready_key());
            }
        }
    }
}

/// Release the slot held by a processing task and hand back the task.
fn finish_processing(state: &mut QueueState, id: TaskId) -> Result<&mut Task, SchedulerError> {
    let QueueState {
        entries,
        partitions,
        inflight_by_platform,
        ..
    } = state;
    let entry = entries.get_mut(&id).ok_or(SchedulerError::TaskNotFound(id))?;
    if entry.task.status != TaskStatus::Processing {
        return Err(SchedulerError::InvalidState {
            id,
            status: entry.task.status,
        });
    }
    if let Some(partition) = partitions.get_mut(&entry.task.queue) {
        partition.active = partition.active.saturating_sub(1);
    }
    if let Some(n) = inflight_by_platform.get_mut(&entry.task.platform) {
        *n = n.saturating_sub(1);
    }
    Ok(&mut entry.task)
}
