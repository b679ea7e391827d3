//! Worker pool that drains admissible tasks from the [`JobQueue`].
//!
//! Concurrency per queue is enforced by the queue's slot accounting: the pool
//! simply keeps asking for the next admissible task and runs each one on the
//! spawner. A scan runs on a fixed interval and whenever a slot frees up or a
//! task is submitted.
//!
//! # Key Features
//!
//! - **Timeouts**: each attempt is bounded by its queue's `task_timeout_secs`
//! - **Isolation**: adapter errors and panics fail only the task at hand
//! - **Lock-free stats**: atomic counters snapshot into [`PoolStats`]

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, Notify};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::core::audit::{AuditAction, AuditEvent, AuditSink};
use crate::core::executor::{PlatformAdapter, Spawn};
use crate::core::job_queue::{FailureOutcome, JobQueue};
use crate::core::task::{Task, TaskOutput};
use crate::util::clock::now_ms;

/// Statistics about pool utilization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Attempts currently executing.
    pub active_tasks: u64,
    /// Attempts started.
    pub dispatched: u64,
    /// Tasks completed successfully.
    pub completed: u64,
    /// Attempts that failed and were rescheduled.
    pub retried: u64,
    /// Tasks that exhausted their attempts.
    pub failed: u64,
    /// Attempts cut off by the timeout.
    pub timed_out: u64,
}

/// Internal counters for pool statistics (thread-safe).
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub active_tasks: AtomicU64,
    pub dispatched: AtomicU64,
    pub completed: AtomicU64,
    pub retried: AtomicU64,
    pub failed: AtomicU64,
    pub timed_out: AtomicU64,
}

impl PoolCounters {
    /// Get a snapshot of current statistics.
    pub fn snapshot(&self) -> PoolStats {
        PoolStats {
            active_tasks: self.active_tasks.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
        }
    }
}

/// Bounded-concurrency executor for queued tasks.
pub struct WorkerPool<S> {
    queue: Arc<JobQueue>,
    adapter: Arc<dyn PlatformAdapter>,
    spawner: S,
    counters: Arc<PoolCounters>,
    wake: Arc<Notify>,
    shutdown: Arc<AtomicBool>,
    audit: Option<Arc<dyn AuditSink>>,
    scan_interval: Duration,
}

impl<S> WorkerPool<S>
where
    S: Spawn + Clone + Send + Sync + 'static,
{
    /// Create a pool over `queue` executing through `adapter`.
    pub fn new(
        queue: Arc<JobQueue>,
        adapter: Arc<dyn PlatformAdapter>,
        spawner: S,
        scan_interval: Duration,
    ) -> Self {
        Self {
            queue,
            adapter,
            spawner,
            counters: Arc::new(PoolCounters::default()),
            wake: Arc::new(Notify::new()),
            shutdown: Arc::new(AtomicBool::new(false)),
            audit: None,
            scan_interval,
        }
    }

    /// Attach an audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Request an immediate scan.
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    /// Get current pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.counters.snapshot()
    }

    /// True once [`Self::shutdown`] has been called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Stop scanning. Attempts already running finish normally.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Shutting down worker pool");
        self.wake.notify_one();
    }

    /// Start every admissible task that fits in a free slot.
    /// Returns the number of attempts started.
    pub fn dispatch_ready(&self) -> usize {
        let mut started = 0;
        while !self.is_shut_down() {
            let Some(task) = self.queue.dequeue_next(now_ms()) else {
                break;
            };
            started += 1;
            self.spawn_attempt(task);
        }
        if started > 0 {
            debug!(started, "dispatched tasks");
        }
        started
    }

    /// Scan loop: dispatch on every interval tick and every wake-up until shutdown.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.scan_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(scan_interval_ms = self.scan_interval.as_millis() as u64, "worker pool started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                () = self.wake.notified() => {}
            }
            if self.is_shut_down() {
                break;
            }
            self.dispatch_ready();
        }
        info!("worker pool stopped");
    }

    fn record(&self, task: &Task, action: AuditAction, detail: Option<String>) {
        record_audit(self.audit.as_ref(), task, action, detail);
    }

    fn spawn_attempt(&self, task: Task) {
        self.counters.dispatched.fetch_add(1, Ordering::Relaxed);
        self.counters.active_tasks.fetch_add(1, Ordering::Relaxed);
        self.record(&task, AuditAction::Started, Some(format!("attempt {}", task.attempts)));

        let queue = Arc::clone(&self.queue);
        let adapter = Arc::clone(&self.adapter);
        let counters = Arc::clone(&self.counters);
        let wake = Arc::clone(&self.wake);
        let audit = self.audit.clone();
        let timeout = queue.queue_config(&task.queue).task_timeout();
        let spawner = self.spawner.clone();

        self.spawner.spawn(async move {
            debug!(task_id = %task.id, platform = %task.platform, attempt = task.attempts, "executing task");
            let outcome = execute_attempt(&spawner, adapter, task.clone(), timeout, &counters).await;
            settle(&queue, &task, outcome, &counters, audit.as_ref());
            counters.active_tasks.fetch_sub(1, Ordering::Relaxed);
            // A slot is free; let the scan loop refill it.
            wake.notify_one();
        });
    }
}

/// Run one attempt with a timeout, isolating adapter panics.
///
/// The adapter call runs as its own task on `spawner`. A panic drops the
/// result sender, which reads as a failed attempt; on timeout the cancel
/// sender is dropped and the adapter future is dropped with it.
async fn execute_attempt<S: Spawn>(
    spawner: &S,
    adapter: Arc<dyn PlatformAdapter>,
    task: Task,
    timeout: Duration,
    counters: &PoolCounters,
) -> Result<TaskOutput, String> {
    let (result_tx, result_rx) = oneshot::channel();
    let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
    spawner.spawn(async move {
        tokio::select! {
            result = adapter.execute(&task) => {
                let _ = result_tx.send(result);
            }
            _ = cancel_rx => {}
        }
    });
    match tokio::time::timeout(timeout, result_rx).await {
        Ok(Ok(Ok(output))) => Ok(output),
        Ok(Ok(Err(e))) => Err(e.to_string()),
        Ok(Err(_)) => {
            error!("platform adapter panicked");
            Err("adapter panicked before returning a result".into())
        }
        Err(_) => {
            drop(cancel_tx);
            counters.timed_out.fetch_add(1, Ordering::Relaxed);
            Err(format!("timed out after {}ms", timeout.as_millis()))
        }
    }
}

/// Report an attempt's outcome to the queue.
fn settle(
    queue: &JobQueue,
    task: &Task,
    outcome: Result<TaskOutput, String>,
    counters: &PoolCounters,
    audit: Option<&Arc<dyn AuditSink>>,
) {
    let now = now_ms();
    match outcome {
        Ok(output) => match queue.complete_task(task.id, output, now) {
            Ok(_) => {
                counters.completed.fetch_add(1, Ordering::Relaxed);
                record_audit(audit, task, AuditAction::Completed, None);
            }
            Err(e) => warn!(task_id = %task.id, error = %e, "could not mark task completed"),
        },
        Err(message) => match queue.fail_task(task.id, message.clone(), now) {
            Ok((_, FailureOutcome::Retrying { retry_at_ms, .. })) => {
                counters.retried.fetch_add(1, Ordering::Relaxed);
                record_audit(
                    audit,
                    task,
                    AuditAction::Retried,
                    Some(format!("{message}; retry at {retry_at_ms}")),
                );
            }
            Ok((_, FailureOutcome::Exhausted { .. })) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                record_audit(audit, task, AuditAction::Failed, Some(message));
            }
            Err(e) => warn!(task_id = %task.id, error = %e, "could not mark task failed"),
        },
    }
}

fn record_audit(
    audit: Option<&Arc<dyn AuditSink>>,
    task: &Task,
    action: AuditAction,
    detail: Option<String>,
) {
    if let Some(sink) = audit {
        sink.record(AuditEvent::new(
            Some(task.id),
            task.queue.clone(),
            task.owner_user_id.clone(),
            action,
            detail,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_stats_default() {
        let stats = PoolStats::default();
        assert_eq!(stats.active_tasks, 0);
        assert_eq!(stats.completed, 0);
    }

    #[test]
    fn test_pool_counters_snapshot() {
        let counters = PoolCounters::default();
        counters.dispatched.fetch_add(10, Ordering::Relaxed);
        counters.completed.fetch_add(5, Ordering::Relaxed);
        counters.timed_out.fetch_add(1, Ordering::Relaxed);

        let stats = counters.snapshot();
        assert_eq!(stats.dispatched, 10);
        assert_eq!(stats.completed, 5);
        assert_eq!(stats.timed_out, 1);
    }
}
