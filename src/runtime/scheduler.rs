//! Scheduler facade: submission, introspection, admin controls, and the
//! background loops that keep the queue moving.
//!
//! Build one with [`crate::builders::SchedulerBuilder`]. Nothing runs until
//! [`Scheduler::start`] spawns the loops:
//!
//! - the worker pool scan loop,
//! - the circuit breaker ticker (OPEN to HALF_OPEN deadlines),
//! - the metrics sampler, which also applies the retention policy and
//!   drops expired quota windows,
//! - the alert evaluator.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::core::{
    Alert, AlertEvaluator, AuditAction, AuditEvent, AuditSink, CircuitBreakerRegistry,
    CircuitRecord, CleanupReport, EnqueueOptions, JobQueue, MetricsCollector, PoolStats,
    QueueMetricsSnapshot, RateLimitStatus, RateLimiter, SchedulerError, Spawn, TaskPayload,
    TaskStatus, UserTierLookup, WorkerPool,
};
use crate::runtime::api::{Health, TaskView};
use crate::runtime::tokio_spawner::TokioSpawner;
use crate::util::clock::now_ms;
use crate::util::serde::{QueueName, SubscriptionTier, TaskId};

/// Entry point for callers of the scheduling core.
pub struct Scheduler<S = TokioSpawner> {
    pub(crate) config: SchedulerConfig,
    pub(crate) queue: Arc<JobQueue>,
    pub(crate) pool: Arc<WorkerPool<S>>,
    pub(crate) metrics: Arc<MetricsCollector>,
    pub(crate) alerts: Arc<AlertEvaluator>,
    pub(crate) tiers: Arc<dyn UserTierLookup>,
    pub(crate) audit: Option<Arc<dyn AuditSink>>,
    pub(crate) spawner: S,
    pub(crate) started: AtomicBool,
    pub(crate) stop_tx: watch::Sender<bool>,
}

impl<S> Scheduler<S>
where
    S: Spawn + Clone + Send + Sync + 'static,
{
    /// Effective configuration.
    #[must_use]
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Underlying job queue.
    #[must_use]
    pub const fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    /// Circuit breaker registry.
    #[must_use]
    pub fn breaker(&self) -> &Arc<CircuitBreakerRegistry> {
        self.queue.breaker()
    }

    /// Rate limiter.
    #[must_use]
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        self.queue.limiter()
    }

    /// Worker pool.
    #[must_use]
    pub const fn pool(&self) -> &Arc<WorkerPool<S>> {
        &self.pool
    }

    /// Resolve a user's tier; lookup failures fall back to the lowest tier.
    pub async fn tier_of(&self, user_id: &str) -> SubscriptionTier {
        match self.tiers.tier(user_id).await {
            Ok(tier) => tier,
            Err(e) => {
                warn!(user_id, error = %e, "tier lookup failed, using lowest tier");
                SubscriptionTier::default()
            }
        }
    }

    /// Submit work for a platform.
    ///
    /// Fails with [`SchedulerError::AdmissionDenied`] when the platform's
    /// circuit is open or the user's quota is spent; such a task is never
    /// queued.
    pub async fn submit(
        &self,
        platform: &str,
        payload: TaskPayload,
        options: EnqueueOptions,
    ) -> Result<TaskId, SchedulerError> {
        let tier = self.tier_of(&options.user_id).await;
        let queue = options
            .queue
            .clone()
            .unwrap_or_else(|| QueueName::platform(platform));
        let user_id = options.user_id.clone();

        match self.queue.enqueue(platform, payload, options, tier, now_ms()) {
            Ok(task) => {
                self.record(Some(task.id), queue, user_id, AuditAction::Submitted, None);
                self.pool.wake();
                Ok(task.id)
            }
            Err(e) => {
                if let SchedulerError::AdmissionDenied(denial) = &e {
                    self.record(
                        None,
                        queue,
                        user_id,
                        AuditAction::Rejected,
                        Some(denial.to_string()),
                    );
                }
                Err(e)
            }
        }
    }

    /// Look up a task in a queue as seen by `viewer_id`.
    pub fn get_job(
        &self,
        queue: &QueueName,
        id: TaskId,
        viewer_id: &str,
    ) -> Result<TaskView, SchedulerError> {
        self.queue
            .get_job(queue, id)
            .map(|task| TaskView::for_viewer(&task, viewer_id))
            .ok_or(SchedulerError::TaskNotFound(id))
    }

    /// A user's tasks in a queue, newest first.
    #[must_use]
    pub fn list_user_jobs(
        &self,
        queue: &QueueName,
        user_id: &str,
        status: Option<TaskStatus>,
    ) -> Vec<TaskView> {
        self.queue
            .get_user_jobs(queue, user_id, status)
            .iter()
            .map(|task| TaskView::for_viewer(task, user_id))
            .collect()
    }

    /// Circuit record of every known platform.
    #[must_use]
    pub fn get_all_statuses(&self) -> BTreeMap<String, CircuitRecord> {
        self.breaker().all_statuses(now_ms())
    }

    /// Force a platform's circuit closed. Returns false when the store
    /// rejected the write.
    pub fn reset_circuit_breaker(&self, platform: &str) -> bool {
        let reset = self.breaker().reset(platform);
        if reset {
            self.pool.wake();
        }
        reset
    }

    /// Quota status of a user on a platform.
    pub async fn get_rate_limit_status(&self, platform: &str, user_id: &str) -> RateLimitStatus {
        let tier = self.tier_of(user_id).await;
        self.limiter().status(platform, user_id, tier, now_ms())
    }

    /// Clear a user's quota window. Returns whether one existed.
    pub fn reset_rate_limit(&self, platform: &str, user_id: &str) -> bool {
        self.limiter().reset(platform, user_id)
    }

    /// Latest stored metrics snapshot of a queue.
    #[must_use]
    pub fn get_latest_metrics(&self, queue: &QueueName) -> Option<QueueMetricsSnapshot> {
        self.metrics.latest(queue)
    }

    /// Stored metrics of a queue over the last `hours` hours, oldest first.
    #[must_use]
    pub fn get_historical_metrics(&self, queue: &QueueName, hours: u64) -> Vec<QueueMetricsSnapshot> {
        self.metrics.historical(queue, hours, now_ms())
    }

    /// Most recent alerts, newest first.
    #[must_use]
    pub fn get_recent_alerts(&self, limit: usize) -> Vec<Alert> {
        self.alerts.recent(limit)
    }

    /// Sample every queue now and store the snapshots.
    pub fn collect_metrics(&self) -> Vec<QueueMetricsSnapshot> {
        self.metrics.sample(now_ms())
    }

    /// Evaluate alert rules against the latest snapshots now.
    pub fn evaluate_alerts(&self) -> Vec<Alert> {
        evaluate_latest(&self.queue, &self.metrics, &self.alerts)
    }

    /// Apply the configured retention policy.
    pub fn cleanup(&self) -> CleanupReport {
        self.queue.cleanup(&self.config.retention, now_ms())
    }

    /// Worker pool counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Liveness summary.
    #[must_use]
    pub fn health(&self) -> Health {
        Health {
            ok: !self.pool.is_shut_down(),
            circuits: self
                .get_all_statuses()
                .into_iter()
                .map(|(platform, record)| (platform, record.state))
                .collect(),
            pool: self.stats(),
        }
    }

    /// Spawn the background loops. Calling it again has no effect.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(queues = self.config.queues.len(), "starting scheduler");

        self.spawner.spawn(Arc::clone(&self.pool).run());

        let breaker = Arc::clone(self.breaker());
        let pool = Arc::clone(&self.pool);
        spawn_periodic(
            &self.spawner,
            "breaker ticker",
            Duration::from_millis(self.config.breaker_tick_ms),
            self.stop_tx.subscribe(),
            move || {
                if breaker.tick(now_ms()) > 0 {
                    // Half-open circuits may admit a probe now.
                    pool.wake();
                }
            },
        );

        let metrics = Arc::clone(&self.metrics);
        let queue = Arc::clone(&self.queue);
        let limiter = Arc::clone(self.limiter());
        let retention = self.config.retention.clone();
        spawn_periodic(
            &self.spawner,
            "metrics sampler",
            Duration::from_secs(self.config.metrics.sample_interval_secs),
            self.stop_tx.subscribe(),
            move || {
                let now = now_ms();
                metrics.sample(now);
                queue.cleanup(&retention, now);
                limiter.purge_expired(now);
            },
        );

        let queue = Arc::clone(&self.queue);
        let metrics = Arc::clone(&self.metrics);
        let alerts = Arc::clone(&self.alerts);
        spawn_periodic(
            &self.spawner,
            "alert evaluator",
            Duration::from_secs(self.config.alerts.eval_interval_secs),
            self.stop_tx.subscribe(),
            move || {
                evaluate_latest(&queue, &metrics, &alerts);
            },
        );
    }

    /// Stop the background loops. Attempts already running finish normally.
    pub fn shutdown(&self) {
        info!("shutting down scheduler");
        self.pool.shutdown();
        self.stop_tx.send_replace(true);
    }

    fn record(
        &self,
        task_id: Option<TaskId>,
        queue: QueueName,
        user_id: String,
        action: AuditAction,
        detail: Option<String>,
    ) {
        if let Some(sink) = &self.audit {
            sink.record(AuditEvent::new(task_id, queue, user_id, action, detail));
        }
    }
}

fn evaluate_latest(
    queue: &JobQueue,
    metrics: &MetricsCollector,
    alerts: &AlertEvaluator,
) -> Vec<Alert> {
    let snapshots: Vec<QueueMetricsSnapshot> = queue
        .queue_names()
        .iter()
        .filter_map(|q| metrics.latest(q))
        .collect();
    alerts.evaluate(&snapshots, now_ms())
}

fn spawn_periodic<S, F>(
    spawner: &S,
    name: &'static str,
    period: Duration,
    mut stop: watch::Receiver<bool>,
    mut job: F,
) where
    S: Spawn,
    F: FnMut() + Send + 'static,
{
    spawner.spawn(async move {
        if *stop.borrow() {
            return;
        }
        // First run after one full period.
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(task = name, period_ms = period.as_millis() as u64, "background loop started");
        loop {
            tokio::select! {
                _ = ticker.tick() => job(),
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }
        debug!(task = name, "background loop stopped");
    });
}
