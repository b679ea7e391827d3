//! Builder assembling a [`Scheduler`] from configuration and collaborators.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::config::SchedulerConfig;
use crate::core::{
    AlertEvaluator, AuditSink, CircuitBreakerRegistry, CircuitStore, JobQueue, MetricsCollector,
    MetricsStore, PlatformAdapter, RateLimitStore, RateLimiter, SchedulerError, Spawn,
    StaticTierLookup, UserTierLookup, WorkerPool,
};
use crate::infra::InMemoryStateStore;
use crate::runtime::{Scheduler, TokioSpawner};
use crate::util::serde::SubscriptionTier;

/// Builder for [`Scheduler`].
///
/// Stores default to one shared [`InMemoryStateStore`]; the tier lookup
/// defaults to every user on the lowest tier.
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    adapter: Option<Arc<dyn PlatformAdapter>>,
    tiers: Option<Arc<dyn UserTierLookup>>,
    circuit_store: Option<Arc<dyn CircuitStore>>,
    rate_limit_store: Option<Arc<dyn RateLimitStore>>,
    metrics_store: Option<Arc<dyn MetricsStore>>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl SchedulerBuilder {
    /// Start building from a configuration.
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            adapter: None,
            tiers: None,
            circuit_store: None,
            rate_limit_store: None,
            metrics_store: None,
            audit: None,
        }
    }

    /// Configuration being built.
    #[must_use]
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Platform adapter that executes attempts. Required.
    #[must_use]
    pub fn adapter(mut self, adapter: Arc<dyn PlatformAdapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    /// Subscription tier lookup.
    #[must_use]
    pub fn tier_lookup(mut self, tiers: Arc<dyn UserTierLookup>) -> Self {
        self.tiers = Some(tiers);
        self
    }

    /// Store for circuit records.
    #[must_use]
    pub fn circuit_store(mut self, store: Arc<dyn CircuitStore>) -> Self {
        self.circuit_store = Some(store);
        self
    }

    /// Store for quota windows.
    #[must_use]
    pub fn rate_limit_store(mut self, store: Arc<dyn RateLimitStore>) -> Self {
        self.rate_limit_store = Some(store);
        self
    }

    /// Store for metrics snapshots and alerts.
    #[must_use]
    pub fn metrics_store(mut self, store: Arc<dyn MetricsStore>) -> Self {
        self.metrics_store = Some(store);
        self
    }

    /// Use one in-memory store for all three keyspaces.
    #[must_use]
    pub fn state_store(self, store: &Arc<InMemoryStateStore>) -> Self {
        self.circuit_store(store.clone())
            .rate_limit_store(store.clone())
            .metrics_store(store.clone())
    }

    /// Audit sink for lifecycle events.
    #[must_use]
    pub fn audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Build on the current tokio runtime.
    pub fn build(self) -> Result<Scheduler<TokioSpawner>, SchedulerError> {
        let spawner = TokioSpawner::try_current()
            .ok_or_else(|| SchedulerError::Backend("no tokio runtime available".into()))?;
        self.build_with_spawner(spawner)
    }

    /// Build with an explicit spawner.
    pub fn build_with_spawner<S>(self, spawner: S) -> Result<Scheduler<S>, SchedulerError>
    where
        S: Spawn + Clone + Send + Sync + 'static,
    {
        self.config.validate().map_err(SchedulerError::InvalidConfig)?;
        let adapter = self
            .adapter
            .ok_or_else(|| SchedulerError::InvalidConfig("platform adapter is required".into()))?;
        let tiers = self
            .tiers
            .unwrap_or_else(|| Arc::new(StaticTierLookup::new(SubscriptionTier::Free)));

        let fallback = Arc::new(InMemoryStateStore::new());
        let circuit_store = self
            .circuit_store
            .unwrap_or_else(|| fallback.clone() as Arc<dyn CircuitStore>);
        let rate_limit_store = self
            .rate_limit_store
            .unwrap_or_else(|| fallback.clone() as Arc<dyn RateLimitStore>);
        let metrics_store = self
            .metrics_store
            .unwrap_or_else(|| fallback as Arc<dyn MetricsStore>);

        let config = self.config;
        let breaker = Arc::new(CircuitBreakerRegistry::new(
            config.circuit_breaker.clone(),
            circuit_store,
        ));
        let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone(), rate_limit_store));
        let queue = Arc::new(JobQueue::new(config.clone(), breaker, limiter));

        let mut pool = WorkerPool::new(
            Arc::clone(&queue),
            adapter,
            spawner.clone(),
            Duration::from_millis(config.scan_interval_ms),
        );
        if let Some(audit) = &self.audit {
            pool = pool.with_audit(Arc::clone(audit));
        }

        let metrics = Arc::new(MetricsCollector::new(
            Arc::clone(&queue),
            Arc::clone(&metrics_store),
            config.metrics.clone(),
        ));
        let alerts = Arc::new(AlertEvaluator::new(metrics_store, config.alerts.clone()));
        let (stop_tx, _) = watch::channel(false);

        Ok(Scheduler {
            config,
            queue,
            pool: Arc::new(pool),
            metrics,
            alerts,
            tiers,
            audit: self.audit,
            spawner,
            started: AtomicBool::new(false),
            stop_tx,
        })
    }
}
