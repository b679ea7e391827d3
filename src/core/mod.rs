//! Core scheduling: admission control, queueing, dispatch, and health tracking.

pub mod alerting;
pub mod audit;
pub mod circuit_breaker;
pub mod error;
pub mod executor;
pub mod job_queue;
pub mod metrics;
pub mod rate_limiter;
pub mod store;
pub mod task;
pub mod worker_pool;

pub use alerting::{Alert, AlertEvaluator, AlertRule, AlertSeverity};
pub use audit::{AuditAction, AuditEvent, AuditSink, InMemoryAuditSink};
pub use circuit_breaker::{CircuitBreakerRegistry, CircuitRecord, CircuitState, Transition};
pub use error::{AdapterError, AdmissionDenial, AppResult, SchedulerError, StoreError};
pub use executor::{PlatformAdapter, Spawn, StaticTierLookup, UserTierLookup};
pub use job_queue::{CleanupReport, FailureOutcome, FinishedTask, JobQueue, QueueCounts};
pub use metrics::{MetricsCollector, QueueMetricsSnapshot};
pub use rate_limiter::{RateLimitStatus, RateLimitWindow, RateLimiter};
pub use store::{CircuitStore, MetricsStore, RateLimitStore};
pub use task::{
    ApplyPayload, EnqueueOptions, SearchPayload, Task, TaskKind, TaskOutput, TaskPayload,
    TaskStatus,
};
pub use worker_pool::{PoolStats, WorkerPool};
