//! Configuration models for queues, admission control, retries, and monitoring.

pub mod env;
pub mod scheduler;

pub use env::ENV_PREFIX;
pub use scheduler::{
    AlertConfig, AlertPolicy, CircuitBreakerConfig, MetricsConfig, QueueConfig, RateLimitConfig,
    RetentionPolicy, RetryConfig, SchedulerConfig, TierMultipliers,
};
