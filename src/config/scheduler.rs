//! Scheduler configuration structures.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::util::serde::{QueueName, SubscriptionTier};

/// Per-queue worker settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum tasks processed concurrently from this queue.
    pub concurrency: usize,
    /// Execution timeout per attempt in seconds.
    pub task_timeout_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            task_timeout_secs: 300,
        }
    }
}

impl QueueConfig {
    /// Execution timeout as a duration.
    #[must_use]
    pub const fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    /// Validate queue settings.
    pub fn validate(&self) -> Result<(), String> {
        if self.concurrency == 0 {
            return Err("concurrency must be greater than 0".into());
        }
        if self.task_timeout_secs == 0 {
            return Err("task_timeout_secs must be greater than 0".into());
        }
        Ok(())
    }
}

/// Circuit breaker thresholds applied to every platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open a closed circuit.
    pub failure_threshold: u32,
    /// Consecutive half-open successes that close the circuit.
    pub success_threshold: u32,
    /// Time an open circuit waits before allowing a probe.
    pub reset_timeout_ms: u64,
    /// Report every failed attempt, not only exhausted tasks, to the breaker.
    pub count_retryable_failures: bool,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout_ms: 60_000,
            count_retryable_failures: false,
        }
    }
}

impl CircuitBreakerConfig {
    /// Validate thresholds.
    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold == 0 {
            return Err("failure_threshold must be greater than 0".into());
        }
        if self.success_threshold == 0 {
            return Err("success_threshold must be greater than 0".into());
        }
        if self.reset_timeout_ms == 0 {
            return Err("reset_timeout_ms must be greater than 0".into());
        }
        Ok(())
    }
}

/// Quota multipliers per subscription tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierMultipliers {
    /// Multiplier for the free tier.
    pub free: u32,
    /// Multiplier for the pro tier.
    pub pro: u32,
    /// Multiplier for the premium tier.
    pub premium: u32,
}

impl Default for TierMultipliers {
    fn default() -> Self {
        Self {
            free: 1,
            pro: 2,
            premium: 3,
        }
    }
}

impl TierMultipliers {
    /// Multiplier for a tier.
    #[must_use]
    pub const fn for_tier(&self, tier: SubscriptionTier) -> u32 {
        match tier {
            SubscriptionTier::Free => self.free,
            SubscriptionTier::Pro => self.pro,
            SubscriptionTier::Premium => self.premium,
        }
    }
}

/// Fixed-window admission quotas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Window length in seconds.
    pub window_secs: u64,
    /// Base points for platforms without an explicit entry.
    pub default_points: u32,
    /// Base points per platform.
    pub platform_points: HashMap<String, u32>,
    /// Tier scaling applied to base points.
    pub tier_multipliers: TierMultipliers,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: 60,
            default_points: 100,
            platform_points: HashMap::new(),
            tier_multipliers: TierMultipliers::default(),
        }
    }
}

impl RateLimitConfig {
    /// Window length as a duration.
    #[must_use]
    pub const fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// Base points for a platform.
    #[must_use]
    pub fn base_points(&self, platform: &str) -> u32 {
        self.platform_points
            .get(platform)
            .copied()
            .unwrap_or(self.default_points)
    }

    /// `base_points(platform) * multiplier(tier)`.
    #[must_use]
    pub fn max_points(&self, platform: &str, tier: SubscriptionTier) -> u32 {
        self.base_points(platform)
            .saturating_mul(self.tier_multipliers.for_tier(tier))
    }

    /// Validate quotas.
    pub fn validate(&self) -> Result<(), String> {
        if self.window_secs == 0 {
            return Err("window_secs must be greater than 0".into());
        }
        if self.default_points == 0 {
            return Err("default_points must be greater than 0".into());
        }
        if let Some((platform, _)) = self.platform_points.iter().find(|(_, p)| **p == 0) {
            return Err(format!("platform `{platform}` has zero points"));
        }
        let m = &self.tier_multipliers;
        if m.free == 0 || m.pro == 0 || m.premium == 0 {
            return Err("tier multipliers must be greater than 0".into());
        }
        if !(m.free <= m.pro && m.pro <= m.premium) {
            return Err("tier multipliers must not decrease with tier".into());
        }
        Ok(())
    }
}

/// Retry policy for failed executions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts allowed when the submitter does not specify one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay_ms: u64,
    /// Upper bound on any retry delay.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 5_000,
            max_delay_ms: 30 * 60 * 1000,
        }
    }
}

impl RetryConfig {
    /// Delay after the given number of consecutive failures:
    /// `base * 2^(failures - 1)`, capped at `max_delay_ms`.
    #[must_use]
    pub fn backoff_delay(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(63);
        let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
        let delay = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(delay)
    }

    /// Validate retry settings.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be greater than 0".into());
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err("base_delay_ms must not exceed max_delay_ms".into());
        }
        Ok(())
    }
}

/// How many finished tasks to keep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionPolicy {
    /// Most recent completed tasks kept per queue.
    pub keep_completed: usize,
    /// Most recent failed tasks kept per queue.
    pub keep_failed: usize,
    /// Failed tasks older than this are pruned regardless of count.
    pub failed_max_age_secs: Option<u64>,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            keep_completed: 100,
            keep_failed: 500,
            failed_max_age_secs: Some(7 * 24 * 3600),
        }
    }
}

/// Queue metrics sampling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Seconds between samples.
    pub sample_interval_secs: u64,
    /// How long snapshots are retained.
    pub retention_secs: u64,
    /// Window for throughput (completions per window).
    pub throughput_window_secs: u64,
    /// Window for error rate.
    pub error_window_secs: u64,
    /// Number of most recent completions used for latency statistics.
    pub latency_sample_size: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            sample_interval_secs: 60,
            retention_secs: 7 * 24 * 3600,
            throughput_window_secs: 60,
            error_window_secs: 300,
            latency_sample_size: 100,
        }
    }
}

impl MetricsConfig {
    /// Validate sampling settings.
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_interval_secs == 0 {
            return Err("sample_interval_secs must be greater than 0".into());
        }
        if self.retention_secs < self.sample_interval_secs {
            return Err("retention_secs must cover at least one sample".into());
        }
        if self.throughput_window_secs == 0 || self.error_window_secs == 0 {
            return Err("metric windows must be greater than 0".into());
        }
        if self.latency_sample_size == 0 {
            return Err("latency_sample_size must be greater than 0".into());
        }
        Ok(())
    }
}

/// Whether a rule that keeps holding fires again on every evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertPolicy {
    /// Fire on every evaluation while the rule holds.
    #[default]
    Continuous,
    /// Fire only when a rule starts holding.
    EdgeTriggered,
}

/// Alert thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Seconds between evaluations.
    pub eval_interval_secs: u64,
    /// Alert when more tasks than this are waiting.
    pub max_waiting: u64,
    /// Alert when the error rate exceeds this fraction.
    pub max_error_rate: f64,
    /// Alert when average latency exceeds this many milliseconds.
    pub max_avg_latency_ms: f64,
    /// Re-alerting policy.
    pub policy: AlertPolicy,
    /// Alerts retained in the recent list.
    pub max_recent: usize,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            eval_interval_secs: 300,
            max_waiting: 100,
            max_error_rate: 0.1,
            max_avg_latency_ms: 60_000.0,
            policy: AlertPolicy::Continuous,
            max_recent: 100,
        }
    }
}

impl AlertConfig {
    /// Validate thresholds.
    pub fn validate(&self) -> Result<(), String> {
        if self.eval_interval_secs == 0 {
            return Err("eval_interval_secs must be greater than 0".into());
        }
        if !(0.0..=1.0).contains(&self.max_error_rate) {
            return Err("max_error_rate must be within 0..=1".into());
        }
        if self.max_avg_latency_ms <= 0.0 {
            return Err("max_avg_latency_ms must be positive".into());
        }
        if self.max_recent == 0 {
            return Err("max_recent must be greater than 0".into());
        }
        Ok(())
    }
}

/// Root scheduler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Queue settings keyed by queue key (platform name or `general`).
    pub queues: HashMap<String, QueueConfig>,
    /// Settings for queues without an explicit entry.
    pub default_queue: QueueConfig,
    /// Milliseconds between dispatcher scans for admissible work.
    pub scan_interval_ms: u64,
    /// Milliseconds between background circuit deadline checks.
    pub breaker_tick_ms: u64,
    /// Circuit breaker thresholds.
    pub circuit_breaker: CircuitBreakerConfig,
    /// Rate limiter quotas.
    pub rate_limit: RateLimitConfig,
    /// Retry policy.
    pub retry: RetryConfig,
    /// Finished-task retention.
    pub retention: RetentionPolicy,
    /// Metrics sampling.
    pub metrics: MetricsConfig,
    /// Alert thresholds.
    pub alerts: AlertConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            queues: HashMap::new(),
            default_queue: QueueConfig::default(),
            scan_interval_ms: 2_000,
            breaker_tick_ms: 1_000,
            circuit_breaker: CircuitBreakerConfig::default(),
            rate_limit: RateLimitConfig::default(),
            retry: RetryConfig::default(),
            retention: RetentionPolicy::default(),
            metrics: MetricsConfig::default(),
            alerts: AlertConfig::default(),
        }
    }
}

impl SchedulerConfig {
    /// Settings for a queue, falling back to `default_queue`.
    #[must_use]
    pub fn queue(&self, name: &QueueName) -> QueueConfig {
        self.queues
            .get(name.key())
            .cloned()
            .unwrap_or_else(|| self.default_queue.clone())
    }

    /// Add or replace settings for a queue.
    #[must_use]
    pub fn with_queue(mut self, name: &QueueName, config: QueueConfig) -> Self {
        self.queues.insert(name.key().to_string(), config);
        self
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        self.default_queue
            .validate()
            .map_err(|e| format!("default_queue invalid: {e}"))?;
        for (name, queue) in &self.queues {
            queue
                .validate()
                .map_err(|e| format!("queue `{name}` invalid: {e}"))?;
        }
        if self.scan_interval_ms == 0 {
            return Err("scan_interval_ms must be greater than 0".into());
        }
        if self.breaker_tick_ms == 0 {
            return Err("breaker_tick_ms must be greater than 0".into());
        }
        self.circuit_breaker
            .validate()
            .map_err(|e| format!("circuit_breaker invalid: {e}"))?;
        self.rate_limit
            .validate()
            .map_err(|e| format!("rate_limit invalid: {e}"))?;
        self.retry
            .validate()
            .map_err(|e| format!("retry invalid: {e}"))?;
        self.metrics
            .validate()
            .map_err(|e| format!("metrics invalid: {e}"))?;
        self.alerts
            .validate()
            .map_err(|e| format!("alerts invalid: {e}"))?;
        Ok(())
    }

    /// Parse scheduler configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }
}
