//! Environment-driven configuration loading.
//!
//! `SchedulerConfig::from_env` reads an optional `.env` file, then an optional
//! JSON file named by `APPLY_DISPATCH_CONFIG`, then scalar overrides from
//! `APPLY_DISPATCH_*` variables.

use anyhow::{anyhow, Context};

use super::SchedulerConfig;
use crate::core::AppResult;

/// Prefix shared by all override variables.
pub const ENV_PREFIX: &str = "APPLY_DISPATCH_";

impl SchedulerConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> AppResult<Self> {
        // A missing .env file is normal outside development.
        let _ = dotenvy::dotenv();

        let mut cfg = match std::env::var(format!("{ENV_PREFIX}CONFIG")) {
            Ok(path) => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading scheduler config `{path}`"))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("parsing scheduler config `{path}`"))?
            }
            Err(_) => Self::default(),
        };
        cfg.apply_overrides(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())?;
        cfg.validate().map_err(|e| anyhow!(e))?;
        Ok(cfg)
    }

    /// Apply scalar overrides; `lookup` receives the unprefixed variable name.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> AppResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(key: &str, raw: &str) -> AppResult<T>
        where
            T::Err: std::fmt::Display,
        {
            raw.trim()
                .parse::<T>()
                .map_err(|e| anyhow!("invalid value for {ENV_PREFIX}{key}: {e}"))
        }

        macro_rules! override_field {
            ($key:literal, $field:expr) => {
                if let Some(raw) = lookup($key) {
                    $field = parse($key, &raw)?;
                }
            };
        }

        override_field!("SCAN_INTERVAL_MS", self.scan_interval_ms);
        override_field!("BREAKER_TICK_MS", self.breaker_tick_ms);
        override_field!("QUEUE_CONCURRENCY", self.default_queue.concurrency);
        override_field!("TASK_TIMEOUT_SECS", self.default_queue.task_timeout_secs);
        override_field!("BREAKER_FAILURE_THRESHOLD", self.circuit_breaker.failure_threshold);
        override_field!("BREAKER_SUCCESS_THRESHOLD", self.circuit_breaker.success_threshold);
        override_field!("BREAKER_RESET_TIMEOUT_MS", self.circuit_breaker.reset_timeout_ms);
        override_field!("RATE_WINDOW_SECS", self.rate_limit.window_secs);
        override_field!("RATE_DEFAULT_POINTS", self.rate_limit.default_points);
        override_field!("RETRY_MAX_ATTEMPTS", self.retry.max_attempts);
        override_field!("RETRY_BASE_DELAY_MS", self.retry.base_delay_ms);
        override_field!("RETRY_MAX_DELAY_MS", self.retry.max_delay_ms);
        override_field!("METRICS_INTERVAL_SECS", self.metrics.sample_interval_secs);
        override_field!("ALERT_INTERVAL_SECS", self.alerts.eval_interval_secs);
        Ok(())
    }
}
