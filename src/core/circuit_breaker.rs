//! Per-platform circuit breaker.
//!
//! Each platform owns one [`CircuitRecord`] in a [`CircuitStore`]. The OPEN to
//! HALF_OPEN transition is driven by the persisted `next_reset_at_ms` deadline,
//! checked lazily on every read and by [`CircuitBreakerRegistry::tick`], so a
//! restart loses nothing. Store failures are logged and treated as CLOSED.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::CircuitBreakerConfig;
use crate::core::store::CircuitStore;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation.
    Closed,
    /// Work for the platform is refused.
    Open,
    /// A single probe is allowed through.
    HalfOpen,
}

/// State transition produced by an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// State before the update.
    pub from: CircuitState,
    /// State after the update.
    pub to: CircuitState,
}

/// Persisted breaker state for one platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitRecord {
    /// Current state.
    pub state: CircuitState,
    /// Failures since the circuit last closed.
    pub failures: u32,
    /// Failures since the last success.
    pub consecutive_failures: u32,
    /// Lifetime failure count.
    pub total_failures: u64,
    /// Successes recorded in the current half-open period.
    pub successes_in_half_open: u32,
    /// Time of the latest failure (ms since epoch).
    pub last_failure_at_ms: Option<u128>,
    /// Time of the latest success (ms since epoch).
    pub last_success_at_ms: Option<u128>,
    /// When an open circuit becomes half-open (ms since epoch).
    pub next_reset_at_ms: Option<u128>,
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Half-open successes that close the circuit.
    pub success_threshold: u32,
    /// Open period before probing.
    pub reset_timeout_ms: u64,
}

impl CircuitRecord {
    /// A closed record with zero counters.
    #[must_use]
    pub const fn closed(config: &CircuitBreakerConfig) -> Self {
        Self {
            state: CircuitState::Closed,
            failures: 0,
            consecutive_failures: 0,
            total_failures: 0,
            successes_in_half_open: 0,
            last_failure_at_ms: None,
            last_success_at_ms: None,
            next_reset_at_ms: None,
            failure_threshold: config.failure_threshold,
            success_threshold: config.success_threshold,
            reset_timeout_ms: config.reset_timeout_ms,
        }
    }

    /// True while work must be refused.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state == CircuitState::Open
    }

    fn open(&mut self, now_ms: u128) {
        self.state = CircuitState::Open;
        self.successes_in_half_open = 0;
        self.next_reset_at_ms = Some(now_ms.saturating_add(u128::from(self.reset_timeout_ms)));
    }

    /// Move OPEN to HALF_OPEN once the reset deadline has passed.
    pub fn refresh(&mut self, now_ms: u128) -> Option<Transition> {
        match (self.state, self.next_reset_at_ms) {
            (CircuitState::Open, Some(deadline)) if now_ms >= deadline => {
                self.state = CircuitState::HalfOpen;
                self.successes_in_half_open = 0;
                Some(Transition {
                    from: CircuitState::Open,
                    to: CircuitState::HalfOpen,
                })
            }
            _ => None,
        }
    }

    /// Apply a successful call.
    pub fn on_success(&mut self, now_ms: u128) -> Option<Transition> {
        let refreshed = self.refresh(now_ms);
        self.last_success_at_ms = Some(now_ms);
        self.consecutive_failures = 0;
        match self.state {
            CircuitState::HalfOpen => {
                self.successes_in_half_open += 1;
                if self.successes_in_half_open >= self.success_threshold {
                    self.state = CircuitState::Closed;
                    self.failures = 0;
                    self.successes_in_half_open = 0;
                    self.next_reset_at_ms = None;
                    return Some(Transition {
                        from: CircuitState::HalfOpen,
                        to: CircuitState::Closed,
                    });
                }
                refreshed
            }
            // Late completions from before the circuit opened do not close it.
            CircuitState::Closed | CircuitState::Open => refreshed,
        }
    }

    /// Apply a failed call.
    pub fn on_failure(&mut self, now_ms: u128) -> Option<Transition> {
        self.refresh(now_ms);
        let from = self.state;
        self.failures = self.failures.saturating_add(1);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.total_failures = self.total_failures.saturating_add(1);
        self.last_failure_at_ms = Some(now_ms);
        match self.state {
            CircuitState::Closed if self.consecutive_failures >= self.failure_threshold => {
                self.open(now_ms);
            }
            CircuitState::HalfOpen => self.open(now_ms),
            CircuitState::Closed | CircuitState::Open => return None,
        }
        Some(Transition {
            from,
            to: CircuitState::Open,
        })
    }
}

/// Registry of per-platform breakers over a shared store.
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    store: Arc<dyn CircuitStore>,
}

impl CircuitBreakerRegistry {
    /// Create a registry over `store`.
    pub fn new(config: CircuitBreakerConfig, store: Arc<dyn CircuitStore>) -> Self {
        Self { config, store }
    }

    /// Thresholds applied to newly created records.
    #[must_use]
    pub const fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn update<F>(&self, platform: &str, mut f: F) -> CircuitRecord
    where
        F: FnMut(&mut CircuitRecord) -> Option<Transition>,
    {
        let mut transition = None;
        let result = self
            .store
            .modify(platform, CircuitRecord::closed(&self.config), &mut |record| {
                transition = f(record);
            });
        match result {
            Ok(record) => {
                if let Some(t) = transition {
                    log_transition(platform, t, &record);
                }
                record
            }
            Err(e) => {
                warn!(platform = %platform, error = %e, "circuit store unavailable, treating as closed");
                CircuitRecord::closed(&self.config)
            }
        }
    }

    /// Record a successful execution.
    pub fn record_success(&self, platform: &str, now_ms: u128) -> CircuitRecord {
        self.update(platform, |r| r.on_success(now_ms))
    }

    /// Record a failed execution.
    pub fn record_failure(&self, platform: &str, now_ms: u128) -> CircuitRecord {
        self.update(platform, |r| r.on_failure(now_ms))
    }

    /// Current status, applying any due OPEN to HALF_OPEN transition.
    /// Unknown platforms read as closed without creating a record.
    pub fn get_status(&self, platform: &str, now_ms: u128) -> CircuitRecord {
        match self.store.load(platform) {
            Ok(None) => CircuitRecord::closed(&self.config),
            Ok(Some(record)) => self.refresh_if_due(platform, record, now_ms).0,
            Err(e) => {
                warn!(platform = %platform, error = %e, "circuit store unavailable, treating as closed");
                CircuitRecord::closed(&self.config)
            }
        }
    }

    fn refresh_if_due(&self, platform: &str, record: CircuitRecord, now_ms: u128) -> (CircuitRecord, bool) {
        if record.clone().refresh(now_ms).is_none() {
            return (record, false);
        }
        let mut moved = false;
        let record = self.update(platform, |r| {
            let t = r.refresh(now_ms);
            moved = t.is_some();
            t
        });
        (record, moved)
    }

    /// True while the platform refuses work.
    pub fn is_open(&self, platform: &str, now_ms: u128) -> bool {
        self.get_status(platform, now_ms).is_open()
    }

    /// Force the platform's circuit closed with zeroed counters.
    /// Returns false only when the store rejected the write.
    pub fn reset(&self, platform: &str) -> bool {
        let closed = CircuitRecord::closed(&self.config);
        let result = self.store.modify(platform, closed.clone(), &mut |record| {
            *record = closed.clone();
        });
        match result {
            Ok(_) => {
                info!(platform = %platform, "circuit manually reset to closed");
                true
            }
            Err(e) => {
                warn!(platform = %platform, error = %e, "circuit reset failed");
                false
            }
        }
    }

    /// Status of every platform with a stored record.
    pub fn all_statuses(&self, now_ms: u128) -> BTreeMap<String, CircuitRecord> {
        let platforms = match self.store.platforms() {
            Ok(platforms) => platforms,
            Err(e) => {
                warn!(error = %e, "circuit store unavailable, no statuses listed");
                return BTreeMap::new();
            }
        };
        platforms
            .into_iter()
            .map(|p| {
                let status = self.get_status(&p, now_ms);
                (p, status)
            })
            .collect()
    }

    /// Apply due OPEN to HALF_OPEN transitions for every platform.
    /// Returns the number of circuits moved to half-open.
    pub fn tick(&self, now_ms: u128) -> usize {
        let platforms = match self.store.platforms() {
            Ok(platforms) => platforms,
            Err(e) => {
                warn!(error = %e, "circuit store unavailable, tick skipped");
                return 0;
            }
        };
        platforms
            .iter()
            .filter(|p| match self.store.load(p) {
                Ok(Some(record)) => self.refresh_if_due(p, record, now_ms).1,
                Ok(None) => false,
                Err(e) => {
                    warn!(platform = %p, error = %e, "circuit store unavailable during tick");
                    false
                }
            })
            .count()
    }
}

fn log_transition(platform: &str, t: Transition, record: &CircuitRecord) {
    match t.to {
        CircuitState::Open => warn!(
            platform = %platform,
            from = ?t.from,
            consecutive_failures = record.consecutive_failures,
            next_reset_at_ms = ?record.next_reset_at_ms,
            "circuit opened"
        ),
        CircuitState::HalfOpen => info!(platform = %platform, "circuit half-open, probing"),
        CircuitState::Closed => info!(platform = %platform, "circuit closed"),
    }
}
