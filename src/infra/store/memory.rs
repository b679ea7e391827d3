//! In-memory state store backing breaker records, quota windows, and metrics.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::core::alerting::Alert;
use crate::core::circuit_breaker::CircuitRecord;
use crate::core::error::StoreError;
use crate::core::metrics::QueueMetricsSnapshot;
use crate::core::rate_limiter::RateLimitWindow;
use crate::core::store::{CircuitStore, MetricsStore, RateLimitStore};

#[derive(Default)]
struct WindowState {
    windows: HashMap<String, RateLimitWindow>,
    next_sweep_ms: u128,
}

impl WindowState {
    fn sweep(&mut self, now_ms: u128) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, w| w.window_expires_at_ms > now_ms);
        before - self.windows.len()
    }
}

#[derive(Default)]
struct MetricsState {
    latest: HashMap<String, QueueMetricsSnapshot>,
    history: HashMap<String, VecDeque<QueueMetricsSnapshot>>,
    alerts: VecDeque<Alert>,
}

/// Process-local implementation of every store trait.
///
/// Each keyspace has its own lock; closures passed to `modify` run under it.
/// Expired quota windows are swept at most once per window length as new
/// windows are written. [`Self::set_available`] simulates a backend outage.
pub struct InMemoryStateStore {
    circuits: Mutex<HashMap<String, CircuitRecord>>,
    windows: Mutex<WindowState>,
    metrics: Mutex<MetricsState>,
    available: AtomicBool,
}

impl Default for InMemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStateStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            circuits: Mutex::new(HashMap::new()),
            windows: Mutex::new(WindowState::default()),
            metrics: Mutex::new(MetricsState::default()),
            available: AtomicBool::new(true),
        }
    }

    /// Toggle availability; while unavailable every call fails.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("in-memory store marked unavailable".into()))
        }
    }
}

impl CircuitStore for InMemoryStateStore {
    fn load(&self, platform: &str) -> Result<Option<CircuitRecord>, StoreError> {
        self.check()?;
        Ok(self.circuits.lock().get(platform).cloned())
    }

    fn modify(
        &self,
        platform: &str,
        init: CircuitRecord,
        update: &mut dyn FnMut(&mut CircuitRecord),
    ) -> Result<CircuitRecord, StoreError> {
        self.check()?;
        let mut circuits = self.circuits.lock();
        let record = circuits.entry(platform.to_string()).or_insert(init);
        update(record);
        Ok(record.clone())
    }

    fn platforms(&self) -> Result<Vec<String>, StoreError> {
        self.check()?;
        Ok(self.circuits.lock().keys().cloned().collect())
    }
}

impl RateLimitStore for InMemoryStateStore {
    fn peek(&self, key: &str, now_ms: u128) -> Result<Option<RateLimitWindow>, StoreError> {
        self.check()?;
        let mut state = self.windows.lock();
        match state.windows.get(key) {
            Some(w) if w.window_expires_at_ms > now_ms => Ok(Some(w.clone())),
            Some(_) => {
                state.windows.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn modify(
        &self,
        key: &str,
        now_ms: u128,
        fresh: RateLimitWindow,
        update: &mut dyn FnMut(&mut RateLimitWindow),
    ) -> Result<RateLimitWindow, StoreError> {
        self.check()?;
        let mut state = self.windows.lock();
        if now_ms >= state.next_sweep_ms {
            state.sweep(now_ms);
            state.next_sweep_ms = fresh.window_expires_at_ms;
        }
        let window = state
            .windows
            .entry(key.to_string())
            .or_insert_with(|| fresh.clone());
        if window.window_expires_at_ms <= now_ms {
            *window = fresh;
        }
        update(window);
        Ok(window.clone())
    }

    fn clear(&self, key: &str) -> Result<bool, StoreError> {
        self.check()?;
        Ok(self.windows.lock().windows.remove(key).is_some())
    }

    fn purge_expired(&self, now_ms: u128) -> Result<usize, StoreError> {
        self.check()?;
        Ok(self.windows.lock().sweep(now_ms))
    }
}

impl MetricsStore for InMemoryStateStore {
    fn record_snapshot(
        &self,
        snapshot: QueueMetricsSnapshot,
        retain_since_ms: u128,
    ) -> Result<(), StoreError> {
        self.check()?;
        let mut metrics = self.metrics.lock();
        let history = metrics
            .history
            .entry(snapshot.queue_name.clone())
            .or_default();
        history.push_back(snapshot.clone());
        while history
            .front()
            .is_some_and(|s| s.timestamp_ms < retain_since_ms)
        {
            history.pop_front();
        }
        metrics.latest.insert(snapshot.queue_name.clone(), snapshot);
        Ok(())
    }

    fn latest_snapshot(&self, queue: &str) -> Result<Option<QueueMetricsSnapshot>, StoreError> {
        self.check()?;
        Ok(self.metrics.lock().latest.get(queue).cloned())
    }

    fn snapshots_since(
        &self,
        queue: &str,
        since_ms: u128,
    ) -> Result<Vec<QueueMetricsSnapshot>, StoreError> {
        self.check()?;
        let metrics = self.metrics.lock();
        Ok(metrics
            .history
            .get(queue)
            .map(|h| {
                h.iter()
                    .filter(|s| s.timestamp_ms >= since_ms)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn push_alert(&self, alert: Alert, max_alerts: usize) -> Result<(), StoreError> {
        self.check()?;
        let mut metrics = self.metrics.lock();
        metrics.alerts.push_front(alert);
        metrics.alerts.truncate(max_alerts);
        Ok(())
    }

    fn recent_alerts(&self, limit: usize) -> Result<Vec<Alert>, StoreError> {
        self.check()?;
        Ok(self.metrics.lock().alerts.iter().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CircuitBreakerConfig;

    fn window(consumed: u32, expires: u128) -> RateLimitWindow {
        RateLimitWindow {
            points_consumed: consumed,
            window_expires_at_ms: expires,
            max_points: 10,
        }
    }

    #[test]
    fn expired_window_is_replaced_on_modify() {
        let store = InMemoryStateStore::new();
        RateLimitStore::modify(&store, "k", 0, window(0, 100), &mut |w| w.points_consumed += 1)
            .unwrap();
        assert_eq!(store.peek("k", 50).unwrap().unwrap().points_consumed, 1);
        assert!(store.peek("k", 100).unwrap().is_none());

        let w = RateLimitStore::modify(&store, "k", 150, window(0, 250), &mut |w| {
            w.points_consumed += 1;
        })
        .unwrap();
        assert_eq!(w.points_consumed, 1);
        assert_eq!(w.window_expires_at_ms, 250);
    }

    #[test]
    fn expired_windows_are_swept_by_later_writes() {
        let store = InMemoryStateStore::new();
        for user in 0..1_000 {
            RateLimitStore::modify(&store, &format!("u{user}"), 0, window(0, 100), &mut |w| {
                w.points_consumed += 1;
            })
            .unwrap();
        }
        assert_eq!(store.windows.lock().windows.len(), 1_000);

        let day = 86_400_000;
        RateLimitStore::modify(&store, "late", day, window(0, day + 100), &mut |w| {
            w.points_consumed += 1;
        })
        .unwrap();
        assert_eq!(store.windows.lock().windows.len(), 1);
    }

    #[test]
    fn peek_drops_expired_window() {
        let store = InMemoryStateStore::new();
        RateLimitStore::modify(&store, "k", 0, window(0, 100), &mut |_| {}).unwrap();
        assert!(store.peek("k", 100).unwrap().is_none());
        assert!(store.windows.lock().windows.is_empty());
        assert!(!store.clear("k").unwrap());
    }

    #[test]
    fn circuit_modify_inserts_init() {
        let store = InMemoryStateStore::new();
        let init = CircuitRecord::closed(&CircuitBreakerConfig::default());
        let rec = CircuitStore::modify(&store, "indeed", init, &mut |r| r.failures = 2).unwrap();
        assert_eq!(rec.failures, 2);
        assert_eq!(store.platforms().unwrap(), vec!["indeed".to_string()]);
    }

    #[test]
    fn unavailable_store_errors() {
        let store = InMemoryStateStore::new();
        store.set_available(false);
        assert!(matches!(store.load("x"), Err(StoreError::Unavailable(_))));
        assert!(store.recent_alerts(1).is_err());
        store.set_available(true);
        assert!(store.load("x").unwrap().is_none());
    }
}
