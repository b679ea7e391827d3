//! State store abstractions for breaker records, quota windows, and metrics.
//!
//! Stores are constructed and injected explicitly; nothing here is global.
//! Every read-modify-write runs its closure under the store's own lock, so
//! concurrent callers for the same key observe a single writer.

use crate::core::alerting::Alert;
use crate::core::circuit_breaker::CircuitRecord;
use crate::core::error::StoreError;
use crate::core::metrics::QueueMetricsSnapshot;
use crate::core::rate_limiter::RateLimitWindow;

/// Persisted per-platform circuit records.
pub trait CircuitStore: Send + Sync {
    /// Read the record for a platform.
    fn load(&self, platform: &str) -> Result<Option<CircuitRecord>, StoreError>;

    /// Atomically update a record, inserting `init` first when absent.
    /// Returns the record as stored after `update` ran; on error the stored
    /// record is left unchanged.
    fn modify(
        &self,
        platform: &str,
        init: CircuitRecord,
        update: &mut dyn FnMut(&mut CircuitRecord),
    ) -> Result<CircuitRecord, StoreError>;

    /// Platforms with a stored record.
    fn platforms(&self) -> Result<Vec<String>, StoreError>;
}

/// Persisted fixed-window counters with expiry.
pub trait RateLimitStore: Send + Sync {
    /// Read a live window; expired windows read as absent.
    fn peek(&self, key: &str, now_ms: u128) -> Result<Option<RateLimitWindow>, StoreError>;

    /// Atomically update a window. An absent or expired window is replaced
    /// by `fresh` before `update` runs.
    fn modify(
        &self,
        key: &str,
        now_ms: u128,
        fresh: RateLimitWindow,
        update: &mut dyn FnMut(&mut RateLimitWindow),
    ) -> Result<RateLimitWindow, StoreError>;

    /// Delete a window. Returns whether one was stored.
    fn clear(&self, key: &str) -> Result<bool, StoreError>;

    /// Delete every window expired at `now_ms`. Returns how many were dropped.
    fn purge_expired(&self, now_ms: u128) -> Result<usize, StoreError>;
}

/// Persisted metrics snapshots and recent alerts.
pub trait MetricsStore: Send + Sync {
    /// Append a snapshot, move the queue's latest pointer to it, and drop
    /// snapshots older than `retain_since_ms`.
    fn record_snapshot(
        &self,
        snapshot: QueueMetricsSnapshot,
        retain_since_ms: u128,
    ) -> Result<(), StoreError>;

    /// Latest snapshot for a queue.
    fn latest_snapshot(&self, queue: &str) -> Result<Option<QueueMetricsSnapshot>, StoreError>;

    /// Snapshots taken at or after `since_ms`, oldest first.
    fn snapshots_since(
        &self,
        queue: &str,
        since_ms: u128,
    ) -> Result<Vec<QueueMetricsSnapshot>, StoreError>;

    /// Prepend an alert, keeping at most `max_alerts`.
    fn push_alert(&self, alert: Alert, max_alerts: usize) -> Result<(), StoreError>;

    /// Most recent alerts, newest first.
    fn recent_alerts(&self, limit: usize) -> Result<Vec<Alert>, StoreError>;
}
