//! Queue health sampling: counts, throughput, error rate, and latency.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::MetricsConfig;
use crate::core::circuit_breaker::CircuitState;
use crate::core::job_queue::{JobQueue, QueueCounts};
use crate::core::store::MetricsStore;
use crate::core::task::TaskStatus;
use crate::util::serde::QueueName;

/// Point-in-time health of one queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMetricsSnapshot {
    /// Queue key.
    pub queue_name: String,
    /// Sample time (ms since epoch).
    pub timestamp_ms: u128,
    /// Task counts by status.
    pub counts: QueueCounts,
    /// Completions within the throughput window.
    pub throughput: u64,
    /// `failed / (failed + completed)` within the error window.
    pub error_rate: f64,
    /// Mean duration of recent completions.
    pub avg_latency_ms: f64,
    /// 95th percentile duration of recent completions.
    pub p95_latency_ms: f64,
    /// Circuit state for platform queues.
    pub circuit_state: Option<CircuitState>,
}

/// Nearest-rank percentile of an ascending slice; zero when empty.
#[must_use]
pub fn percentile(sorted: &[u128], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (pct / 100.0 * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1] as f64
}

/// Samples queue state into a [`MetricsStore`].
pub struct MetricsCollector {
    queue: Arc<JobQueue>,
    store: Arc<dyn MetricsStore>,
    config: MetricsConfig,
}

impl MetricsCollector {
    /// Create a collector.
    pub fn new(queue: Arc<JobQueue>, store: Arc<dyn MetricsStore>, config: MetricsConfig) -> Self {
        Self {
            queue,
            store,
            config,
        }
    }

    /// Compute a snapshot for one queue without storing it.
    #[must_use]
    pub fn snapshot(&self, queue: &QueueName, now_ms: u128) -> QueueMetricsSnapshot {
        let counts = self.queue.counts(queue, now_ms);
        let throughput_since = now_ms.saturating_sub(u128::from(self.config.throughput_window_secs) * 1000);
        let error_since = now_ms.saturating_sub(u128::from(self.config.error_window_secs) * 1000);
        let window_start = throughput_since.min(error_since);

        // Newest first; latency uses the most recent completions regardless of window.
        let finished = self.queue.finished_since(queue, 0);

        let mut throughput = 0u64;
        let mut completed_in_window = 0u64;
        let mut failed_in_window = 0u64;
        for f in finished.iter().take_while(|f| f.finished_at_ms >= window_start) {
            let completed = f.status == TaskStatus::Completed;
            if completed && f.finished_at_ms >= throughput_since {
                throughput += 1;
            }
            if f.finished_at_ms >= error_since {
                if completed {
                    completed_in_window += 1;
                } else {
                    failed_in_window += 1;
                }
            }
        }
        let attempts = completed_in_window + failed_in_window;
        let error_rate = if attempts == 0 {
            0.0
        } else {
            failed_in_window as f64 / attempts as f64
        };

        let mut latencies: Vec<u128> = finished
            .iter()
            .filter(|f| f.status == TaskStatus::Completed)
            .take(self.config.latency_sample_size)
            .map(|f| f.latency_ms)
            .collect();
        latencies.sort_unstable();
        let avg_latency_ms = if latencies.is_empty() {
            0.0
        } else {
            latencies.iter().sum::<u128>() as f64 / latencies.len() as f64
        };

        let circuit_state = match queue {
            QueueName::Platform(platform) => {
                Some(self.queue.breaker().get_status(platform, now_ms).state)
            }
            QueueName::General => None,
        };

        QueueMetricsSnapshot {
            queue_name: queue.key().to_string(),
            timestamp_ms: now_ms,
            counts,
            throughput,
            error_rate,
            avg_latency_ms,
            p95_latency_ms: percentile(&latencies, 95.0),
            circuit_state,
        }
    }

    /// Sample every known queue and persist the snapshots.
    pub fn sample(&self, now_ms: u128) -> Vec<QueueMetricsSnapshot> {
        let retain_since = now_ms.saturating_sub(u128::from(self.config.retention_secs) * 1000);
        let snapshots: Vec<QueueMetricsSnapshot> = self
            .queue
            .queue_names()
            .iter()
            .map(|q| self.snapshot(q, now_ms))
            .collect();
        for snapshot in &snapshots {
            if let Err(e) = self.store.record_snapshot(snapshot.clone(), retain_since) {
                warn!(queue = %snapshot.queue_name, error = %e, "failed to store metrics snapshot");
            }
        }
        debug!(queues = snapshots.len(), "metrics sampled");
        snapshots
    }

    /// Latest stored snapshot for a queue.
    #[must_use]
    pub fn latest(&self, queue: &QueueName) -> Option<QueueMetricsSnapshot> {
        self.store
            .latest_snapshot(queue.key())
            .unwrap_or_else(|e| {
                warn!(queue = %queue, error = %e, "failed to read latest metrics");
                None
            })
    }

    /// Stored snapshots from the last `hours` hours, oldest first.
    #[must_use]
    pub fn historical(&self, queue: &QueueName, hours: u64, now_ms: u128) -> Vec<QueueMetricsSnapshot> {
        let since = now_ms.saturating_sub(u128::from(hours) * 3600 * 1000);
        self.store
            .snapshots_since(queue.key(), since)
            .unwrap_or_else(|e| {
                warn!(queue = %queue, error = %e, "failed to read metrics history");
                Vec::new()
            })
    }
}
