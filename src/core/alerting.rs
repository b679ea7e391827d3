//! Threshold alerting over queue metrics snapshots.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::{AlertConfig, AlertPolicy};
use crate::core::metrics::QueueMetricsSnapshot;
use crate::core::store::MetricsStore;

/// How urgent an alert is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    /// Degraded but working.
    Warning,
    /// Work is being lost.
    Critical,
}

/// Threshold rule that produced an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertRule {
    /// Too many tasks waiting.
    Backlog,
    /// Error rate above threshold.
    ErrorRate,
    /// Average latency above threshold.
    Latency,
}

impl fmt::Display for AlertRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Backlog => "backlog",
            Self::ErrorRate => "error_rate",
            Self::Latency => "latency",
        })
    }
}

/// A raised alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    /// Queue key.
    pub queue_name: String,
    /// Rule that fired.
    pub rule: AlertRule,
    /// Human-readable description.
    pub message: String,
    /// Severity.
    pub severity: AlertSeverity,
    /// Evaluation time (ms since epoch).
    pub timestamp_ms: u128,
}

/// Evaluates threshold rules and appends alerts to the store.
pub struct AlertEvaluator {
    store: Arc<dyn MetricsStore>,
    config: AlertConfig,
    firing: Mutex<HashSet<(String, AlertRule)>>,
}

impl AlertEvaluator {
    /// Create an evaluator.
    pub fn new(store: Arc<dyn MetricsStore>, config: AlertConfig) -> Self {
        Self {
            store,
            config,
            firing: Mutex::new(HashSet::new()),
        }
    }

    /// Rules that hold for a snapshot.
    #[must_use]
    pub fn violations(&self, snapshot: &QueueMetricsSnapshot) -> Vec<(AlertRule, AlertSeverity, String)> {
        let mut out = Vec::new();
        if snapshot.counts.waiting > self.config.max_waiting {
            out.push((
                AlertRule::Backlog,
                AlertSeverity::Warning,
                format!(
                    "{} tasks waiting in {} (threshold {})",
                    snapshot.counts.waiting, snapshot.queue_name, self.config.max_waiting
                ),
            ));
        }
        if snapshot.error_rate > self.config.max_error_rate {
            out.push((
                AlertRule::ErrorRate,
                AlertSeverity::Critical,
                format!(
                    "error rate {:.1}% in {} (threshold {:.1}%)",
                    snapshot.error_rate * 100.0,
                    snapshot.queue_name,
                    self.config.max_error_rate * 100.0
                ),
            ));
        }
        if snapshot.avg_latency_ms > self.config.max_avg_latency_ms {
            out.push((
                AlertRule::Latency,
                AlertSeverity::Warning,
                format!(
                    "average latency {:.0}ms in {} (threshold {:.0}ms)",
                    snapshot.avg_latency_ms, snapshot.queue_name, self.config.max_avg_latency_ms
                ),
            ));
        }
        out
    }

    /// Evaluate snapshots and store the alerts raised under the configured policy.
    pub fn evaluate(&self, snapshots: &[QueueMetricsSnapshot], now_ms: u128) -> Vec<Alert> {
        let mut raised = Vec::new();
        let mut firing = self.firing.lock();
        for snapshot in snapshots {
            let holding = self.violations(snapshot);
            let holding_rules: HashSet<AlertRule> = holding.iter().map(|(r, _, _)| *r).collect();
            firing.retain(|(q, r)| q != &snapshot.queue_name || holding_rules.contains(r));

            for (rule, severity, message) in holding {
                let newly = firing.insert((snapshot.queue_name.clone(), rule));
                if self.config.policy == AlertPolicy::EdgeTriggered && !newly {
                    continue;
                }
                raised.push(Alert {
                    queue_name: snapshot.queue_name.clone(),
                    rule,
                    message,
                    severity,
                    timestamp_ms: now_ms,
                });
            }
        }
        drop(firing);

        for alert in &raised {
            warn!(
                queue = %alert.queue_name,
                rule = %alert.rule,
                severity = ?alert.severity,
                "{}",
                alert.message
            );
            if let Err(e) = self.store.push_alert(alert.clone(), self.config.max_recent) {
                warn!(error = %e, "failed to store alert");
            }
        }
        raised
    }

    /// Most recent alerts, newest first.
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<Alert> {
        self.store.recent_alerts(limit).unwrap_or_else(|e| {
            warn!(error = %e, "failed to read alerts");
            Vec::new()
        })
    }
}
