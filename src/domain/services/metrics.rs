//! Trading metrics - in-memory execution aggregates
//!
//! Reference `MetricsSink` the execution engine samples into on every
//! placement attempt. Embedders that export to a real metrics system
//! implement the sink themselves.

use std::collections::HashMap;
use std::sync::Mutex;
use tracing::trace;

use crate::domain::repositories::event_sink::MetricsSink;

/// Per-strategy attempt counters.
#[derive(Debug, Clone, Default)]
pub struct StrategyCounters {
    pub attempts: u64,
    pub successes: u64,
}

/// Aggregated view over everything recorded so far.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub total_trades: u64,
    pub successful_trades: u64,
    pub failed_trades: u64,
    /// Success rate as a percentage (0.0 to 100.0).
    pub success_rate: f64,
    /// Rolling average over samples that reported a latency.
    pub avg_latency_ms: f64,
    pub by_strategy: HashMap<String, StrategyCounters>,
    latency_samples: u64,
}

pub struct TradingMetrics {
    inner: Mutex<MetricsSnapshot>,
}

impl TradingMetrics {
    pub fn new() -> Self {
        TradingMetrics {
            inner: Mutex::new(MetricsSnapshot::default()),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner
            .lock()
            .map(|snapshot| snapshot.clone())
            .unwrap_or_default()
    }
}

impl Default for TradingMetrics {
    fn default() -> Self {
        TradingMetrics::new()
    }
}

impl MetricsSink for TradingMetrics {
    fn record_trade(&self, user: &str, strategy: &str, success: bool, latency_ms: Option<f64>) {
        let Ok(mut snapshot) = self.inner.lock() else {
            return;
        };

        snapshot.total_trades += 1;
        if success {
            snapshot.successful_trades += 1;
        } else {
            snapshot.failed_trades += 1;
        }
        snapshot.success_rate =
            snapshot.successful_trades as f64 / snapshot.total_trades as f64 * 100.0;

        if let Some(latency) = latency_ms {
            snapshot.latency_samples += 1;
            let samples = snapshot.latency_samples as f64;
            snapshot.avg_latency_ms =
                (snapshot.avg_latency_ms * (samples - 1.0) + latency) / samples;
        }

        let counters = snapshot
            .by_strategy
            .entry(strategy.to_string())
            .or_default();
        counters.attempts += 1;
        if success {
            counters.successes += 1;
        }

        trace!(user, strategy, success, ?latency_ms, "Recorded trade metric");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_success_and_failure() {
        let metrics = TradingMetrics::new();
        metrics.record_trade("alice", "trend-following", true, Some(12.0));
        metrics.record_trade("alice", "trend-following", false, None);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_trades, 2);
        assert_eq!(snapshot.successful_trades, 1);
        assert_eq!(snapshot.failed_trades, 1);
        assert_eq!(snapshot.success_rate, 50.0);
    }

    #[test]
    fn test_latency_average_ignores_missing_samples() {
        let metrics = TradingMetrics::new();
        metrics.record_trade("alice", "s", true, Some(10.0));
        metrics.record_trade("alice", "s", true, None);
        metrics.record_trade("alice", "s", true, Some(20.0));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.avg_latency_ms, 15.0);
    }

    #[test]
    fn test_per_strategy_counters() {
        let metrics = TradingMetrics::new();
        metrics.record_trade("alice", "a", true, None);
        metrics.record_trade("alice", "a", false, None);
        metrics.record_trade("alice", "b", true, None);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.by_strategy["a"].attempts, 2);
        assert_eq!(snapshot.by_strategy["a"].successes, 1);
        assert_eq!(snapshot.by_strategy["b"].attempts, 1);
    }
}
