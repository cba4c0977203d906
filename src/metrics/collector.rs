//! Metrics collector implementation.
//!
//! Every recording path is non-blocking and side-effect only, so the hot
//! paths (workers, hub loop, write pumps) never wait on metrics.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;

use crate::domain::ProbeResult;

/// Label set for per-probe counters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ProbeKey {
    payer: String,
    endpoint_type: String,
    status: String,
}

#[derive(Default)]
struct ProbeCounters {
    count: AtomicU64,
    latency_total_ms: AtomicU64,
}

/// Metrics collector for the monitor.
#[derive(Default)]
pub struct MetricsCollector {
    // Probe metrics
    probes: DashMap<ProbeKey, ProbeCounters>,

    // WebSocket metrics
    ws_messages_sent: DashMap<(String, String), AtomicU64>,
    ws_connections_active: AtomicU64,

    // Config metrics
    config_reload_success: AtomicU64,
    config_reload_failure: AtomicU64,

    // Pipeline gauges and back-pressure counters
    scheduler_tasks: AtomicU64,
    http_clients: AtomicU64,
    tasks_dropped: AtomicU64,
    broadcasts_dropped: AtomicU64,
    slow_consumers_evicted: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed probe, success or failure.
    pub fn record_probe(&self, result: &ProbeResult) {
        let status = if result.status_code > 0 {
            result.status_code.to_string()
        } else {
            "unknown".to_string()
        };
        let key = ProbeKey {
            payer: result.payer.clone(),
            endpoint_type: result.endpoint_type.clone(),
            status,
        };
        let counters = self.probes.entry(key).or_default();
        counters.count.fetch_add(1, Ordering::Relaxed);
        counters
            .latency_total_ms
            .fetch_add(result.latency_ms.max(0) as u64, Ordering::Relaxed);
    }

    /// Count one message written to a subscriber's socket.
    pub fn increment_ws_message(&self, payer: &str, endpoint_type: &str) {
        self.ws_messages_sent
            .entry((payer.to_string(), endpoint_type.to_string()))
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Update the active connection gauge.
    pub fn set_ws_connections(&self, count: u64) {
        self.ws_connections_active.store(count, Ordering::Relaxed);
    }

    /// Record a configuration (re)load attempt.
    pub fn record_config_reload(&self, success: bool) {
        if success {
            self.config_reload_success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.config_reload_failure.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn set_scheduler_tasks(&self, count: u64) {
        self.scheduler_tasks.store(count, Ordering::Relaxed);
    }

    pub fn set_http_clients(&self, count: u64) {
        self.http_clients.store(count, Ordering::Relaxed);
    }

    /// A dispatch dropped because the task channel was full.
    pub fn record_task_dropped(&self) {
        self.tasks_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// A result dropped because the broadcast intake was full.
    pub fn record_broadcast_dropped(&self) {
        self.broadcasts_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// A client evicted because its send queue was full.
    pub fn record_slow_consumer(&self) {
        self.slow_consumers_evicted.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time view of every metric.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut probes: Vec<ProbeStat> = self
            .probes
            .iter()
            .map(|entry| {
                let key = entry.key();
                let count = entry.value().count.load(Ordering::Relaxed);
                let latency_total_ms = entry.value().latency_total_ms.load(Ordering::Relaxed);
                ProbeStat {
                    payer: key.payer.clone(),
                    endpoint_type: key.endpoint_type.clone(),
                    status: key.status.clone(),
                    count,
                    latency_total_ms,
                }
            })
            .collect();
        probes.sort_by(|a, b| {
            (&a.payer, &a.endpoint_type, &a.status).cmp(&(&b.payer, &b.endpoint_type, &b.status))
        });

        let mut ws_messages: Vec<WsMessageStat> = self
            .ws_messages_sent
            .iter()
            .map(|entry| WsMessageStat {
                payer: entry.key().0.clone(),
                endpoint_type: entry.key().1.clone(),
                count: entry.value().load(Ordering::Relaxed),
            })
            .collect();
        ws_messages.sort_by(|a, b| {
            (&a.payer, &a.endpoint_type).cmp(&(&b.payer, &b.endpoint_type))
        });

        MetricsSnapshot {
            probes,
            ws_messages,
            ws_connections: self.ws_connections_active.load(Ordering::Relaxed),
            config_reload_success: self.config_reload_success.load(Ordering::Relaxed),
            config_reload_failure: self.config_reload_failure.load(Ordering::Relaxed),
            scheduler_tasks: self.scheduler_tasks.load(Ordering::Relaxed),
            http_clients: self.http_clients.load(Ordering::Relaxed),
            tasks_dropped: self.tasks_dropped.load(Ordering::Relaxed),
            broadcasts_dropped: self.broadcasts_dropped.load(Ordering::Relaxed),
            slow_consumers_evicted: self.slow_consumers_evicted.load(Ordering::Relaxed),
        }
    }
}

/// Per-(payer, type, status) probe counters.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeStat {
    pub payer: String,
    #[serde(rename = "type")]
    pub endpoint_type: String,
    pub status: String,
    pub count: u64,
    pub latency_total_ms: u64,
}

impl ProbeStat {
    /// Mean latency over every recorded probe for this label set.
    pub fn latency_avg_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.latency_total_ms as f64 / self.count as f64
        }
    }
}

/// Per-(payer, type) WebSocket message counter.
#[derive(Debug, Clone, Serialize)]
pub struct WsMessageStat {
    pub payer: String,
    #[serde(rename = "type")]
    pub endpoint_type: String,
    pub count: u64,
}

/// A snapshot of all metrics at a point in time.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub probes: Vec<ProbeStat>,
    pub ws_messages: Vec<WsMessageStat>,
    pub ws_connections: u64,
    pub config_reload_success: u64,
    pub config_reload_failure: u64,
    pub scheduler_tasks: u64,
    pub http_clients: u64,
    pub tasks_dropped: u64,
    pub broadcasts_dropped: u64,
    pub slow_consumers_evicted: u64,
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn result(status_code: u16, latency_ms: i64, err: &str) -> ProbeResult {
        ProbeResult {
            ts: Utc::now(),
            payer: "acme".to_string(),
            endpoint_type: "login".to_string(),
            url: "https://a.test".to_string(),
            latency_ms,
            status_code,
            err: err.to_string(),
        }
    }

    #[test]
    fn test_record_probe_accumulates() {
        let collector = MetricsCollector::new();
        collector.record_probe(&result(200, 40, ""));
        collector.record_probe(&result(200, 60, ""));

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.probes.len(), 1);
        assert_eq!(snapshot.probes[0].count, 2);
        assert_eq!(snapshot.probes[0].latency_total_ms, 100);
        assert_eq!(snapshot.probes[0].latency_avg_ms(), 50.0);
        assert_eq!(snapshot.probes[0].status, "200");
    }

    #[test]
    fn test_failed_probe_uses_unknown_status() {
        let collector = MetricsCollector::new();
        collector.record_probe(&result(0, 10_000, "timeout"));

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.probes[0].status, "unknown");
    }

    #[test]
    fn test_config_reload_counters() {
        let collector = MetricsCollector::new();
        collector.record_config_reload(true);
        collector.record_config_reload(true);
        collector.record_config_reload(false);

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.config_reload_success, 2);
        assert_eq!(snapshot.config_reload_failure, 1);
    }

    #[test]
    fn test_gauges_and_drop_counters() {
        let collector = MetricsCollector::new();
        collector.set_ws_connections(3);
        collector.set_scheduler_tasks(7);
        collector.set_http_clients(2);
        collector.record_task_dropped();
        collector.record_broadcast_dropped();
        collector.record_slow_consumer();

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.ws_connections, 3);
        assert_eq!(snapshot.scheduler_tasks, 7);
        assert_eq!(snapshot.http_clients, 2);
        assert_eq!(snapshot.tasks_dropped, 1);
        assert_eq!(snapshot.broadcasts_dropped, 1);
        assert_eq!(snapshot.slow_consumers_evicted, 1);
    }

    #[test]
    fn test_ws_message_counter() {
        let collector = MetricsCollector::new();
        collector.increment_ws_message("acme", "login");
        collector.increment_ws_message("acme", "login");
        collector.increment_ws_message("umbrella", "api");

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.ws_messages.len(), 2);
        assert_eq!(snapshot.ws_messages[0].payer, "acme");
        assert_eq!(snapshot.ws_messages[0].count, 2);
    }
}
