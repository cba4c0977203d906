//! Prometheus metrics exporter.
//!
//! Exports the collector's snapshot in Prometheus text format.

use std::sync::Arc;

use super::collector::MetricsCollector;

/// Prometheus metrics exporter.
pub struct PrometheusExporter {
    collector: Arc<MetricsCollector>,
    namespace: String,
}

impl PrometheusExporter {
    /// Create a new exporter with the default namespace.
    pub fn new(collector: Arc<MetricsCollector>) -> Self {
        Self {
            collector,
            namespace: "payer_status".to_string(),
        }
    }

    /// Create a new exporter with a custom namespace.
    pub fn with_namespace(collector: Arc<MetricsCollector>, namespace: impl Into<String>) -> Self {
        Self {
            collector,
            namespace: namespace.into(),
        }
    }

    /// Export metrics in Prometheus text format.
    pub fn export(&self) -> String {
        let snapshot = self.collector.snapshot();
        let mut output = String::new();

        self.write_header(&mut output, "probe_total", "Total health probes executed", "counter");
        for probe in &snapshot.probes {
            self.write_sample(
                &mut output,
                "probe_total",
                &[
                    ("payer", &probe.payer),
                    ("type", &probe.endpoint_type),
                    ("status_code", &probe.status),
                ],
                probe.count as f64,
            );
        }

        self.write_header(
            &mut output,
            "probe_latency_ms_total",
            "Accumulated probe latency in milliseconds",
            "counter",
        );
        for probe in &snapshot.probes {
            self.write_sample(
                &mut output,
                "probe_latency_ms_total",
                &[
                    ("payer", &probe.payer),
                    ("type", &probe.endpoint_type),
                    ("status_code", &probe.status),
                ],
                probe.latency_total_ms as f64,
            );
        }

        self.write_header(
            &mut output,
            "websocket_messages_sent_total",
            "Total WebSocket messages sent",
            "counter",
        );
        for stat in &snapshot.ws_messages {
            self.write_sample(
                &mut output,
                "websocket_messages_sent_total",
                &[("payer", &stat.payer), ("type", &stat.endpoint_type)],
                stat.count as f64,
            );
        }

        self.write_scalar(
            &mut output,
            "websocket_connections_active",
            "Number of active WebSocket connections",
            "gauge",
            snapshot.ws_connections as f64,
        );

        self.write_header(
            &mut output,
            "config_reload_total",
            "Total configuration reload attempts",
            "counter",
        );
        self.write_sample(
            &mut output,
            "config_reload_total",
            &[("status", "success")],
            snapshot.config_reload_success as f64,
        );
        self.write_sample(
            &mut output,
            "config_reload_total",
            &[("status", "failure")],
            snapshot.config_reload_failure as f64,
        );

        self.write_scalar(
            &mut output,
            "scheduler_tasks",
            "Scheduled probe tasks",
            "gauge",
            snapshot.scheduler_tasks as f64,
        );
        self.write_scalar(
            &mut output,
            "http_clients",
            "Pooled HTTP clients by hostname",
            "gauge",
            snapshot.http_clients as f64,
        );
        self.write_scalar(
            &mut output,
            "tasks_dropped_total",
            "Dispatches dropped because the task channel was full",
            "counter",
            snapshot.tasks_dropped as f64,
        );
        self.write_scalar(
            &mut output,
            "broadcasts_dropped_total",
            "Results dropped because the broadcast intake was full",
            "counter",
            snapshot.broadcasts_dropped as f64,
        );
        self.write_scalar(
            &mut output,
            "slow_consumers_evicted_total",
            "Clients evicted with a full send queue",
            "counter",
            snapshot.slow_consumers_evicted as f64,
        );

        output
    }

    fn write_header(&self, output: &mut String, name: &str, help: &str, kind: &str) {
        let full_name = format!("{}_{}", self.namespace, name);
        output.push_str(&format!("# HELP {} {}\n", full_name, help));
        output.push_str(&format!("# TYPE {} {}\n", full_name, kind));
    }

    fn write_sample(&self, output: &mut String, name: &str, labels: &[(&str, &str)], value: f64) {
        let full_name = format!("{}_{}", self.namespace, name);
        let labels_str = labels
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", k, v))
            .collect::<Vec<_>>()
            .join(",");
        output.push_str(&format!("{}{{{}}} {}\n", full_name, labels_str, value));
    }

    fn write_scalar(&self, output: &mut String, name: &str, help: &str, kind: &str, value: f64) {
        self.write_header(output, name, help, kind);
        let full_name = format!("{}_{}", self.namespace, name);
        output.push_str(&format!("{} {}\n", full_name, value));
    }
}
