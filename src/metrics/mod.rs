//! Metrics collection and exposition.

mod collector;
mod exporter;

pub use collector::{MetricsCollector, MetricsSnapshot, ProbeStat, WsMessageStat};
pub use exporter::PrometheusExporter;
