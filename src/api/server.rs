//! HTTP server setup.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::ConfigLoader;
use crate::error::Result;
use crate::hub::HubHandle;
use crate::metrics::{MetricsCollector, PrometheusExporter};
use crate::prober::Prober;
use crate::scheduler::Scheduler;

/// Shared state for the WebSocket server's routes.
#[derive(Clone)]
pub struct AppState {
    /// Server start time for uptime reporting.
    pub start_time: Instant,
    pub config: Arc<ConfigLoader>,
    pub hub: HubHandle,
    pub scheduler: Arc<Scheduler>,
    pub prober: Arc<Prober>,
    pub metrics: Arc<MetricsCollector>,
    /// Root cancellation; sessions derive their shutdown from it.
    pub cancel: CancellationToken,
}

/// Serve the WebSocket endpoint and the ancillary routes until cancelled.
pub async fn serve_ws(state: AppState, port: u16, cancel: CancellationToken) -> Result<()> {
    let router = crate::api::routes::create_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "WebSocket server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    info!("WebSocket server stopped");
    Ok(())
}

/// Serve Prometheus text exposition until cancelled.
pub async fn serve_metrics(
    metrics: Arc<MetricsCollector>,
    port: u16,
    cancel: CancellationToken,
) -> Result<()> {
    let exporter = Arc::new(PrometheusExporter::new(metrics));
    let router = Router::new().route(
        "/metrics",
        get(move || {
            let exporter = exporter.clone();
            async move { exporter.export() }
        }),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Metrics server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    info!("Metrics server stopped");
    Ok(())
}
