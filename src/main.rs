use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use payer_status::api::{self, AppState};
use payer_status::config::ConfigLoader;
use payer_status::hub::Hub;
use payer_status::metrics::MetricsCollector;
use payer_status::prober::{Prober, WorkerPool};
use payer_status::scheduler::Scheduler;

const DEFAULT_CONFIG_PATH: &str = "config/payer_status.yaml";
const DEFAULT_WS_PORT: u16 = 8080;
const DEFAULT_METRICS_PORT: u16 = 9090;

/// Bound on the graceful shutdown phase.
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    payer_status::logging::init();
    dotenvy::dotenv().ok();

    info!("Starting payer status monitor");

    let root = CancellationToken::new();
    let metrics = Arc::new(MetricsCollector::new());

    // Configuration: fatal on the initial load, resilient on reloads.
    let config_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let loader = Arc::new(
        ConfigLoader::load(&config_path, metrics.clone())
            .with_context(|| format!("failed to load configuration from {config_path}"))?,
    );

    // Core pipeline: scheduler -> workers -> hub.
    let (scheduler, task_rx) = Scheduler::new(metrics.clone());
    let scheduler = Arc::new(scheduler);
    scheduler.load_config(&loader.get());

    let (hub, hub_handle) = Hub::new(metrics.clone());
    let prober = Arc::new(Prober::new(metrics.clone()));
    let pool = Arc::new(WorkerPool::new(
        prober.clone(),
        hub_handle.clone(),
        metrics.clone(),
    ));
    pool.start(task_rx, root.clone());

    let mut handles = Vec::new();

    handles.push(tokio::spawn({
        let hub_cancel = root.clone();
        hub.run(hub_cancel)
    }));

    handles.push(tokio::spawn({
        let scheduler = scheduler.clone();
        let reloads = loader.subscribe();
        let cancel = root.clone();
        async move { scheduler.run(reloads, cancel).await }
    }));

    handles.push(tokio::spawn(loader.clone().watch(root.clone())));

    let state = AppState {
        start_time: Instant::now(),
        config: loader.clone(),
        hub: hub_handle,
        scheduler: scheduler.clone(),
        prober: prober.clone(),
        metrics: metrics.clone(),
        cancel: root.clone(),
    };

    let ws_port = env_port("WS_PORT", DEFAULT_WS_PORT);
    handles.push(tokio::spawn({
        let cancel = root.clone();
        let root = root.clone();
        async move {
            if let Err(e) = api::serve_ws(state, ws_port, cancel).await {
                error!(error = %e, "WebSocket server failed");
                root.cancel();
            }
        }
    }));

    let metrics_port = env_port("METRICS_PORT", DEFAULT_METRICS_PORT);
    handles.push(tokio::spawn({
        let metrics = metrics.clone();
        let cancel = root.clone();
        let root = root.clone();
        async move {
            if let Err(e) = api::serve_metrics(metrics, metrics_port, cancel).await {
                error!(error = %e, "Metrics server failed");
                root.cancel();
            }
        }
    }));

    // SIGINT / SIGTERM initiate graceful shutdown; a server failure above
    // cancels the root token directly.
    let mut sigterm = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    let server_failed = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT");
            false
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM");
            false
        }
        _ = root.cancelled() => true,
    };

    info!("Initiating graceful shutdown");
    root.cancel();

    let drain = async {
        // Workers finish in-flight probes; the scheduler has closed the
        // task channel, the hub disconnects its clients.
        pool.stop().await;
        for handle in handles {
            let _ = handle.await;
        }
    };
    if tokio::time::timeout(SHUTDOWN_DEADLINE, drain).await.is_err() {
        warn!("Graceful shutdown deadline exceeded");
    }

    prober.registry().close();

    if server_failed {
        anyhow::bail!("shut down after a server failure");
    }
    info!("Payer status monitor stopped");
    Ok(())
}

fn env_port(name: &str, default: u16) -> u16 {
    match std::env::var(name) {
        Ok(value) => value.parse().unwrap_or_else(|_| {
            warn!(%name, %value, "Invalid port, using default");
            default
        }),
        Err(_) => default,
    }
}
