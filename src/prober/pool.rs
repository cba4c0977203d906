//! Worker pool consuming the scheduler's task channel.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::hub::HubHandle;
use crate::metrics::MetricsCollector;
use crate::scheduler::Task;

use super::service::Prober;

/// Default worker concurrency.
pub const DEFAULT_WORKERS: usize = 50;

/// Fixed fan-out of workers pulling tasks off the shared channel.
///
/// Workers hold no shared state beyond the channel. On cancellation a
/// worker finishes any in-flight probe under the probe's own deadline and
/// then exits; a closed task channel is likewise terminal.
pub struct WorkerPool {
    workers: usize,
    prober: Arc<Prober>,
    hub: HubHandle,
    metrics: Arc<MetricsCollector>,
    tasks: parking_lot::Mutex<Option<JoinSet<()>>>,
}

impl WorkerPool {
    pub fn new(prober: Arc<Prober>, hub: HubHandle, metrics: Arc<MetricsCollector>) -> Self {
        Self::with_workers(DEFAULT_WORKERS, prober, hub, metrics)
    }

    pub fn with_workers(
        workers: usize,
        prober: Arc<Prober>,
        hub: HubHandle,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            workers,
            prober,
            hub,
            metrics,
            tasks: parking_lot::Mutex::new(Some(JoinSet::new())),
        }
    }

    /// Spawn the workers against `task_rx`.
    pub fn start(&self, task_rx: mpsc::Receiver<Task>, cancel: CancellationToken) {
        let task_rx = Arc::new(Mutex::new(task_rx));

        let mut tasks = self.tasks.lock();
        let Some(join_set) = tasks.as_mut() else {
            return;
        };

        for worker_id in 0..self.workers {
            let task_rx = task_rx.clone();
            let prober = self.prober.clone();
            let hub = self.hub.clone();
            let metrics = self.metrics.clone();
            let cancel = cancel.clone();

            join_set.spawn(async move {
                debug!(worker_id, "Worker started");
                loop {
                    let task = {
                        let mut rx = task_rx.lock().await;
                        tokio::select! {
                            _ = cancel.cancelled() => None,
                            task = rx.recv() => task,
                        }
                    };
                    let Some(task) = task else {
                        debug!(worker_id, "Worker stopping");
                        break;
                    };

                    let result = prober.probe(&task).await;
                    metrics.record_probe(&result);
                    hub.broadcast(result);
                }
            });
        }

        info!(workers = self.workers, "Worker pool started");
    }

    /// Wait for every worker to exit.
    pub async fn stop(&self) {
        let join_set = self.tasks.lock().take();
        if let Some(mut join_set) = join_set {
            while join_set.join_next().await.is_some() {}
        }
        info!("Worker pool stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::config::Endpoint;
    use crate::hub::Hub;

    use super::*;

    fn task(url: &str) -> Task {
        Task {
            payer: "acme".to_string(),
            endpoint: Endpoint {
                endpoint_type: "login".to_string(),
                url: Some(url.to_string()),
                path: None,
                url_contains: None,
                method: None,
                schedule: None,
                description: None,
            },
            next_run: tokio::time::Instant::now(),
            interval: Duration::from_secs(60),
        }
    }

    #[tokio::test]
    async fn test_workers_exit_on_channel_close() {
        let metrics = Arc::new(MetricsCollector::new());
        let (_hub, handle) = Hub::new(metrics.clone());
        let prober = Arc::new(Prober::new(metrics.clone()));
        let pool = WorkerPool::with_workers(4, prober, handle, metrics);

        let (tx, rx) = mpsc::channel::<Task>(8);
        pool.start(rx, CancellationToken::new());

        drop(tx);
        tokio::time::timeout(Duration::from_secs(5), pool.stop())
            .await
            .expect("workers exit once the channel closes");
    }

    #[tokio::test]
    async fn test_workers_exit_on_cancellation() {
        let metrics = Arc::new(MetricsCollector::new());
        let (_hub, handle) = Hub::new(metrics.clone());
        let prober = Arc::new(Prober::new(metrics.clone()));
        let pool = WorkerPool::with_workers(4, prober, handle, metrics);

        let (_tx, rx) = mpsc::channel::<Task>(8);
        let cancel = CancellationToken::new();
        pool.start(rx, cancel.clone());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), pool.stop())
            .await
            .expect("workers exit on cancellation");
    }

    #[tokio::test]
    async fn test_unresolvable_task_still_produces_result() {
        let metrics = Arc::new(MetricsCollector::new());
        let (hub, handle) = Hub::new(metrics.clone());
        let cancel = CancellationToken::new();
        let hub_task = tokio::spawn(hub.run(cancel.clone()));

        let prober = Arc::new(Prober::new(metrics.clone()));
        let pool = WorkerPool::with_workers(1, prober, handle.clone(), metrics.clone());

        let (tx, rx) = mpsc::channel::<Task>(8);
        pool.start(rx, cancel.clone());

        // A task with a malformed URL flows through as an error observation.
        tx.send(task("::bad::")).await.unwrap();
        drop(tx);
        pool.stop().await;

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.probes.len(), 1);
        assert_eq!(snapshot.probes[0].status, "unknown");

        cancel.cancel();
        hub_task.await.unwrap();
    }
}
