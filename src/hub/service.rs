//! Hub event loop and the handle used to reach it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::ProbeResult;
use crate::error::{Error, Result};
use crate::metrics::MetricsCollector;

use super::client::{ClientHandle, Delivery};

/// Capacity of the broadcast intake channel.
pub const BROADCAST_CAPACITY: usize = 1000;

/// Register/unregister are rendezvous-style; senders wait for the loop.
const CONTROL_CAPACITY: usize = 1;

/// Owns the set of connected clients and fans results out to them.
///
/// All mutation of the client set happens on the single task running
/// [`Hub::run`]; everything else communicates through the handle's
/// channels. A client whose queue is full at dispatch time is evicted
/// rather than allowed to stall the loop.
pub struct Hub {
    clients: HashMap<Uuid, ClientHandle>,
    register_rx: mpsc::Receiver<ClientHandle>,
    unregister_rx: mpsc::Receiver<Uuid>,
    broadcast_rx: mpsc::Receiver<Arc<ProbeResult>>,
    /// Client count mirrored for the stats endpoint.
    active_clients: Arc<AtomicUsize>,
    metrics: Arc<MetricsCollector>,
}

/// Cloneable access to the hub's channels.
#[derive(Clone)]
pub struct HubHandle {
    register_tx: mpsc::Sender<ClientHandle>,
    unregister_tx: mpsc::Sender<Uuid>,
    broadcast_tx: mpsc::Sender<Arc<ProbeResult>>,
    active_clients: Arc<AtomicUsize>,
    metrics: Arc<MetricsCollector>,
}

/// Point-in-time hub counters for the debug endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct HubStats {
    pub active_clients: usize,
    pub broadcast_queued: usize,
    pub broadcast_capacity: usize,
}

impl Hub {
    pub fn new(metrics: Arc<MetricsCollector>) -> (Self, HubHandle) {
        let (register_tx, register_rx) = mpsc::channel(CONTROL_CAPACITY);
        let (unregister_tx, unregister_rx) = mpsc::channel(CONTROL_CAPACITY);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(BROADCAST_CAPACITY);
        let active_clients = Arc::new(AtomicUsize::new(0));

        (
            Self {
                clients: HashMap::new(),
                register_rx,
                unregister_rx,
                broadcast_rx,
                active_clients: active_clients.clone(),
                metrics: metrics.clone(),
            },
            HubHandle {
                register_tx,
                unregister_tx,
                broadcast_tx,
                active_clients,
                metrics,
            },
        )
    }

    /// Publish the current client count to the stats mirror and gauge.
    fn sync_client_count(&self) {
        let count = self.clients.len();
        self.active_clients.store(count, Ordering::Relaxed);
        self.metrics.set_ws_connections(count as u64);
    }

    /// Run the event loop until cancelled.
    ///
    /// On cancellation every client handle is dropped, closing each send
    /// queue; write pumps observe the closure and say goodbye on their
    /// sockets.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("Starting hub");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(clients = self.clients.len(), "Hub stopping, disconnecting clients");
                    self.clients.clear();
                    self.sync_client_count();
                    return;
                }
                Some(client) = self.register_rx.recv() => {
                    debug!(client_id = %client.id(), "Client registered");
                    self.clients.insert(client.id(), client);
                    self.sync_client_count();
                }
                Some(id) = self.unregister_rx.recv() => {
                    if self.clients.remove(&id).is_some() {
                        debug!(client_id = %id, "Client unregistered");
                        self.sync_client_count();
                    }
                }
                Some(result) = self.broadcast_rx.recv() => {
                    self.dispatch(result);
                }
            }
        }
    }

    /// Deliver one result to every matching client, evicting the slow.
    fn dispatch(&mut self, result: Arc<ProbeResult>) {
        let mut evicted = Vec::new();
        for client in self.clients.values() {
            match client.deliver(&result) {
                Delivery::Ok => {}
                Delivery::SlowConsumer => {
                    warn!(client_id = %client.id(), "Client send queue full, evicting slow consumer");
                    self.metrics.record_slow_consumer();
                    evicted.push(client.id());
                }
                Delivery::Disconnected => evicted.push(client.id()),
            }
        }

        if !evicted.is_empty() {
            for id in evicted {
                self.clients.remove(&id);
            }
            self.sync_client_count();
        }
    }
}

impl HubHandle {
    /// Hand a new client to the hub loop.
    pub async fn register(&self, client: ClientHandle) -> Result<()> {
        self.register_tx
            .send(client)
            .await
            .map_err(|_| Error::Hub("hub is not running".to_string()))
    }

    /// Ask the hub loop to forget a client. A no-op once the hub is gone.
    pub async fn unregister(&self, id: Uuid) {
        let _ = self.unregister_tx.send(id).await;
    }

    /// Queue a result for fan-out without blocking.
    ///
    /// This is the outer back-pressure boundary: when the intake is full
    /// the result is dropped and counted, never awaited.
    pub fn broadcast(&self, result: ProbeResult) {
        match self.broadcast_tx.try_send(Arc::new(result)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(result)) => {
                self.metrics.record_broadcast_dropped();
                warn!(
                    payer = %result.payer,
                    endpoint_type = %result.endpoint_type,
                    "Broadcast channel full, dropping result"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Broadcast channel closed, result dropped");
            }
        }
    }

    /// Counters for the debug endpoint.
    pub fn stats(&self) -> HubStats {
        let capacity = self.broadcast_tx.max_capacity();
        HubStats {
            active_clients: self.active_clients.load(Ordering::Relaxed),
            broadcast_queued: capacity - self.broadcast_tx.capacity(),
            broadcast_capacity: capacity,
        }
    }
}
