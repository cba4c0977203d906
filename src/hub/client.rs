//! Client handle owned by the hub.

use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::domain::ProbeResult;

use super::filter::SharedFilter;

/// Results buffered per client before it counts as a slow consumer.
pub const SEND_QUEUE_CAPACITY: usize = 256;

/// The hub's view of one connected subscriber.
///
/// The hub holds the only sender of the client's queue; dropping the
/// handle is what closes the queue, so closure happens exactly once and
/// only by the hub (on unregister, eviction or shutdown).
pub struct ClientHandle {
    id: Uuid,
    sender: mpsc::Sender<Arc<ProbeResult>>,
    filter: SharedFilter,
}

/// Outcome of a non-blocking delivery attempt.
pub enum Delivery {
    /// Queued (or filtered out, which is not a failure).
    Ok,
    /// Queue full: the client is a slow consumer.
    SlowConsumer,
    /// The session is gone; the client is dead weight.
    Disconnected,
}

impl ClientHandle {
    pub fn new(id: Uuid, sender: mpsc::Sender<Arc<ProbeResult>>, filter: SharedFilter) -> Self {
        Self { id, sender, filter }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Offer a result to this client, applying its filter.
    pub fn deliver(&self, result: &Arc<ProbeResult>) -> Delivery {
        if !self.filter.accepts(result) {
            return Delivery::Ok;
        }
        match self.sender.try_send(result.clone()) {
            Ok(()) => Delivery::Ok,
            Err(mpsc::error::TrySendError::Full(_)) => Delivery::SlowConsumer,
            Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Disconnected,
        }
    }
}
