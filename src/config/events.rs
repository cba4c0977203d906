//! Configuration change notification.
//!
//! Reloads are distributed as immutable snapshots over a broadcast channel
//! rather than through registered callbacks, so subscribers react in their
//! own event loops and a reload never re-enters subscriber state. A
//! subscriber failure cannot fail or roll back the reload.

use std::sync::Arc;

use tokio::sync::broadcast;

use super::models::Config;

/// Default channel capacity for config snapshots.
const DEFAULT_CHANNEL_CAPACITY: usize = 16;

/// Broadcaster distributing validated configuration snapshots.
pub struct ConfigEventBroadcaster {
    sender: broadcast::Sender<Arc<Config>>,
}

impl ConfigEventBroadcaster {
    /// Create a new broadcaster with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new broadcaster with specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to configuration snapshots.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Config>> {
        self.sender.subscribe()
    }

    /// Publish a new snapshot.
    ///
    /// Returns the number of subscribers that received it; 0 when nobody
    /// is listening, which is not an error.
    pub fn publish(&self, snapshot: Arc<Config>) -> usize {
        self.sender.send(snapshot).unwrap_or(0)
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ConfigEventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for ConfigEventBroadcaster {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::models::Payer;

    fn config() -> Arc<Config> {
        Arc::new(Config {
            payers: vec![Payer {
                name: "acme".to_string(),
                endpoints: vec![],
            }],
        })
    }

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let broadcaster = ConfigEventBroadcaster::new();
        let mut rx = broadcaster.subscribe();

        assert_eq!(broadcaster.publish(config()), 1);
        let snapshot = rx.recv().await.unwrap();
        assert_eq!(snapshot.payers[0].name, "acme");
    }

    #[test]
    fn test_publish_without_subscribers() {
        let broadcaster = ConfigEventBroadcaster::new();
        assert_eq!(broadcaster.publish(config()), 0);
    }
}
