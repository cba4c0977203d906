//! Per-hostname HTTP client registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::debug;

use crate::metrics::MetricsCollector;

/// Idle pooled connections kept per host.
const MAX_IDLE_PER_HOST: usize = 10;

/// How long an idle pooled connection is kept.
const IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Redirects followed before the request fails.
const MAX_REDIRECTS: usize = 5;

/// Lazily builds and caches one pooled `reqwest::Client` per hostname.
///
/// The hot path is a read lock; insertion is double-checked under the
/// write lock so concurrent probes against a new host build one client.
pub struct ClientRegistry {
    clients: RwLock<HashMap<String, reqwest::Client>>,
    timeout: Duration,
    metrics: Arc<MetricsCollector>,
}

impl ClientRegistry {
    /// Create a registry whose clients enforce `timeout` per request.
    pub fn new(timeout: Duration, metrics: Arc<MetricsCollector>) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            timeout,
            metrics,
        }
    }

    /// The pooled client for `hostname`, building it on first use.
    pub fn client_for(&self, hostname: &str) -> reqwest::Result<reqwest::Client> {
        if let Some(client) = self.clients.read().get(hostname) {
            return Ok(client.clone());
        }

        let mut clients = self.clients.write();
        if let Some(client) = clients.get(hostname) {
            return Ok(client.clone());
        }

        let client = self.build_client()?;
        clients.insert(hostname.to_string(), client.clone());
        self.metrics.set_http_clients(clients.len() as u64);
        debug!(hostname, "Created HTTP client");
        Ok(client)
    }

    fn build_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .use_rustls_tls()
            .min_tls_version(reqwest::tls::Version::TLS_1_2)
            .pool_max_idle_per_host(MAX_IDLE_PER_HOST)
            .pool_idle_timeout(IDLE_TIMEOUT)
            .timeout(self.timeout)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .gzip(true)
            .build()
    }

    /// Number of cached clients.
    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.read().is_empty()
    }

    /// Drop every cached client, closing their idle connection pools.
    pub fn close(&self) {
        let mut clients = self.clients.write();
        let dropped = clients.len();
        clients.clear();
        self.metrics.set_http_clients(0);
        debug!(dropped, "Closed HTTP client registry");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ClientRegistry {
        ClientRegistry::new(Duration::from_secs(10), Arc::new(MetricsCollector::new()))
    }

    #[test]
    fn test_client_is_reused_per_hostname() {
        let registry = registry();
        assert!(registry.is_empty());

        registry.client_for("a.test").unwrap();
        registry.client_for("a.test").unwrap();
        registry.client_for("b.test").unwrap();

        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_close_clears_clients() {
        let registry = registry();
        registry.client_for("a.test").unwrap();
        registry.close();
        assert!(registry.is_empty());
    }
}
