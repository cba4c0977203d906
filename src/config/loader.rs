//! Configuration loading, validation and hot reload.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::{Error, Result};
use crate::metrics::MetricsCollector;

use super::events::ConfigEventBroadcaster;
use super::models::{Config, MIN_SCHEDULE};

/// Loads the YAML configuration and hands out immutable snapshots.
///
/// A failed load or reload never disturbs the current snapshot: validation
/// happens on the candidate first, and only a valid candidate is swapped in
/// and published.
pub struct ConfigLoader {
    path: PathBuf,
    current: RwLock<Arc<Config>>,
    events: ConfigEventBroadcaster,
    metrics: Arc<MetricsCollector>,
}

impl ConfigLoader {
    /// Load the configuration from `path`, returning the loader on success.
    ///
    /// The initial load is fatal on error; reloads are not.
    pub fn load(path: impl Into<PathBuf>, metrics: Arc<MetricsCollector>) -> Result<Self> {
        let path = path.into();
        let config = read_and_validate(&path)?;
        info!(
            path = %path.display(),
            payers = config.payers.len(),
            endpoints = config.endpoint_count(),
            "Configuration loaded"
        );
        metrics.record_config_reload(true);
        Ok(Self {
            path,
            current: RwLock::new(Arc::new(config)),
            events: ConfigEventBroadcaster::new(),
            metrics,
        })
    }

    /// Current configuration snapshot.
    pub fn get(&self) -> Arc<Config> {
        self.current.read().clone()
    }

    /// Subscribe to snapshots published on reload.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Arc<Config>> {
        self.events.subscribe()
    }

    /// Re-read the file, swap the snapshot and publish it.
    ///
    /// On any failure the previous snapshot stays in effect.
    pub fn reload(&self) -> Result<()> {
        match read_and_validate(&self.path) {
            Ok(config) => {
                let snapshot = Arc::new(config);
                *self.current.write() = snapshot.clone();
                let receivers = self.events.publish(snapshot.clone());
                self.metrics.record_config_reload(true);
                info!(
                    payers = snapshot.payers.len(),
                    endpoints = snapshot.endpoint_count(),
                    receivers,
                    "Configuration reloaded"
                );
                Ok(())
            }
            Err(e) => {
                self.metrics.record_config_reload(false);
                error!(error = %e, "Configuration reload failed, keeping previous snapshot");
                Err(e)
            }
        }
    }

    /// Reload on SIGHUP until cancelled.
    pub async fn watch(self: Arc<Self>, cancel: CancellationToken) {
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "Failed to install SIGHUP handler");
                return;
            }
        };

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = hangup.recv() => {
                    info!("Received SIGHUP, reloading configuration");
                    let _ = self.reload();
                }
            }
        }
    }
}

fn read_and_validate(path: &std::path::Path) -> Result<Config> {
    let data = std::fs::read_to_string(path)
        .map_err(|e| Error::config(format!("failed to read {}: {e}", path.display())))?;
    let config: Config = serde_yaml::from_str(&data)?;
    validate(&config)?;
    Ok(config)
}

/// Validate a candidate configuration.
pub fn validate(config: &Config) -> Result<()> {
    if config.payers.is_empty() {
        return Err(Error::validation("no payers configured"));
    }

    for (i, payer) in config.payers.iter().enumerate() {
        if payer.name.is_empty() {
            return Err(Error::validation(format!("payer at index {i} has empty name")));
        }
        if payer.endpoints.is_empty() {
            return Err(Error::validation(format!("payer {} has no endpoints", payer.name)));
        }

        for (j, endpoint) in payer.endpoints.iter().enumerate() {
            if endpoint.endpoint_type.is_empty() {
                return Err(Error::validation(format!(
                    "payer {} endpoint at index {j} has empty type",
                    payer.name
                )));
            }
            if !endpoint.has_target() {
                return Err(Error::validation(format!(
                    "payer {} endpoint {} has no url, path, or url_contains",
                    payer.name, endpoint.endpoint_type
                )));
            }
            if let Some(schedule) = endpoint.schedule {
                if schedule < MIN_SCHEDULE {
                    return Err(Error::validation(format!(
                        "payer {} endpoint {} has schedule below 1 minute",
                        payer.name, endpoint.endpoint_type
                    )));
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const VALID: &str = r#"
payers:
  - name: acme
    endpoints:
      - type: login
        url: https://portal.acme.test/login
        schedule: 1m
"#;

    fn parse(yaml: &str) -> Config {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn write_config(yaml: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_valid_config_accepted() {
        assert!(validate(&parse(VALID)).is_ok());
    }

    #[test]
    fn test_empty_payer_list_rejected() {
        assert!(validate(&parse("payers: []")).is_err());
    }

    #[test]
    fn test_empty_payer_name_rejected() {
        let yaml = r#"
payers:
  - name: ""
    endpoints:
      - type: login
        url: https://a.test
"#;
        assert!(validate(&parse(yaml)).is_err());
    }

    #[test]
    fn test_payer_without_endpoints_rejected() {
        let yaml = "payers:\n  - name: acme\n    endpoints: []\n";
        assert!(validate(&parse(yaml)).is_err());
    }

    #[test]
    fn test_endpoint_without_target_rejected() {
        let yaml = r#"
payers:
  - name: acme
    endpoints:
      - type: login
        description: nothing to probe
"#;
        assert!(validate(&parse(yaml)).is_err());
    }

    #[test]
    fn test_schedule_just_below_minute_rejected() {
        let yaml = r#"
payers:
  - name: acme
    endpoints:
      - type: login
        url: https://a.test
        schedule: 59s
"#;
        assert!(validate(&parse(yaml)).is_err());
    }

    #[test]
    fn test_schedule_exactly_one_minute_accepted() {
        let yaml = r#"
payers:
  - name: acme
    endpoints:
      - type: login
        url: https://a.test
        schedule: 60s
"#;
        assert!(validate(&parse(yaml)).is_ok());
    }

    #[test]
    fn test_loader_reload_keeps_previous_on_failure() {
        let metrics = Arc::new(MetricsCollector::new());
        let file = write_config(VALID);
        let loader = ConfigLoader::load(file.path(), metrics.clone()).unwrap();
        assert_eq!(loader.get().payers[0].name, "acme");

        // Corrupt the file; reload must fail and keep the old snapshot.
        std::fs::write(file.path(), "payers: []").unwrap();
        assert!(loader.reload().is_err());
        assert_eq!(loader.get().payers[0].name, "acme");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.config_reload_success, 1);
        assert_eq!(snapshot.config_reload_failure, 1);
    }

    #[tokio::test]
    async fn test_reload_publishes_snapshot() {
        let metrics = Arc::new(MetricsCollector::new());
        let file = write_config(VALID);
        let loader = ConfigLoader::load(file.path(), metrics).unwrap();
        let mut rx = loader.subscribe();

        let updated = VALID.replace("acme", "umbrella");
        std::fs::write(file.path(), updated).unwrap();
        loader.reload().unwrap();

        let snapshot = rx.recv().await.unwrap();
        assert_eq!(snapshot.payers[0].name, "umbrella");
    }
}
