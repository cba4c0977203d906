//! Configuration data model.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Probe interval applied when an endpoint does not declare one.
pub const DEFAULT_SCHEDULE: Duration = Duration::from_secs(15 * 60);

/// Floor for any effective probe interval.
pub const MIN_SCHEDULE: Duration = Duration::from_secs(60);

/// The complete monitoring configuration: an ordered list of payers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub payers: Vec<Payer>,
}

impl Config {
    /// Total number of endpoints across all payers.
    pub fn endpoint_count(&self) -> usize {
        self.payers.iter().map(|p| p.endpoints.len()).sum()
    }
}

/// A healthcare payer with one or more monitored endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payer {
    pub name: String,
    pub endpoints: Vec<Endpoint>,
}

/// A single endpoint to monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Logical role: login, api, patient_search, ...
    #[serde(rename = "type")]
    pub endpoint_type: String,
    /// Full URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Relative path, used when no full URL is given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// URL pattern used for matching elsewhere; not probeable by itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_contains: Option<String>,
    /// HTTP method, default GET.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Probe interval ("90s", "15m", "1h"), default 15 minutes.
    #[serde(
        default,
        with = "schedule_format",
        skip_serializing_if = "Option::is_none"
    )]
    pub schedule: Option<Duration>,
    /// Optional human context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Endpoint {
    /// The HTTP method to probe with.
    pub fn method_or_default(&self) -> &str {
        match self.method.as_deref() {
            Some(m) if !m.is_empty() => m,
            _ => "GET",
        }
    }

    /// Effective probe interval: declared schedule, defaulted to 15 minutes
    /// and clamped up to the 1 minute floor.
    pub fn effective_schedule(&self) -> Duration {
        self.schedule.unwrap_or(DEFAULT_SCHEDULE).max(MIN_SCHEDULE)
    }

    /// Whether any probe target is declared at all.
    pub fn has_target(&self) -> bool {
        let non_empty = |s: &Option<String>| s.as_deref().is_some_and(|v| !v.is_empty());
        non_empty(&self.url) || non_empty(&self.path) || non_empty(&self.url_contains)
    }
}

/// Serde adapter for humantime-style durations ("90s", "15m"); bare
/// integers are taken as seconds.
mod schedule_format {
    use std::time::Duration;

    use serde::{de, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Seconds(u64),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Raw>::deserialize(deserializer)? {
            None => Ok(None),
            Some(Raw::Seconds(secs)) => Ok(Some(Duration::from_secs(secs))),
            Some(Raw::Text(text)) => humantime::parse_duration(text.trim())
                .map(Some)
                .map_err(|e| de::Error::custom(format!("invalid duration {text:?}: {e}"))),
        }
    }

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(d) => serializer.serialize_str(&humantime::format_duration(*d).to_string()),
            None => serializer.serialize_none(),
        }
    }
}
