//! Probe result type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a single health probe against one endpoint.
///
/// A result is produced for every probe attempt. Non-2xx responses are
/// observations, not errors: `err` is populated only when no HTTP status
/// was obtained at all (DNS, connect, TLS, timeout, redirect overflow,
/// malformed URL), in which case `status_code` is 0.
///
/// Serialized to JSON for WebSocket subscribers; `err` is omitted from the
/// wire when empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    /// Wall-clock timestamp at probe start (RFC 3339 on the wire).
    pub ts: DateTime<Utc>,
    /// Payer the probed endpoint belongs to.
    pub payer: String,
    /// Logical endpoint type (login, api, patient_search, ...).
    #[serde(rename = "type")]
    pub endpoint_type: String,
    /// Resolved URL the probe targeted.
    pub url: String,
    /// Milliseconds from probe start to completion, on success and failure.
    pub latency_ms: i64,
    /// HTTP status code, 0 when the request never completed.
    pub status_code: u16,
    /// Transport-level failure description; empty on any HTTP response.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub err: String,
}

impl ProbeResult {
    /// Whether the probe obtained an HTTP response at all.
    pub fn completed(&self) -> bool {
        self.err.is_empty()
    }
}
