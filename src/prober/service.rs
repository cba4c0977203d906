//! Probe executor.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use reqwest::header;
use tracing::debug;

use crate::config::Endpoint;
use crate::domain::ProbeResult;
use crate::metrics::MetricsCollector;
use crate::scheduler::Task;

use super::registry::ClientRegistry;

/// Hard deadline for a single probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

const USER_AGENT: &str = "Payer-Status-Monitor/1.0";
const ACCEPT: &str = "text/html,application/json,*/*";

/// Executes HTTP probes through the per-hostname client registry.
///
/// Every probe yields a [`ProbeResult`]: non-2xx statuses are recorded
/// as-is, and `err` is set only when no HTTP status was obtained.
pub struct Prober {
    registry: ClientRegistry,
}

impl Prober {
    pub fn new(metrics: Arc<MetricsCollector>) -> Self {
        Self::with_timeout(PROBE_TIMEOUT, metrics)
    }

    pub fn with_timeout(timeout: Duration, metrics: Arc<MetricsCollector>) -> Self {
        Self {
            registry: ClientRegistry::new(timeout, metrics),
        }
    }

    /// The client registry, for shutdown and stats.
    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    /// Execute one probe. Latency covers start to completion on both the
    /// success and the failure path.
    pub async fn probe(&self, task: &Task) -> ProbeResult {
        let ts = Utc::now();
        let start = Instant::now();

        let fail = |err: String, start: Instant, url: String| ProbeResult {
            ts,
            payer: task.payer.clone(),
            endpoint_type: task.endpoint.endpoint_type.clone(),
            url,
            latency_ms: start.elapsed().as_millis() as i64,
            status_code: 0,
            err,
        };

        let url = match resolve_url(&task.endpoint) {
            Ok(url) => url,
            Err(err) => return fail(err, start, String::new()),
        };

        let parsed = match reqwest::Url::parse(&url) {
            Ok(parsed) => parsed,
            Err(e) => return fail(format!("invalid URL: {e}"), start, url),
        };
        let Some(hostname) = parsed.host_str().map(str::to_owned) else {
            return fail("URL has no host".to_string(), start, url);
        };

        let client = match self.registry.client_for(&hostname) {
            Ok(client) => client,
            Err(e) => return fail(format!("failed to build client: {e}"), start, url),
        };

        let method = match reqwest::Method::from_bytes(task.endpoint.method_or_default().as_bytes())
        {
            Ok(method) => method,
            Err(e) => return fail(format!("invalid method: {e}"), start, url),
        };

        let response = client
            .request(method, parsed)
            .header(header::USER_AGENT, USER_AGENT)
            .header(header::ACCEPT, ACCEPT)
            .header(header::CACHE_CONTROL, "no-cache")
            .send()
            .await;

        match response {
            Ok(response) => {
                let status_code = response.status().as_u16();
                // Drain the body so the connection returns to the pool.
                let _ = response.bytes().await;
                let result = ProbeResult {
                    ts,
                    payer: task.payer.clone(),
                    endpoint_type: task.endpoint.endpoint_type.clone(),
                    url,
                    latency_ms: start.elapsed().as_millis() as i64,
                    status_code,
                    err: String::new(),
                };
                debug!(
                    payer = %result.payer,
                    endpoint_type = %result.endpoint_type,
                    status_code,
                    latency_ms = result.latency_ms,
                    "Probe completed"
                );
                result
            }
            Err(e) => fail(format!("request failed: {e}"), start, url),
        }
    }
}

/// Resolve an endpoint's probe URL: full `url` first, then `path`, with
/// `${VAR}` references expanded from the process environment.
///
/// `url_contains` is a matcher, not a target; an endpoint carrying only
/// that is unresolvable here and yields an error result.
fn resolve_url(endpoint: &Endpoint) -> Result<String, String> {
    let target = endpoint
        .url
        .as_deref()
        .filter(|u| !u.is_empty())
        .or_else(|| endpoint.path.as_deref().filter(|p| !p.is_empty()));

    match target {
        Some(target) => Ok(expand_env(target)),
        None => Err("endpoint has no probeable URL (url_contains is match-only)".to_string()),
    }
}

/// Expand `${VAR}` references from the environment. Unset variables expand
/// to the empty string; text without references passes through unchanged.
fn expand_env(input: &str) -> String {
    if !input.contains("${") {
        return input.to_string();
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find('}') {
            Some(end) => {
                let name = &rest[start + 2..start + 2 + end];
                if let Ok(value) = std::env::var(name) {
                    out.push_str(&value);
                }
                rest = &rest[start + 2 + end + 1..];
            }
            None => {
                // Unterminated reference; keep the literal text.
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
