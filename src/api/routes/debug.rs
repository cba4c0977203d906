//! Runtime statistics route.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::server::AppState;
use crate::hub::HubStats;
use crate::metrics::MetricsSnapshot;
use crate::scheduler::SchedulerStats;

#[derive(Debug, Serialize)]
pub struct DebugStats {
    pub scheduler: SchedulerStats,
    pub hub: HubStats,
    pub http_clients: usize,
    pub metrics: MetricsSnapshot,
}

pub async fn debug_stats(State(state): State<AppState>) -> Json<DebugStats> {
    Json(DebugStats {
        scheduler: state.scheduler.stats(),
        hub: state.hub.stats(),
        http_clients: state.prober.registry().len(),
        metrics: state.metrics.snapshot(),
    })
}
