//! Configuration summary route for the web UI.

use std::collections::BTreeSet;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::server::AppState;

#[derive(Debug, Serialize)]
pub struct ConfigSummary {
    pub payers: Vec<String>,
    pub types: Vec<String>,
    pub total_payers: usize,
    pub total_endpoints: usize,
}

/// Payer names and distinct endpoint types from the current snapshot, so
/// the UI can populate its filter controls.
pub async fn config_summary(State(state): State<AppState>) -> Json<ConfigSummary> {
    let config = state.config.get();

    let payers: Vec<String> = config.payers.iter().map(|p| p.name.clone()).collect();
    let types: BTreeSet<String> = config
        .payers
        .iter()
        .flat_map(|p| p.endpoints.iter())
        .map(|e| e.endpoint_type.clone())
        .collect();

    Json(ConfigSummary {
        total_payers: payers.len(),
        total_endpoints: config.endpoint_count(),
        payers,
        types: types.into_iter().collect(),
    })
}
