//! WebSocket upgrade route.

use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;

use crate::api::server::AppState;
use crate::hub::session;

/// Inbound messages are small subscription updates; anything larger is
/// rejected at the protocol layer.
const MAX_INBOUND_MESSAGE_BYTES: usize = 1024;

/// Upgrade `/ws` and hand the socket to a hub session.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.protocols(["payer-status-v1"])
        .max_message_size(MAX_INBOUND_MESSAGE_BYTES)
        .on_upgrade(move |socket| {
            session::run(
                socket,
                state.hub.clone(),
                state.metrics.clone(),
                state.cancel.clone(),
            )
        })
}
