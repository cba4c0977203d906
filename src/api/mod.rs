//! HTTP surface: the WebSocket server and the metrics server.

pub mod routes;
pub mod server;

pub use server::{serve_metrics, serve_ws, AppState};
