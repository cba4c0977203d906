//! Result fan-out to WebSocket subscribers.
//!
//! The hub's event loop is the sole owner of the client set; sessions and
//! workers talk to it over the register/unregister/broadcast channels.

mod client;
mod filter;
mod service;
pub mod session;

pub use client::{ClientHandle, SEND_QUEUE_CAPACITY};
pub use filter::{parse_subscription, SharedFilter, SubscriptionFilter};
pub use service::{Hub, HubHandle, HubStats, BROADCAST_CAPACITY};
