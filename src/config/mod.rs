//! Configuration loading, validation and change notification.
//!
//! The configuration is an immutable snapshot (`Arc<Config>`) replaced
//! atomically on reload and distributed through [`ConfigEventBroadcaster`];
//! nothing reads it through globals.

mod events;
mod loader;
mod models;

pub use events::ConfigEventBroadcaster;
pub use loader::ConfigLoader;
pub use models::{Config, Endpoint, Payer, DEFAULT_SCHEDULE, MIN_SCHEDULE};
