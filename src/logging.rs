//! Logging initialization.
//!
//! Builds the tracing subscriber from `RUST_LOG` when set, otherwise from
//! the coarser `LOG_LEVEL` environment variable the deployment scripts use.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default directive when neither `RUST_LOG` nor `LOG_LEVEL` is set.
const DEFAULT_DIRECTIVE: &str = "payer_status=info";

/// Initialize the global tracing subscriber.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directive = match std::env::var("LOG_LEVEL").ok().as_deref() {
            Some("debug") => "payer_status=debug",
            Some("warn") => "payer_status=warn",
            Some("error") => "payer_status=error",
            _ => DEFAULT_DIRECTIVE,
        };
        EnvFilter::new(directive)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
