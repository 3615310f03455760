//! Tracing initialization: structured logs to stdout, filtered by
//! `RUST_LOG` with a sensible per-crate default.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn init() {
    let default_filter = "forge_workspaces=info,tower_http=debug,axum=debug";
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
