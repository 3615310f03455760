// Forge Workspaces — a multi-tenant backend for AI-assisted app workspaces
//
// Three systems carry the interesting work:
// - Process Supervisor: one dev server per workspace, lifecycle + log capture
// - Generation Pipeline: a streaming, tool-calling AI loop over a workspace
// - Preview Proxy: reverse-proxies HTTP/WebSocket traffic to a workspace's dev server
//
// Everything else (auth, CRUD, static assets) is a thin HTTP surface over a
// SQLite-backed persistence layer.

mod auth;
mod config;
mod db;
mod error;
mod generation;
mod logbus;
mod logging;
mod ports;
mod preview;
mod provider;
mod routes;
mod state;
mod supervisor;
mod tools;
mod workspace_store;
mod ws;

use anyhow::{Context, Result};
use axum::Router;
use config::Config;
use state::AppState;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let config = Config::from_env().context("loading configuration")?;
    tracing::info!(bind = %config.bind_addr, "starting forge-workspaces");

    let db = db::open(&config.database_path).context("opening database")?;
    let bind_addr = config.bind_addr;
    let state = AppState::new(config, db);

    let cors = match &state.config.cors_origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin.parse::<axum::http::HeaderValue>().context("parsing CORS_ORIGIN")?)
            .allow_methods(Any)
            .allow_headers(Any),
        None => CorsLayer::new().allow_methods(Any).allow_headers(Any),
    };

    let mut app = Router::new()
        .merge(routes::auth::router())
        .merge(routes::apps::router())
        .merge(routes::chats::router())
        .merge(routes::files::router())
        .merge(routes::process::router())
        .merge(routes::settings::router())
        .merge(routes::stream::router())
        .route("/preview/:appId/*path", axum::routing::any(preview::proxy))
        .route("/ws", axum::routing::get(ws::upgrade))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state.clone());

    if let Some(static_dir) = &state.config.static_dir {
        app = app.fallback_service(tower_http::services::ServeDir::new(static_dir));
    }

    let listener = TcpListener::bind(bind_addr).await.context("binding HTTP listener")?;
    tracing::info!("listening on {bind_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await
        .context("server error")?;

    tracing::info!("forge-workspaces shut down gracefully");
    Ok(())
}

async fn shutdown_signal(state: AppState) {
    tokio::signal::ctrl_c().await.ok();
    tracing::info!("shutdown signal received, stopping workspace processes");
    state.supervisor.stop_all().await;
}
