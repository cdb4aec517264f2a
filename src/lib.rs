//! flowwatch -- runtime health checks for scheduled flows.
//!
//! This crate judges each scheduled flow's latest execution against that
//! flow's own run-time history and exposes the result to monitoring systems
//! over HTTP and the command line.

pub mod api;
pub mod config;
pub mod health;
pub mod scheduler;
pub mod storage;

use anyhow::{Context, Result};

use crate::config::FlowwatchConfig;

/// Start the flowwatch HTTP service.
pub async fn serve(config: &FlowwatchConfig) -> Result<()> {
    // 1. Initialize Storage
    let db_path = config.storage.db_path.to_string_lossy().into_owned();
    tracing::info!(%db_path, "Initializing database");
    let pool = storage::open_pool(&db_path)?;

    // 2. Evaluation defaults for requests without overrides
    let evaluation = config.evaluation.defaults()?;

    // 3. Start API Server
    let addr: std::net::SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("Invalid bind address '{}'", config.server.bind))?;
    let app = api::router(api::state::AppState::new(pool, evaluation));

    tracing::info!(%addr, "flowwatch listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
