//! cutwatch -- predictive-maintenance monitoring for an industrial cutting machine.
//!
//! This crate provides the core library for vibration-based stop detection,
//! the downtime event log, reliability KPIs, anomaly scanning and the HTTP API.

pub mod analysis;
pub mod api;
pub mod config;
pub mod detect;
pub mod storage;
pub mod telemetry;

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Start the cutwatch daemon: API server and background detection loop.
pub async fn serve(bind: &str, db_path: &Path, config_path: &Path) -> Result<()> {
    // 1. Initialize Storage
    tracing::info!(db_path = %db_path.display(), "Initializing database");
    let pool = storage::open_pool(db_path)?;

    // 2. Load configuration
    let store = config::ConfigStore::open(config_path);
    tracing::info!(config_path = %store.path().display(), "Configuration loaded");
    let config = Arc::new(Mutex::new(store));

    // 3. Start detection loop (background task)
    let engine = detect::engine::DetectionEngine::new(pool.clone());
    let loop_config = config.clone();
    tokio::spawn(async move {
        detect::engine::run_detection_loop(engine, loop_config).await;
    });

    // 4. Start API Server
    let addr: std::net::SocketAddr = bind.parse()?;
    let app = api::router(api::state::AppState::new(pool, config));

    tracing::info!(%addr, "cutwatch listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
