//! TrapTriage -- attack correlation and threat escalation for honeypot
//! fleets.
//!
//! This crate provides the correlation core: detector-verdict fusion,
//! attack-framework mapping, per-attacker sequence tracking, multi-stage
//! pattern detection, behavioral scoring, and campaign reporting.

pub mod api;
pub mod campaign;
pub mod config;
pub mod engine;
pub mod event;
pub mod fusion;
pub mod ingest;
pub mod knowledge;
pub mod maintenance;
pub mod mitre;
pub mod patterns;
pub mod scoring;
pub mod sequence;
pub mod storage;

use std::sync::Arc;

use anyhow::Result;

use crate::config::Config;

/// Start the TrapTriage daemon: API server, event intake, and maintenance.
pub async fn serve(config: Config) -> Result<()> {
    // 1. Storage
    tracing::info!(db_path = %config.storage.db_path, "initializing database");
    let pool = storage::open_pool(&config.storage.db_path)?;

    // 2. Correlation engine (loads knowledge base, restores sequence state)
    let engine = Arc::new(engine::CorrelationEngine::new(
        &config.engine,
        Some(pool.clone()),
    )?);

    // 3. Maintenance loop (background task)
    let schedules = maintenance::MaintenanceSchedules::parse(&config.maintenance)?;
    tokio::spawn(maintenance::run_maintenance_loop(
        engine.clone(),
        Some(pool.clone()),
        schedules,
    ));

    // 4. Event intake (background task)
    let intake_engine = engine.clone();
    let intake_bind = config.network.intake_bind.clone();
    tokio::spawn(async move {
        if let Err(e) = ingest::run_intake(&intake_bind, intake_engine).await {
            tracing::error!(error = %e, "event intake failed");
        }
    });

    // 5. API server
    let state = api::state::AppState { pool, engine };
    let app = api::router(state);

    let addr: std::net::SocketAddr = config.network.api_bind.parse()?;
    tracing::info!(%addr, "TrapTriage listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
