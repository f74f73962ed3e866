//! API route definitions.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::engine::DEFAULT_TOP_ATTACKERS;
use crate::event::HoneypotEvent;
use crate::storage;

use super::state::AppState;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/events", post(process_event))
        .route("/report", get(campaign_report))
        .route("/attackers", get(top_attackers))
        .route("/sequences/{source_id}", get(sequence_detail))
        .route("/sequences", delete(clear_sequences))
        .route("/incidents", get(list_incidents))
}

fn envelope(data: Value) -> Json<Value> {
    Json(json!({
        "data": data,
        "meta": {
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

async fn health() -> Json<Value> {
    envelope(json!({ "status": "ok" }))
}

async fn process_event(
    State(state): State<AppState>,
    Json(event): Json<HoneypotEvent>,
) -> Result<Json<Value>, StatusCode> {
    let engine = state.engine.clone();
    let enriched = tokio::task::spawn_blocking(move || engine.process(event))
        .await
        .map_err(|e| {
            warn!(error = %e, "event processing task panicked");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    let value = serde_json::to_value(&enriched).map_err(|e| {
        warn!(error = %e, "failed to serialize enriched event");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(envelope(value))
}

#[derive(Deserialize)]
struct TopQuery {
    n: Option<usize>,
}

async fn campaign_report(
    State(state): State<AppState>,
    Query(query): Query<TopQuery>,
) -> Json<Value> {
    let report = state
        .engine
        .campaign_report(query.n.unwrap_or(DEFAULT_TOP_ATTACKERS));
    envelope(serde_json::to_value(&report).unwrap_or(Value::Null))
}

async fn top_attackers(
    State(state): State<AppState>,
    Query(query): Query<TopQuery>,
) -> Json<Value> {
    let report = state
        .engine
        .campaign_report(query.n.unwrap_or(DEFAULT_TOP_ATTACKERS));
    envelope(serde_json::to_value(&report.top_attackers).unwrap_or(Value::Null))
}

async fn sequence_detail(
    State(state): State<AppState>,
    Path(source_id): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    match state.engine.inspect(&source_id) {
        Some(analysis) => {
            let value = serde_json::to_value(&analysis).unwrap_or(Value::Null);
            Ok(envelope(value))
        }
        None => Err(StatusCode::NOT_FOUND),
    }
}

async fn clear_sequences(State(state): State<AppState>) -> Json<Value> {
    let cleared = state.engine.store().len();
    state.engine.store().clear();
    envelope(json!({ "cleared": cleared }))
}

#[derive(Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

async fn list_incidents(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Json<Value> {
    match storage::list_incidents(&state.pool, query.limit.unwrap_or(50)) {
        Ok(incidents) => {
            let total = incidents.len();
            Json(json!({
                "data": incidents,
                "meta": { "total": total }
            }))
        }
        Err(e) => {
            warn!(error = %e, "failed to list incidents");
            Json(json!({ "data": [], "meta": { "total": 0 } }))
        }
    }
}
