use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::metrics::{FlushReport, PendingBucket};
use crate::AppState;

use super::AppError;

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub instance: String,
}

#[derive(Debug, Serialize)]
pub struct PendingLatency {
    pub instance: String,
    pub buckets: Vec<PendingBucket>,
}

// ─── GET /api/health ─────────────────────────────────────────────

pub async fn health(State(state): State<Arc<AppState>>) -> Json<Health> {
    Json(Health {
        status: "ok",
        instance: state.aggregator.instance().to_owned(),
    })
}

// ─── GET /api/latency ────────────────────────────────────────────

/// Statistics accumulated since the last flush. Does not drain.
pub async fn pending(State(state): State<Arc<AppState>>) -> Json<PendingLatency> {
    Json(PendingLatency {
        instance: state.aggregator.instance().to_owned(),
        buckets: state.aggregator.snapshot(),
    })
}

// ─── POST /api/latency/flush ─────────────────────────────────────

/// Runs a flush pass now instead of waiting for the next tick.
pub async fn flush(
    State(state): State<Arc<AppState>>,
) -> Result<Json<FlushReport>, AppError> {
    let report = state.flush_now().await?;
    Ok(Json(report))
}
