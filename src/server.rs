use axum::{
    middleware as axum_mw,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::handlers;
use crate::middleware::timing;
use crate::AppState;

/// Builds the full Axum `Router`: every route, including the latency
/// endpoints themselves, goes through the timing middleware.
pub fn create_router(state: Arc<AppState>) -> Router {
    let interceptor = state.interceptor.clone();

    Router::new()
        .route("/api/health", get(handlers::latency::health))
        // ── Latency ─────────────────────────────────────────────
        .route("/api/latency", get(handlers::latency::pending))
        .route("/api/latency/flush", post(handlers::latency::flush))
        // ── Synthetic load ──────────────────────────────────────
        .route("/api/load/start", post(handlers::load::start_load))
        .route("/api/load/stop", post(handlers::load::stop_load))
        .route("/api/load/status", get(handlers::load::load_status))
        // ── Provide shared state to all routes above ────────────
        .with_state(state)
        // ── Global middleware (applied bottom-up) ───────────────
        .layer(axum_mw::from_fn_with_state(
            interceptor,
            timing::latency_middleware,
        ))
        .layer(CorsLayer::permissive())
}
