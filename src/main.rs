use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing_subscriber::{fmt, EnvFilter};

use route_latency::config::AppConfig;
use route_latency::error::{LatencyError, Result};
use route_latency::metrics::TracingSink;
use route_latency::{server, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    // ── 1. Configuration ─────────────────────────────────────────
    let config = AppConfig::from_env()?;
    let listen = config.listen;
    tracing::info!(
        instance = %config.instance,
        prefix = %config.metric_prefix,
        flush_interval_secs = config.flush_interval.as_secs(),
        verbose = config.verbose,
        per_request = config.per_request,
        "configuration loaded"
    );

    // ── 2. Shared state + flusher ────────────────────────────────
    let state = Arc::new(AppState::new(config, Arc::new(TracingSink)));

    // ── 3. Router ────────────────────────────────────────────────
    let app = server::create_router(state.clone());

    // ── 4. Bind & serve until Ctrl-C ─────────────────────────────
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| LatencyError::Internal(format!("bind {listen}: {e}")))?;
    tracing::info!(%listen, "route-latency listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| LatencyError::Internal(format!("server: {e}")))?;

    // ── 5. Drain ─────────────────────────────────────────────────
    state.load_running.store(false, Ordering::SeqCst);
    if let Some(handle) = state.load_handle.lock().await.take() {
        let _ = handle.await;
    }

    let report = state.shutdown().await?;
    tracing::info!(keys = report.records.len(), "final latency flush done");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
