use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::load_generator::LoadProfile;
use crate::AppState;

use super::AppError;

// ─── Request / response types ────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct LoadConfig {
    /// Number of concurrent Tokio tasks generating requests
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// How long the run lasts (seconds)
    #[serde(default = "default_duration")]
    pub duration_secs: u64,

    /// Percentage of synthetic requests that fail downstream (0–100)
    #[serde(default = "default_error_pct")]
    pub error_pct: u8,

    /// Upper bound of the simulated handler work (milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_concurrency() -> u32 {
    10
}
fn default_duration() -> u64 {
    30
}
fn default_error_pct() -> u8 {
    5
}
fn default_max_delay_ms() -> u64 {
    50
}

#[derive(Debug, Serialize)]
pub struct LoadStatus {
    pub running: bool,
    pub message: String,
}

impl LoadConfig {
    fn validate(&self) -> Result<(), AppError> {
        if self.concurrency == 0 || self.concurrency > 500 {
            return Err(AppError::BadRequest(
                "concurrency must be between 1 and 500".into(),
            ));
        }
        if self.duration_secs == 0 || self.duration_secs > 300 {
            return Err(AppError::BadRequest(
                "duration_secs must be between 1 and 300".into(),
            ));
        }
        if self.error_pct > 100 {
            return Err(AppError::BadRequest(
                "error_pct must be between 0 and 100".into(),
            ));
        }
        if self.max_delay_ms > 10_000 {
            return Err(AppError::BadRequest(
                "max_delay_ms must be at most 10000".into(),
            ));
        }
        Ok(())
    }
}

// ─── POST /api/load/start ────────────────────────────────────────

pub async fn start_load(
    State(state): State<Arc<AppState>>,
    Json(config): Json<LoadConfig>,
) -> Result<Json<LoadStatus>, AppError> {
    config.validate()?;

    // Guard: only one run at a time
    if state
        .load_running
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Err(AppError::AlreadyRunning);
    }

    let msg = format!(
        "Started: {} workers × {}s, {}% failures, ≤{}ms work",
        config.concurrency, config.duration_secs, config.error_pct, config.max_delay_ms,
    );

    let profile = LoadProfile {
        concurrency: config.concurrency,
        duration: Duration::from_secs(config.duration_secs),
        error_pct: config.error_pct,
        max_delay_ms: config.max_delay_ms,
    };
    let running = state.load_running.clone();
    let interceptor = state.interceptor.clone();

    let handle = tokio::spawn(async move {
        crate::load_generator::run(running, interceptor, profile).await;
    });

    // Stash the handle so `stop` can await clean shutdown
    let mut guard = state.load_handle.lock().await;
    *guard = Some(handle);

    Ok(Json(LoadStatus {
        running: true,
        message: msg,
    }))
}

// ─── POST /api/load/stop ─────────────────────────────────────────

pub async fn stop_load(
    State(state): State<Arc<AppState>>,
) -> Result<Json<LoadStatus>, AppError> {
    if !state.load_running.load(Ordering::SeqCst) {
        return Ok(Json(LoadStatus {
            running: false,
            message: "No load run in progress".into(),
        }));
    }

    state.load_running.store(false, Ordering::SeqCst);

    let mut guard = state.load_handle.lock().await;
    if let Some(handle) = guard.take() {
        // Ignore JoinError — the task may have already finished
        let _ = handle.await;
    }

    Ok(Json(LoadStatus {
        running: false,
        message: "Load run stopped".into(),
    }))
}

// ─── GET /api/load/status ────────────────────────────────────────

pub async fn load_status(State(state): State<Arc<AppState>>) -> Json<LoadStatus> {
    let running = state.load_running.load(Ordering::SeqCst);
    Json(LoadStatus {
        running,
        message: if running {
            "Load run in progress".into()
        } else {
            "Idle".into()
        },
    })
}
