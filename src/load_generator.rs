use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::Method;
use tracing::info;

use crate::middleware::{RequestContext, RequestInterceptor};

/// Routes the synthetic traffic is spread across.
pub const SYNTHETIC_PATHS: &[(&str, &str)] = &[
    ("GET", "/synthetic/users/:id"),
    ("GET", "/synthetic/products/:id"),
    ("POST", "/synthetic/orders"),
    ("POST", "/synthetic/sessions"),
];

#[derive(Debug, Clone, Copy)]
pub struct LoadProfile {
    pub concurrency: u32,
    pub duration: Duration,
    /// Share of synthetic requests that fail downstream (0–100).
    pub error_pct: u8,
    /// Simulated handler work is drawn from 0..=max_delay_ms.
    pub max_delay_ms: u64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadSummary {
    pub requests: u64,
    pub failures: u64,
}

#[derive(Debug)]
struct SyntheticFailure;

// ─── Public entry point ──────────────────────────────────────────

/// Spawns `concurrency` Tokio tasks that push synthetic requests through
/// the interceptor until the deadline or until `running` is cleared.
pub async fn run(
    running: Arc<AtomicBool>,
    interceptor: RequestInterceptor,
    profile: LoadProfile,
) -> LoadSummary {
    let deadline = Instant::now() + profile.duration;

    let mut handles = Vec::with_capacity(profile.concurrency as usize);

    for worker_id in 0..profile.concurrency {
        let running = running.clone();
        let interceptor = interceptor.clone();

        handles.push(tokio::spawn(async move {
            worker(worker_id, running, interceptor, deadline, profile).await
        }));
    }

    let mut summary = LoadSummary::default();
    for h in handles {
        if let Ok(s) = h.await {
            summary.requests += s.requests;
            summary.failures += s.failures;
        }
    }

    running.store(false, Ordering::SeqCst);
    info!(
        requests = summary.requests,
        failures = summary.failures,
        "load generator finished"
    );
    summary
}

// ─── Worker loop ─────────────────────────────────────────────────

async fn worker(
    id: u32,
    running: Arc<AtomicBool>,
    interceptor: RequestInterceptor,
    deadline: Instant,
    profile: LoadProfile,
) -> LoadSummary {
    // Each worker gets its own deterministic RNG seeded uniquely.
    let mut rng = StdRng::seed_from_u64(1000 + id as u64);
    let mut summary = LoadSummary::default();

    while running.load(Ordering::Relaxed) && Instant::now() < deadline {
        let (method, path) = SYNTHETIC_PATHS[rng.gen_range(0..SYNTHETIC_PATHS.len())];
        let delay = Duration::from_millis(rng.gen_range(0..=profile.max_delay_ms));
        let fail = rng.gen_range(0u8..100) < profile.error_pct;

        let method = Method::from_bytes(method.as_bytes()).unwrap_or(Method::GET);
        let ctx = RequestContext::new(method, path);

        let outcome = interceptor
            .intercept(ctx, async move {
                tokio::time::sleep(delay).await;
                if fail {
                    Err(SyntheticFailure)
                } else {
                    Ok(())
                }
            })
            .await;

        summary.requests += 1;
        if outcome.is_err() {
            summary.failures += 1;
        }
    }

    summary
}
