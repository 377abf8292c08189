//! Per-route request latency capture with periodic min/max/average flush.
//!
//! - `middleware` times every request and records one sample per request.
//! - `metrics` holds the shared aggregation store, the flush pass and the
//!   background flusher that drains the store into a `MetricsSink`.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub mod config;
pub mod error;
pub mod handlers;
pub mod load_generator;
pub mod metrics;
pub mod middleware;
pub mod server;

use config::AppConfig;
use error::{LatencyError, Result};
use metrics::{FlushReport, Flusher, LatencyAggregator, MetricsSink};
use middleware::RequestInterceptor;

/// Shared application state available to every handler via `State<Arc<AppState>>`.
pub struct AppState {
    pub config: AppConfig,

    /// Samples recorded by the middleware, drained by the flusher.
    pub aggregator: Arc<LatencyAggregator>,

    /// Cloned into the timing middleware and the load generator.
    pub interceptor: RequestInterceptor,

    /// `None` once `shutdown()` has run.
    flusher: tokio::sync::Mutex<Option<Flusher>>,

    /// Flag checked by every load-generator worker on each iteration.
    pub load_running: Arc<AtomicBool>,

    /// Handle to the spawned load-generator task so we can await clean shutdown.
    pub load_handle: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl AppState {
    /// Build the aggregator and interceptor and start the flusher.
    /// Must be called inside a Tokio runtime.
    pub fn new(config: AppConfig, sink: Arc<dyn MetricsSink>) -> Self {
        let aggregator = Arc::new(LatencyAggregator::new(config.instance.clone()));

        let mut interceptor = RequestInterceptor::new(aggregator.clone()).verbose(config.verbose);
        if config.per_request {
            interceptor = interceptor.with_per_request_sink(sink.clone());
        }

        let flusher = Flusher::start(
            aggregator.clone(),
            sink,
            config.metric_prefix.clone(),
            config.flush_interval,
        );

        Self {
            config,
            aggregator,
            interceptor,
            flusher: tokio::sync::Mutex::new(Some(flusher)),
            load_running: Arc::new(AtomicBool::new(false)),
            load_handle: tokio::sync::Mutex::new(None),
        }
    }

    pub async fn flush_now(&self) -> Result<FlushReport> {
        let guard = self.flusher.lock().await;
        match guard.as_ref() {
            Some(flusher) => flusher.flush_now().await,
            None => Err(LatencyError::FlusherStopped),
        }
    }

    /// Stop the flusher after a final pass. Later calls are no-ops
    /// returning `FlusherStopped`.
    pub async fn shutdown(&self) -> Result<FlushReport> {
        let flusher = self.flusher.lock().await.take();
        match flusher {
            Some(flusher) => flusher.stop().await,
            None => Err(LatencyError::FlusherStopped),
        }
    }
}
