use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{MatchedPath, Request, State},
    http::Method,
    middleware::Next,
    response::Response,
};
use tracing::{error, info, warn};

use crate::metrics::{LatencyAggregator, MetricsSink, Tags, REQUEST_LATENCY_METRIC};

/// Bucket path for requests no route matched (404s, scanners).
pub const UNMATCHED_PATH: &str = "<unmatched>";

/// What the interceptor needs to know about a request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    /// Route string used as the bucket key.
    pub path: String,
}

impl RequestContext {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
        }
    }

    /// Key on the matched route pattern (`/api/users/:id`), never the raw
    /// URI, so ids and random 404 paths cannot grow the bucket count.
    pub fn from_request(req: &Request) -> Self {
        let path = req
            .extensions()
            .get::<MatchedPath>()
            .map(|mp| mp.as_str().to_owned())
            .unwrap_or_else(|| UNMATCHED_PATH.to_owned());
        Self::new(req.method().clone(), path)
    }
}

/// Times a continuation and records one sample for it, whatever the
/// continuation's outcome.
#[derive(Clone)]
pub struct RequestInterceptor {
    aggregator: Arc<LatencyAggregator>,
    per_request: Option<Arc<dyn MetricsSink>>,
    verbose: bool,
}

impl RequestInterceptor {
    pub fn new(aggregator: Arc<LatencyAggregator>) -> Self {
        Self {
            aggregator,
            per_request: None,
            verbose: false,
        }
    }

    /// Log a start line before and a completion line after every request.
    pub fn verbose(mut self, on: bool) -> Self {
        self.verbose = on;
        self
    }

    /// Also emit a `RequestLatency` measurement tagged with method and
    /// path for every request.
    pub fn with_per_request_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.per_request = Some(sink);
        self
    }

    pub fn aggregator(&self) -> &Arc<LatencyAggregator> {
        &self.aggregator
    }

    /// Run `next`, recording its latency under `ctx.path`.
    ///
    /// The outcome of `next` is returned untouched. Recording happens in a
    /// drop guard, so it also runs when this future is dropped before
    /// `next` completes.
    pub async fn intercept<F, T>(&self, ctx: RequestContext, next: F) -> T
    where
        F: Future<Output = T>,
    {
        if self.verbose {
            info!(method = %ctx.method, path = %ctx.path, "request started");
        }
        let _guard = RecordOnDrop {
            interceptor: self,
            ctx,
            start: Instant::now(),
        };
        next.await
    }

    fn finish(&self, ctx: &RequestContext, elapsed: Duration) {
        self.aggregator.record_elapsed(&ctx.path, elapsed);

        if self.verbose {
            info!(
                method = %ctx.method,
                path = %ctx.path,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                "request completed"
            );
        }

        if let Some(sink) = &self.per_request {
            emit_per_request(sink.clone(), ctx, elapsed);
        }
    }
}

struct RecordOnDrop<'a> {
    interceptor: &'a RequestInterceptor,
    ctx: RequestContext,
    start: Instant,
}

impl Drop for RecordOnDrop<'_> {
    fn drop(&mut self) {
        self.interceptor.finish(&self.ctx, self.start.elapsed());
    }
}

/// Fire-and-forget: the sink may be slow, the request must not wait on it.
fn emit_per_request(sink: Arc<dyn MetricsSink>, ctx: &RequestContext, elapsed: Duration) {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        warn!(path = %ctx.path, "no tokio runtime, per-request latency not emitted");
        return;
    };

    let mut tags = Tags::new();
    tags.insert("method".into(), ctx.method.to_string());
    tags.insert("path".into(), ctx.path.clone());
    let value = elapsed.as_secs_f64() * 1000.0;

    runtime.spawn(async move {
        if let Err(e) = sink.emit(REQUEST_LATENCY_METRIC, value, Some(&tags)).await {
            error!(error = %e, "per-request latency emit failed");
        }
    });
}

/// axum middleware: wraps the rest of the stack in the interceptor.
///
/// ```ignore
/// Router::new()
///     .route("/foo", get(handler))
///     .layer(axum::middleware::from_fn_with_state(interceptor, latency_middleware))
/// ```
pub async fn latency_middleware(
    State(interceptor): State<RequestInterceptor>,
    req: Request,
    next: Next,
) -> Response {
    let ctx = RequestContext::from_request(&req);
    interceptor.intercept(ctx, next.run(req)).await
}
