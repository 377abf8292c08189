//! Periodic drain of the aggregation store into a metrics sink.
//!
//! One background task owns the timer and runs every pass, so passes never
//! overlap: timer ticks, manual `flush_now()` requests and the final pass on
//! `stop()` all go through the same loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use super::aggregator::LatencyAggregator;
use super::key::{BucketKey, MetricName, Statistic};
use super::sink::MetricsSink;
use super::stats::LatencyStats;
use crate::error::{LatencyError, Result};

/// Statistics emitted for one key in one pass.
#[derive(Debug, Clone, Serialize)]
pub struct FlushRecord {
    pub instance: String,
    pub path: String,
    pub min: u64,
    pub max: u64,
    pub average: f64,
    pub count: u64,
}

/// Outcome of a single flush pass.
#[derive(Debug, Clone, Serialize)]
pub struct FlushReport {
    pub flushed_at: DateTime<Utc>,
    /// Keys whose three measurements were all emitted.
    pub records: Vec<FlushRecord>,
    /// Keys that were already gone or empty when their turn came.
    pub skipped: usize,
    /// Set when the pass was cut short by a sink failure.
    pub error: Option<String>,
}

impl FlushReport {
    fn begin() -> Self {
        Self {
            flushed_at: Utc::now(),
            records: Vec::new(),
            skipped: 0,
            error: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Drain every bucket currently in `aggregator` and emit Min/Max/Average
/// for each.
///
/// Never fails: a sink error ends the pass, is logged and lands in
/// `FlushReport::error`. Keys not reached yet keep their buckets for the
/// next pass.
pub async fn flush_once(
    aggregator: &LatencyAggregator,
    sink: &dyn MetricsSink,
    prefix: &str,
) -> FlushReport {
    let mut report = FlushReport::begin();
    let keys = aggregator.keys();
    if let Err(e) = drain(aggregator, keys, sink, prefix, &mut report).await {
        error!(error = %e, emitted = report.records.len(), "latency flush pass failed");
        report.error = Some(e.to_string());
    }
    report
}

/// Emit every bucket in `keys`. A key whose bucket was taken since the
/// key snapshot is skipped.
async fn drain(
    aggregator: &LatencyAggregator,
    keys: Vec<BucketKey>,
    sink: &dyn MetricsSink,
    prefix: &str,
    report: &mut FlushReport,
) -> Result<()> {
    for key in keys {
        let Some(samples) = aggregator.take(&key) else {
            report.skipped += 1;
            continue;
        };
        let Some(stats) = LatencyStats::from_samples(&samples) else {
            report.skipped += 1;
            continue;
        };

        emit_stats(sink, prefix, &key, &stats).await?;

        info!(
            instance = %key.instance,
            path = %key.path,
            min = stats.min,
            max = stats.max,
            average = stats.average,
            count = stats.count,
            "latency flushed"
        );
        report.records.push(FlushRecord {
            instance: key.instance,
            path: key.path,
            min: stats.min,
            max: stats.max,
            average: stats.average,
            count: stats.count,
        });
    }
    Ok(())
}

async fn emit_stats(
    sink: &dyn MetricsSink,
    prefix: &str,
    key: &BucketKey,
    stats: &LatencyStats,
) -> Result<()> {
    for stat in Statistic::ALL {
        let name = MetricName::new(prefix, key, stat).to_string();
        sink.emit(&name, stats.value(stat), None).await?;
    }
    Ok(())
}

// ─── Background task ─────────────────────────────────────────────

enum FlusherCommand {
    /// Run a pass right away and hand back its report.
    FlushNow(oneshot::Sender<FlushReport>),
    /// Run the final pass and exit.
    Shutdown(oneshot::Sender<FlushReport>),
}

/// Handle to the periodic flush task.
pub struct Flusher {
    command_tx: mpsc::UnboundedSender<FlusherCommand>,
    handle: Option<JoinHandle<()>>,
}

impl Flusher {
    /// Spawn the timer task. The first tick fires one `period` after start.
    pub fn start(
        aggregator: Arc<LatencyAggregator>,
        sink: Arc<dyn MetricsSink>,
        prefix: impl Into<String>,
        period: Duration,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let prefix = prefix.into();

        info!(period_secs = period.as_secs_f64(), instance = %aggregator.instance(), "latency flusher started");

        let handle = tokio::spawn(run_flush_loop(aggregator, sink, prefix, period, command_rx));

        Self {
            command_tx,
            handle: Some(handle),
        }
    }

    /// Run an out-of-band pass, serialized with the timer.
    pub async fn flush_now(&self) -> Result<FlushReport> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(FlusherCommand::FlushNow(tx))
            .map_err(|_| LatencyError::FlusherStopped)?;
        rx.await.map_err(|_| LatencyError::FlusherStopped)
    }

    /// Stop the timer after one last pass, and wait for the task to exit.
    pub async fn stop(mut self) -> Result<FlushReport> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(FlusherCommand::Shutdown(tx))
            .map_err(|_| LatencyError::FlusherStopped)?;
        let report = rx.await.map_err(|_| LatencyError::FlusherStopped)?;

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .map_err(|e| LatencyError::Internal(format!("flusher task: {e}")))?;
        }
        info!("latency flusher stopped");
        Ok(report)
    }
}

impl Drop for Flusher {
    fn drop(&mut self) {
        // Not stopped explicitly: let the task run its final pass on its own.
        if self.handle.is_some() {
            let (tx, _rx) = oneshot::channel();
            let _ = self.command_tx.send(FlusherCommand::Shutdown(tx));
        }
    }
}

async fn run_flush_loop(
    aggregator: Arc<LatencyAggregator>,
    sink: Arc<dyn MetricsSink>,
    prefix: String,
    period: Duration,
    mut command_rx: mpsc::UnboundedReceiver<FlusherCommand>,
) {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                flush_once(&aggregator, sink.as_ref(), &prefix).await;
            }

            cmd = command_rx.recv() => {
                match cmd {
                    Some(FlusherCommand::FlushNow(reply)) => {
                        let report = flush_once(&aggregator, sink.as_ref(), &prefix).await;
                        let _ = reply.send(report);
                    }
                    Some(FlusherCommand::Shutdown(reply)) => {
                        let report = flush_once(&aggregator, sink.as_ref(), &prefix).await;
                        let _ = reply.send(report);
                        break;
                    }
                    None => {
                        warn!("latency flusher handle dropped, running final pass");
                        flush_once(&aggregator, sink.as_ref(), &prefix).await;
                        break;
                    }
                }
            }
        }
    }
}
