//! Destinations for emitted measurements.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;

use crate::error::{LatencyError, Result};

pub type Tags = BTreeMap<String, String>;

/// Accepts named numeric measurements with optional tags.
///
/// Implementations may block or suspend; callers never hold a store lock
/// while emitting.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn emit(&self, name: &str, value: f64, tags: Option<&Tags>) -> Result<()>;
}

/// Writes every measurement as a structured `tracing` event under the
/// `metrics` target. Default sink of the binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl MetricsSink for TracingSink {
    async fn emit(&self, name: &str, value: f64, tags: Option<&Tags>) -> Result<()> {
        match tags {
            Some(tags) => tracing::info!(target: "metrics", metric = %name, value, ?tags, "measurement"),
            None => tracing::info!(target: "metrics", metric = %name, value, "measurement"),
        }
        Ok(())
    }
}

/// One measurement captured by `MemorySink`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    pub name: String,
    pub value: f64,
    pub tags: Option<Tags>,
}

/// Keeps measurements in memory.
///
/// `fail_matching` makes every emit whose name contains the pattern fail,
/// which is how sink outages are simulated.
#[derive(Default)]
pub struct MemorySink {
    measurements: Mutex<Vec<Measurement>>,
    fail_pattern: Mutex<Option<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_matching(&self, pattern: impl Into<String>) {
        *self.fail_pattern.lock() = Some(pattern.into());
    }

    pub fn heal(&self) {
        *self.fail_pattern.lock() = None;
    }

    pub fn measurements(&self) -> Vec<Measurement> {
        self.measurements.lock().clone()
    }

    /// Value of the most recent measurement with exactly this name.
    pub fn last_value(&self, name: &str) -> Option<f64> {
        self.measurements
            .lock()
            .iter()
            .rev()
            .find(|m| m.name == name)
            .map(|m| m.value)
    }

    pub fn len(&self) -> usize {
        self.measurements.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.lock().is_empty()
    }

    pub fn clear(&self) {
        self.measurements.lock().clear();
    }
}

#[async_trait]
impl MetricsSink for MemorySink {
    async fn emit(&self, name: &str, value: f64, tags: Option<&Tags>) -> Result<()> {
        if let Some(pattern) = self.fail_pattern.lock().as_deref() {
            if name.contains(pattern) {
                return Err(LatencyError::sink(name, "sink unavailable"));
            }
        }
        self.measurements.lock().push(Measurement {
            name: name.to_owned(),
            value,
            tags: tags.cloned(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_sink_records_and_fails_on_demand() {
        let sink = MemorySink::new();
        sink.emit("a|Min", 1.0, None).await.unwrap();

        sink.fail_matching("|b|");
        assert!(sink.emit("p|b|Max", 2.0, None).await.is_err());
        sink.emit("p|c|Max", 3.0, None).await.unwrap();

        sink.heal();
        sink.emit("p|b|Max", 4.0, None).await.unwrap();

        assert_eq!(sink.len(), 3);
        assert_eq!(sink.last_value("p|b|Max"), Some(4.0));
    }

    #[tokio::test]
    async fn tracing_sink_never_fails() {
        let mut tags = Tags::new();
        tags.insert("method".into(), "GET".into());
        assert!(TracingSink.emit("RequestLatency", 12.0, Some(&tags)).await.is_ok());
    }
}
