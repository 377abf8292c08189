//! Environment-sourced configuration.
//!
//! Every value has a default; an unset or empty variable falls back to it.
//! Values that are present but unparsable are rejected instead of ignored.

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{LatencyError, Result};

pub const ENV_INSTANCE: &str = "POD_NAME";
pub const ENV_PREFIX: &str = "LATENCY_METRIC_PREFIX";
pub const ENV_FLUSH_INTERVAL: &str = "LATENCY_FLUSH_INTERVAL_SECS";
pub const ENV_VERBOSE: &str = "LATENCY_VERBOSE";
pub const ENV_PER_REQUEST: &str = "LATENCY_PER_REQUEST";
pub const ENV_LISTEN: &str = "LISTEN_ADDR";

/// Placeholder instance id used when `POD_NAME` is not set.
pub const DEFAULT_INSTANCE: &str = "local-instance";
pub const DEFAULT_PREFIX: &str = "RequestLatency";
pub const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 300;
const MAX_FLUSH_INTERVAL_SECS: u64 = 86_400;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub instance: String,
    pub metric_prefix: String,
    pub flush_interval: Duration,
    /// Log a start and a completion line for every request.
    pub verbose: bool,
    /// Emit a `RequestLatency` measurement per request in addition to the
    /// aggregated flush.
    pub per_request: bool,
    pub listen: SocketAddr,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            instance: DEFAULT_INSTANCE.into(),
            metric_prefix: DEFAULT_PREFIX.into(),
            flush_interval: Duration::from_secs(DEFAULT_FLUSH_INTERVAL_SECS),
            verbose: false,
            per_request: false,
            listen: SocketAddr::from(([0, 0, 0, 0], 3000)),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Tests pass a closure over a map
    /// instead of mutating the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());
        let mut cfg = Self::default();

        if let Some(instance) = get(ENV_INSTANCE) {
            cfg.instance = instance;
        }
        if let Some(prefix) = get(ENV_PREFIX) {
            cfg.metric_prefix = prefix;
        }
        if let Some(raw) = get(ENV_FLUSH_INTERVAL) {
            let secs: u64 = raw
                .parse()
                .map_err(|e| LatencyError::Config(format!("{ENV_FLUSH_INTERVAL}={raw}: {e}")))?;
            cfg.flush_interval = Duration::from_secs(secs);
        }
        if let Some(raw) = get(ENV_VERBOSE) {
            cfg.verbose = parse_bool(ENV_VERBOSE, &raw)?;
        }
        if let Some(raw) = get(ENV_PER_REQUEST) {
            cfg.per_request = parse_bool(ENV_PER_REQUEST, &raw)?;
        }
        if let Some(raw) = get(ENV_LISTEN) {
            cfg.listen = raw
                .parse()
                .map_err(|e| LatencyError::Config(format!("{ENV_LISTEN}={raw}: {e}")))?;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let secs = self.flush_interval.as_secs();
        if !(1..=MAX_FLUSH_INTERVAL_SECS).contains(&secs) {
            return Err(LatencyError::Config(format!(
                "{ENV_FLUSH_INTERVAL} must be between 1 and {MAX_FLUSH_INTERVAL_SECS}"
            )));
        }
        if self.metric_prefix.trim_matches('|').trim().is_empty() {
            return Err(LatencyError::Config(format!(
                "{ENV_PREFIX} must contain something besides '|'"
            )));
        }
        Ok(())
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(LatencyError::Config(format!("{key}={raw}: expected a boolean"))),
    }
}
