//! Typed configuration.
//!
//! Process configuration (database URL, log level) comes from environment
//! variables, loaded once at startup, failing fast if required vars are
//! missing. Sensitive values are wrapped in secrecy::SecretString to
//! prevent log leaks. Engine tuning lives in [`EngineConfig`], loadable
//! from a TOML file.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

pub use secrecy::{ExposeSecret, SecretString};

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    /// In production, systemd EnvironmentFile provides the vars.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: SecretString::from(required_var("DATABASE_URL")?),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

// ---------------------------------------------------------------------------
// Engine tuning
// ---------------------------------------------------------------------------

/// Engine tuning knobs, read once at startup.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Master switch. When false, `start()` is a silent no-op and records
    /// just accumulate until another node (or a restart) drains them.
    pub enabled: bool,

    /// Maximum pending records read per category per cycle.
    pub batch_size: usize,

    /// Worker tasks in the pool. The coordinator occupies one slot, so the
    /// effective worker count is one less.
    pub worker_count: usize,

    /// Bounded task-queue capacity; a full queue is the backpressure signal.
    pub queue_capacity: usize,

    /// How long the coordinator sleeps between cycles when nothing woke it.
    pub poll_interval_secs: u64,

    /// One-time delay before the first cycle after `start()`.
    pub startup_delay_secs: u64,

    /// Floor for the throughput-scaled pause after a productive cycle.
    pub min_pause_ms: u64,

    /// Estimated records processed per second, used to scale the
    /// inter-cycle pause to observed throughput.
    pub capacity_per_sec: u32,

    /// Sleep after a cycle fails wholesale (e.g. the store is unreachable).
    pub failure_backoff_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            enabled: true,
            batch_size: 5000,
            worker_count: cpus + 3,
            queue_capacity: 1000,
            poll_interval_secs: 60,
            startup_delay_secs: 0,
            min_pause_ms: 300,
            capacity_per_sec: 100,
            failure_backoff_secs: 300,
        }
    }
}

impl EngineConfig {
    /// Load tuning from a TOML file. Absent keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("bad engine config {}: {e}", path.display())))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_secs)
    }

    pub fn min_pause(&self) -> Duration {
        Duration::from_millis(self.min_pause_ms)
    }

    pub fn failure_backoff(&self) -> Duration {
        Duration::from_secs(self.failure_backoff_secs)
    }
}
