//! Worker configuration.
//!
//! Settings load from an optional TOML file plus `RELAY_*` environment
//! variable overrides (e.g. `RELAY_MAX_RUN_TIME=600`), and every knob has a
//! usable default so embedding applications can also just construct
//! `WorkerSettings::default()` and adjust fields directly.

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::{QueueError, QueueResult};

/// Environment variable prefix for configuration overrides
const ENV_PREFIX: &str = "RELAY";

/// Default configuration file (extension resolved by the loader)
const DEFAULT_CONFIG_FILE: &str = "config/worker";

// ============================================================================
// Default value functions
// ============================================================================

fn default_worker_name() -> String {
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| uuid::Uuid::new_v4().to_string());
    format!("host:{host} pid:{}", std::process::id())
}

fn default_max_run_time() -> u64 {
    4 * 60 * 60 // locks older than this are stale and claimable
}

fn default_read_ahead() -> i64 {
    5
}

fn default_poll_interval() -> u64 {
    5
}

/// Knobs for one worker process.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerSettings {
    /// Identity written into `locked_by`; must be unique per live worker.
    #[serde(default = "default_worker_name")]
    pub worker_name: String,

    /// Seconds before a held lock counts as abandoned. Must exceed the
    /// worst-case job runtime, otherwise a live job can have its lock
    /// stolen mid-run.
    #[serde(default = "default_max_run_time")]
    pub max_run_time: u64,

    /// Candidates fetched per poll, anticipating lock contention on the
    /// returned batch.
    #[serde(default = "default_read_ahead")]
    pub read_ahead: i64,

    /// Only claim jobs with `priority >= min_priority`, when set.
    #[serde(default)]
    pub min_priority: Option<i32>,

    /// Only claim jobs with `priority <= max_priority`, when set.
    #[serde(default)]
    pub max_priority: Option<i32>,

    /// Seconds to sleep between polls that claimed nothing.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            worker_name: default_worker_name(),
            max_run_time: default_max_run_time(),
            read_ahead: default_read_ahead(),
            min_priority: None,
            max_priority: None,
            poll_interval: default_poll_interval(),
        }
    }
}

impl WorkerSettings {
    /// Loads settings from `config/worker.toml` (optional) and `RELAY_*`
    /// environment variables, then validates them.
    pub fn load() -> QueueResult<Self> {
        let settings = Config::builder()
            .add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .map_err(|e| QueueError::Configuration {
                key: "worker".to_string(),
                source: anyhow::Error::from(e),
            })?
            .try_deserialize::<WorkerSettings>()
            .map_err(|e| QueueError::Configuration {
                key: "worker".to_string(),
                source: anyhow::Error::from(e),
            })?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate worker settings
    ///
    /// # Validation Rules
    /// - Worker name must not be empty
    /// - `max_run_time` and `poll_interval` must be greater than 0
    /// - `read_ahead` must be greater than 0
    /// - Priority bounds must not cross when both are set
    pub fn validate(&self) -> QueueResult<()> {
        if self.worker_name.trim().is_empty() {
            return Err(config_error(
                "worker.worker_name",
                "Worker name must not be empty.",
            ));
        }

        if self.max_run_time == 0 {
            return Err(config_error(
                "worker.max_run_time",
                "max_run_time must be greater than 0 seconds.",
            ));
        }

        if self.read_ahead <= 0 {
            return Err(config_error(
                "worker.read_ahead",
                "read_ahead must be greater than 0.",
            ));
        }

        if self.poll_interval == 0 {
            return Err(config_error(
                "worker.poll_interval",
                "poll_interval must be greater than 0 seconds.",
            ));
        }

        if let (Some(floor), Some(ceiling)) = (self.min_priority, self.max_priority) {
            if floor > ceiling {
                return Err(config_error(
                    "worker.min_priority",
                    "min_priority must not exceed max_priority.",
                ));
            }
        }

        Ok(())
    }
}

fn config_error(key: &str, reason: &str) -> QueueError {
    QueueError::Configuration {
        key: key.to_string(),
        source: anyhow::anyhow!(reason.to_string()),
    }
}
