//! Orchestrator configuration: timeouts, throttling, quotation TTL and the
//! result store backend.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::config::scheduler::JobSchedulerConfig;
use crate::core::AppResult;

/// Prefix of every environment variable read by [`OrchestratorConfig::from_env`].
pub const ENV_PREFIX: &str = "ORCHESTRATOR_";

/// Upper bound for any synchronous wait, configured or requested (one day).
pub const MAX_SYNC_TIMEOUT_SECS: u64 = 86_400;

/// Result store backend selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum ResultStoreConfig {
    /// Keep status documents in memory.
    #[default]
    InMemory,
    /// Write one JSON document per job into `dir`.
    File {
        /// Target directory, created if missing.
        dir: PathBuf,
    },
}

/// Root orchestrator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Worker pool settings.
    pub scheduler: JobSchedulerConfig,
    /// Wait bound for synchronous executions without an explicit timeout.
    pub default_sync_timeout_secs: u64,
    /// Minimum interval between recorded progress updates of one job.
    pub progress_throttle_ms: u64,
    /// Lifetime of a quotation.
    pub quotation_ttl_secs: u64,
    /// Where status documents are externalized.
    pub result_store: ResultStoreConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            scheduler: JobSchedulerConfig::default(),
            default_sync_timeout_secs: 120,
            progress_throttle_ms: 200,
            quotation_ttl_secs: 3600,
            result_store: ResultStoreConfig::InMemory,
        }
    }
}

impl OrchestratorConfig {
    /// Default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the worker pool settings.
    #[must_use]
    pub fn with_scheduler(mut self, scheduler: JobSchedulerConfig) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Set the default synchronous wait bound.
    #[must_use]
    pub const fn with_default_sync_timeout_secs(mut self, secs: u64) -> Self {
        self.default_sync_timeout_secs = secs;
        self
    }

    /// Set the progress throttle interval.
    #[must_use]
    pub const fn with_progress_throttle_ms(mut self, ms: u64) -> Self {
        self.progress_throttle_ms = ms;
        self
    }

    /// Set the quotation lifetime.
    #[must_use]
    pub const fn with_quotation_ttl_secs(mut self, secs: u64) -> Self {
        self.quotation_ttl_secs = secs;
        self
    }

    /// Select the result store backend.
    #[must_use]
    pub fn with_result_store(mut self, result_store: ResultStoreConfig) -> Self {
        self.result_store = result_store;
        self
    }

    /// Default synchronous wait bound as a `Duration`.
    #[must_use]
    pub const fn sync_timeout(&self) -> Duration {
        Duration::from_secs(self.default_sync_timeout_secs)
    }

    /// Progress throttle interval as a `Duration`.
    #[must_use]
    pub const fn progress_throttle(&self) -> Duration {
        Duration::from_millis(self.progress_throttle_ms)
    }

    /// Quotation lifetime as a `Duration`.
    #[must_use]
    pub const fn quotation_ttl(&self) -> Duration {
        Duration::from_secs(self.quotation_ttl_secs)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        self.scheduler
            .validate()
            .map_err(|e| format!("scheduler invalid: {e}"))?;
        if self.default_sync_timeout_secs == 0 {
            return Err("default_sync_timeout_secs must be greater than 0".into());
        }
        if self.default_sync_timeout_secs > MAX_SYNC_TIMEOUT_SECS {
            return Err(format!(
                "default_sync_timeout_secs must not exceed {MAX_SYNC_TIMEOUT_SECS}"
            ));
        }
        if self.quotation_ttl_secs == 0 {
            return Err("quotation_ttl_secs must be greater than 0".into());
        }
        if let ResultStoreConfig::File { dir } = &self.result_store {
            if dir.as_os_str().is_empty() {
                return Err("result_store.dir must not be empty".into());
            }
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a description of the parse or validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration from the process environment, reading a `.env` file
    /// first when present. Unset variables keep their defaults.
    ///
    /// Recognized variables: `ORCHESTRATOR_WORKER_COUNT`,
    /// `ORCHESTRATOR_MAX_QUEUE_DEPTH`, `ORCHESTRATOR_SYNC_TIMEOUT_SECS`,
    /// `ORCHESTRATOR_PROGRESS_THROTTLE_MS`, `ORCHESTRATOR_QUOTATION_TTL_SECS`,
    /// `ORCHESTRATOR_RESULT_DIR`.
    ///
    /// # Errors
    ///
    /// Fails on unparsable values or an invalid resulting configuration.
    pub fn from_env() -> AppResult<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup (keys include the prefix).
    ///
    /// # Errors
    ///
    /// Fails on unparsable values or an invalid resulting configuration.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(v) = parse_var(&lookup, "WORKER_COUNT")? {
            cfg.scheduler.worker_count = v;
        }
        if let Some(v) = parse_var(&lookup, "MAX_QUEUE_DEPTH")? {
            cfg.scheduler.max_queue_depth = v;
        }
        if let Some(v) = parse_var(&lookup, "SYNC_TIMEOUT_SECS")? {
            cfg.default_sync_timeout_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "PROGRESS_THROTTLE_MS")? {
            cfg.progress_throttle_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "QUOTATION_TTL_SECS")? {
            cfg.quotation_ttl_secs = v;
        }
        if let Some(dir) = lookup(&format!("{ENV_PREFIX}RESULT_DIR")) {
            cfg.result_store = ResultStoreConfig::File {
                dir: PathBuf::from(dir),
            };
        }
        cfg.validate().map_err(anyhow::Error::msg)?;
        Ok(cfg)
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> AppResult<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    let key = format!("{ENV_PREFIX}{name}");
    lookup(&key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("invalid value for {key}: {raw:?}"))
        })
        .transpose()
}
