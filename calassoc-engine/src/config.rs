//! Engine settings resolved from the TOML configuration
//!
//! Turns the raw `TomlConfig` tables into validated runtime values: worker
//! pool timings, the instrument registry with overrides, and per-module
//! limit overrides. Invalid values are configuration errors at startup.

use crate::evaluator::{Evaluator, Limits};
use crate::rules::Registry;
use calassoc_common::config::{TomlConfig, WorkersConfig};
use calassoc_common::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Worker pool timings
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerSettings {
    pub worker_count: usize,
    /// Age after which an in-progress claim is considered abandoned
    pub claim_timeout: chrono::Duration,
    /// Sleep between claims when the queue is empty
    pub poll_interval: Duration,
    pub reap_interval: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self::from_config(&WorkersConfig::default()).unwrap_or(Self {
            worker_count: 4,
            claim_timeout: chrono::Duration::minutes(10),
            poll_interval: Duration::from_millis(500),
            reap_interval: Duration::from_secs(60),
        })
    }
}

impl WorkerSettings {
    pub fn from_config(workers: &WorkersConfig) -> Result<Self> {
        if workers.count == 0 {
            return Err(Error::Config("workers.count must be at least 1".to_string()));
        }
        if workers.claim_timeout_secs == 0 {
            return Err(Error::Config(
                "workers.claim_timeout_secs must be at least 1".to_string(),
            ));
        }
        if workers.reap_interval_secs == 0 {
            return Err(Error::Config(
                "workers.reap_interval_secs must be at least 1".to_string(),
            ));
        }
        let claim_timeout = i64::try_from(workers.claim_timeout_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .ok_or_else(|| Error::Config("workers.claim_timeout_secs is too large".to_string()))?;

        Ok(Self {
            worker_count: workers.count,
            claim_timeout,
            poll_interval: Duration::from_millis(workers.poll_interval_ms),
            reap_interval: Duration::from_secs(workers.reap_interval_secs),
        })
    }
}

/// Everything the service needs to start the engine
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub database_path: PathBuf,
    pub workers: WorkerSettings,
    pub registry: Registry,
    pub limits: Limits,
}

impl EngineSettings {
    pub fn from_toml(config: &TomlConfig, root_folder: &Path) -> Result<Self> {
        Ok(Self {
            database_path: config.database_path(root_folder),
            workers: WorkerSettings::from_config(&config.workers)?,
            registry: Registry::with_overrides(&config.registry)?,
            limits: Limits::from_config(&config.limits)?,
        })
    }

    pub fn evaluator(&self) -> Evaluator {
        Evaluator::new(self.registry.clone(), self.limits.clone())
    }
}
