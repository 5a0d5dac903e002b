//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration comes from a TOML file. Everything in it is
//! optional; a missing file means built-in defaults plus a warning.
//!
//! Root folder priority order:
//! 1. Command-line argument
//! 2. Environment variable (`CALASSOC_ROOT_FOLDER`)
//! 3. `root_folder` key in the TOML config file
//! 4. OS-dependent compiled default

use crate::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "CALASSOC_ROOT_FOLDER";

/// Environment variable naming an explicit config file
pub const CONFIG_FILE_ENV: &str = "CALASSOC_CONFIG";

/// Database file name used when the config does not give one
pub const DEFAULT_DATABASE_FILE: &str = "calassoc.db";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Folder holding the database (optional)
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Database path, relative to the root folder unless absolute
    #[serde(default)]
    pub database_file: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub workers: WorkersConfig,

    /// Per-module result limit overrides: `[limits.GMOS] flat = 3`
    #[serde(default)]
    pub limits: BTreeMap<String, BTreeMap<String, usize>>,

    /// Instrument to rule module overrides: `[registry] "GMOS-S" = "GMOS"`
    #[serde(default)]
    pub registry: BTreeMap<String, String>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Refresh worker pool configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WorkersConfig {
    #[serde(default = "default_worker_count")]
    pub count: usize,

    /// Claims older than this are returned to the queue by the reaper
    #[serde(default = "default_claim_timeout_secs")]
    pub claim_timeout_secs: u64,

    /// Idle wait between claim attempts
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_reap_interval_secs")]
    pub reap_interval_secs: u64,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            count: default_worker_count(),
            claim_timeout_secs: default_claim_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            reap_interval_secs: default_reap_interval_secs(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_worker_count() -> usize {
    4
}

fn default_claim_timeout_secs() -> u64 {
    600
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_reap_interval_secs() -> u64 {
    60
}

impl TomlConfig {
    /// Database location given a resolved root folder
    pub fn database_path(&self, root_folder: &Path) -> PathBuf {
        match &self.database_file {
            Some(file) if file.is_absolute() => file.clone(),
            Some(file) => root_folder.join(file),
            None => root_folder.join(DEFAULT_DATABASE_FILE),
        }
    }
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Load the config file if one can be found, else defaults
///
/// An explicit path that fails to load is an error. A missing default
/// location is not.
pub fn load_or_default(explicit: Option<&Path>) -> Result<TomlConfig> {
    if let Some(path) = explicit {
        let config = load_toml_config(path)?;
        info!("Loaded configuration from {}", path.display());
        return Ok(config);
    }

    match find_config_file() {
        Ok(path) => {
            let config = load_toml_config(&path)?;
            info!("Loaded configuration from {}", path.display());
            Ok(config)
        }
        Err(_) => {
            warn!("No config file found, using built-in defaults");
            Ok(TomlConfig::default())
        }
    }
}

/// Root folder resolution following the documented priority order
pub fn resolve_root_folder(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(path) = &config.root_folder {
        return path.clone();
    }

    // Priority 4: OS-dependent compiled default
    default_root_folder()
}

/// Locate the config file for this platform
pub fn find_config_file() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Ok(path);
        }
        return Err(Error::Config(format!("Config file not found: {:?}", path)));
    }

    let user_config = dirs::config_dir().map(|d| d.join("calassoc").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Ok(path);
        }
    }

    if cfg!(unix) {
        let system_config = PathBuf::from("/etc/calassoc/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }
    }

    Err(Error::Config("No config file found".to_string()))
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join("calassoc"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/calassoc"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("calassoc"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/calassoc"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("calassoc"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\calassoc"))
    } else {
        PathBuf::from("./calassoc_data")
    }
}
