//! TOML configuration for flowwatch.
//!
//! Layered: an explicit path, the `FLOWWATCH_CONFIG` environment variable,
//! the system location, then compiled-in defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::health::{EvaluationParameters, DEFAULT_HISTORY_LIMIT, DEFAULT_TOLERANCE_FRACTION};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "FLOWWATCH_CONFIG";

const SYSTEM_CONFIG_PATH: &str = "/etc/flowwatch/flowwatch.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowwatchConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl FlowwatchConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Parse and validate configuration text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.evaluation.defaults()?;
        Ok(config)
    }

    /// Resolve configuration. An explicit path must load; the environment
    /// variable and system location fall through to defaults on failure.
    ///
    /// Runs before logging is set up, so nothing is logged here. Call
    /// [`Resolved::log`] once a subscriber is installed.
    pub fn resolve(explicit: Option<&Path>) -> Result<Resolved> {
        Self::resolve_from(explicit, std::env::var_os(CONFIG_ENV).map(PathBuf::from), Path::new(SYSTEM_CONFIG_PATH))
    }

    fn resolve_from(explicit: Option<&Path>, env_path: Option<PathBuf>, system_path: &Path) -> Result<Resolved> {
        if let Some(path) = explicit {
            return Ok(Resolved::loaded(Self::load(path)?, path));
        }

        let mut skipped = Vec::new();

        if let Some(path) = env_path {
            match Self::load(&path) {
                Ok(cfg) => return Ok(Resolved::loaded(cfg, &path).with_skipped(skipped)),
                Err(e) => skipped.push(SkippedConfig {
                    path,
                    error: format!("{:#}", e),
                }),
            }
        }

        if system_path.exists() {
            match Self::load(system_path) {
                Ok(cfg) => return Ok(Resolved::loaded(cfg, system_path).with_skipped(skipped)),
                Err(e) => skipped.push(SkippedConfig {
                    path: system_path.to_path_buf(),
                    error: format!("{:#}", e),
                }),
            }
        }

        Ok(Resolved {
            config: Self::default(),
            source: None,
            skipped,
        })
    }
}

/// A config file that was found but could not be loaded.
#[derive(Debug, Clone)]
pub struct SkippedConfig {
    pub path: PathBuf,
    pub error: String,
}

/// Outcome of [`FlowwatchConfig::resolve`].
#[derive(Debug)]
pub struct Resolved {
    pub config: FlowwatchConfig,
    /// File the config came from; `None` means compiled-in defaults.
    pub source: Option<PathBuf>,
    pub skipped: Vec<SkippedConfig>,
}

impl Resolved {
    fn loaded(config: FlowwatchConfig, path: &Path) -> Self {
        Self {
            config,
            source: Some(path.to_path_buf()),
            skipped: Vec::new(),
        }
    }

    fn with_skipped(mut self, skipped: Vec<SkippedConfig>) -> Self {
        self.skipped = skipped;
        self
    }

    /// Report where the config came from and every fallback taken.
    pub fn log(&self) {
        for skipped in &self.skipped {
            warn!(
                path = %skipped.path.display(),
                error = %skipped.error,
                "config file could not be loaded, falling back"
            );
        }
        match &self.source {
            Some(path) => info!(path = %path.display(), "loaded flowwatch configuration"),
            None => debug!("no config file loaded, using compiled-in defaults"),
        }
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address and port for the HTTP listener.
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database holding schedules and executions.
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/flowwatch.db"),
        }
    }
}

/// Defaults for the `limit` and `percentageFromAverage` request parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub history_limit: i64,
    pub tolerance_fraction: f64,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            history_limit: i64::from(DEFAULT_HISTORY_LIMIT),
            tolerance_fraction: DEFAULT_TOLERANCE_FRACTION,
        }
    }
}

impl EvaluationConfig {
    /// Validated parameters with `now` set to the current instant.
    pub fn defaults(&self) -> Result<EvaluationParameters> {
        EvaluationParameters::new(self.history_limit, self.tolerance_fraction, Utc::now())
            .context("invalid [evaluation] configuration")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
