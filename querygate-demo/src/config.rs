//! Configuration loading for the demo.
//!
//! All fields are required unless explicitly marked optional. No defaults.

use querygate_cache::{QueryConfig, Staleness};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Longest single `wait` step.
pub const MAX_WAIT_MS: u64 = 60_000;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DemoConfig {
    /// How long the producer sleeps before answering.
    pub fetch_delay_ms: u64,
    /// Reuse window for resolved data; absent means forever.
    pub stale_time_ms: Option<u64>,
    pub abort_stale_fetches: bool,
    pub log: LogConfig,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    pub format: LogFormat,
    /// Used when `RUST_LOG` is not set.
    pub filter: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// One of the two comparison columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    /// Driven by the enabled flag.
    Enabled,
    /// Driven by the skip sentinel.
    SkipToken,
}

/// A scripted user action.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Replace a column's input text.
    Type { column: Column, text: String },
    /// Set a column's checkbox.
    Check { column: Column, checked: bool },
    /// Let fetches make progress.
    Wait { ms: u64 },
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing configuration file path (use --config or QUERYGATE_DEMO_CONFIG)")]
    MissingConfigPath,
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl DemoConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path_from_args().or_else(config_path_from_env);
        let path = path.ok_or(ConfigError::MissingConfigPath)?;
        let config = Self::from_path(&path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: DemoConfig = toml::from_str(contents)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch_delay_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "fetch_delay_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.log.filter.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "log.filter",
                reason: "must not be empty".to_string(),
            });
        }
        if self.steps.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "steps",
                reason: "at least one step is required".to_string(),
            });
        }
        for step in &self.steps {
            if let Step::Wait { ms } = step {
                if *ms == 0 || *ms > MAX_WAIT_MS {
                    return Err(ConfigError::InvalidValue {
                        field: "steps.ms",
                        reason: format!("wait must be between 1 and {} ms", MAX_WAIT_MS),
                    });
                }
            }
        }
        self.query_config()
            .validate()
            .map_err(|e| ConfigError::InvalidValue {
                field: "stale_time_ms",
                reason: e.to_string(),
            })?;
        Ok(())
    }

    /// Cache configuration derived from this file.
    pub fn query_config(&self) -> QueryConfig {
        let staleness = match self.stale_time_ms {
            Some(ms) => Staleness::after(Duration::from_millis(ms)),
            None => Staleness::Never,
        };
        QueryConfig::default()
            .with_staleness(staleness)
            .with_abort_stale_fetches(self.abort_stale_fetches)
    }

    pub fn fetch_delay(&self) -> Duration {
        Duration::from_millis(self.fetch_delay_ms)
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var("QUERYGATE_DEMO_CONFIG").ok().map(PathBuf::from)
}

fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}
