//! Error types for the demo.

use crate::config::ConfigError;
use querygate_cache::QueryError;

#[derive(Debug, thiserror::Error)]
pub enum DemoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error("Failed to render snapshot: {0}")]
    Render(#[from] serde_json::Error),
    #[error("Failed to initialize logging: {0}")]
    Telemetry(String),
}
