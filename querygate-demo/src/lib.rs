//! querygate demo: replays the enabled-vs-skip comparison from a TOML script.

pub mod config;
pub mod error;
pub mod producer;
pub mod scenario;
pub mod telemetry;
