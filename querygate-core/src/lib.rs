//! querygate Core - Query Cache Types
//!
//! Pure data structures shared by the cache, the test utilities and the demo.
//! This crate holds no runtime: the store, executor and resolver live in
//! `querygate-cache`.

pub mod config;
pub mod entry;
pub mod error;
pub mod key;
pub mod policy;
pub mod producer;
pub mod snapshot;

pub use config::QueryConfig;
pub use entry::{QueryEntry, QueryStatus, Settlement, Staleness};
pub use error::{ConfigError, ProducerFailure, QueryError, QueryResult, StoreError};
pub use key::{EncodedKey, KeyPart, QueryKey};
pub use policy::{ExecutionRequest, QueryFnSlot, RunState, Suppression};
pub use producer::{query_fn, FnQuery, QueryData, QueryFn};
pub use snapshot::Snapshot;

use chrono::{DateTime, Utc};

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Fetch generation. Issued from a single monotonic counter per store.
pub type Generation = u64;
