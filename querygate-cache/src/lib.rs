//! querygate Cache - Conditional Asynchronous Query Cache
//!
//! This crate decides, per cache key, whether to start a fetch, reuse a
//! cached result, or skip execution, and exposes the result as observable
//! [`Snapshot`]s.
//!
//! # Design Philosophy
//!
//! Two policies can stop a query from running, and they must not be confused:
//!
//! - `enabled = false` **freezes** the entry. Nothing is fetched, but data
//!   already in the cache stays visible.
//! - the skip sentinel **deletes** the entry. Observers see `idle` with no
//!   data, and re-activation always starts from a clean slate.
//!
//! Both policies share one [`CacheStore`] and one [`FetchExecutor`]; the
//! [`PolicyResolver`] is the only place that tells them apart.
//!
//! # Cancellation
//!
//! Fetches are not cancelled for correctness. Every fetch carries a
//! generation drawn from a store-wide counter, and a completion is recorded
//! only while its generation still owns the entry. Aborting the producer task
//! is an optional extra controlled by `QueryConfig::abort_stale_fetches`.
//!
//! # Example
//!
//! ```ignore
//! let client: QueryClient<String> = QueryClient::with_defaults();
//! let producer = query_fn(|key| async move { fetch_remote(key).await });
//!
//! let mut observer = client.observe(ExecutionRequest::new(query_key!["enabled", "abc"], producer.clone()))?;
//! let resolved = observer.wait_for(|s| s.is_settled()).await?;
//!
//! // Freeze: data stays
//! observer.set_request(ExecutionRequest::new(query_key!["enabled", "abc"], producer).with_enabled(false))?;
//! ```

pub mod client;
pub mod executor;
pub mod observer;
pub mod registry;
pub mod resolver;
pub mod stats;
pub mod store;

pub use client::QueryClient;
pub use executor::FetchExecutor;
pub use observer::QueryObserver;
pub use registry::ObserverRegistry;
pub use resolver::{PolicyResolver, Resolution};
pub use stats::CacheStats;
pub use store::{CacheStore, FetchClaim, FetchMode};

pub use querygate_core::{
    query_fn, query_key, EncodedKey, ExecutionRequest, KeyPart, ProducerFailure, QueryConfig,
    QueryData, QueryEntry, QueryError, QueryFn, QueryFnSlot, QueryKey, QueryResult, QueryStatus,
    RunState, Settlement, Snapshot, Staleness, StoreError, Suppression,
};
