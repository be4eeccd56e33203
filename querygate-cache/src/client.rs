//! Query client: the entry point tying store, executor and resolver together.

use std::sync::Arc;

use querygate_core::{
    ExecutionRequest, QueryConfig, QueryData, QueryFn, QueryKey, QueryResult, Snapshot,
    Staleness,
};
use tokio::sync::watch;
use tracing::debug;

use crate::executor::FetchExecutor;
use crate::observer::QueryObserver;
use crate::resolver::{PolicyResolver, Resolution};
use crate::stats::CacheStats;
use crate::store::{CacheStore, FetchClaim};

/// Handle to a query cache. Clones share the same store.
pub struct QueryClient<T> {
    store: CacheStore<T>,
    executor: FetchExecutor<T>,
    resolver: PolicyResolver<T>,
}

impl<T: QueryData> QueryClient<T> {
    /// Create a client after validating `config`.
    pub fn new(config: QueryConfig) -> QueryResult<Self> {
        config.validate()?;
        Ok(Self::assemble(config))
    }

    /// Create a client with the default configuration.
    pub fn with_defaults() -> Self {
        Self::assemble(QueryConfig::default())
    }

    fn assemble(config: QueryConfig) -> Self {
        let store = CacheStore::new(config);
        let executor = FetchExecutor::new(store.clone());
        let resolver = PolicyResolver::new(store.clone(), executor.clone());
        Self {
            store,
            executor,
            resolver,
        }
    }

    /// Evaluate a request and return the key's snapshot right after.
    ///
    /// Producer failures never surface here; they land in the snapshot.
    pub fn subscribe(&self, request: &ExecutionRequest<T>) -> QueryResult<Snapshot<T>> {
        self.resolver.resolve(request)?;
        self.snapshot(&request.key)
    }

    /// Evaluate a request once.
    pub fn resolve(&self, request: &ExecutionRequest<T>) -> QueryResult<Resolution> {
        self.resolver.resolve(request)
    }

    /// Create an observer tracking `request` and evaluate it.
    pub fn observe(&self, request: ExecutionRequest<T>) -> QueryResult<QueryObserver<T>> {
        QueryObserver::new(self.clone(), request)
    }

    /// Watch a key's snapshots without evaluating any request.
    pub fn watch(&self, key: &QueryKey) -> QueryResult<watch::Receiver<Snapshot<T>>> {
        self.store.subscribe(&key.encode())
    }

    pub fn snapshot(&self, key: &QueryKey) -> QueryResult<Snapshot<T>> {
        self.store.snapshot(&key.encode())
    }

    /// Cached data for a key, if any.
    pub fn get_query_data(&self, key: &QueryKey) -> QueryResult<Option<T>> {
        Ok(self.store.get(&key.encode())?.and_then(|entry| entry.data))
    }

    /// Seed or overwrite a key's data. In-flight fetches for the key are discarded.
    pub fn set_query_data(&self, key: &QueryKey, value: T) -> QueryResult<()> {
        let generation = self.store.set_data(&key.encode(), value)?;
        debug!(key = %key, generation, "Query data set");
        Ok(())
    }

    /// Start a fetch even if one is in flight or the data is fresh.
    pub fn refetch(&self, key: &QueryKey, producer: Arc<dyn QueryFn<T>>) -> QueryResult<FetchClaim> {
        let staleness = self.store.config().default_staleness;
        self.executor.refetch(key, producer, staleness)
    }

    /// Like [`refetch`](Self::refetch), with a staleness override for the entry.
    pub fn refetch_with_staleness(
        &self,
        key: &QueryKey,
        producer: Arc<dyn QueryFn<T>>,
        staleness: Staleness,
    ) -> QueryResult<FetchClaim> {
        self.executor.refetch(key, producer, staleness)
    }

    /// Mark a key stale. Returns false if it has no entry.
    pub fn invalidate(&self, key: &QueryKey) -> QueryResult<bool> {
        self.store.invalidate(&key.encode())
    }

    /// Remove a key's entry. Returns false if it had none.
    pub fn remove(&self, key: &QueryKey) -> QueryResult<bool> {
        self.store.remove(&key.encode())
    }

    pub fn stats(&self) -> QueryResult<CacheStats> {
        self.store.stats()
    }

    /// Drop per-key channels nobody observes anymore.
    pub fn prune_observers(&self) -> QueryResult<usize> {
        self.store.prune_observers()
    }

    pub fn store(&self) -> &CacheStore<T> {
        &self.store
    }

    pub fn config(&self) -> &QueryConfig {
        self.store.config()
    }
}

impl<T> Clone for QueryClient<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            executor: self.executor.clone(),
            resolver: self.resolver.clone(),
        }
    }
}

impl<T: QueryData> Default for QueryClient<T> {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use querygate_core::{query_fn, query_key, QueryError};
    use std::time::Duration;

    fn producer() -> Arc<dyn QueryFn<String>> {
        query_fn(|key: QueryKey| async move {
            Ok(format!("{} - fetched", key.last_str().unwrap_or_default()))
        })
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config =
            QueryConfig::default().with_staleness(Staleness::after(Duration::from_secs(30 * 86_400)));
        let result = QueryClient::<String>::new(config);
        assert!(matches!(result, Err(QueryError::Config(_))));
    }

    #[test]
    fn test_set_and_get_query_data() {
        let client = QueryClient::with_defaults();
        let key = query_key!["enabled", "abc"];
        assert_eq!(client.get_query_data(&key).unwrap(), None);

        client.set_query_data(&key, "seeded".to_string()).unwrap();
        assert_eq!(
            client.get_query_data(&key).unwrap().as_deref(),
            Some("seeded")
        );
        assert!(client.snapshot(&key).unwrap().is_success());
    }

    #[tokio::test]
    async fn test_subscribe_returns_loading_snapshot() {
        let client = QueryClient::with_defaults();
        let request = ExecutionRequest::new(query_key!["enabled", "abc"], producer());
        let snapshot = client.subscribe(&request).unwrap();
        assert!(snapshot.is_loading);
        assert!(snapshot.is_fetching);
        assert!(snapshot.data.is_none());
    }

    #[tokio::test]
    async fn test_refetch_keeps_data_visible() {
        let client = QueryClient::with_defaults();
        let key = query_key!["enabled", "abc"];
        client.set_query_data(&key, "old".to_string()).unwrap();

        let claim = client.refetch(&key, producer()).unwrap();
        assert!(matches!(claim, FetchClaim::Started(_)));
        let snapshot = client.snapshot(&key).unwrap();
        assert!(snapshot.is_fetching);
        assert!(!snapshot.is_loading);
        assert_eq!(snapshot.data.as_deref(), Some("old"));
    }

    #[test]
    fn test_remove_and_invalidate_missing_keys() {
        let client: QueryClient<String> = QueryClient::default();
        let key = query_key!["nothing"];
        assert!(!client.remove(&key).unwrap());
        assert!(!client.invalidate(&key).unwrap());
    }

    #[test]
    fn test_clones_share_store() {
        let client = QueryClient::with_defaults();
        let other = client.clone();
        other
            .set_query_data(&query_key!["shared"], "x".to_string())
            .unwrap();
        assert_eq!(client.stats().unwrap().entry_count, 1);
    }

    #[test]
    fn test_prune_observers() {
        let client: QueryClient<String> = QueryClient::with_defaults();
        let kept = client.watch(&query_key!["kept"]).unwrap();
        drop(client.watch(&query_key!["gone"]).unwrap());
        assert_eq!(client.prune_observers().unwrap(), 1);
        drop(kept);
        assert_eq!(client.prune_observers().unwrap(), 1);
    }
}
