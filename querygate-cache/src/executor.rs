//! Fetch executor: runs producers on the tokio runtime.
//!
//! The executor never awaits the producer itself. It claims the key in the
//! store, spawns a task that awaits the producer, and that task settles the
//! result with the generation captured when the claim was made.

use std::sync::Arc;

use querygate_core::{
    EncodedKey, Generation, QueryData, QueryFn, QueryKey, QueryResult, Settlement, Staleness,
    StoreError,
};
use tokio::runtime::Handle;
use tracing::{debug, error, trace, warn};

use crate::store::{CacheStore, FetchClaim, FetchMode};

/// Starts fetches against a [`CacheStore`].
pub struct FetchExecutor<T> {
    store: CacheStore<T>,
}

impl<T: QueryData> FetchExecutor<T> {
    pub fn new(store: CacheStore<T>) -> Self {
        Self { store }
    }

    /// Fetch unless the key holds fresh data or a fetch is already in flight.
    pub fn run(
        &self,
        key: &QueryKey,
        producer: Arc<dyn QueryFn<T>>,
        staleness: Staleness,
    ) -> QueryResult<FetchClaim> {
        self.execute(key, producer, staleness, FetchMode::JoinInFlight)
    }

    /// Start a new fetch, superseding any fetch in flight for the key.
    pub fn refetch(
        &self,
        key: &QueryKey,
        producer: Arc<dyn QueryFn<T>>,
        staleness: Staleness,
    ) -> QueryResult<FetchClaim> {
        self.execute(key, producer, staleness, FetchMode::Supersede)
    }

    /// Claim the key and, if a fetch was started, spawn it.
    ///
    /// Fails with [`StoreError::NoRuntime`] outside a tokio runtime; the
    /// store is left untouched in that case.
    pub fn execute(
        &self,
        key: &QueryKey,
        producer: Arc<dyn QueryFn<T>>,
        staleness: Staleness,
        mode: FetchMode,
    ) -> QueryResult<FetchClaim> {
        let encoded = key.encode();
        let runtime = Handle::try_current().map_err(|_| StoreError::NoRuntime {
            key: encoded.to_string(),
        })?;

        let claim = self.store.claim_fetch(&encoded, staleness, mode)?;
        if let FetchClaim::Started(generation) = claim {
            let task = runtime.spawn(settle_fetch(
                self.store.clone(),
                key.clone(),
                encoded.clone(),
                generation,
                producer,
            ));
            self.store
                .attach_abort(&encoded, generation, task.abort_handle())?;
        }
        Ok(claim)
    }

    pub fn store(&self) -> &CacheStore<T> {
        &self.store
    }
}

impl<T> Clone for FetchExecutor<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

async fn settle_fetch<T: QueryData>(
    store: CacheStore<T>,
    key: QueryKey,
    encoded: EncodedKey,
    generation: Generation,
    producer: Arc<dyn QueryFn<T>>,
) {
    let outcome = match producer.fetch(&key).await {
        Ok(value) => store.settle_success(&encoded, generation, value),
        Err(cause) => {
            warn!(key = %encoded, generation, error = %cause, "Query producer failed");
            store.settle_failure(&encoded, generation, cause)
        }
    };

    match outcome {
        Ok(Settlement::Applied) => debug!(key = %encoded, generation, "Fetch settled"),
        Ok(outcome) => trace!(key = %encoded, generation, ?outcome, "Discarded stale completion"),
        Err(e) => error!(key = %encoded, generation, error = %e, "Failed to settle fetch"),
    }
}
