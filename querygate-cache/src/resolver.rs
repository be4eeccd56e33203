//! Policy resolver: maps a request's run state onto store actions.

use std::sync::Arc;

use querygate_core::{
    ExecutionRequest, Generation, QueryData, QueryResult, RunState, Suppression,
};
use tracing::debug;

use crate::executor::FetchExecutor;
use crate::store::{CacheStore, FetchClaim};

/// What resolving a request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// A new fetch was started.
    Fetching(Generation),
    /// A fetch already in flight was joined.
    Joined(Generation),
    /// Fresh data was reused.
    CacheHit,
    /// `enabled = false`: the entry was left untouched.
    Frozen,
    /// Skip sentinel: the entry was removed.
    Cleared { existed: bool },
}

impl Resolution {
    pub fn started_fetch(&self) -> bool {
        matches!(self, Self::Fetching(_))
    }
}

impl From<FetchClaim> for Resolution {
    fn from(claim: FetchClaim) -> Self {
        match claim {
            FetchClaim::Started(generation) => Self::Fetching(generation),
            FetchClaim::Joined(generation) => Self::Joined(generation),
            FetchClaim::Fresh => Self::CacheHit,
        }
    }
}

/// Applies the enabled flag and the skip sentinel to the store.
pub struct PolicyResolver<T> {
    store: CacheStore<T>,
    executor: FetchExecutor<T>,
}

impl<T: QueryData> PolicyResolver<T> {
    pub fn new(store: CacheStore<T>, executor: FetchExecutor<T>) -> Self {
        Self { store, executor }
    }

    /// Evaluate a request once.
    ///
    /// - active: fetch unless fresh or already in flight
    /// - frozen: nothing, the entry keeps whatever it holds
    /// - deleted: remove the entry so observers read `idle`
    pub fn resolve(&self, request: &ExecutionRequest<T>) -> QueryResult<Resolution> {
        let state = request.run_state();
        let producer = match (state, request.query_fn.producer()) {
            (RunState::Active, Some(producer)) => Arc::clone(producer),
            (RunState::Suppressed(Suppression::Frozen), _) => {
                debug!(key = %request.key, "Query frozen");
                return Ok(Resolution::Frozen);
            }
            _ => {
                let existed = self.store.remove(&request.key.encode())?;
                debug!(key = %request.key, existed, "Query skipped");
                return Ok(Resolution::Cleared { existed });
            }
        };

        let staleness = request
            .staleness
            .unwrap_or(self.store.config().default_staleness);
        let claim = self.executor.run(&request.key, producer, staleness)?;
        Ok(claim.into())
    }
}

impl<T> Clone for PolicyResolver<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            executor: self.executor.clone(),
        }
    }
}
