//! Run policies for a query request.
//!
//! Execution can be suppressed two ways, and they differ in one decision:
//!
//! - `enabled = false` freezes the entry in place ([`Suppression::Frozen`])
//! - a skip sentinel in place of the producer deletes it ([`Suppression::Deleted`])

use std::fmt;
use std::sync::Arc;

use crate::entry::Staleness;
use crate::key::QueryKey;
use crate::producer::{QueryData, QueryFn};

/// How a suppressed query treats its cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Suppression {
    /// Keep the entry and any data untouched.
    Frozen,
    /// Remove the entry entirely.
    Deleted,
}

/// Per-key policy state derived from a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunState {
    Active,
    Suppressed(Suppression),
}

impl RunState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

/// Producer slot of a request: a producer, or the skip sentinel.
pub enum QueryFnSlot<T: QueryData> {
    Producer(Arc<dyn QueryFn<T>>),
    Skip,
}

impl<T: QueryData> QueryFnSlot<T> {
    pub fn producer(&self) -> Option<&Arc<dyn QueryFn<T>>> {
        match self {
            Self::Producer(producer) => Some(producer),
            Self::Skip => None,
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, Self::Skip)
    }
}

impl<T: QueryData> Clone for QueryFnSlot<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Producer(producer) => Self::Producer(Arc::clone(producer)),
            Self::Skip => Self::Skip,
        }
    }
}

impl<T: QueryData> fmt::Debug for QueryFnSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Producer(_) => f.write_str("Producer(..)"),
            Self::Skip => f.write_str("Skip"),
        }
    }
}

/// A cache key paired with its run policy.
pub struct ExecutionRequest<T: QueryData> {
    pub key: QueryKey,
    pub query_fn: QueryFnSlot<T>,
    pub enabled: bool,
    /// Overrides the client's default staleness for this key.
    pub staleness: Option<Staleness>,
}

impl<T: QueryData> ExecutionRequest<T> {
    /// An enabled request with a producer.
    pub fn new(key: QueryKey, producer: Arc<dyn QueryFn<T>>) -> Self {
        Self {
            key,
            query_fn: QueryFnSlot::Producer(producer),
            enabled: true,
            staleness: None,
        }
    }

    /// A request whose producer is replaced by the skip sentinel.
    pub fn skip(key: QueryKey) -> Self {
        Self {
            key,
            query_fn: QueryFnSlot::Skip,
            enabled: true,
            staleness: None,
        }
    }

    /// Choose between a producer and the skip sentinel.
    pub fn skip_unless(key: QueryKey, run: bool, producer: Arc<dyn QueryFn<T>>) -> Self {
        if run {
            Self::new(key, producer)
        } else {
            Self::skip(key)
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_staleness(mut self, staleness: Staleness) -> Self {
        self.staleness = Some(staleness);
        self
    }

    /// Derive the policy state. The skip sentinel wins over `enabled`.
    pub fn run_state(&self) -> RunState {
        match (&self.query_fn, self.enabled) {
            (QueryFnSlot::Skip, _) => RunState::Suppressed(Suppression::Deleted),
            (QueryFnSlot::Producer(_), false) => RunState::Suppressed(Suppression::Frozen),
            (QueryFnSlot::Producer(_), true) => RunState::Active,
        }
    }
}

impl<T: QueryData> Clone for ExecutionRequest<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            query_fn: self.query_fn.clone(),
            enabled: self.enabled,
            staleness: self.staleness,
        }
    }
}

impl<T: QueryData> fmt::Debug for ExecutionRequest<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionRequest")
            .field("key", &self.key)
            .field("query_fn", &self.query_fn)
            .field("enabled", &self.enabled)
            .field("staleness", &self.staleness)
            .finish()
    }
}
