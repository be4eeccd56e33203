//! querygate Test Utilities
//!
//! Shared test infrastructure for the querygate workspace:
//! - Mock producers with call counting and manual completion
//! - Proptest generators for keys and typed input
//! - Fixtures for the enabled and skip comparison keys
//! - Assertions over snapshots and results

pub use querygate_core::{
    query_fn, query_key, ExecutionRequest, KeyPart, ProducerFailure, QueryConfig, QueryError,
    QueryFn, QueryKey, QueryResult, QueryStatus, Snapshot, Staleness, StoreError,
};

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

// ============================================================================
// MOCK PRODUCERS
// ============================================================================

/// Producer that answers immediately with `"<last key part> #<call number>"`.
#[derive(Debug, Clone, Default)]
pub struct CountingQuery {
    calls: Arc<AtomicUsize>,
}

impl CountingQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times the producer has been invoked.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn producer(&self) -> Arc<dyn QueryFn<String>> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl QueryFn<String> for CountingQuery {
    async fn fetch(&self, key: &QueryKey) -> Result<String, ProducerFailure> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("{} #{}", key.last_str().unwrap_or_default(), call))
    }
}

/// Producer that always fails with the same message.
#[derive(Debug, Clone)]
pub struct FailingQuery {
    message: String,
    calls: Arc<AtomicUsize>,
}

impl FailingQuery {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn producer(&self) -> Arc<dyn QueryFn<String>> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl QueryFn<String> for FailingQuery {
    async fn fetch(&self, _key: &QueryKey) -> Result<String, ProducerFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ProducerFailure::new(self.message.clone()))
    }
}

type Completion<T> = oneshot::Sender<Result<T, ProducerFailure>>;

struct GateState<T> {
    gates: Vec<Option<Completion<T>>>,
    keys: Vec<QueryKey>,
}

/// Producer whose calls block until the test completes them.
///
/// Every call opens a gate, numbered from zero in call order. The test
/// decides when and how each call completes, which makes overlapping fetches
/// deterministic.
pub struct GatedQuery<T> {
    state: Arc<Mutex<GateState<T>>>,
}

impl<T: Send + 'static> GatedQuery<T> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(GateState {
                gates: Vec::new(),
                keys: Vec::new(),
            })),
        }
    }

    /// Number of calls made so far.
    pub fn calls(&self) -> usize {
        self.state.lock().map(|state| state.gates.len()).unwrap_or(0)
    }

    /// Keys passed to each call, in call order.
    pub fn keys(&self) -> Vec<QueryKey> {
        self.state
            .lock()
            .map(|state| state.keys.clone())
            .unwrap_or_default()
    }

    /// Complete call `index` with a value.
    ///
    /// Returns false if the call does not exist, was already completed, or
    /// its task is gone.
    pub fn release(&self, index: usize, value: T) -> bool {
        self.complete(index, Ok(value))
    }

    /// Complete call `index` with a failure.
    pub fn fail(&self, index: usize, message: &str) -> bool {
        self.complete(index, Err(ProducerFailure::new(message)))
    }

    fn complete(&self, index: usize, outcome: Result<T, ProducerFailure>) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        match state.gates.get_mut(index).and_then(Option::take) {
            Some(gate) => gate.send(outcome).is_ok(),
            None => false,
        }
    }
}

impl<T: Send + Sync + Clone + 'static> GatedQuery<T> {
    pub fn producer(&self) -> Arc<dyn QueryFn<T>> {
        Arc::new(self.clone())
    }
}

impl<T> Clone for GatedQuery<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Send + 'static> Default for GatedQuery<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Send + Sync + Clone + 'static> QueryFn<T> for GatedQuery<T> {
    async fn fetch(&self, key: &QueryKey) -> Result<T, ProducerFailure> {
        let (tx, rx) = oneshot::channel();
        {
            let mut state = self
                .state
                .lock()
                .map_err(|_| ProducerFailure::new("gate state poisoned"))?;
            state.gates.push(Some(tx));
            state.keys.push(key.clone());
        }
        rx.await
            .map_err(|_| ProducerFailure::new("gate closed without completion"))?
    }
}

/// Let spawned fetch tasks run to their next suspension point.
///
/// Fetch tasks settle within a couple of polls on a current-thread runtime;
/// this yields enough times for a chain of them to finish.
pub async fn settle_tasks() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for keys and typed input.

    use super::*;
    use proptest::prelude::*;

    /// Generate a single key part of any kind.
    pub fn arb_key_part() -> impl Strategy<Value = KeyPart> {
        prop_oneof![
            ".*".prop_map(KeyPart::Str),
            any::<i64>().prop_map(KeyPart::Int),
            any::<f64>().prop_map(KeyPart::Float),
            any::<bool>().prop_map(KeyPart::Bool),
        ]
    }

    /// Generate a key of up to six parts, including the empty key.
    pub fn arb_query_key() -> impl Strategy<Value = QueryKey> {
        prop::collection::vec(arb_key_part(), 0..6).prop_map(QueryKey::from_parts)
    }

    /// Generate text as a user would type it into an input box.
    pub fn arb_input() -> impl Strategy<Value = String> {
        "[a-z0-9 ]{0,12}"
    }

    /// Generate a sequence of checkbox toggles.
    pub fn arb_toggles(max: usize) -> impl Strategy<Value = Vec<bool>> {
        prop::collection::vec(any::<bool>(), 1..=max)
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Keys and configs shared by scenario tests.

    use super::*;
    use std::time::Duration;

    /// Key of the column driven by the enabled flag.
    pub fn enabled_key(input: &str) -> QueryKey {
        query_key!["enabled", input]
    }

    /// Key of the column driven by the skip sentinel.
    pub fn skip_key(input: &str) -> QueryKey {
        query_key!["skipToken", input]
    }

    /// Config that lets superseded producers run to completion, so stale
    /// settlements can be observed.
    pub fn no_abort_config() -> QueryConfig {
        QueryConfig::default().with_abort_stale_fetches(false)
    }

    /// Config whose resolved data goes stale immediately.
    pub fn always_stale_config() -> QueryConfig {
        QueryConfig::default().with_staleness(Staleness::after(Duration::ZERO))
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over snapshots and results.

    use super::*;
    use std::fmt::Debug;

    /// Assert the snapshot of a key with no entry: idle, nothing in flight, no data.
    #[track_caller]
    pub fn assert_idle_without_data<T: Debug>(snapshot: &Snapshot<T>) {
        assert_eq!(snapshot.status, QueryStatus::Idle, "snapshot: {:?}", snapshot);
        assert!(!snapshot.is_fetching, "snapshot: {:?}", snapshot);
        assert!(!snapshot.is_loading, "snapshot: {:?}", snapshot);
        assert!(snapshot.data.is_none(), "snapshot: {:?}", snapshot);
    }

    /// Assert a first fetch in flight: pending with no data.
    #[track_caller]
    pub fn assert_loading<T: Debug>(snapshot: &Snapshot<T>) {
        assert_eq!(snapshot.status, QueryStatus::Pending, "snapshot: {:?}", snapshot);
        assert!(snapshot.is_loading, "snapshot: {:?}", snapshot);
        assert!(snapshot.is_fetching, "snapshot: {:?}", snapshot);
        assert!(snapshot.data.is_none(), "snapshot: {:?}", snapshot);
    }

    /// Assert a background refetch: pending while showing `data`.
    #[track_caller]
    pub fn assert_refetching<T: Debug + PartialEq>(snapshot: &Snapshot<T>, data: &T) {
        assert_eq!(snapshot.status, QueryStatus::Pending, "snapshot: {:?}", snapshot);
        assert!(!snapshot.is_loading, "snapshot: {:?}", snapshot);
        assert!(snapshot.is_fetching, "snapshot: {:?}", snapshot);
        assert_eq!(snapshot.data.as_ref(), Some(data));
    }

    /// Assert resolved data with nothing in flight.
    #[track_caller]
    pub fn assert_resolved_with<T: Debug + PartialEq>(snapshot: &Snapshot<T>, data: &T) {
        assert_eq!(snapshot.status, QueryStatus::Resolved, "snapshot: {:?}", snapshot);
        assert!(!snapshot.is_fetching, "snapshot: {:?}", snapshot);
        assert!(!snapshot.is_loading, "snapshot: {:?}", snapshot);
        assert_eq!(snapshot.data.as_ref(), Some(data));
        assert!(snapshot.error.is_none(), "snapshot: {:?}", snapshot);
    }

    /// Assert an errored snapshot carrying `message` and no data.
    #[track_caller]
    pub fn assert_errored<T: Debug>(snapshot: &Snapshot<T>, message: &str) {
        assert_eq!(snapshot.status, QueryStatus::Errored, "snapshot: {:?}", snapshot);
        assert!(snapshot.data.is_none(), "snapshot: {:?}", snapshot);
        assert!(!snapshot.is_fetching, "snapshot: {:?}", snapshot);
        match &snapshot.error {
            Some(failure) => assert_eq!(failure.message(), message),
            None => panic!("Expected a producer failure, got: {:?}", snapshot),
        }
    }

    /// Assert that a QueryResult is a Config error.
    #[track_caller]
    pub fn assert_config_error<T: Debug>(result: &QueryResult<T>) {
        match result {
            Err(QueryError::Config(_)) => {}
            other => panic!("Expected Config error, got: {:?}", other),
        }
    }

    /// Assert that a QueryResult is a specific store error.
    #[track_caller]
    pub fn assert_store_error<T: Debug>(result: &QueryResult<T>, expected: &StoreError) {
        match result {
            Err(QueryError::Store(err)) => assert_eq!(err, expected),
            other => panic!("Expected Store error {:?}, got: {:?}", expected, other),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
