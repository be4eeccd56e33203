//! Cache store: one entry per encoded key.
//!
//! The store is the only shared mutable resource. Every operation takes the
//! lock once, mutates, publishes the key's new snapshot and releases the
//! lock; no lock is ever held across an `.await`.
//!
//! Generations come from a single store-wide counter. A generation is never
//! reissued, so a completion for an entry that was removed and recreated can
//! never match the new entry.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use querygate_core::{
    EncodedKey, Generation, ProducerFailure, QueryConfig, QueryData, QueryEntry, QueryResult,
    Settlement, Snapshot, Staleness, StoreError,
};
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::{debug, trace};

use crate::registry::ObserverRegistry;
use crate::stats::CacheStats;

/// How a fetch claim treats a fetch already in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Join the in-flight fetch and reuse fresh data.
    JoinInFlight,
    /// Start a new generation regardless of in-flight or fresh state.
    Supersede,
}

/// Result of claiming a key for fetching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchClaim {
    /// A new fetch owns the entry under this generation.
    Started(Generation),
    /// A fetch was already in flight under this generation.
    Joined(Generation),
    /// Resolved data is fresh; nothing to do.
    Fresh,
}

struct Slot<T> {
    entry: QueryEntry<T>,
    in_flight: Option<AbortHandle>,
}

impl<T> Slot<T> {
    fn new(staleness: Staleness) -> Self {
        Self {
            entry: QueryEntry::idle(staleness),
            in_flight: None,
        }
    }
}

struct StoreInner<T> {
    entries: HashMap<EncodedKey, Slot<T>>,
    observers: ObserverRegistry<T>,
    last_generation: Generation,
    stats: CacheStats,
}

impl<T: QueryData> StoreInner<T> {
    fn snapshot(&self, key: &EncodedKey) -> Snapshot<T> {
        Snapshot::from_entry(self.entries.get(key).map(|slot| &slot.entry))
    }

    fn publish(&self, key: &EncodedKey) {
        self.observers.publish(key, || self.snapshot(key));
    }

    fn next_generation(&mut self) -> Generation {
        self.last_generation += 1;
        self.last_generation
    }

    /// Transition the key's entry to a new fetch, creating it if needed.
    fn begin(&mut self, key: &EncodedKey, staleness: Staleness, abort_previous: bool) -> Generation {
        let generation = self.next_generation();
        let slot = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| Slot::new(staleness));
        if let Some(previous) = slot.in_flight.take() {
            if abort_previous {
                previous.abort();
            }
        }
        slot.entry.begin_fetch(generation);
        self.stats.misses += 1;
        self.publish(key);
        generation
    }

    fn settle(
        &mut self,
        key: &EncodedKey,
        apply: impl FnOnce(&mut QueryEntry<T>) -> Settlement,
    ) -> Settlement {
        let outcome = match self.entries.get_mut(key) {
            Some(slot) => {
                let outcome = apply(&mut slot.entry);
                if outcome.is_applied() {
                    slot.in_flight = None;
                }
                outcome
            }
            None => Settlement::Missing,
        };
        if outcome.is_applied() {
            self.publish(key);
        } else {
            self.stats.stale_completions += 1;
        }
        outcome
    }
}

/// Shared cache store. Cloning yields another handle to the same store.
pub struct CacheStore<T> {
    inner: Arc<RwLock<StoreInner<T>>>,
    config: QueryConfig,
}

impl<T: QueryData> CacheStore<T> {
    /// Create an empty store.
    pub fn new(config: QueryConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(StoreInner {
                entries: HashMap::new(),
                observers: ObserverRegistry::new(),
                last_generation: 0,
                stats: CacheStats::default(),
            })),
            config,
        }
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    fn read(&self) -> QueryResult<RwLockReadGuard<'_, StoreInner<T>>> {
        self.inner
            .read()
            .map_err(|_| StoreError::LockPoisoned.into())
    }

    fn write(&self) -> QueryResult<RwLockWriteGuard<'_, StoreInner<T>>> {
        self.inner
            .write()
            .map_err(|_| StoreError::LockPoisoned.into())
    }

    /// Look up an entry.
    pub fn get(&self, key: &EncodedKey) -> QueryResult<Option<QueryEntry<T>>> {
        Ok(self.read()?.entries.get(key).map(|slot| slot.entry.clone()))
    }

    pub fn contains(&self, key: &EncodedKey) -> QueryResult<bool> {
        Ok(self.read()?.entries.contains_key(key))
    }

    /// Return the existing entry or insert a fresh `idle` one.
    ///
    /// An existing entry adopts `staleness`; the latest request wins.
    pub fn ensure(&self, key: &EncodedKey, staleness: Staleness) -> QueryResult<QueryEntry<T>> {
        let mut inner = self.write()?;
        let mut inserted = false;
        let slot = inner.entries.entry(key.clone()).or_insert_with(|| {
            inserted = true;
            Slot::new(staleness)
        });
        slot.entry.staleness = staleness;
        let entry = slot.entry.clone();
        if inserted {
            inner.publish(key);
        }
        Ok(entry)
    }

    /// Start a fetch unconditionally and return its generation.
    ///
    /// Any fetch already in flight for the key is superseded.
    pub fn begin_fetch(&self, key: &EncodedKey) -> QueryResult<Generation> {
        let mut inner = self.write()?;
        let staleness = inner
            .entries
            .get(key)
            .map(|slot| slot.entry.staleness)
            .unwrap_or(self.config.default_staleness);
        let generation = inner.begin(key, staleness, self.config.abort_stale_fetches);
        debug!(key = %key, generation, "Fetch started");
        Ok(generation)
    }

    /// Atomically decide whether a fetch is needed and claim the key if so.
    ///
    /// This is the single-flight guard: the freshness check, the in-flight
    /// check and the transition to `pending` happen under one lock.
    pub fn claim_fetch(
        &self,
        key: &EncodedKey,
        staleness: Staleness,
        mode: FetchMode,
    ) -> QueryResult<FetchClaim> {
        let now = Utc::now();
        let mut inner = self.write()?;

        if let Some(slot) = inner.entries.get_mut(key) {
            slot.entry.staleness = staleness;
            if mode == FetchMode::JoinInFlight {
                if slot.entry.is_fetching {
                    let generation = slot.entry.fetch_count;
                    inner.stats.joins += 1;
                    debug!(key = %key, generation, "Joined in-flight fetch");
                    return Ok(FetchClaim::Joined(generation));
                }
                if slot.entry.is_fresh(now) {
                    inner.stats.hits += 1;
                    debug!(key = %key, "Cache hit");
                    return Ok(FetchClaim::Fresh);
                }
            }
        }

        let generation = inner.begin(key, staleness, self.config.abort_stale_fetches);
        debug!(key = %key, generation, ?mode, "Fetch started");
        Ok(FetchClaim::Started(generation))
    }

    /// Remember the task running `generation` so it can be aborted later.
    ///
    /// Returns false if the generation no longer owns the entry. A handle for
    /// a superseded fetch is aborted right away when aborting is enabled.
    pub fn attach_abort(
        &self,
        key: &EncodedKey,
        generation: Generation,
        handle: AbortHandle,
    ) -> QueryResult<bool> {
        let mut inner = self.write()?;
        let (owned, superseded) = match inner.entries.get_mut(key) {
            Some(slot) if slot.entry.fetch_count == generation => {
                if slot.entry.is_fetching {
                    slot.in_flight = Some(handle.clone());
                    (true, false)
                } else {
                    (false, false)
                }
            }
            _ => (false, true),
        };
        if superseded && self.config.abort_stale_fetches {
            handle.abort();
        }
        Ok(owned)
    }

    /// Record a successful completion of `generation`.
    pub fn settle_success(
        &self,
        key: &EncodedKey,
        generation: Generation,
        value: T,
    ) -> QueryResult<Settlement> {
        let now = Utc::now();
        let mut inner = self.write()?;
        let outcome = inner.settle(key, |entry| entry.resolve(generation, value, now));
        trace!(key = %key, generation, ?outcome, "Settled success");
        Ok(outcome)
    }

    /// Record a failed completion of `generation`. Never fails on a stale
    /// generation; the completion is simply discarded.
    pub fn settle_failure(
        &self,
        key: &EncodedKey,
        generation: Generation,
        cause: ProducerFailure,
    ) -> QueryResult<Settlement> {
        let now = Utc::now();
        let mut inner = self.write()?;
        let outcome = inner.settle(key, |entry| entry.fail(generation, cause, now));
        if outcome.is_applied() {
            inner.stats.failures += 1;
        }
        trace!(key = %key, generation, ?outcome, "Settled failure");
        Ok(outcome)
    }

    /// Remove an entry unconditionally.
    ///
    /// Any in-flight fetch for the key settles as [`Settlement::Missing`] or
    /// [`Settlement::Stale`]. Returns whether an entry existed.
    pub fn remove(&self, key: &EncodedKey) -> QueryResult<bool> {
        let mut inner = self.write()?;
        let Some(slot) = inner.entries.remove(key) else {
            return Ok(false);
        };
        if let Some(handle) = slot.in_flight {
            if self.config.abort_stale_fetches {
                handle.abort();
            }
        }
        inner.stats.drops += 1;
        inner.publish(key);
        debug!(key = %key, "Entry removed");
        Ok(true)
    }

    /// Mark a resolved entry stale so the next active request refetches it.
    pub fn invalidate(&self, key: &EncodedKey) -> QueryResult<bool> {
        let mut inner = self.write()?;
        let Some(slot) = inner.entries.get_mut(key) else {
            return Ok(false);
        };
        slot.entry.invalidate();
        inner.publish(key);
        Ok(true)
    }

    /// Seed or overwrite an entry with resolved data.
    ///
    /// The write takes a fresh generation, so an in-flight fetch for the key
    /// is discarded when it settles.
    pub fn set_data(&self, key: &EncodedKey, value: T) -> QueryResult<Generation> {
        let now = Utc::now();
        let mut inner = self.write()?;
        let generation = inner.next_generation();
        let default_staleness = self.config.default_staleness;
        let abort = self.config.abort_stale_fetches;
        let slot = inner
            .entries
            .entry(key.clone())
            .or_insert_with(|| Slot::new(default_staleness));
        if let Some(previous) = slot.in_flight.take() {
            if abort {
                previous.abort();
            }
        }
        slot.entry.seed(generation, value, now);
        inner.publish(key);
        Ok(generation)
    }

    /// Current snapshot for a key; `idle` if absent.
    pub fn snapshot(&self, key: &EncodedKey) -> QueryResult<Snapshot<T>> {
        Ok(self.read()?.snapshot(key))
    }

    /// Subscribe to snapshot updates for a key.
    pub fn subscribe(&self, key: &EncodedKey) -> QueryResult<watch::Receiver<Snapshot<T>>> {
        let mut inner = self.write()?;
        let current = inner.snapshot(key);
        Ok(inner.observers.subscribe(key, || current))
    }

    /// Drop one key's observer channel if nobody listens to it anymore.
    pub fn release_observer(&self, key: &EncodedKey) -> QueryResult<bool> {
        Ok(self.write()?.observers.release(key))
    }

    /// Drop observer channels nobody listens to anymore.
    pub fn prune_observers(&self) -> QueryResult<usize> {
        Ok(self.write()?.observers.prune())
    }

    pub fn stats(&self) -> QueryResult<CacheStats> {
        let inner = self.read()?;
        Ok(CacheStats {
            entry_count: inner.entries.len() as u64,
            observed_keys: inner.observers.len() as u64,
            ..inner.stats.clone()
        })
    }

    pub fn len(&self) -> QueryResult<usize> {
        Ok(self.read()?.entries.len())
    }

    pub fn is_empty(&self) -> QueryResult<bool> {
        Ok(self.read()?.entries.is_empty())
    }
}

impl<T> Clone for CacheStore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            config: self.config.clone(),
        }
    }
}

impl<T: QueryData> Default for CacheStore<T> {
    fn default() -> Self {
        Self::new(QueryConfig::default())
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;
    use querygate_core::{query_key, QueryStatus};

    #[derive(Debug, Clone)]
    enum Op {
        Begin(u8),
        SettleOk(u8, u8),
        SettleErr(u8, u8),
        Remove(u8),
        Invalidate(u8),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..3).prop_map(Op::Begin),
            (0u8..3, 0u8..8).prop_map(|(k, g)| Op::SettleOk(k, g)),
            (0u8..3, 0u8..8).prop_map(|(k, g)| Op::SettleErr(k, g)),
            (0u8..3).prop_map(Op::Remove),
            (0u8..3).prop_map(Op::Invalidate),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        /// Property: entry invariants hold after any sequence of operations.
        ///
        /// Settlements pick a generation from those issued so far, so both
        /// current and superseded completions are exercised.
        #[test]
        fn prop_entry_invariants_hold(ops in prop::collection::vec(op_strategy(), 1..40)) {
            let store: CacheStore<u32> = CacheStore::default();
            let keys: Vec<EncodedKey> = (0..3).map(|i| query_key!["k", i].encode()).collect();
            let mut issued: Vec<Generation> = Vec::new();

            for op in ops {
                match op {
                    Op::Begin(k) => issued.push(store.begin_fetch(&keys[k as usize]).unwrap()),
                    Op::SettleOk(k, g) if !issued.is_empty() => {
                        let generation = issued[g as usize % issued.len()];
                        store.settle_success(&keys[k as usize], generation, generation as u32).unwrap();
                    }
                    Op::SettleErr(k, g) if !issued.is_empty() => {
                        let generation = issued[g as usize % issued.len()];
                        store
                            .settle_failure(&keys[k as usize], generation, ProducerFailure::new("x"))
                            .unwrap();
                    }
                    Op::Remove(k) => { store.remove(&keys[k as usize]).unwrap(); }
                    Op::Invalidate(k) => { store.invalidate(&keys[k as usize]).unwrap(); }
                    _ => {}
                }

                for key in &keys {
                    if let Some(entry) = store.get(key).unwrap() {
                        match entry.status {
                            QueryStatus::Resolved => {
                                prop_assert!(entry.data.is_some());
                                prop_assert!(entry.error.is_none());
                                prop_assert!(!entry.is_fetching);
                            }
                            QueryStatus::Errored => {
                                prop_assert!(entry.data.is_none());
                                prop_assert!(entry.error.is_some());
                                prop_assert!(!entry.is_fetching);
                            }
                            QueryStatus::Pending => prop_assert!(entry.is_fetching),
                            QueryStatus::Idle => prop_assert!(!entry.is_fetching),
                        }
                    }
                }
            }
        }

        /// Property: generations are strictly increasing across all keys.
        #[test]
        fn prop_generations_strictly_increase(keys in prop::collection::vec(0u8..4, 1..30)) {
            let store: CacheStore<u32> = CacheStore::default();
            let mut last = 0;
            for k in keys {
                let generation = store.begin_fetch(&query_key![u32::from(k)].encode()).unwrap();
                prop_assert!(generation > last);
                last = generation;
            }
        }
    }
}
