//! Cache entry state and transitions.
//!
//! A [`QueryEntry`] is mutated only through its transition methods so the
//! status/data/error invariants hold after every step:
//!
//! - `Resolved` implies `data` present and `error` absent
//! - `Errored` implies `error` present and `data` absent
//! - `is_fetching` is true iff the generation in `fetch_count` has not settled

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ProducerFailure;
use crate::{Generation, Timestamp};

/// Lifecycle status of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    /// No fetch has been attempted.
    #[default]
    Idle,
    /// A fetch owns the entry.
    Pending,
    /// The last fetch produced data.
    Resolved,
    /// The last fetch failed.
    Errored,
}

/// How long resolved data may be reused without re-fetching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Staleness {
    /// Resolved data is always reusable.
    #[default]
    Never,
    /// Resolved data becomes stale once it is at least this old.
    After(Duration),
}

impl Staleness {
    /// Create a time-based staleness policy.
    pub fn after(duration: Duration) -> Self {
        Self::After(duration)
    }

    /// Returns true if data last updated at `updated_at` is stale at `now`.
    ///
    /// Missing data is always stale.
    pub fn is_stale(&self, updated_at: Option<Timestamp>, now: Timestamp) -> bool {
        match (self, updated_at) {
            (_, None) => true,
            (Self::Never, Some(_)) => false,
            (Self::After(max_age), Some(at)) => {
                let age = now
                    .signed_duration_since(at)
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                age >= *max_age
            }
        }
    }
}

/// Outcome of applying a fetch completion to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// The completion owned the entry and was recorded.
    Applied,
    /// The completion carried a superseded generation and was discarded.
    Stale,
    /// The entry no longer exists; the completion was discarded.
    Missing,
}

impl Settlement {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// One cache entry, keyed by an encoded query key.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryEntry<T> {
    pub status: QueryStatus,
    pub data: Option<T>,
    pub error: Option<ProducerFailure>,
    /// Generation of the latest fetch that took ownership of this entry.
    pub fetch_count: Generation,
    pub is_fetching: bool,
    pub staleness: Staleness,
    pub data_updated_at: Option<Timestamp>,
    pub error_updated_at: Option<Timestamp>,
    /// Set by explicit invalidation; cleared when new data lands.
    pub is_invalidated: bool,
}

impl<T> QueryEntry<T> {
    /// A fresh `idle` entry with no data.
    pub fn idle(staleness: Staleness) -> Self {
        Self {
            status: QueryStatus::Idle,
            data: None,
            error: None,
            fetch_count: 0,
            is_fetching: false,
            staleness,
            data_updated_at: None,
            error_updated_at: None,
            is_invalidated: false,
        }
    }

    /// Returns true if resolved data may be served without a fetch.
    pub fn is_fresh(&self, now: Timestamp) -> bool {
        self.status == QueryStatus::Resolved
            && !self.is_invalidated
            && !self.staleness.is_stale(self.data_updated_at, now)
    }

    /// Hand ownership of the entry to the fetch identified by `generation`.
    ///
    /// Existing data stays visible while the refetch runs; a previous error
    /// is kept until the new attempt settles.
    pub fn begin_fetch(&mut self, generation: Generation) {
        self.status = QueryStatus::Pending;
        self.is_fetching = true;
        self.fetch_count = generation;
    }

    /// Record a successful completion if `generation` still owns the entry.
    pub fn resolve(&mut self, generation: Generation, value: T, now: Timestamp) -> Settlement {
        if !self.owned_by(generation) {
            return Settlement::Stale;
        }
        self.status = QueryStatus::Resolved;
        self.data = Some(value);
        self.error = None;
        self.is_fetching = false;
        self.is_invalidated = false;
        self.data_updated_at = Some(now);
        Settlement::Applied
    }

    /// Record a failed completion if `generation` still owns the entry.
    pub fn fail(
        &mut self,
        generation: Generation,
        cause: ProducerFailure,
        now: Timestamp,
    ) -> Settlement {
        if !self.owned_by(generation) {
            return Settlement::Stale;
        }
        self.status = QueryStatus::Errored;
        self.data = None;
        self.error = Some(cause);
        self.is_fetching = false;
        self.error_updated_at = Some(now);
        Settlement::Applied
    }

    /// Overwrite the entry with data that did not come from a fetch.
    ///
    /// The caller supplies a fresh generation so that any in-flight fetch is
    /// discarded when it settles.
    pub fn seed(&mut self, generation: Generation, value: T, now: Timestamp) {
        self.fetch_count = generation;
        self.status = QueryStatus::Resolved;
        self.data = Some(value);
        self.error = None;
        self.is_fetching = false;
        self.is_invalidated = false;
        self.data_updated_at = Some(now);
    }

    /// Mark the entry stale regardless of its staleness policy.
    pub fn invalidate(&mut self) {
        self.is_invalidated = true;
    }

    fn owned_by(&self, generation: Generation) -> bool {
        self.is_fetching && self.fetch_count == generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn failure() -> ProducerFailure {
        ProducerFailure::new("boom")
    }

    #[test]
    fn test_idle_entry_is_not_fresh() {
        let entry: QueryEntry<String> = QueryEntry::idle(Staleness::Never);
        assert_eq!(entry.status, QueryStatus::Idle);
        assert!(!entry.is_fresh(Utc::now()));
    }

    #[test]
    fn test_resolve_applies_matching_generation() {
        let mut entry = QueryEntry::idle(Staleness::Never);
        entry.begin_fetch(3);
        assert!(entry.is_fetching);

        let outcome = entry.resolve(3, "abc".to_string(), Utc::now());
        assert_eq!(outcome, Settlement::Applied);
        assert_eq!(entry.status, QueryStatus::Resolved);
        assert_eq!(entry.data.as_deref(), Some("abc"));
        assert!(entry.error.is_none());
        assert!(!entry.is_fetching);
        assert!(entry.is_fresh(Utc::now()));
    }

    #[test]
    fn test_resolve_discards_old_generation() {
        let mut entry = QueryEntry::idle(Staleness::Never);
        entry.begin_fetch(1);
        entry.begin_fetch(2);

        assert_eq!(
            entry.resolve(1, "old".to_string(), Utc::now()),
            Settlement::Stale
        );
        assert!(entry.is_fetching);
        assert!(entry.data.is_none());

        assert_eq!(
            entry.resolve(2, "new".to_string(), Utc::now()),
            Settlement::Applied
        );
        assert_eq!(entry.data.as_deref(), Some("new"));
    }

    #[test]
    fn test_second_settlement_of_same_generation_is_stale() {
        let mut entry = QueryEntry::idle(Staleness::Never);
        entry.begin_fetch(1);
        assert!(entry.resolve(1, 1, Utc::now()).is_applied());
        assert_eq!(entry.fail(1, failure(), Utc::now()), Settlement::Stale);
        assert_eq!(entry.status, QueryStatus::Resolved);
    }

    #[test]
    fn test_fail_clears_data() {
        let mut entry = QueryEntry::idle(Staleness::Never);
        entry.begin_fetch(1);
        entry.resolve(1, 10, Utc::now());
        entry.invalidate();
        entry.begin_fetch(2);
        assert_eq!(entry.data, Some(10));

        assert_eq!(entry.fail(2, failure(), Utc::now()), Settlement::Applied);
        assert_eq!(entry.status, QueryStatus::Errored);
        assert!(entry.data.is_none());
        assert_eq!(entry.error, Some(failure()));
        assert!(entry.error_updated_at.is_some());
    }

    #[test]
    fn test_invalidate_makes_resolved_entry_stale() {
        let mut entry = QueryEntry::idle(Staleness::Never);
        entry.seed(1, "seeded", Utc::now());
        assert!(entry.is_fresh(Utc::now()));
        entry.invalidate();
        assert!(!entry.is_fresh(Utc::now()));
    }

    #[test]
    fn test_seed_supersedes_in_flight_fetch() {
        let mut entry = QueryEntry::idle(Staleness::Never);
        entry.begin_fetch(1);
        entry.seed(2, "manual", Utc::now());
        assert_eq!(entry.resolve(1, "late", Utc::now()), Settlement::Stale);
        assert_eq!(entry.data, Some("manual"));
    }

    #[test]
    fn test_staleness_never() {
        let now = Utc::now();
        let long_ago = now - chrono::Duration::days(365);
        assert!(!Staleness::Never.is_stale(Some(long_ago), now));
        assert!(Staleness::Never.is_stale(None, now));
    }

    #[test]
    fn test_staleness_after() {
        let now = Utc::now();
        let policy = Staleness::after(Duration::from_secs(60));
        assert!(!policy.is_stale(Some(now - chrono::Duration::seconds(10)), now));
        assert!(policy.is_stale(Some(now - chrono::Duration::seconds(60)), now));
        assert!(policy.is_stale(Some(now - chrono::Duration::seconds(90)), now));
    }

    #[test]
    fn test_staleness_after_zero_is_always_stale() {
        let now = Utc::now();
        assert!(Staleness::after(Duration::ZERO).is_stale(Some(now), now));
    }

    #[test]
    fn test_staleness_default_is_never() {
        assert_eq!(Staleness::default(), Staleness::Never);
    }
}
