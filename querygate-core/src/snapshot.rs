//! Read-only view of a cache entry handed to observers.

use serde::Serialize;

use crate::entry::{QueryEntry, QueryStatus};
use crate::error::ProducerFailure;
use crate::{Generation, Timestamp};

/// Snapshot of one key's query state.
///
/// `is_loading` is true only for a first fetch (pending with no data);
/// `is_fetching` is true for any fetch, including background refetches.
/// A key with no entry reads as `idle` with no data.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot<T> {
    pub status: QueryStatus,
    pub is_loading: bool,
    pub is_fetching: bool,
    pub data: Option<T>,
    pub error: Option<ProducerFailure>,
    pub data_updated_at: Option<Timestamp>,
    pub error_updated_at: Option<Timestamp>,
    pub fetch_count: Generation,
}

impl<T> Snapshot<T> {
    /// The snapshot of a key with no cache entry.
    pub fn idle() -> Self {
        Self {
            status: QueryStatus::Idle,
            is_loading: false,
            is_fetching: false,
            data: None,
            error: None,
            data_updated_at: None,
            error_updated_at: None,
            fetch_count: 0,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.status == QueryStatus::Idle
    }

    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Resolved
    }

    pub fn is_error(&self) -> bool {
        self.status == QueryStatus::Errored
    }

    /// True once the key has settled at least once and nothing is in flight.
    pub fn is_settled(&self) -> bool {
        matches!(self.status, QueryStatus::Resolved | QueryStatus::Errored)
    }
}

impl<T: Clone> Snapshot<T> {
    /// Build a snapshot from an optional entry.
    pub fn from_entry(entry: Option<&QueryEntry<T>>) -> Self {
        let Some(entry) = entry else {
            return Self::idle();
        };
        let is_fetching = entry.status == QueryStatus::Pending;
        Self {
            status: entry.status,
            is_loading: is_fetching && entry.data.is_none(),
            is_fetching,
            data: entry.data.clone(),
            error: entry.error.clone(),
            data_updated_at: entry.data_updated_at,
            error_updated_at: entry.error_updated_at,
            fetch_count: entry.fetch_count,
        }
    }
}

impl<T> Default for Snapshot<T> {
    fn default() -> Self {
        Self::idle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Staleness;
    use chrono::Utc;

    #[test]
    fn test_missing_entry_reads_idle() {
        let snapshot: Snapshot<String> = Snapshot::from_entry(None);
        assert!(snapshot.is_idle());
        assert!(!snapshot.is_loading);
        assert!(!snapshot.is_fetching);
        assert!(snapshot.data.is_none());
    }

    #[test]
    fn test_first_fetch_is_loading() {
        let mut entry: QueryEntry<String> = QueryEntry::idle(Staleness::Never);
        entry.begin_fetch(1);
        let snapshot = Snapshot::from_entry(Some(&entry));
        assert!(snapshot.is_loading);
        assert!(snapshot.is_fetching);
        assert_eq!(snapshot.fetch_count, 1);
    }

    #[test]
    fn test_refetch_with_data_is_not_loading() {
        let mut entry = QueryEntry::idle(Staleness::Never);
        entry.begin_fetch(1);
        entry.resolve(1, "abc".to_string(), Utc::now());
        entry.invalidate();
        entry.begin_fetch(2);

        let snapshot = Snapshot::from_entry(Some(&entry));
        assert!(!snapshot.is_loading);
        assert!(snapshot.is_fetching);
        assert_eq!(snapshot.data.as_deref(), Some("abc"));
    }

    #[test]
    fn test_resolved_snapshot() {
        let mut entry = QueryEntry::idle(Staleness::Never);
        entry.begin_fetch(1);
        entry.resolve(1, 5u32, Utc::now());
        let snapshot = Snapshot::from_entry(Some(&entry));
        assert!(snapshot.is_success());
        assert!(snapshot.is_settled());
        assert!(!snapshot.is_fetching);
        assert!(snapshot.data_updated_at.is_some());
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let snapshot: Snapshot<String> = Snapshot::idle();
        let json = serde_json::to_value(&snapshot).expect("serialize snapshot");
        assert_eq!(json["status"], "idle");
        assert_eq!(json["isLoading"], false);
        assert_eq!(json["isFetching"], false);
        assert!(json["data"].is_null());
    }
}
