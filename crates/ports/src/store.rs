//! Event store port.
//!
//! Defines the interface for persisting and querying captured events.
//! Backend drivers (in-memory, SQLite) implement this trait.

use chrono::{DateTime, Utc};
use opsline_core::{Event, EventId, NewEvent};

use crate::error::StoreError;
use crate::filter::{EventFilter, EventQuery, GroupBy, GroupStats};

/// Append-only event storage with filtered reads and bulk deletes.
///
/// Methods are synchronous: capture happens inside instrumentation hooks
/// that may run outside any async runtime. Implementations must be safe to
/// share across threads and must assign strictly increasing ids.
pub trait EventStore: Send + Sync {
    /// Validate and append an event, returning its new id.
    fn insert(&self, event: NewEvent) -> Result<EventId, StoreError>;

    /// Fetch one event.
    fn get(&self, id: EventId) -> Result<Option<Event>, StoreError>;

    /// Filtered, ordered, limited listing.
    fn query(&self, query: &EventQuery) -> Result<Vec<Event>, StoreError>;

    /// Number of events matching `filter`.
    fn count(&self, filter: &EventFilter) -> Result<u64, StoreError>;

    /// Per-group statistics over events matching `filter`, sorted by count
    /// descending then key.
    fn aggregate(&self, filter: &EventFilter, by: GroupBy) -> Result<Vec<GroupStats>, StoreError>;

    /// Number of distinct non-null correlation ids among matching events.
    fn count_distinct_correlations(&self, filter: &EventFilter) -> Result<u64, StoreError>;

    /// Delete every event with `occurred_at < before`. Returns how many.
    fn purge(&self, before: DateTime<Utc>) -> Result<usize, StoreError>;

    /// Delete one event. Returns whether it existed.
    fn delete(&self, id: EventId) -> Result<bool, StoreError>;

    /// Delete every event. Returns how many.
    fn clear(&self) -> Result<usize, StoreError>;

    /// Fetch one event, failing with [`StoreError::NotFound`] if absent.
    fn fetch(&self, id: EventId) -> Result<Event, StoreError> {
        self.get(id)?.ok_or(StoreError::NotFound(id))
    }
}
