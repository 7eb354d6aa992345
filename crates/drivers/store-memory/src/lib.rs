#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Opsline Store Memory Driver
//!
//! In-memory event store implementing the [`EventStore`] port.
//!
//! Events live in a `BTreeMap` keyed by id behind a `parking_lot::RwLock`;
//! ids come from an atomic counter so they are strictly increasing even
//! under concurrent inserts.
//!
//! Suitable for tests, development and single-process deployments where
//! durability is not required.
//!
//! # Examples
//!
//! ```rust
//! use opsline_core::NewEvent;
//! use opsline_ports::{EventFilter, EventStore};
//! use opsline_store_memory::MemoryEventStore;
//!
//! let store = MemoryEventStore::new();
//! let id = store.insert(NewEvent::new("cache.read", "users/42")).unwrap();
//! assert_eq!(store.get(id).unwrap().unwrap().name, "users/42");
//! assert_eq!(store.count(&EventFilter::new()).unwrap(), 1);
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use opsline_core::{Event, EventId, NewEvent, storage_instant};
use opsline_ports::{
    EventFilter, EventQuery, EventStore, GroupBy, GroupStats, StoreError, aggregate,
};
use parking_lot::RwLock;

/// Process-local event store.
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    events: RwLock<BTreeMap<EventId, Event>>,
    last_id: AtomicU64,
}

impl MemoryEventStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored events.
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Whether the store holds no events.
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    fn matching(&self, filter: &EventFilter) -> Vec<Event> {
        self.events
            .read()
            .values()
            .filter(|event| filter.matches(event))
            .cloned()
            .collect()
    }
}

impl EventStore for MemoryEventStore {
    fn insert(&self, event: NewEvent) -> Result<EventId, StoreError> {
        event.validate()?;
        let id = EventId::new(self.last_id.fetch_add(1, Ordering::Relaxed) + 1);
        let stored = event.into_event(id, Utc::now());
        self.events.write().insert(id, stored);
        Ok(id)
    }

    fn get(&self, id: EventId) -> Result<Option<Event>, StoreError> {
        Ok(self.events.read().get(&id).cloned())
    }

    fn query(&self, query: &EventQuery) -> Result<Vec<Event>, StoreError> {
        let mut events = self.matching(&query.filter);
        query.order.sort(&mut events);
        if let Some(limit) = query.limit {
            events.truncate(limit);
        }
        Ok(events)
    }

    fn count(&self, filter: &EventFilter) -> Result<u64, StoreError> {
        let events = self.events.read();
        Ok(events.values().filter(|event| filter.matches(event)).count() as u64)
    }

    fn aggregate(&self, filter: &EventFilter, by: GroupBy) -> Result<Vec<GroupStats>, StoreError> {
        let events = self.events.read();
        Ok(aggregate(
            events.values().filter(|event| filter.matches(event)),
            by,
        ))
    }

    fn count_distinct_correlations(&self, filter: &EventFilter) -> Result<u64, StoreError> {
        let events = self.events.read();
        let distinct: BTreeSet<&str> = events
            .values()
            .filter(|event| filter.matches(event))
            .filter_map(|event| event.correlation_id.as_deref())
            .collect();
        Ok(distinct.len() as u64)
    }

    fn purge(&self, before: DateTime<Utc>) -> Result<usize, StoreError> {
        let before = storage_instant(before);
        let mut events = self.events.write();
        let len = events.len();
        events.retain(|_, event| event.occurred_at >= before);
        Ok(len - events.len())
    }

    fn delete(&self, id: EventId) -> Result<bool, StoreError> {
        Ok(self.events.write().remove(&id).is_some())
    }

    fn clear(&self) -> Result<usize, StoreError> {
        Ok(std::mem::take(&mut *self.events.write()).len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use opsline_core::{EventError, EventFamily};
    use opsline_ports::Order;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    fn at(store: &MemoryEventStore, event_type: &str, name: &str, when: DateTime<Utc>) -> EventId {
        store
            .insert(NewEvent::new(event_type, name).with_occurred_at(when))
            .unwrap()
    }

    #[test]
    fn insert_assigns_increasing_ids() {
        let store = MemoryEventStore::new();
        let a = store.insert(NewEvent::new("cache.read", "a")).unwrap();
        let b = store.insert(NewEvent::new("cache.read", "b")).unwrap();
        assert!(b > a);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn insert_rejects_invalid_events() {
        let store = MemoryEventStore::new();
        let err = store.insert(NewEvent::new("", "x")).unwrap_err();
        assert!(matches!(err, StoreError::Invalid(EventError::EmptyType)));
        assert!(store.is_empty());
    }

    #[test]
    fn stored_event_keeps_fields() {
        let store = MemoryEventStore::new();
        let mut meta = opsline_core::Metadata::new();
        meta.insert("hit".into(), json!(true));
        let id = store
            .insert(
                NewEvent::new("cache.read", "users/1")
                    .with_correlation_id("c1")
                    .with_tenant_id("acme")
                    .with_duration_ms(0.5)
                    .with_metadata(meta.clone()),
            )
            .unwrap();

        let event = store.fetch(id).unwrap();
        assert_eq!(event.correlation_id.as_deref(), Some("c1"));
        assert_eq!(event.tenant_id.as_deref(), Some("acme"));
        assert_eq!(event.duration_ms, Some(0.5));
        assert_eq!(event.metadata, meta);
    }

    #[test]
    fn fetch_missing_is_not_found() {
        let store = MemoryEventStore::new();
        assert!(matches!(
            store.fetch(EventId::new(1)),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn query_filters_orders_and_limits() {
        let store = MemoryEventStore::new();
        let now = Utc::now();
        at(&store, "task.enqueue", "A", now - TimeDelta::seconds(3));
        at(&store, "cache.read", "k", now - TimeDelta::seconds(2));
        at(&store, "task.perform", "A", now - TimeDelta::seconds(1));

        let tasks = store
            .query(&EventQuery::new(EventFilter::new().family(EventFamily::Task)))
            .unwrap();
        let types: Vec<&str> = tasks.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(types, vec!["task.perform", "task.enqueue"]);

        let first = store
            .query(
                &EventQuery::new(EventFilter::new())
                    .order(Order::Chronological)
                    .limit(1),
            )
            .unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].event_type, "task.enqueue");
    }

    #[test]
    fn purge_removes_strictly_older_and_is_idempotent() {
        let store = MemoryEventStore::new();
        let cutoff = Utc::now();
        at(&store, "cache.read", "old", cutoff - TimeDelta::seconds(1));
        let kept = at(&store, "cache.read", "edge", cutoff);
        at(&store, "cache.read", "new", cutoff + TimeDelta::seconds(1));

        assert_eq!(store.purge(cutoff).unwrap(), 1);
        assert_eq!(store.purge(cutoff).unwrap(), 0);
        assert!(store.get(kept).unwrap().is_some());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn purge_cutoff_is_compared_in_microseconds() {
        let store = MemoryEventStore::new();
        let second = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let id = at(&store, "cache.read", "edge", second + TimeDelta::nanoseconds(700));
        assert_eq!(store.get(id).unwrap().unwrap().occurred_at, second);

        assert_eq!(store.purge(second + TimeDelta::nanoseconds(500)).unwrap(), 0);
        assert_eq!(store.purge(second + TimeDelta::microseconds(1)).unwrap(), 1);
    }

    #[test]
    fn delete_and_clear() {
        let store = MemoryEventStore::new();
        let id = store.insert(NewEvent::new("cache.read", "a")).unwrap();
        store.insert(NewEvent::new("cache.read", "b")).unwrap();

        assert!(store.delete(id).unwrap());
        assert!(!store.delete(id).unwrap());
        assert_eq!(store.clear().unwrap(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn ids_keep_increasing_after_clear() {
        let store = MemoryEventStore::new();
        let before = store.insert(NewEvent::new("cache.read", "a")).unwrap();
        store.clear().unwrap();
        let after = store.insert(NewEvent::new("cache.read", "a")).unwrap();
        assert!(after > before);
    }

    #[test]
    fn distinct_correlations_skip_nulls() {
        let store = MemoryEventStore::new();
        for corr in [Some("c1"), Some("c1"), Some("c2"), None] {
            let mut event = NewEvent::new("task.perform", "Job");
            event.correlation_id = corr.map(str::to_owned);
            store.insert(event).unwrap();
        }
        assert_eq!(
            store
                .count_distinct_correlations(&EventFilter::new())
                .unwrap(),
            2
        );
    }

    #[test]
    fn concurrent_inserts_get_unique_ids() {
        let store = Arc::new(MemoryEventStore::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        store
                            .insert(NewEvent::new("cache.write", format!("{t}-{i}")))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let all = store.query(&EventQuery::default()).unwrap();
        let ids: BTreeSet<EventId> = all.iter().map(|e| e.id).collect();
        assert_eq!(all.len(), 200);
        assert_eq!(ids.len(), 200);
    }
}
