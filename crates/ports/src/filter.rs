//! Query shapes shared by every store driver.
//!
//! [`EventFilter::matches`] and [`aggregate`] are the reference semantics:
//! the in-memory driver uses them directly and the SQL drivers translate
//! them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use opsline_core::{Event, EventFamily, storage_instant};
use serde::{Deserialize, Serialize};

/// Conjunction of optional predicates over stored events.
///
/// Every `None` field matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilter {
    /// Exact event type.
    pub event_type: Option<String>,
    /// Event type prefix (`task.`, `cache.`, `cable.`).
    pub family: Option<EventFamily>,
    /// Exact correlation id.
    pub correlation_id: Option<String>,
    /// Exact request id.
    pub request_id: Option<String>,
    /// Exact tenant id.
    pub tenant_id: Option<String>,
    /// Exact actor id.
    pub actor_id: Option<String>,
    /// Case-sensitive substring of `name`.
    pub name_contains: Option<String>,
    /// Inclusive lower bound on `occurred_at`, compared in whole
    /// microseconds.
    pub since: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `occurred_at`, compared in whole
    /// microseconds.
    pub until: Option<DateTime<Utc>>,
    /// Metadata key whose value must be present and neither `null` nor
    /// `false` (e.g. `hit`, `exception`).
    pub metadata_flag: Option<String>,
}

impl EventFilter {
    /// A filter matching every event.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Only this event type.
    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Only this family.
    pub fn family(mut self, family: EventFamily) -> Self {
        self.family = Some(family);
        self
    }

    /// Only this correlation id.
    pub fn correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Only this request id.
    pub fn request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    /// Only this tenant.
    pub fn tenant_id(mut self, id: impl Into<String>) -> Self {
        self.tenant_id = Some(id.into());
        self
    }

    /// Only this actor.
    pub fn actor_id(mut self, id: impl Into<String>) -> Self {
        self.actor_id = Some(id.into());
        self
    }

    /// Names containing `needle`.
    pub fn name_contains(mut self, needle: impl Into<String>) -> Self {
        self.name_contains = Some(needle.into());
        self
    }

    /// Events at or after `at`.
    pub fn since(mut self, at: DateTime<Utc>) -> Self {
        self.since = Some(at);
        self
    }

    /// Events at or before `at`.
    pub fn until(mut self, at: DateTime<Utc>) -> Self {
        self.until = Some(at);
        self
    }

    /// Events whose metadata `key` is set to something other than `null`
    /// or `false`.
    pub fn metadata_flag(mut self, key: impl Into<String>) -> Self {
        self.metadata_flag = Some(key.into());
        self
    }

    /// Whether `event` satisfies every present predicate.
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        fn exact(want: Option<&String>, have: Option<&String>) -> bool {
            want.is_none_or(|want| have == Some(want))
        }
        let at = storage_instant(event.occurred_at);

        self.event_type
            .as_ref()
            .is_none_or(|t| *t == event.event_type)
            && self.family.is_none_or(|f| f.contains(&event.event_type))
            && exact(self.correlation_id.as_ref(), event.correlation_id.as_ref())
            && exact(self.request_id.as_ref(), event.request_id.as_ref())
            && exact(self.tenant_id.as_ref(), event.tenant_id.as_ref())
            && exact(self.actor_id.as_ref(), event.actor_id.as_ref())
            && self
                .name_contains
                .as_ref()
                .is_none_or(|needle| event.name.contains(needle.as_str()))
            && self.since.is_none_or(|since| at >= storage_instant(since))
            && self.until.is_none_or(|until| at <= storage_instant(until))
            && self
                .metadata_flag
                .as_ref()
                .is_none_or(|key| is_flag_set(event, key))
    }
}

fn is_flag_set(event: &Event, key: &str) -> bool {
    match event.metadata.get(key) {
        None | Some(serde_json::Value::Null | serde_json::Value::Bool(false)) => false,
        Some(_) => true,
    }
}

/// Result ordering. Ties on `occurred_at` break on `id`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    /// Newest first.
    #[default]
    Recent,
    /// Oldest first.
    Chronological,
}

impl Order {
    /// Sort `events` in place.
    pub fn sort(self, events: &mut [Event]) {
        match self {
            Self::Recent => events.sort_by(|a, b| {
                b.occurred_at
                    .cmp(&a.occurred_at)
                    .then_with(|| b.id.cmp(&a.id))
            }),
            Self::Chronological => events.sort_by(|a, b| {
                a.occurred_at
                    .cmp(&b.occurred_at)
                    .then_with(|| a.id.cmp(&b.id))
            }),
        }
    }
}

/// A filtered, ordered, optionally limited listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventQuery {
    /// Which events.
    pub filter: EventFilter,
    /// In which order.
    pub order: Order,
    /// At most this many; `None` for all.
    pub limit: Option<usize>,
}

impl EventQuery {
    /// Newest-first listing of `filter`.
    #[must_use]
    pub fn new(filter: EventFilter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    /// Set the order.
    pub fn order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    /// Set the limit.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Grouping key for [`EventStore::aggregate`](crate::EventStore::aggregate).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    /// Group on `event_type`.
    EventType,
    /// Group on `name`.
    Name,
}

impl GroupBy {
    fn key(self, event: &Event) -> &str {
        match self {
            Self::EventType => &event.event_type,
            Self::Name => &event.name,
        }
    }
}

/// Count and duration statistics for one group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupStats {
    /// The event type or name.
    pub key: String,
    /// Number of events in the group.
    pub count: u64,
    /// Mean over events that have a duration.
    pub avg_duration_ms: Option<f64>,
    /// Max over events that have a duration.
    pub max_duration_ms: Option<f64>,
}

/// Order groups by count descending, then key ascending.
pub fn sort_groups(groups: &mut [GroupStats]) {
    groups.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
}

/// Group `events` and compute [`GroupStats`], sorted with [`sort_groups`].
pub fn aggregate<'a>(events: impl IntoIterator<Item = &'a Event>, by: GroupBy) -> Vec<GroupStats> {
    #[derive(Default)]
    struct Acc {
        count: u64,
        timed: u64,
        total: f64,
        max: Option<f64>,
    }

    let mut acc: BTreeMap<&str, Acc> = BTreeMap::new();
    for event in events {
        let entry = acc.entry(by.key(event)).or_default();
        entry.count += 1;
        if let Some(duration) = event.duration_ms {
            entry.timed += 1;
            entry.total += duration;
            entry.max = Some(entry.max.map_or(duration, |max| max.max(duration)));
        }
    }

    let mut groups: Vec<GroupStats> = acc
        .into_iter()
        .map(|(key, acc)| GroupStats {
            key: key.to_owned(),
            count: acc.count,
            avg_duration_ms: (acc.timed > 0).then(|| acc.total / acc.timed as f64),
            max_duration_ms: acc.max,
        })
        .collect();
    sort_groups(&mut groups);
    groups
}
