//! Read-side helpers built on [`EventStore`]: event browsing limits,
//! time windows, correlation chains and the dashboard aggregates.

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use opsline_core::{Event, EventFamily, event_type};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::filter::{EventFilter, EventQuery, GroupBy, GroupStats, Order};
use crate::store::EventStore;

/// Listing size when the caller asks for none or a non-positive one.
pub const DEFAULT_LIMIT: usize = 200;
/// Largest listing a caller may ask for.
pub const MAX_LIMIT: usize = 1000;
/// Largest correlation chain returned by [`related_events`].
pub const RELATED_LIMIT: usize = 200;
/// Recent events in an [`Overview`].
pub const OVERVIEW_RECENT: usize = 10;
/// Groups kept in a [`FamilyOverview`].
pub const FAMILY_TOP_NAMES: usize = 20;
/// Recent events in a [`FamilyOverview`].
pub const FAMILY_RECENT: usize = 50;

/// Normalize a caller-supplied listing size.
#[must_use]
pub fn clamp_limit(requested: Option<i64>) -> usize {
    match requested {
        Some(n) if n > 0 => usize::try_from(n).map_or(MAX_LIMIT, |n| n.min(MAX_LIMIT)),
        _ => DEFAULT_LIMIT,
    }
}

/// The newest [`RELATED_LIMIT`] events sharing `event`'s correlation id,
/// oldest first.
///
/// An event without a correlation id is its own, single-element chain.
pub fn related_events<S>(store: &S, event: &Event) -> Result<Vec<Event>, StoreError>
where
    S: EventStore + ?Sized,
{
    let Some(correlation_id) = &event.correlation_id else {
        return Ok(vec![event.clone()]);
    };
    let mut chain = store.query(
        &EventQuery::new(EventFilter::new().correlation_id(correlation_id.clone()))
            .order(Order::Recent)
            .limit(RELATED_LIMIT),
    )?;
    chain.reverse();
    Ok(chain)
}

/// Look-back presets for the dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Window {
    /// Last 5 minutes.
    #[serde(rename = "5m")]
    FiveMinutes,
    /// Last 15 minutes.
    #[serde(rename = "15m")]
    FifteenMinutes,
    /// Last 30 minutes.
    #[serde(rename = "30m")]
    ThirtyMinutes,
    /// Last hour.
    #[default]
    #[serde(rename = "1h")]
    OneHour,
    /// Last 6 hours.
    #[serde(rename = "6h")]
    SixHours,
    /// Last 24 hours.
    #[serde(rename = "24h")]
    OneDay,
    /// Last 7 days.
    #[serde(rename = "7d")]
    SevenDays,
}

impl Window {
    /// Every preset, shortest first.
    pub const ALL: [Self; 7] = [
        Self::FiveMinutes,
        Self::FifteenMinutes,
        Self::ThirtyMinutes,
        Self::OneHour,
        Self::SixHours,
        Self::OneDay,
        Self::SevenDays,
    ];

    /// Short label (`5m`, `1h`, `7d`, ...).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FiveMinutes => "5m",
            Self::FifteenMinutes => "15m",
            Self::ThirtyMinutes => "30m",
            Self::OneHour => "1h",
            Self::SixHours => "6h",
            Self::OneDay => "24h",
            Self::SevenDays => "7d",
        }
    }

    /// Parse a label; anything unrecognized is one hour.
    #[must_use]
    pub fn parse(label: &str) -> Self {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|window| window.as_str() == label)
            .unwrap_or_default()
    }

    /// Length of the window.
    #[must_use]
    pub fn duration(self) -> TimeDelta {
        match self {
            Self::FiveMinutes => TimeDelta::minutes(5),
            Self::FifteenMinutes => TimeDelta::minutes(15),
            Self::ThirtyMinutes => TimeDelta::minutes(30),
            Self::OneHour => TimeDelta::hours(1),
            Self::SixHours => TimeDelta::hours(6),
            Self::OneDay => TimeDelta::hours(24),
            Self::SevenDays => TimeDelta::days(7),
        }
    }

    /// Start of the window ending at `now`.
    #[must_use]
    pub fn since(self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.duration()
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All-family summary of one window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overview {
    /// The window summarized.
    pub window: Window,
    /// Its start.
    pub since: DateTime<Utc>,
    /// Events in the window.
    pub total: u64,
    /// Per-type statistics.
    pub by_type: Vec<GroupStats>,
    /// Distinct correlation ids in the window.
    pub correlations: u64,
    /// Newest events in the window.
    pub recent: Vec<Event>,
}

/// Summarize every event in `window` ending at `now`.
pub fn overview<S>(store: &S, window: Window, now: DateTime<Utc>) -> Result<Overview, StoreError>
where
    S: EventStore + ?Sized,
{
    let since = window.since(now);
    let filter = EventFilter::new().since(since);
    Ok(Overview {
        window,
        since,
        total: store.count(&filter)?,
        by_type: store.aggregate(&filter, GroupBy::EventType)?,
        correlations: store.count_distinct_correlations(&filter)?,
        recent: store.query(&EventQuery::new(filter).limit(OVERVIEW_RECENT))?,
    })
}

/// One family's summary of one window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FamilyOverview {
    /// The family summarized.
    pub family: EventFamily,
    /// The window summarized.
    pub window: Window,
    /// Its start.
    pub since: DateTime<Utc>,
    /// Family events in the window.
    pub total: u64,
    /// Busiest names with their statistics.
    pub by_name: Vec<GroupStats>,
    /// Newest family events in the window.
    pub recent: Vec<Event>,
    /// Share of cache reads that hit; cache family with reads only.
    pub cache_hit_rate: Option<f64>,
    /// Finished tasks that raised; task family only.
    pub task_errors: Option<u64>,
}

/// Summarize `family` over `window` ending at `now`.
pub fn family_overview<S>(
    store: &S,
    family: EventFamily,
    window: Window,
    now: DateTime<Utc>,
) -> Result<FamilyOverview, StoreError>
where
    S: EventStore + ?Sized,
{
    let since = window.since(now);
    let filter = EventFilter::new().family(family).since(since);

    let mut by_name = store.aggregate(&filter, GroupBy::Name)?;
    by_name.truncate(FAMILY_TOP_NAMES);

    let cache_hit_rate = match family {
        EventFamily::Cache => {
            let reads = EventFilter::new()
                .event_type(event_type::CACHE_READ)
                .since(since);
            let total = store.count(&reads)?;
            if total == 0 {
                None
            } else {
                let hits = store.count(&reads.metadata_flag("hit"))?;
                Some(hits as f64 / total as f64)
            }
        }
        _ => None,
    };

    let task_errors = match family {
        EventFamily::Task => Some(
            store.count(
                &EventFilter::new()
                    .event_type(event_type::TASK_PERFORM)
                    .since(since)
                    .metadata_flag("exception"),
            )?,
        ),
        _ => None,
    };

    Ok(FamilyOverview {
        family,
        window,
        since,
        total: store.count(&filter)?,
        by_name,
        recent: store.query(&EventQuery::new(filter).limit(FAMILY_RECENT))?,
        cache_hit_rate,
        task_errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::aggregate;
    use opsline_core::{EventId, NewEvent};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    /// Minimal store over the reference filter semantics.
    #[derive(Default)]
    struct VecStore {
        events: Mutex<Vec<Event>>,
    }

    impl VecStore {
        fn matching(&self, filter: &EventFilter) -> Vec<Event> {
            self.events
                .lock()
                .iter()
                .filter(|e| filter.matches(e))
                .cloned()
                .collect()
        }
    }

    impl EventStore for VecStore {
        fn insert(&self, event: NewEvent) -> Result<EventId, StoreError> {
            event.validate()?;
            let mut events = self.events.lock();
            let id = EventId::new(events.len() as u64 + 1);
            events.push(event.into_event(id, Utc::now()));
            Ok(id)
        }

        fn get(&self, id: EventId) -> Result<Option<Event>, StoreError> {
            Ok(self.events.lock().iter().find(|e| e.id == id).cloned())
        }

        fn query(&self, query: &EventQuery) -> Result<Vec<Event>, StoreError> {
            let mut events = self.matching(&query.filter);
            query.order.sort(&mut events);
            events.truncate(query.limit.unwrap_or(usize::MAX));
            Ok(events)
        }

        fn count(&self, filter: &EventFilter) -> Result<u64, StoreError> {
            Ok(self.matching(filter).len() as u64)
        }

        fn aggregate(
            &self,
            filter: &EventFilter,
            by: GroupBy,
        ) -> Result<Vec<GroupStats>, StoreError> {
            Ok(aggregate(&self.matching(filter), by))
        }

        fn count_distinct_correlations(&self, filter: &EventFilter) -> Result<u64, StoreError> {
            let mut ids: Vec<String> = self
                .matching(filter)
                .into_iter()
                .filter_map(|e| e.correlation_id)
                .collect();
            ids.sort();
            ids.dedup();
            Ok(ids.len() as u64)
        }

        fn purge(&self, before: DateTime<Utc>) -> Result<usize, StoreError> {
            let mut events = self.events.lock();
            let len = events.len();
            events.retain(|e| e.occurred_at >= opsline_core::storage_instant(before));
            Ok(len - events.len())
        }

        fn delete(&self, id: EventId) -> Result<bool, StoreError> {
            let mut events = self.events.lock();
            let len = events.len();
            events.retain(|e| e.id != id);
            Ok(events.len() != len)
        }

        fn clear(&self) -> Result<usize, StoreError> {
            Ok(std::mem::take(&mut *self.events.lock()).len())
        }
    }

    #[rstest]
    #[case(None, 200)]
    #[case(Some(0), 200)]
    #[case(Some(-5), 200)]
    #[case(Some(50), 50)]
    #[case(Some(1000), 1000)]
    #[case(Some(5000), 1000)]
    fn limits_are_clamped(#[case] requested: Option<i64>, #[case] expected: usize) {
        assert_eq!(clamp_limit(requested), expected);
    }

    #[rstest]
    #[case("5m", Window::FiveMinutes)]
    #[case("24h", Window::OneDay)]
    #[case(" 7d ", Window::SevenDays)]
    #[case("2w", Window::OneHour)]
    #[case("", Window::OneHour)]
    fn window_labels(#[case] label: &str, #[case] expected: Window) {
        assert_eq!(Window::parse(label), expected);
    }

    #[test]
    fn window_serializes_as_label() {
        assert_eq!(serde_json::to_value(Window::OneDay).unwrap(), json!("24h"));
        assert_eq!(Window::SixHours.to_string(), "6h");
    }

    #[test]
    fn related_events_follow_correlation_chronologically() {
        let store = VecStore::default();
        for name in ["A", "B", "C"] {
            store
                .insert(NewEvent::new("task.perform", name).with_correlation_id("c1"))
                .unwrap();
        }
        store
            .insert(NewEvent::new("task.perform", "other").with_correlation_id("c2"))
            .unwrap();

        let anchor = store.fetch(EventId::new(2)).unwrap();
        let names: Vec<String> = related_events(&store, &anchor)
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["A", "B", "C"]);
    }

    #[test]
    fn long_chains_keep_the_newest_events() {
        let store = VecStore::default();
        let start = Utc::now() - TimeDelta::hours(1);
        for i in 0..250 {
            store
                .insert(
                    NewEvent::new("cache.read", format!("k{i}"))
                        .with_correlation_id("long")
                        .with_occurred_at(start + TimeDelta::seconds(i)),
                )
                .unwrap();
        }

        let anchor = store.fetch(EventId::new(250)).unwrap();
        let chain = related_events(&store, &anchor).unwrap();
        assert_eq!(chain.len(), RELATED_LIMIT);
        assert_eq!(chain[0].name, "k50");
        assert_eq!(chain.last(), Some(&anchor));
    }

    #[test]
    fn uncorrelated_event_is_its_own_chain() {
        let store = VecStore::default();
        let id = store.insert(NewEvent::new("cache.read", "k")).unwrap();
        store.insert(NewEvent::new("cache.read", "k")).unwrap();

        let event = store.fetch(id).unwrap();
        assert_eq!(related_events(&store, &event).unwrap(), vec![event]);
    }

    #[test]
    fn overview_counts_window_only() {
        let store = VecStore::default();
        let now = Utc::now();
        store
            .insert(
                NewEvent::new("cache.read", "old")
                    .with_occurred_at(now - TimeDelta::hours(2))
                    .with_correlation_id("c0"),
            )
            .unwrap();
        for corr in ["c1", "c1", "c2"] {
            store
                .insert(
                    NewEvent::new("task.perform", "Job")
                        .with_occurred_at(now - TimeDelta::minutes(1))
                        .with_correlation_id(corr)
                        .with_duration_ms(5.0),
                )
                .unwrap();
        }

        let summary = overview(&store, Window::OneHour, now).unwrap();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.correlations, 2);
        assert_eq!(summary.by_type.len(), 1);
        assert_eq!(summary.by_type[0].key, "task.perform");
        assert_eq!(summary.recent.len(), 3);
        assert_eq!(summary.recent[0].id, EventId::new(4));
    }

    #[test]
    fn cache_family_reports_hit_rate() {
        let store = VecStore::default();
        let now = Utc::now();
        for hit in [true, true, true, false] {
            let mut meta = opsline_core::Metadata::new();
            meta.insert("hit".into(), json!(hit));
            store
                .insert(
                    NewEvent::new("cache.read", "users/1")
                        .with_occurred_at(now)
                        .with_metadata(meta),
                )
                .unwrap();
        }
        store
            .insert(NewEvent::new("cache.write", "users/1").with_occurred_at(now))
            .unwrap();

        let summary =
            family_overview(&store, EventFamily::Cache, Window::FiveMinutes, now).unwrap();
        assert_eq!(summary.total, 5);
        assert_eq!(summary.cache_hit_rate, Some(0.75));
        assert_eq!(summary.task_errors, None);
        assert_eq!(summary.by_name[0].key, "users/1");
        assert_eq!(summary.by_name[0].count, 5);
    }

    #[test]
    fn task_family_counts_errors() {
        let store = VecStore::default();
        let now = Utc::now();
        for exception in [json!(null), json!("TimeoutError"), json!("IoError")] {
            let mut meta = opsline_core::Metadata::new();
            meta.insert("exception".into(), exception);
            store
                .insert(
                    NewEvent::new("task.perform", "ReportJob")
                        .with_occurred_at(now)
                        .with_metadata(meta),
                )
                .unwrap();
        }

        let summary = family_overview(&store, EventFamily::Task, Window::OneHour, now).unwrap();
        assert_eq!(summary.task_errors, Some(2));
        assert_eq!(summary.cache_hit_rate, None);
    }

    #[test]
    fn empty_cache_family_has_no_hit_rate() {
        let store = VecStore::default();
        let summary =
            family_overview(&store, EventFamily::Cache, Window::OneHour, Utc::now()).unwrap();
        assert_eq!(summary.total, 0);
        assert_eq!(summary.cache_hit_rate, None);
    }
}
