//! Stored event records.
//!
//! An [`Event`] is created exactly once, by the recorder, and is never
//! mutated afterwards. Stores receive a [`NewEvent`] and assign the
//! [`EventId`] and `created_at` stamp themselves.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::id::EventId;

/// Free-form JSON object attached to an event.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// `at` at the precision every store keeps: whole microseconds.
///
/// Stored timestamps and time-bound comparisons both go through this, so
/// boundary results agree across drivers.
#[must_use]
pub fn storage_instant(at: DateTime<Utc>) -> DateTime<Utc> {
    at.trunc_subsecs(6)
}

/// A validation failure for an event about to be stored.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    /// `event_type` was empty or whitespace.
    #[error("event_type must not be empty")]
    EmptyType,
    /// `name` was empty or whitespace.
    #[error("event name must not be empty")]
    EmptyName,
}

/// An event as handed to a store, before an id is assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    /// Dot-namespaced type, e.g. `task.perform`.
    pub event_type: String,
    /// Subject of the event: task class, cache key or stream name.
    pub name: String,
    /// Correlation id active when the event was captured.
    pub correlation_id: Option<String>,
    /// Request id active when the event was captured.
    pub request_id: Option<String>,
    /// Tenant id active when the event was captured.
    pub tenant_id: Option<String>,
    /// Actor id active when the event was captured.
    pub actor_id: Option<String>,
    /// Elapsed time of the observed operation.
    pub duration_ms: Option<f64>,
    /// Capture time.
    pub occurred_at: DateTime<Utc>,
    /// Sanitized metadata.
    pub metadata: Metadata,
}

impl NewEvent {
    /// Create an event with empty context fields, no duration and empty
    /// metadata, occurring now.
    pub fn new(event_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            name: name.into(),
            correlation_id: None,
            request_id: None,
            tenant_id: None,
            actor_id: None,
            duration_ms: None,
            occurred_at: Utc::now(),
            metadata: Metadata::new(),
        }
    }

    /// Set the correlation id.
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Set the request id.
    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    /// Set the tenant id.
    pub fn with_tenant_id(mut self, id: impl Into<String>) -> Self {
        self.tenant_id = Some(id.into());
        self
    }

    /// Set the actor id.
    pub fn with_actor_id(mut self, id: impl Into<String>) -> Self {
        self.actor_id = Some(id.into());
        self
    }

    /// Set the duration in milliseconds.
    pub fn with_duration_ms(mut self, duration_ms: f64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Set the capture time.
    pub fn with_occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = occurred_at;
        self
    }

    /// Replace the metadata.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Check the invariants every stored event must satisfy.
    pub fn validate(&self) -> Result<(), EventError> {
        if self.event_type.trim().is_empty() {
            return Err(EventError::EmptyType);
        }
        if self.name.trim().is_empty() {
            return Err(EventError::EmptyName);
        }
        Ok(())
    }

    /// Attach the store-assigned id and creation stamp.
    #[must_use]
    pub fn into_event(self, id: EventId, created_at: DateTime<Utc>) -> Event {
        Event {
            id,
            event_type: self.event_type,
            name: self.name,
            correlation_id: self.correlation_id,
            request_id: self.request_id,
            tenant_id: self.tenant_id,
            actor_id: self.actor_id,
            duration_ms: self.duration_ms,
            occurred_at: storage_instant(self.occurred_at),
            metadata: self.metadata,
            created_at,
        }
    }
}

/// A persisted, immutable event record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Store-assigned id.
    pub id: EventId,
    /// Dot-namespaced type, e.g. `cache.read`.
    pub event_type: String,
    /// Subject of the event.
    pub name: String,
    /// Correlation id at capture time.
    pub correlation_id: Option<String>,
    /// Request id at capture time.
    pub request_id: Option<String>,
    /// Tenant id at capture time.
    pub tenant_id: Option<String>,
    /// Actor id at capture time.
    pub actor_id: Option<String>,
    /// Elapsed time of the observed operation.
    pub duration_ms: Option<f64>,
    /// Capture time.
    pub occurred_at: DateTime<Utc>,
    /// Sanitized metadata.
    pub metadata: Metadata,
    /// Time the store accepted the record.
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Metadata value under `key`, if present.
    #[must_use]
    pub fn meta(&self, key: &str) -> Option<&serde_json::Value> {
        self.metadata.get(key)
    }

    /// Whether the metadata was replaced by a truncation marker.
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        self.meta("truncated").and_then(serde_json::Value::as_bool) == Some(true)
    }
}
