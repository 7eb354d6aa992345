//! The capture pipeline: guard, sample, stamp, sanitize, persist.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use chrono::Utc;
use opsline_config::{Config, ConfigHandle, panic_message};
use opsline_context::{Context, RecordingGuard};
use opsline_core::{EventId, Metadata, NewEvent};
use opsline_ports::EventStore;
use serde::Serialize;

use crate::sanitize;

/// A capture that passed the nesting, enabled and sampling checks.
pub(crate) struct Admission {
    pub(crate) config: Arc<Config>,
    _guard: RecordingGuard,
}

/// Name stored when a signal carries none.
pub const UNKNOWN_NAME: &str = "unknown";

/// Turns observations into stored events.
///
/// Capture never fails from the caller's point of view: every problem is
/// logged and the event is dropped.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use opsline_config::{Config, ConfigHandle};
/// use opsline_core::Metadata;
/// use opsline_ports::EventStore;
/// use opsline_recorder::Recorder;
/// use opsline_store_memory::MemoryEventStore;
///
/// let store = Arc::new(MemoryEventStore::new());
/// let recorder = Recorder::new(ConfigHandle::new(Config::default()), store.clone());
///
/// let id = recorder
///     .record("cache.read", "users/42", Some(0.4), Metadata::new())
///     .unwrap();
/// let event = store.fetch(id).unwrap();
/// assert!(event.correlation_id.is_some());
/// ```
#[derive(Clone)]
pub struct Recorder {
    config: ConfigHandle,
    store: Arc<dyn EventStore>,
}

impl Recorder {
    /// Recorder over `store`, reading switches from `config` on every call.
    pub fn new(config: ConfigHandle, store: Arc<dyn EventStore>) -> Self {
        Self { config, store }
    }

    /// Recorder using the process default configuration.
    pub fn with_global_config(store: Arc<dyn EventStore>) -> Self {
        Self::new(opsline_config::global().clone(), store)
    }

    /// The configuration this recorder reads.
    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    /// Capture one event.
    ///
    /// Returns `None` when the event was skipped (nested capture, disabled,
    /// not sampled) or could not be stored.
    pub fn record(
        &self,
        event_type: &str,
        name: &str,
        duration_ms: Option<f64>,
        metadata: Metadata,
    ) -> Option<EventId> {
        let admission = self.admit()?;
        self.persist(admission, event_type, name, duration_ms, metadata)
    }

    /// Decide whether an event may be captured in the active frame.
    ///
    /// Takes the frame's recording guard on success, so metadata can be
    /// built afterwards without re-entering capture.
    pub(crate) fn admit(&self) -> Option<Admission> {
        if opsline_context::is_recording() {
            return None;
        }
        let config = self.config.load();
        if !config.enabled || !config.should_sample() {
            return None;
        }
        let guard = opsline_context::enter_recording()?;
        Some(Admission {
            config,
            _guard: guard,
        })
    }

    pub(crate) fn persist(
        &self,
        admission: Admission,
        event_type: &str,
        name: &str,
        duration_ms: Option<f64>,
        metadata: Metadata,
    ) -> Option<EventId> {
        let config = &admission.config;
        opsline_context::ensure_correlation_id();
        let metadata = sanitize::truncate(config.redact(metadata), config.max_payload_bytes);
        let context = Context::current();

        let name = if name.trim().is_empty() {
            UNKNOWN_NAME
        } else {
            name
        };
        let mut event = NewEvent::new(event_type, name)
            .with_occurred_at(Utc::now())
            .with_metadata(metadata);
        event.correlation_id = context.correlation_id;
        event.request_id = context.request_id;
        event.tenant_id = context.tenant_id;
        event.actor_id = context.actor_id;
        event.duration_ms = duration_ms;

        match catch_unwind(AssertUnwindSafe(|| self.store.insert(event))) {
            Ok(Ok(id)) => Some(id),
            Ok(Err(error)) => {
                tracing::warn!(event_type, %error, "failed to record event");
                None
            }
            Err(panic) => {
                tracing::warn!(
                    event_type,
                    panic = panic_message(panic.as_ref()),
                    "event store panicked while recording"
                );
                None
            }
        }
    }

    /// Capture one event with arbitrary serializable metadata.
    ///
    /// Non-object values are stored as `{"value": ..}`; values that fail to
    /// serialize are stored as `{"unserializable": true}`.
    pub fn record_serialized<T: Serialize + ?Sized>(
        &self,
        event_type: &str,
        name: &str,
        duration_ms: Option<f64>,
        metadata: &T,
    ) -> Option<EventId> {
        let admission = self.admit()?;
        let metadata = sanitize::to_metadata(metadata);
        self.persist(admission, event_type, name, duration_ms, metadata)
    }
}

impl std::fmt::Debug for Recorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recorder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
