//! Mapping from [`Signal`]s to stored events.

use std::sync::Arc;
use std::time::Duration;

use opsline_core::Metadata;
use serde_json::Value;

use crate::bus::{Instrumentation, Observer, SubscriptionId};
use crate::recorder::{Recorder, UNKNOWN_NAME};
use crate::sanitize;
use crate::signal::{BroadcastSignal, CacheSignal, Signal, SignalKind, TaskInfo, TaskSignal};

impl Observer for Recorder {
    fn on_signal(&self, signal: &Signal, elapsed: Option<Duration>) {
        // Metadata is only built for signals that will be stored.
        let Some(admission) = self.admit() else {
            return;
        };
        let duration_ms = elapsed.map(|d| d.as_nanos() as f64 / 1_000_000.0);
        let event_type = signal.kind().event_type();
        let (name, metadata) = match signal {
            Signal::Task(task) => (
                task.task().class.as_str(),
                task_metadata(task, admission.config.max_payload_bytes),
            ),
            Signal::Cache(cache) => (cache.key(), cache_metadata(cache)),
            Signal::Broadcast(broadcast) => (
                broadcast.broadcasting.as_deref().unwrap_or(UNKNOWN_NAME),
                broadcast_metadata(broadcast),
            ),
        };
        self.persist(admission, event_type, name, duration_ms, metadata);
    }
}

fn task_metadata(signal: &TaskSignal, max_bytes: usize) -> Metadata {
    let task: &TaskInfo = signal.task();
    let mut metadata = Metadata::new();
    metadata.insert("task_id".into(), task.task_id.clone().into());
    metadata.insert(
        "provider_task_id".into(),
        task.provider_task_id.clone().into(),
    );
    metadata.insert("queue_name".into(), task.queue_name.clone().into());
    metadata.insert(
        "arguments".into(),
        sanitize::limit_arguments(&task.arguments, max_bytes),
    );
    match signal {
        TaskSignal::Enqueue { queue, adapter, .. } => {
            metadata.insert("queue".into(), queue.clone().into());
            metadata.insert("adapter".into(), adapter.clone().into());
        }
        TaskSignal::PerformStart { .. } => {}
        TaskSignal::Perform { exception, .. } => {
            metadata.insert("exception".into(), exception.clone().into());
        }
    }
    metadata
}

fn cache_metadata(signal: &CacheSignal) -> Metadata {
    let mut metadata = Metadata::new();
    match signal {
        CacheSignal::Read { hit, store, .. } => {
            metadata.insert("hit".into(), (*hit).into());
            metadata.insert("store".into(), store.clone().into());
        }
        CacheSignal::Write {
            store, value_bytes, ..
        } => {
            metadata.insert("store".into(), store.clone().into());
            metadata.insert("value_bytes".into(), (*value_bytes).into());
        }
        CacheSignal::Delete { store, .. } => {
            metadata.insert("store".into(), store.clone().into());
        }
    }
    metadata
}

fn broadcast_metadata(signal: &BroadcastSignal) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert(
        "broadcasting".into(),
        signal
            .broadcasting
            .clone()
            .map_or(Value::Null, Value::String),
    );
    metadata.insert("message_bytes".into(), signal.message_bytes.into());
    metadata
}

/// Subscribe `recorder` to every task, cache and broadcast signal on `bus`.
///
/// Returns `None` without subscribing when capture is disabled at install
/// time; the checks made on every record still apply afterwards.
pub fn install(bus: &Instrumentation, recorder: Recorder) -> Option<SubscriptionId> {
    if !recorder.config().load().enabled {
        tracing::debug!("capture disabled, signal observers not installed");
        return None;
    }
    Some(bus.subscribe(SignalKind::ALL, Arc::new(recorder)))
}
