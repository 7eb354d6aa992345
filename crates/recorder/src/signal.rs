//! Instrumentation signals emitted by host integrations.
//!
//! A [`Signal`] is a closed set of the operations Opsline observes. Every
//! variant maps to exactly one [`SignalKind`], which is what observers
//! subscribe to.

use std::fmt;

use opsline_core::event_type;
use serde_json::Value;

// ---------------------------------------------------------------------------
// SignalKind
// ---------------------------------------------------------------------------

/// The concrete kinds of [`Signal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SignalKind {
    /// A task was handed to a queue.
    TaskEnqueue,
    /// A worker started a task.
    TaskPerformStart,
    /// A worker finished a task, successfully or not.
    TaskPerform,
    /// A cache lookup.
    CacheRead,
    /// A cache store.
    CacheWrite,
    /// A cache eviction.
    CacheDelete,
    /// A pub/sub broadcast.
    Broadcast,
}

impl SignalKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::TaskEnqueue,
        Self::TaskPerformStart,
        Self::TaskPerform,
        Self::CacheRead,
        Self::CacheWrite,
        Self::CacheDelete,
        Self::Broadcast,
    ];

    /// Task lifecycle kinds.
    pub const TASK: [Self; 3] = [Self::TaskEnqueue, Self::TaskPerformStart, Self::TaskPerform];

    /// Cache kinds.
    pub const CACHE: [Self; 3] = [Self::CacheRead, Self::CacheWrite, Self::CacheDelete];

    /// Stored `event_type` for this kind.
    pub const fn event_type(self) -> &'static str {
        match self {
            Self::TaskEnqueue => event_type::TASK_ENQUEUE,
            Self::TaskPerformStart => event_type::TASK_PERFORM_START,
            Self::TaskPerform => event_type::TASK_PERFORM,
            Self::CacheRead => event_type::CACHE_READ,
            Self::CacheWrite => event_type::CACHE_WRITE,
            Self::CacheDelete => event_type::CACHE_DELETE,
            Self::Broadcast => event_type::CABLE_BROADCAST,
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.event_type())
    }
}

// ---------------------------------------------------------------------------
// Signal payloads
// ---------------------------------------------------------------------------

/// The task a lifecycle signal is about.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskInfo {
    /// Task class name.
    pub class: String,
    /// Framework-assigned task id.
    pub task_id: String,
    /// Id assigned by the queue backend, once known.
    pub provider_task_id: Option<String>,
    /// Queue the task runs on.
    pub queue_name: String,
    /// Serialized task arguments.
    pub arguments: Vec<Value>,
}

impl TaskInfo {
    /// Describe a task by class and id.
    pub fn new(class: impl Into<String>, task_id: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            task_id: task_id.into(),
            ..Self::default()
        }
    }

    /// Set the queue name.
    #[must_use]
    pub fn with_queue_name(mut self, queue_name: impl Into<String>) -> Self {
        self.queue_name = queue_name.into();
        self
    }

    /// Set the backend task id.
    #[must_use]
    pub fn with_provider_task_id(mut self, id: impl Into<String>) -> Self {
        self.provider_task_id = Some(id.into());
        self
    }

    /// Set the arguments.
    #[must_use]
    pub fn with_arguments(mut self, arguments: Vec<Value>) -> Self {
        self.arguments = arguments;
        self
    }
}

/// Task lifecycle signals.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskSignal {
    /// Handed to a queue.
    Enqueue {
        /// The task.
        task: TaskInfo,
        /// Queue the adapter received the task on.
        queue: String,
        /// Queue adapter name.
        adapter: String,
    },
    /// About to run.
    PerformStart {
        /// The task.
        task: TaskInfo,
    },
    /// Finished running.
    Perform {
        /// The task.
        task: TaskInfo,
        /// Error type name when the task failed.
        exception: Option<String>,
    },
}

impl TaskSignal {
    /// The task this signal describes.
    pub const fn task(&self) -> &TaskInfo {
        match self {
            Self::Enqueue { task, .. } | Self::PerformStart { task } | Self::Perform { task, .. } => {
                task
            }
        }
    }
}

/// Cache access signals. The key becomes the event name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheSignal {
    /// A lookup.
    Read {
        /// Cache key.
        key: String,
        /// Whether the key was found, when the store reports it.
        hit: Option<bool>,
        /// Cache store name.
        store: String,
    },
    /// A write.
    Write {
        /// Cache key.
        key: String,
        /// Cache store name.
        store: String,
        /// Encoded value size.
        value_bytes: Option<usize>,
    },
    /// An eviction.
    Delete {
        /// Cache key.
        key: String,
        /// Cache store name.
        store: String,
    },
}

impl CacheSignal {
    /// The cache key.
    pub fn key(&self) -> &str {
        match self {
            Self::Read { key, .. } | Self::Write { key, .. } | Self::Delete { key, .. } => key,
        }
    }
}

/// A pub/sub broadcast. The broadcasting becomes the event name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastSignal {
    /// Stream or channel name.
    pub broadcasting: Option<String>,
    /// Encoded message size.
    pub message_bytes: Option<usize>,
}

// ---------------------------------------------------------------------------
// Signal
// ---------------------------------------------------------------------------

/// One observed operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    /// Task lifecycle.
    Task(TaskSignal),
    /// Cache access.
    Cache(CacheSignal),
    /// Pub/sub broadcast.
    Broadcast(BroadcastSignal),
}

impl Signal {
    /// Which kind of signal this is.
    pub const fn kind(&self) -> SignalKind {
        match self {
            Self::Task(TaskSignal::Enqueue { .. }) => SignalKind::TaskEnqueue,
            Self::Task(TaskSignal::PerformStart { .. }) => SignalKind::TaskPerformStart,
            Self::Task(TaskSignal::Perform { .. }) => SignalKind::TaskPerform,
            Self::Cache(CacheSignal::Read { .. }) => SignalKind::CacheRead,
            Self::Cache(CacheSignal::Write { .. }) => SignalKind::CacheWrite,
            Self::Cache(CacheSignal::Delete { .. }) => SignalKind::CacheDelete,
            Self::Broadcast(_) => SignalKind::Broadcast,
        }
    }
}

impl From<TaskSignal> for Signal {
    fn from(signal: TaskSignal) -> Self {
        Self::Task(signal)
    }
}

impl From<CacheSignal> for Signal {
    fn from(signal: CacheSignal) -> Self {
        Self::Cache(signal)
    }
}

impl From<BroadcastSignal> for Signal {
    fn from(signal: BroadcastSignal) -> Self {
        Self::Broadcast(signal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn kinds_map_to_their_event_types() {
        let types: Vec<&str> = SignalKind::ALL.iter().map(|k| k.event_type()).collect();
        assert_eq!(
            types,
            vec![
                "task.enqueue",
                "task.perform_start",
                "task.perform",
                "cache.read",
                "cache.write",
                "cache.delete",
                "cable.broadcast",
            ]
        );
    }

    #[test]
    fn signal_kind_follows_variant() {
        let read: Signal = CacheSignal::Read {
            key: "k".into(),
            hit: Some(true),
            store: "memory".into(),
        }
        .into();
        assert_eq!(read.kind(), SignalKind::CacheRead);

        let perform: Signal = TaskSignal::Perform {
            task: TaskInfo::new("ReportJob", "t1"),
            exception: None,
        }
        .into();
        assert_eq!(perform.kind(), SignalKind::TaskPerform);
        assert_eq!(Signal::from(BroadcastSignal::default()).kind(), SignalKind::Broadcast);
    }
}
