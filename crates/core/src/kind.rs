//! Event type names and the families they belong to.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Dot-namespaced event type names written by the recorder.
pub mod event_type {
    /// A task was handed off for deferred execution.
    pub const TASK_ENQUEUE: &str = "task.enqueue";
    /// A worker began executing a task.
    pub const TASK_PERFORM_START: &str = "task.perform_start";
    /// A worker finished executing a task (successfully or not).
    pub const TASK_PERFORM: &str = "task.perform";
    /// A cache key was read.
    pub const CACHE_READ: &str = "cache.read";
    /// A cache key was written.
    pub const CACHE_WRITE: &str = "cache.write";
    /// A cache key was deleted.
    pub const CACHE_DELETE: &str = "cache.delete";
    /// A message was broadcast to a stream.
    pub const CABLE_BROADCAST: &str = "cable.broadcast";
}

/// The three observed subsystems, identified by event type prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventFamily {
    /// Background task lifecycle (`task.*`).
    Task,
    /// Keyed cache access (`cache.*`).
    Cache,
    /// Pub/sub broadcasts (`cable.*`).
    Cable,
}

impl EventFamily {
    /// Every family, in display order.
    pub const ALL: [Self; 3] = [Self::Task, Self::Cache, Self::Cable];

    /// Event type prefix shared by every type in this family, dot included.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Task => "task.",
            Self::Cache => "cache.",
            Self::Cable => "cable.",
        }
    }

    /// Whether `event_type` belongs to this family.
    #[must_use]
    pub fn contains(self, event_type: &str) -> bool {
        event_type.starts_with(self.prefix())
    }

    /// The family an event type belongs to, if any.
    #[must_use]
    pub fn of(event_type: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|family| family.contains(event_type))
    }
}

impl fmt::Display for EventFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Task => "task",
            Self::Cache => "cache",
            Self::Cable => "cable",
        })
    }
}

/// Returned when parsing an unknown family name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event family `{0}` (expected task, cache or cable)")]
pub struct UnknownFamily(pub String);

impl FromStr for EventFamily {
    type Err = UnknownFamily;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "task" | "tasks" | "job" | "jobs" => Ok(Self::Task),
            "cache" => Ok(Self::Cache),
            "cable" | "broadcast" => Ok(Self::Cable),
            other => Err(UnknownFamily(other.to_owned())),
        }
    }
}
