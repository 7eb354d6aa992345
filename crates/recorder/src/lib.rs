#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Opsline Recorder
//!
//! Turns instrumentation signals into stored events.
//!
//! ## Key Components
//!
//! - **[`Signal`]**: closed set of observed operations (task lifecycle,
//!   cache access, broadcasts), each with one [`SignalKind`]
//! - **[`Instrumentation`]**: synchronous bus dispatching signals to
//!   [`Observer`]s subscribed by kind
//! - **[`Recorder`]**: the capture pipeline. Skips nested capture, honors
//!   `enabled` and `sample_rate`, assigns a correlation id, redacts,
//!   truncates and stores the event stamped with the active context
//! - **[`install`]**: subscribes a [`Recorder`] to every signal kind
//!
//! Events are **projections**: a failure anywhere in capture is logged and
//! the event dropped; the host never sees it.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use opsline_config::ConfigHandle;
//! use opsline_ports::{EventFilter, EventStore};
//! use opsline_recorder::{CacheSignal, Instrumentation, Recorder, install};
//! use opsline_store_memory::MemoryEventStore;
//!
//! let store = Arc::new(MemoryEventStore::new());
//! let bus = Instrumentation::new();
//! install(&bus, Recorder::new(ConfigHandle::default(), store.clone()));
//!
//! bus.instrument(
//!     CacheSignal::Write { key: "users/42".into(), store: "memory".into(), value_bytes: Some(64) },
//!     || (),
//! );
//! assert_eq!(store.count(&EventFilter::new().event_type("cache.write")).unwrap(), 1);
//! ```

mod bus;
mod observer;
mod recorder;
pub mod sanitize;
mod signal;

pub use bus::{Instrumentation, Observer, SubscriptionId};
pub use observer::install;
pub use recorder::{Recorder, UNKNOWN_NAME};
pub use signal::{BroadcastSignal, CacheSignal, Signal, SignalKind, TaskInfo, TaskSignal};
