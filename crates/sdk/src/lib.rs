#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Opsline
//!
//! Embeddable telemetry core. Correlates inbound requests, the background
//! tasks they enqueue and the cache and broadcast operations both perform,
//! and records each as a queryable event.
//!
//! ## Key Components
//!
//! - **[`Opsline`]**: one configuration handle, event store, instrumentation
//!   bus and recorder wired together
//! - **[`open_store`]**: builds the configured store driver
//! - **[`logging::init`]**: installs the global `tracing` subscriber
//! - **[`prelude`]**: the types a host touches day to day
//!
//! ## Usage
//!
//! ```rust
//! use opsline::prelude::*;
//!
//! let opsline = Opsline::from_settings(&Settings::default())?;
//! opsline.install();
//!
//! Context::new().with_correlation_id("c1").scope_sync(|| {
//!     opsline.bus().instrument(
//!         CacheSignal::Read { key: "users/42".into(), hit: Some(true), store: "memory".into() },
//!         || (),
//!     );
//! });
//!
//! let chain = opsline.store().count(&EventFilter::new().correlation_id("c1"))?;
//! assert_eq!(chain, 1);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod error;
pub mod logging;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub use error::SdkError;

pub use opsline_config as config;
pub use opsline_context as context;
pub use opsline_core as model;
pub use opsline_ports as ports;
pub use opsline_propagation as propagation;
pub use opsline_recorder as recorder;
pub use opsline_retention as retention;

use opsline_config::{ConfigHandle, Settings, StoreBackend, StoreSettings};
use opsline_ports::EventStore;
use opsline_propagation::RequestContextLayer;
use opsline_recorder::{Instrumentation, Recorder, SubscriptionId};
use opsline_retention::RetentionTask;
use opsline_store_memory::MemoryEventStore;
use opsline_store_sqlite::SqliteEventStore;

/// Common imports.
pub mod prelude {
    pub use super::{Opsline, SdkError};

    pub use opsline_config::{Config, ConfigHandle, Settings};
    pub use opsline_context::{Context, correlation_id, ensure_correlation_id, with, with_async};
    pub use opsline_core::{Event, EventFamily, EventId, Metadata, NewEvent};
    pub use opsline_ports::{EventFilter, EventQuery, EventStore, GroupBy, Order, StoreError, Window};
    pub use opsline_propagation::{ContextPropagator, EnqueueHook, PerformHook, TaskEnvelope};
    pub use opsline_recorder::{
        BroadcastSignal, CacheSignal, Instrumentation, Recorder, Signal, SignalKind, TaskInfo,
        TaskSignal,
    };
}

/// Build the store driver named by `settings`.
pub fn open_store(settings: &StoreSettings) -> Result<Arc<dyn EventStore>, SdkError> {
    let store: Arc<dyn EventStore> = match (settings.backend, &settings.path) {
        (StoreBackend::Memory, _) => Arc::new(MemoryEventStore::new()),
        (StoreBackend::Sqlite, Some(path)) => Arc::new(SqliteEventStore::open(path)?),
        (StoreBackend::Sqlite, None) => {
            return Err(opsline_config::ConfigError::invalid(
                "store.path",
                "required for the sqlite backend",
            )
            .into());
        }
    };
    tracing::debug!(backend = ?settings.backend, path = ?settings.path, "opened event store");
    Ok(store)
}

/// A wired Opsline instance.
///
/// Cloning is cheap; clones share the configuration, store and bus.
#[derive(Clone)]
pub struct Opsline {
    config: ConfigHandle,
    store: Arc<dyn EventStore>,
    bus: Arc<Instrumentation>,
    recorder: Recorder,
    purge_interval: Duration,
}

impl Opsline {
    /// Wire `store` to `config` with a fresh bus.
    pub fn new(config: ConfigHandle, store: Arc<dyn EventStore>) -> Self {
        let recorder = Recorder::new(config.clone(), Arc::clone(&store));
        Self {
            config,
            store,
            bus: Arc::new(Instrumentation::new()),
            recorder,
            purge_interval: Settings::default().purge_interval,
        }
    }

    /// Validate `settings`, open the store and build a private configuration
    /// handle from them.
    ///
    /// Callbacks (redactor, resolvers, auth check) are attached afterwards
    /// through [`config`](Self::config).
    pub fn from_settings(settings: &Settings) -> Result<Self, SdkError> {
        settings.validate()?;
        let store = open_store(&settings.store)?;
        let config = ConfigHandle::new(settings.to_config());
        Ok(Self::new(config, store).with_purge_interval(settings.purge_interval))
    }

    /// Like [`from_settings`](Self::from_settings), but publishes the
    /// configuration as the process default and shares its handle.
    pub fn global_from_settings(settings: &Settings) -> Result<Self, SdkError> {
        settings.validate()?;
        let store = open_store(&settings.store)?;
        let config = opsline_config::global().clone();
        config.store(settings.to_config());
        Ok(Self::new(config, store).with_purge_interval(settings.purge_interval))
    }

    /// Override the retention purge interval.
    #[must_use]
    pub fn with_purge_interval(mut self, interval: Duration) -> Self {
        self.purge_interval = interval;
        self
    }

    /// Live configuration.
    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }

    /// Event store.
    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    /// Instrumentation bus signals are emitted on.
    pub fn bus(&self) -> &Arc<Instrumentation> {
        &self.bus
    }

    /// Capture pipeline.
    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    /// Subscribe the recorder to every signal kind.
    ///
    /// `None` when capture is disabled at install time.
    pub fn install(&self) -> Option<SubscriptionId> {
        opsline_recorder::install(&self.bus, self.recorder.clone())
    }

    /// `tower` layer seeding request context from this configuration.
    pub fn http_layer(&self) -> RequestContextLayer {
        RequestContextLayer::new(self.config.clone())
    }

    /// Retention loop over this store and configuration.
    pub fn retention_task(&self) -> RetentionTask {
        RetentionTask::new(
            Arc::clone(&self.store),
            self.config.clone(),
            self.purge_interval,
        )
    }

    /// Spawn [`retention_task`](Self::retention_task) on the current
    /// runtime.
    pub fn spawn_retention(&self, cancel: CancellationToken) -> JoinHandle<()> {
        self.retention_task().spawn(cancel)
    }
}

impl fmt::Debug for Opsline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Opsline")
            .field("bus", &self.bus)
            .field("purge_interval", &self.purge_interval)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsline_config::{ConfigError, Settings};
    use pretty_assertions::assert_eq;

    #[test]
    fn sqlite_requires_a_path() {
        let settings = StoreSettings {
            backend: StoreBackend::Sqlite,
            path: None,
        };
        assert!(matches!(
            open_store(&settings),
            Err(SdkError::Config(ConfigError::Invalid { field: "store.path", .. }))
        ));
    }

    #[test]
    fn sqlite_store_is_opened_at_path() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            store: StoreSettings {
                backend: StoreBackend::Sqlite,
                path: Some(dir.path().join("events.db")),
            },
            ..Settings::default()
        };
        let opsline = Opsline::from_settings(&settings).unwrap();
        assert!(opsline.install().is_some());
        assert!(dir.path().join("events.db").is_file());
    }

    #[test]
    fn disabled_settings_skip_install() {
        let settings = Settings {
            enabled: false,
            ..Settings::default()
        };
        let opsline = Opsline::from_settings(&settings).unwrap();
        assert_eq!(opsline.install(), None);
        assert_eq!(opsline.bus().subscription_count(), 0);
    }

    #[test]
    fn purge_interval_comes_from_settings() {
        let settings = Settings {
            purge_interval: Duration::from_secs(90),
            ..Settings::default()
        };
        let opsline = Opsline::from_settings(&settings).unwrap();
        assert_eq!(opsline.retention_task().interval(), Duration::from_secs(90));
    }
}
