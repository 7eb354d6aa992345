#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Opsline Retention
//!
//! Deletes events older than the configured retention period.
//!
//! - [`purge`]: delete everything that occurred strictly before a cutoff
//! - [`cutoff`] / [`run_once`]: the same, driven by
//!   [`Config::retention_period`]
//! - [`RetentionTask`]: runs [`run_once`] on a fixed interval until
//!   cancelled
//!
//! Purging is idempotent; running it twice with the same cutoff deletes
//! nothing the second time.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use opsline_config::{Config, ConfigHandle};
use opsline_ports::{EventStore, StoreError};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Delete every event with `occurred_at < before`.
pub fn purge(store: &dyn EventStore, before: DateTime<Utc>) -> Result<usize, StoreError> {
    let deleted = store.purge(before)?;
    tracing::info!(deleted, cutoff = %before, "purged expired events");
    Ok(deleted)
}

/// `now - retention_period`, or `None` when retention is disabled.
///
/// A period too long to represent also yields `None`: nothing can be that
/// old.
pub fn cutoff(config: &Config, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let period = TimeDelta::from_std(config.retention_period?).ok()?;
    now.checked_sub_signed(period)
}

/// Purge using the configured retention period.
///
/// Returns `Ok(None)` when retention is disabled.
pub fn run_once(store: &dyn EventStore, config: &Config) -> Result<Option<usize>, StoreError> {
    match cutoff(config, Utc::now()) {
        Some(before) => purge(store, before).map(Some),
        None => {
            tracing::debug!("retention disabled, skipping purge");
            Ok(None)
        }
    }
}

/// Background purge loop.
///
/// The first purge runs as soon as the task starts; later ones follow every
/// `interval`. The retention period is re-read from the [`ConfigHandle`] on
/// each run, so changes apply without a restart.
pub struct RetentionTask {
    store: Arc<dyn EventStore>,
    config: ConfigHandle,
    interval: Duration,
}

impl RetentionTask {
    /// Create a task purging `store` every `interval`.
    ///
    /// # Panics
    ///
    /// [`spawn`](Self::spawn) panics if `interval` is zero.
    pub fn new(store: Arc<dyn EventStore>, config: ConfigHandle, interval: Duration) -> Self {
        Self {
            store,
            config,
            interval,
        }
    }

    /// Purge interval.
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Start the loop on the current Tokio runtime.
    ///
    /// The returned handle completes once `cancel` fires. Store calls run on
    /// the blocking pool; failures are logged and retried on the next tick.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    () = cancel.cancelled() => break,
                }

                let store = Arc::clone(&self.store);
                let config = self.config.load();
                match tokio::task::spawn_blocking(move || run_once(store.as_ref(), &config)).await
                {
                    Ok(Ok(_)) => {}
                    Ok(Err(error)) => {
                        tracing::warn!(%error, retryable = error.is_retryable(), "retention purge failed");
                    }
                    Err(error) => tracing::warn!(%error, "retention purge task aborted"),
                }
            }
            tracing::debug!("retention task stopped");
        })
    }
}

impl std::fmt::Debug for RetentionTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetentionTask")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}
