//! Synchronous signal bus.
//!
//! Observers run on the emitting thread, inside the emitting frame, so they
//! see the same [`Context`](opsline_context::Context) as the code that
//! produced the signal. A panicking observer is logged and skipped; it never
//! unwinds into the emitter.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use opsline_config::panic_message;
use parking_lot::RwLock;

use crate::signal::{Signal, SignalKind};

// ---------------------------------------------------------------------------
// Observer
// ---------------------------------------------------------------------------

/// Receives signals from an [`Instrumentation`] bus.
pub trait Observer: Send + Sync {
    /// Called once per emitted signal of a subscribed kind. `elapsed` is
    /// the duration of the instrumented operation, when it was timed.
    fn on_signal(&self, signal: &Signal, elapsed: Option<Duration>);
}

impl<F> Observer for F
where
    F: Fn(&Signal, Option<Duration>) + Send + Sync,
{
    fn on_signal(&self, signal: &Signal, elapsed: Option<Duration>) {
        self(signal, elapsed);
    }
}

/// Handle returned by [`Instrumentation::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    kinds: Vec<SignalKind>,
    observer: Arc<dyn Observer>,
}

// ---------------------------------------------------------------------------
// Instrumentation
// ---------------------------------------------------------------------------

/// Registry of observers keyed by [`SignalKind`].
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::time::Duration;
///
/// use opsline_recorder::{CacheSignal, Instrumentation, Signal, SignalKind};
///
/// let bus = Instrumentation::new();
/// let reads = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&reads);
/// bus.subscribe(
///     [SignalKind::CacheRead],
///     Arc::new(move |_: &Signal, _: Option<Duration>| {
///         counter.fetch_add(1, Ordering::Relaxed);
///     }),
/// );
///
/// let value = bus.instrument(
///     CacheSignal::Read { key: "users/42".into(), hit: Some(true), store: "memory".into() },
///     || 42,
/// );
/// assert_eq!(value, 42);
/// assert_eq!(reads.load(Ordering::Relaxed), 1);
/// ```
pub struct Instrumentation {
    subscriptions: RwLock<Vec<Subscription>>,
    next_id: AtomicU64,
}

impl Instrumentation {
    /// Create a bus with no observers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register `observer` for the given kinds.
    pub fn subscribe(
        &self,
        kinds: impl IntoIterator<Item = SignalKind>,
        observer: Arc<dyn Observer>,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut kinds: Vec<SignalKind> = kinds.into_iter().collect();
        kinds.sort_unstable();
        kinds.dedup();
        self.subscriptions.write().push(Subscription {
            id,
            kinds,
            observer,
        });
        id
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.subscriptions.write();
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);
        subscriptions.len() != before
    }

    /// Whether any observer listens for `kind`.
    pub fn is_observed(&self, kind: SignalKind) -> bool {
        self.subscriptions
            .read()
            .iter()
            .any(|s| s.kinds.contains(&kind))
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Deliver `signal` to every observer subscribed to its kind.
    pub fn emit(&self, signal: &Signal, elapsed: Option<Duration>) {
        let kind = signal.kind();
        // Observers may subscribe from inside a callback; never hold the lock
        // while calling out.
        let observers: Vec<Arc<dyn Observer>> = self
            .subscriptions
            .read()
            .iter()
            .filter(|s| s.kinds.contains(&kind))
            .map(|s| Arc::clone(&s.observer))
            .collect();

        for observer in observers {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| observer.on_signal(signal, elapsed)))
            {
                tracing::warn!(
                    signal = %kind,
                    panic = panic_message(panic.as_ref()),
                    "signal observer panicked"
                );
            }
        }
    }

    /// Run `body`, then emit `signal` with the time it took.
    ///
    /// Nothing is emitted if `body` panics.
    pub fn instrument<R>(&self, signal: impl Into<Signal>, body: impl FnOnce() -> R) -> R {
        let started = Instant::now();
        let output = body();
        self.emit(&signal.into(), Some(started.elapsed()));
        output
    }
}

impl Default for Instrumentation {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Instrumentation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instrumentation")
            .field("subscriptions", &self.subscription_count())
            .finish_non_exhaustive()
    }
}
