//! Frame storage and scoped overrides.
//!
//! Inside [`Context::scope`] / [`Context::scope_sync`] the frame is a
//! `tokio::task_local!` slot and survives `.await` points on multi-thread
//! runtimes. Outside any scope the frame falls back to a `thread_local!`
//! slot owned by the current OS thread.

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::Poll;

use opsline_core::generate_id;
use pin_project::pin_project;
use tokio::task::futures::TaskLocalFuture;

use crate::Context;

#[derive(Debug, Clone, Default)]
struct Frame {
    context: Context,
    recording: bool,
}

impl Frame {
    fn seeded(context: Context) -> Self {
        Self {
            context,
            recording: false,
        }
    }
}

tokio::task_local! {
    static FRAME: RefCell<Frame>;
}

thread_local! {
    static THREAD_FRAME: RefCell<Frame> = RefCell::new(Frame::default());
}

/// Run `f` against the active frame. Borrows must not outlive `f`.
fn with_frame<R>(f: impl FnOnce(&RefCell<Frame>) -> R) -> R {
    if FRAME.try_with(|_| ()).is_ok() {
        FRAME.with(f)
    } else {
        THREAD_FRAME.with(f)
    }
}

impl Context {
    /// Snapshot of the active frame's context.
    #[must_use]
    pub fn current() -> Self {
        with_frame(|cell| cell.borrow().context.clone())
    }

    /// Run a future in a fresh frame seeded with exactly this context.
    ///
    /// The frame survives `.await` points and task migration. Nothing the
    /// future does to its context leaks into the caller's frame.
    pub fn scope<F: Future>(self, future: F) -> Scoped<F> {
        Scoped::new(Frame::seeded(self), future)
    }

    /// Run a closure in a fresh frame seeded with exactly this context.
    pub fn scope_sync<R>(self, f: impl FnOnce() -> R) -> R {
        FRAME.sync_scope(RefCell::new(Frame::seeded(self)), f)
    }
}

/// Future returned by [`Context::scope`], [`with_async`] and [`isolate`].
///
/// Polls the inner future with its own frame installed.
#[pin_project]
#[must_use = "futures do nothing unless polled"]
pub struct Scoped<F> {
    #[pin]
    inner: TaskLocalFuture<RefCell<Frame>, F>,
}

impl<F: Future> Scoped<F> {
    fn new(frame: Frame, future: F) -> Self {
        Self {
            inner: FRAME.scope(RefCell::new(frame), future),
        }
    }
}

impl<F: Future> Future for Scoped<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> Poll<Self::Output> {
        self.project().inner.poll(cx)
    }
}

impl<F> fmt::Debug for Scoped<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scoped").finish_non_exhaustive()
    }
}

/// The active correlation id, for tagging log lines.
#[must_use]
pub fn correlation_id() -> Option<String> {
    with_frame(|cell| cell.borrow().context.correlation_id.clone())
}

/// Return the frame's correlation id, assigning a new UUID v4 if absent.
///
/// An existing value is never overwritten, so repeated calls in one frame
/// return the same id.
pub fn ensure_correlation_id() -> String {
    with_frame(|cell| {
        cell.borrow_mut()
            .context
            .correlation_id
            .get_or_insert_with(generate_id)
            .clone()
    })
}

/// Clear all four fields of the active frame.
pub fn reset() {
    replace(Context::default());
}

/// Install `context` in the active frame, returning the previous value.
pub fn replace(context: Context) -> Context {
    with_frame(|cell| std::mem::replace(&mut cell.borrow_mut().context, context))
}

struct Restore(Context);

impl Drop for Restore {
    fn drop(&mut self) {
        let saved = std::mem::take(&mut self.0);
        with_frame(|cell| cell.borrow_mut().context = saved);
    }
}

/// Run `body` with the present fields of `overrides` applied.
///
/// The enclosing context is restored when `body` returns or unwinds.
/// Panics propagate after restoration.
pub fn with<R>(overrides: &Context, body: impl FnOnce() -> R) -> R {
    let saved = with_frame(|cell| {
        let mut frame = cell.borrow_mut();
        let saved = frame.context.clone();
        frame.context.apply(overrides);
        saved
    });
    let _restore = Restore(saved);
    body()
}

/// Async form of [`with`].
///
/// The overrides are merged onto the caller's context when `with_async` is
/// called and the future runs in its own frame, so the caller's frame is
/// untouched whether the future completes, fails or is dropped early.
pub fn with_async<F: Future>(overrides: &Context, future: F) -> Scoped<F> {
    let frame = with_frame(|cell| {
        let current = cell.borrow();
        Frame {
            context: current.context.clone().merged(overrides),
            recording: current.recording,
        }
    });
    Scoped::new(frame, future)
}

/// Run a future in a fresh, empty frame.
pub fn isolate<F: Future>(future: F) -> Scoped<F> {
    Context::default().scope(future)
}

/// Run a closure in a fresh, empty frame.
pub fn isolate_sync<R>(f: impl FnOnce() -> R) -> R {
    Context::default().scope_sync(f)
}

/// Marks the active frame as recording until dropped.
///
/// Not `Send`: the guard must be released in the frame that took it.
#[must_use = "the frame stops recording as soon as the guard is dropped"]
pub struct RecordingGuard {
    _frame: PhantomData<*const ()>,
}

impl Drop for RecordingGuard {
    fn drop(&mut self) {
        with_frame(|cell| cell.borrow_mut().recording = false);
    }
}

impl fmt::Debug for RecordingGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RecordingGuard")
    }
}

/// Flag the active frame as recording.
///
/// Returns `None` when the frame is already recording, which is how nested
/// capture is suppressed.
pub fn enter_recording() -> Option<RecordingGuard> {
    with_frame(|cell| {
        let mut frame = cell.borrow_mut();
        if frame.recording {
            None
        } else {
            frame.recording = true;
            Some(RecordingGuard {
                _frame: PhantomData,
            })
        }
    })
}

/// Whether the active frame holds a [`RecordingGuard`].
#[must_use]
pub fn is_recording() -> bool {
    with_frame(|cell| cell.borrow().recording)
}
