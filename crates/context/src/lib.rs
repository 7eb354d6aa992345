#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Opsline Context
//!
//! Frame-local correlation context.
//!
//! A *frame* is the unit of isolation: a Tokio task (or `sync_scope`) when
//! the caller runs inside [`Context::scope`] / [`Context::scope_sync`], or the
//! current OS thread otherwise. Each frame carries one [`Context`] plus the
//! recorder's recursion flag, and concurrent frames never observe each
//! other's values.
//!
//! ## Key Components
//!
//! - **[`Context`]**: the four optional identifiers stamped on every event
//! - **Scoped overrides**: [`with`] (sync) and [`with_async`] restore the
//!   enclosing values on every exit path, panics and cancellation included
//! - **Fresh frames**: [`Context::scope`], [`Context::scope_sync`],
//!   [`isolate`] and [`isolate_sync`]
//! - **Recursion guard**: [`enter_recording`] returns a [`RecordingGuard`]
//!   at most once per frame
//! - **Log tagging**: [`correlation_id`] and [`span`]
//!
//! ## Usage
//!
//! ```rust
//! use opsline_context::{Context, ensure_correlation_id, with};
//!
//! Context::default().scope_sync(|| {
//!     let id = ensure_correlation_id();
//!     with(&Context::default().with_tenant_id("acme"), || {
//!         assert_eq!(Context::current().tenant_id.as_deref(), Some("acme"));
//!         assert_eq!(Context::current().correlation_id, Some(id.clone()));
//!     });
//!     assert_eq!(Context::current().tenant_id, None);
//! });
//! ```

mod context;
mod frame;
mod span;

pub use context::Context;
pub use frame::{
    RecordingGuard, Scoped, correlation_id, ensure_correlation_id, enter_recording, is_recording,
    isolate, isolate_sync, replace, reset, with, with_async,
};
pub use span::span;
