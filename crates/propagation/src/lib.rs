#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Opsline Propagation
//!
//! Carries the correlation [`Context`](opsline_context::Context) across
//! process and async boundaries.
//!
//! - [`http`]: a `tower` layer seeding a fresh frame for every inbound
//!   request from `x-correlation-id` / `x-request-id` and the configured
//!   tenant and actor resolvers
//! - [`task`]: the enqueue/perform hook pair writing the context into task
//!   payloads and restoring it around the task body, plus [`TaskEnvelope`]
//!   which also emits the task lifecycle signals
//!
//! ## Usage
//!
//! ```rust
//! use opsline_context::Context;
//! use opsline_propagation::{ContextPropagator, EnqueueHook, PerformHook};
//! use serde_json::json;
//!
//! let mut payload = json!(["report-42"]);
//! Context::new()
//!     .with_tenant_id("acme")
//!     .scope_sync(|| ContextPropagator.before_enqueue(&mut payload));
//!
//! let restored = ContextPropagator.before_perform(&payload).unwrap();
//! assert_eq!(restored.tenant_id.as_deref(), Some("acme"));
//! assert!(restored.correlation_id.is_some());
//! ```

pub mod http;
pub mod task;

pub use http::{RequestContextLayer, RequestContextService, seed_context};
pub use task::{
    ContextPropagator, EnqueueHook, META_KEY, PerformHook, TaskEnvelope, embed_context,
    extract_context, take_context,
};
