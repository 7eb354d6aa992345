//! Inbound request adapter.
//!
//! [`RequestContextLayer`] seeds a fresh frame for every request from its
//! headers and the configured resolvers. The inner service's `call` and
//! the response future both run in frames seeded with that context; the
//! caller's frame is never modified.

use std::task::{Context as TaskContext, Poll};

use http::Request;
use http::request::Parts;
use opsline_config::{Config, ConfigHandle};
use opsline_context::{Context, Scoped};
use opsline_core::generate_id;
use tower::{Layer, Service};
use tower_http::request_id::RequestId;

/// Header carrying an upstream correlation id.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Header carrying an upstream request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Build the context for one inbound request.
///
/// - `correlation_id`: `x-correlation-id`, else a new UUID
/// - `request_id`: `x-request-id`, else a [`RequestId`] extension set by
///   `tower_http`, else a new UUID
/// - `tenant_id` / `actor_id`: the configured resolvers; failures yield
///   `None`
pub fn seed_context(parts: &Parts, config: &Config) -> Context {
    let correlation_id = header(parts, CORRELATION_ID_HEADER).unwrap_or_else(generate_id);
    let request_id = header(parts, REQUEST_ID_HEADER)
        .or_else(|| upstream_request_id(parts))
        .unwrap_or_else(generate_id);

    Context {
        correlation_id: Some(correlation_id),
        request_id: Some(request_id),
        tenant_id: config.resolve_tenant(parts),
        actor_id: config.resolve_actor(parts),
    }
}

fn header(parts: &Parts, name: &str) -> Option<String> {
    let value = parts.headers.get(name)?.to_str().ok()?.trim();
    (!value.is_empty()).then(|| value.to_owned())
}

fn upstream_request_id(parts: &Parts) -> Option<String> {
    let value = parts
        .extensions
        .get::<RequestId>()?
        .header_value()
        .to_str()
        .ok()?;
    (!value.is_empty()).then(|| value.to_owned())
}

/// [`Layer`] installing [`RequestContextService`].
#[derive(Debug, Clone)]
pub struct RequestContextLayer {
    config: ConfigHandle,
}

impl RequestContextLayer {
    /// Layer reading resolvers from `config`.
    pub fn new(config: ConfigHandle) -> Self {
        Self { config }
    }

    /// Layer reading the process default configuration.
    pub fn from_global() -> Self {
        Self::new(opsline_config::global().clone())
    }
}

impl<S> Layer<S> for RequestContextLayer {
    type Service = RequestContextService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestContextService {
            inner,
            config: self.config.clone(),
        }
    }
}

/// Runs each request in a frame seeded by [`seed_context`].
#[derive(Debug, Clone)]
pub struct RequestContextService<S> {
    inner: S,
    config: ConfigHandle,
}

impl<S, B> Service<Request<B>> for RequestContextService<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Scoped<S::Future>;

    fn poll_ready(&mut self, cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<B>) -> Self::Future {
        let (parts, body) = request.into_parts();
        let context = seed_context(&parts, &self.config.load());
        tracing::trace!(
            correlation_id = context.correlation_id.as_deref(),
            request_id = context.request_id.as_deref(),
            "seeded request context"
        );
        let request = Request::from_parts(parts, body);

        let inner = &mut self.inner;
        let future = context.clone().scope_sync(|| inner.call(request));
        context.scope(future)
    }
}
