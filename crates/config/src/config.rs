//! Runtime configuration read on the capture path.

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use http::request::Parts;
use opsline_core::Metadata;

/// Error type returned by user callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Rewrites event metadata before it is stored.
pub type Redactor = Arc<dyn Fn(Metadata) -> Result<Metadata, BoxError> + Send + Sync>;

/// Derives a tenant or actor id from an inbound request.
pub type Resolver = Arc<dyn Fn(&Parts) -> Result<Option<String>, BoxError> + Send + Sync>;

/// Decides whether a caller may read captured events.
pub type AuthCheck = Arc<dyn Fn(&Parts) -> bool + Send + Sync>;

/// Default upper bound on serialized metadata size.
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 10_000;

/// Default age after which events are purged.
pub const DEFAULT_RETENTION_PERIOD: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Capture configuration.
///
/// Cheap to clone: callbacks are reference counted.
#[derive(Clone)]
pub struct Config {
    /// Master switch for capture.
    pub enabled: bool,
    /// Fraction of signals that are recorded. `>= 1.0` keeps everything,
    /// `<= 0.0` and NaN keep nothing.
    pub sample_rate: f64,
    /// Largest serialized metadata kept verbatim. `0` disables truncation.
    pub max_payload_bytes: usize,
    /// Applied to metadata before truncation.
    pub redactor: Option<Redactor>,
    /// Supplies `tenant_id` for inbound requests.
    pub tenant_resolver: Option<Resolver>,
    /// Supplies `actor_id` for inbound requests.
    pub actor_resolver: Option<Resolver>,
    /// Guards read access to captured events. Absent means open.
    pub auth_check: Option<AuthCheck>,
    /// Age after which events are purged. `None` keeps events forever.
    pub retention_period: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_rate: 1.0,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            redactor: None,
            tenant_resolver: None,
            actor_resolver: None,
            auth_check: None,
            retention_period: Some(DEFAULT_RETENTION_PERIOD),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("enabled", &self.enabled)
            .field("sample_rate", &self.sample_rate)
            .field("max_payload_bytes", &self.max_payload_bytes)
            .field("redactor", &self.redactor.is_some())
            .field("tenant_resolver", &self.tenant_resolver.is_some())
            .field("actor_resolver", &self.actor_resolver.is_some())
            .field("auth_check", &self.auth_check.is_some())
            .field("retention_period", &self.retention_period)
            .finish()
    }
}

impl Config {
    /// Set the redactor.
    pub fn with_redactor<F>(mut self, redactor: F) -> Self
    where
        F: Fn(Metadata) -> Result<Metadata, BoxError> + Send + Sync + 'static,
    {
        self.redactor = Some(Arc::new(redactor));
        self
    }

    /// Set the tenant resolver.
    pub fn with_tenant_resolver<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&Parts) -> Result<Option<String>, BoxError> + Send + Sync + 'static,
    {
        self.tenant_resolver = Some(Arc::new(resolver));
        self
    }

    /// Set the actor resolver.
    pub fn with_actor_resolver<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&Parts) -> Result<Option<String>, BoxError> + Send + Sync + 'static,
    {
        self.actor_resolver = Some(Arc::new(resolver));
        self
    }

    /// Set the auth check.
    pub fn with_auth_check<F>(mut self, check: F) -> Self
    where
        F: Fn(&Parts) -> bool + Send + Sync + 'static,
    {
        self.auth_check = Some(Arc::new(check));
        self
    }

    /// Independent Bernoulli draw against [`sample_rate`](Self::sample_rate).
    pub fn should_sample(&self) -> bool {
        let rate = self.sample_rate;
        if rate.is_nan() || rate <= 0.0 {
            return false;
        }
        if rate >= 1.0 {
            return true;
        }
        rand::random::<f64>() < rate
    }

    /// Run the redactor, keeping `metadata` unchanged if it fails or panics.
    pub fn redact(&self, metadata: Metadata) -> Metadata {
        let Some(redactor) = &self.redactor else {
            return metadata;
        };
        let input = metadata.clone();
        match catch_unwind(AssertUnwindSafe(|| redactor(input))) {
            Ok(Ok(redacted)) => redacted,
            Ok(Err(error)) => {
                tracing::warn!(%error, "redactor failed, keeping unredacted metadata");
                metadata
            }
            Err(panic) => {
                tracing::warn!(
                    panic = panic_message(panic.as_ref()),
                    "redactor panicked, keeping unredacted metadata"
                );
                metadata
            }
        }
    }

    /// Tenant id for a request, or `None` when unset or failing.
    pub fn resolve_tenant(&self, parts: &Parts) -> Option<String> {
        resolve(self.tenant_resolver.as_ref(), parts, "tenant")
    }

    /// Actor id for a request, or `None` when unset or failing.
    pub fn resolve_actor(&self, parts: &Parts) -> Option<String> {
        resolve(self.actor_resolver.as_ref(), parts, "actor")
    }

    /// Whether the caller may read captured events.
    ///
    /// Open when no check is configured; a panicking check denies.
    pub fn authorize(&self, parts: &Parts) -> bool {
        let Some(check) = &self.auth_check else {
            return true;
        };
        match catch_unwind(AssertUnwindSafe(|| check(parts))) {
            Ok(allowed) => allowed,
            Err(panic) => {
                tracing::warn!(
                    panic = panic_message(panic.as_ref()),
                    "auth check panicked, denying access"
                );
                false
            }
        }
    }
}

fn resolve(resolver: Option<&Resolver>, parts: &Parts, which: &'static str) -> Option<String> {
    let resolver = resolver?;
    match catch_unwind(AssertUnwindSafe(|| resolver(parts))) {
        Ok(Ok(value)) => value,
        Ok(Err(error)) => {
            tracing::warn!(resolver = which, %error, "context resolver failed");
            None
        }
        Err(panic) => {
            tracing::warn!(
                resolver = which,
                panic = panic_message(panic.as_ref()),
                "context resolver panicked"
            );
            None
        }
    }
}

/// Best-effort text of a caught panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
