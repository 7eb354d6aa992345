use serde::{Deserialize, Serialize};

/// Correlation identifiers for one logical operation.
///
/// Every field is optional. Used both as the active value of a frame and as
/// an override set for [`with`](crate::with), where `None` means "leave the
/// current value untouched".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Context {
    /// Stable id spanning a request and every task it triggers.
    pub correlation_id: Option<String>,
    /// Id of the originating inbound call.
    pub request_id: Option<String>,
    /// Tenant the operation runs for.
    pub tenant_id: Option<String>,
    /// User or principal performing the operation.
    pub actor_id: Option<String>,
}

impl Context {
    /// An empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the correlation id.
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Set the request id.
    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    /// Set the tenant id.
    pub fn with_tenant_id(mut self, id: impl Into<String>) -> Self {
        self.tenant_id = Some(id.into());
        self
    }

    /// Set the actor id.
    pub fn with_actor_id(mut self, id: impl Into<String>) -> Self {
        self.actor_id = Some(id.into());
        self
    }

    /// Whether every field is absent.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.correlation_id.is_none()
            && self.request_id.is_none()
            && self.tenant_id.is_none()
            && self.actor_id.is_none()
    }

    /// Copy every present field of `overrides` onto `self`.
    pub fn apply(&mut self, overrides: &Self) {
        if let Some(id) = &overrides.correlation_id {
            self.correlation_id = Some(id.clone());
        }
        if let Some(id) = &overrides.request_id {
            self.request_id = Some(id.clone());
        }
        if let Some(id) = &overrides.tenant_id {
            self.tenant_id = Some(id.clone());
        }
        if let Some(id) = &overrides.actor_id {
            self.actor_id = Some(id.clone());
        }
    }

    /// `self` with `overrides` applied.
    #[must_use]
    pub fn merged(mut self, overrides: &Self) -> Self {
        self.apply(overrides);
        self
    }
}
