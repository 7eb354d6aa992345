use crate::Context;

/// An `INFO` span tagged with the active correlation and request ids.
///
/// Absent ids are left unrecorded.
pub fn span() -> tracing::Span {
    let ctx = Context::current();
    tracing::info_span!(
        "opsline",
        correlation_id = ctx.correlation_id.as_deref(),
        request_id = ctx.request_id.as_deref(),
        tenant_id = ctx.tenant_id.as_deref(),
    )
}
