//! Global `tracing` subscriber setup.

use std::io::stderr;

use opsline_config::{LogFormat, LogSettings};
use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::SdkError;

/// Environment variable overriding [`LogSettings::level`].
pub const LOG_ENV: &str = "OPSLINE_LOG";

macro_rules! try_init_with {
    ($filter:expr, $fmt_layer:expr) => {
        Registry::default().with($filter).with($fmt_layer).try_init()
    };
}

/// Install the global subscriber, writing to stderr.
///
/// The filter comes from `OPSLINE_LOG`, then `RUST_LOG`, then
/// `settings.level`. Returns `Ok(false)` when a global subscriber is
/// already set, which leaves that subscriber in place.
pub fn init(settings: &LogSettings) -> Result<bool, SdkError> {
    let filter = filter(settings)?;
    let installed = match settings.format {
        LogFormat::Compact => try_init_with!(filter, fmt::layer().compact().with_writer(stderr)),
        LogFormat::Pretty => try_init_with!(filter, fmt::layer().pretty().with_writer(stderr)),
        LogFormat::Json => try_init_with!(
            filter,
            fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(false)
                .with_writer(stderr)
        ),
    };
    Ok(installed.is_ok())
}

/// The directive `init` would use.
pub fn directive(settings: &LogSettings) -> String {
    [LOG_ENV, EnvFilter::DEFAULT_ENV]
        .into_iter()
        .find_map(|key| std::env::var(key).ok().filter(|v| !v.trim().is_empty()))
        .unwrap_or_else(|| settings.level.clone())
}

fn filter(settings: &LogSettings) -> Result<EnvFilter, SdkError> {
    let directive = directive(settings);
    EnvFilter::try_new(&directive).map_err(|e| SdkError::Logging(format!("{directive:?}: {e}")))
}
