//! Error type for wiring Opsline from settings.

use opsline_config::ConfigError;
use opsline_ports::StoreError;

/// Failure to bring up Opsline.
#[derive(Debug, thiserror::Error)]
pub enum SdkError {
    /// Settings failed to load or validate.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The event store could not be opened.
    #[error("failed to open event store: {0}")]
    Store(#[from] StoreError),

    /// The log filter could not be parsed.
    #[error("invalid log filter {0}")]
    Logging(String),
}
