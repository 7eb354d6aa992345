#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Opsline Config
//!
//! Process-wide capture configuration and the settings file it is built
//! from.
//!
//! ## Key Components
//!
//! - **[`Config`]**: the runtime switches read on every capture (enabled,
//!   sampling, payload limit, retention) plus the user callbacks
//!   (redactor, resolvers, auth check)
//! - **[`ConfigHandle`]**: lock-free, hot-swappable access to a [`Config`];
//!   [`global`] is the process default
//! - **[`Settings`]**: the serializable form, loaded with `figment` from
//!   defaults, an optional TOML file and `OPSLINE_*` environment variables
//!
//! User callbacks are treated as fallible: [`Config::redact`],
//! [`Config::resolve_tenant`], [`Config::resolve_actor`] and
//! [`Config::authorize`] catch errors and panics, log them and fall back.
//!
//! ## Usage
//!
//! ```rust
//! use opsline_config::{Config, ConfigHandle};
//!
//! let handle = ConfigHandle::new(Config::default());
//! handle.update(|config| config.sample_rate = 0.25);
//! assert_eq!(handle.load().sample_rate, 0.25);
//! ```

mod config;
mod error;
mod handle;
mod settings;

pub use config::{
    AuthCheck, BoxError, Config, DEFAULT_MAX_PAYLOAD_BYTES, DEFAULT_RETENTION_PERIOD, Redactor,
    Resolver, panic_message,
};
pub use error::ConfigError;
pub use handle::{ConfigHandle, configure, global};
pub use settings::{ENV_PREFIX, LogFormat, LogSettings, Settings, StoreBackend, StoreSettings};
