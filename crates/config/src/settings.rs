//! Serializable settings and layered loading.
//!
//! Sources merge in order, later ones winning:
//!
//! 1. [`Settings::default`]
//! 2. an optional TOML file
//! 3. `OPSLINE_*` environment variables, with `__` separating nested keys
//!    (`OPSLINE_STORE__PATH=/var/lib/opsline.db`)
//!
//! `OPSLINE_LOG` is reserved for the log filter and is not read as a
//! setting.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_MAX_PAYLOAD_BYTES, DEFAULT_RETENTION_PERIOD};
use crate::{Config, ConfigError};

/// Environment variable prefix for settings.
pub const ENV_PREFIX: &str = "OPSLINE_";

/// Serializable Opsline settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Master switch for capture.
    pub enabled: bool,
    /// Fraction of signals recorded.
    pub sample_rate: f64,
    /// Largest serialized metadata kept verbatim; negative values clamp to 0.
    #[serde(deserialize_with = "payload_limit::deserialize")]
    pub max_payload_bytes: usize,
    /// Event age limit such as `"7d"`, or `"off"` to keep events forever.
    #[serde(with = "retention")]
    pub retention_period: Option<Duration>,
    /// How often the background purge runs.
    #[serde(with = "humantime_serde")]
    pub purge_interval: Duration,
    /// Event store backend.
    pub store: StoreSettings,
    /// Log output.
    pub log: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_rate: 1.0,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            retention_period: Some(DEFAULT_RETENTION_PERIOD),
            purge_interval: Duration::from_secs(60 * 60),
            store: StoreSettings::default(),
            log: LogSettings::default(),
        }
    }
}

/// Which event store driver to build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local, lost on exit.
    #[default]
    Memory,
    /// SQLite file at [`StoreSettings::path`].
    Sqlite,
}

/// Event store settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Driver to use.
    pub backend: StoreBackend,
    /// Database file, required for SQLite.
    pub path: Option<PathBuf>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Single-line human readable.
    #[default]
    Compact,
    /// Multi-line human readable.
    Pretty,
    /// Newline-delimited JSON.
    Json,
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `EnvFilter` directive, e.g. `info` or `opsline=debug,warn`.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: LogFormat::Compact,
        }
    }
}

impl Settings {
    /// Debug logging in a readable format, everything captured.
    #[must_use]
    pub fn development() -> Self {
        Self {
            log: LogSettings {
                level: "debug".to_owned(),
                format: LogFormat::Pretty,
            },
            ..Self::default()
        }
    }

    /// JSON logs at `info`.
    #[must_use]
    pub fn production() -> Self {
        Self {
            log: LogSettings {
                level: "info".to_owned(),
                format: LogFormat::Json,
            },
            ..Self::default()
        }
    }

    /// The merged provider chain, without extracting.
    pub fn figment(file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(file) = file {
            figment = figment.merge(Toml::file(file));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).ignore(&["log"]).split("__"))
    }

    /// Load and validate settings from defaults, `file` and the environment.
    ///
    /// An explicitly named file must exist.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(file) = file
            && !file.is_file()
        {
            return Err(ConfigError::Load(format!(
                "settings file {} does not exist",
                file.display()
            )));
        }
        let settings: Self = Self::figment(file).extract()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load from defaults and the environment only.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Reject values that would misbehave at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate.is_nan() {
            return Err(ConfigError::invalid("sample_rate", "must be a number"));
        }
        if self.purge_interval.is_zero() {
            return Err(ConfigError::invalid("purge_interval", "must be non-zero"));
        }
        if self.store.backend == StoreBackend::Sqlite && self.store.path.is_none() {
            return Err(ConfigError::invalid(
                "store.path",
                "required for the sqlite backend",
            ));
        }
        Ok(())
    }

    /// Runtime configuration without callbacks; attach those in code.
    pub fn to_config(&self) -> Config {
        Config {
            enabled: self.enabled,
            sample_rate: self.sample_rate,
            max_payload_bytes: self.max_payload_bytes,
            retention_period: self.retention_period,
            ..Config::default()
        }
    }
}

mod payload_limit {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<usize, D::Error> {
        let raw = i64::deserialize(deserializer)?;
        Ok(usize::try_from(raw.max(0)).unwrap_or(usize::MAX))
    }
}

mod retention {
    use std::fmt;
    use std::time::Duration;

    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};

    const DISABLED: [&str; 4] = ["off", "none", "never", ""];

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(period) => serializer.collect_str(&humantime::format_duration(*period)),
            None => serializer.serialize_str("off"),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        deserializer.deserialize_any(PeriodVisitor)
    }

    struct PeriodVisitor;

    impl<'de> Visitor<'de> for PeriodVisitor {
        type Value = Option<Duration>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a duration such as \"7d\", a number of seconds, or \"off\"")
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
            let value = value.trim();
            if DISABLED.iter().any(|word| value.eq_ignore_ascii_case(word)) {
                return Ok(None);
            }
            humantime::parse_duration(value)
                .map(Some)
                .map_err(|err| E::custom(format!("invalid retention period `{value}`: {err}")))
        }

        fn visit_u64<E: de::Error>(self, seconds: u64) -> Result<Self::Value, E> {
            Ok(Some(Duration::from_secs(seconds)))
        }

        fn visit_i64<E: de::Error>(self, seconds: i64) -> Result<Self::Value, E> {
            u64::try_from(seconds)
                .map(|s| Some(Duration::from_secs(s)))
                .map_err(|_| E::custom("retention period must not be negative"))
        }

        fn visit_bool<E: de::Error>(self, enabled: bool) -> Result<Self::Value, E> {
            if enabled {
                Err(E::custom("use a duration to enable retention"))
            } else {
                Ok(None)
            }
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn defaults_round_trip_through_figment() {
        Jail::expect_with(|_| {
            let settings = Settings::from_env().map_err(|e| e.to_string())?;
            assert_eq!(settings, Settings::default());
            Ok(())
        });
    }

    #[test]
    fn file_then_env_layering() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "opsline.toml",
                r#"
                    sample_rate = 0.5
                    max_payload_bytes = 2048
                    retention_period = "2d"
                    purge_interval = "15m"

                    [store]
                    backend = "sqlite"
                    path = "events.db"
                "#,
            )?;
            jail.set_env("OPSLINE_SAMPLE_RATE", "0.25");
            jail.set_env("OPSLINE_LOG__FORMAT", "json");
            jail.set_env("OPSLINE_LOG", "debug");

            let settings =
                Settings::load(Some(Path::new("opsline.toml"))).map_err(|e| e.to_string())?;
            assert_eq!(settings.sample_rate, 0.25);
            assert_eq!(settings.max_payload_bytes, 2048);
            assert_eq!(
                settings.retention_period,
                Some(Duration::from_secs(2 * 86_400))
            );
            assert_eq!(settings.purge_interval, Duration::from_secs(900));
            assert_eq!(settings.store.backend, StoreBackend::Sqlite);
            assert_eq!(settings.store.path, Some(PathBuf::from("events.db")));
            assert_eq!(settings.log.format, LogFormat::Json);
            assert_eq!(settings.log.level, "info");
            Ok(())
        });
    }

    #[rstest]
    #[case("\"off\"", None)]
    #[case("\"None\"", None)]
    #[case("false", None)]
    #[case("\"12h\"", Some(Duration::from_secs(12 * 3600)))]
    #[case("3600", Some(Duration::from_secs(3600)))]
    fn retention_period_forms(#[case] raw: &str, #[case] expected: Option<Duration>) {
        let json = format!("{{\"retention_period\": {raw}}}");
        let settings: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(settings.retention_period, expected);
    }

    #[test]
    fn negative_payload_limit_clamps_to_zero() {
        let settings: Settings = serde_json::from_str(r#"{"max_payload_bytes": -5}"#).unwrap();
        assert_eq!(settings.max_payload_bytes, 0);
    }

    #[test]
    fn unparseable_retention_is_an_error() {
        let result = serde_json::from_str::<Settings>(r#"{"retention_period": "soon"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn sqlite_requires_path() {
        let settings = Settings {
            store: StoreSettings {
                backend: StoreBackend::Sqlite,
                path: None,
            },
            ..Settings::default()
        };
        assert_eq!(
            settings.validate(),
            Err(ConfigError::invalid(
                "store.path",
                "required for the sqlite backend"
            ))
        );
    }

    #[test]
    fn nan_sample_rate_is_rejected() {
        let settings = Settings {
            sample_rate: f64::NAN,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn missing_named_file_is_an_error() {
        let err = Settings::load(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }

    #[test]
    fn to_config_carries_switches() {
        let settings = Settings {
            enabled: false,
            sample_rate: 0.3,
            max_payload_bytes: 0,
            retention_period: None,
            ..Settings::default()
        };
        let config = settings.to_config();
        assert!(!config.enabled);
        assert_eq!(config.sample_rate, 0.3);
        assert_eq!(config.max_payload_bytes, 0);
        assert_eq!(config.retention_period, None);
        assert!(config.redactor.is_none());
    }

    #[test]
    fn presets() {
        assert_eq!(Settings::development().log.format, LogFormat::Pretty);
        assert_eq!(Settings::production().log.format, LogFormat::Json);
        assert_eq!(Settings::production().log.level, "info");
    }
}
