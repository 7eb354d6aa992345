use std::sync::{Arc, LazyLock};

use arc_swap::ArcSwap;

use crate::Config;

static GLOBAL: LazyLock<ConfigHandle> = LazyLock::new(ConfigHandle::default);

/// Shared, hot-swappable [`Config`].
///
/// Reads are lock-free; writers publish a whole new value, so readers see
/// either the old or the new configuration, never a mix.
#[derive(Debug, Clone, Default)]
pub struct ConfigHandle {
    inner: Arc<ArcSwap<Config>>,
}

impl ConfigHandle {
    /// Wrap an initial configuration.
    pub fn new(config: Config) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(config)),
        }
    }

    /// Current configuration.
    #[inline]
    pub fn load(&self) -> Arc<Config> {
        self.inner.load_full()
    }

    /// Replace the configuration.
    pub fn store(&self, config: Config) {
        self.inner.store(Arc::new(config));
    }

    /// Modify a copy of the current configuration and publish it.
    ///
    /// `f` may run more than once if another writer races this one.
    pub fn update(&self, mut f: impl FnMut(&mut Config)) {
        self.inner.rcu(|current| {
            let mut next = Config::clone(current);
            f(&mut next);
            next
        });
    }
}

/// The process default configuration.
pub fn global() -> &'static ConfigHandle {
    &GLOBAL
}

/// Modify the process default configuration.
pub fn configure(f: impl FnMut(&mut Config)) {
    global().update(f);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn update_publishes_new_value() {
        let handle = ConfigHandle::new(Config::default());
        let before = handle.load();
        handle.update(|config| {
            config.enabled = false;
            config.max_payload_bytes = 64;
        });

        let after = handle.load();
        assert!(before.enabled);
        assert!(!after.enabled);
        assert_eq!(after.max_payload_bytes, 64);
    }

    #[test]
    fn clones_share_state() {
        let handle = ConfigHandle::default();
        let other = handle.clone();
        other.store(Config {
            sample_rate: 0.1,
            ..Config::default()
        });
        assert_eq!(handle.load().sample_rate, 0.1);
    }

    #[test]
    fn global_is_a_singleton() {
        assert!(std::ptr::eq(global(), global()));
    }
}
