//! Configuration provider port.
//!
//! Settings are read once at startup through this trait. Providers are plain
//! key/value lookups; typing and validation live in [`crate::settings`].

use std::collections::HashMap;

/// Source of raw configuration values.
pub trait ConfigProvider: Send + Sync {
    /// Look up a key, `None` when the provider has no value for it.
    fn lookup(&self, key: &str) -> Option<String>;

    /// Look up a key, falling back to `default`.
    fn get_value(&self, key: &str, default: &str) -> String {
        self.lookup(key).unwrap_or_else(|| default.to_string())
    }
}

/// In-memory provider, mainly for tests.
#[derive(Debug, Clone, Default)]
pub struct MapConfigProvider {
    values: HashMap<String, String>,
}

impl MapConfigProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value, builder style.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }
}

impl ConfigProvider for MapConfigProvider {
    fn lookup(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}
