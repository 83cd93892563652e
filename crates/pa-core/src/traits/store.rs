//! Configuration store trait

use std::path::Path;

use crate::config::AppConfig;
use crate::error::ConfigError;

/// Key-value view of the persisted configuration.
///
/// `section` names a top-level table; `key` may be dotted to reach nested
/// tables (e.g. `backoff.initial` in the `orchestrator` section).
pub trait ConfigStore: Send + Sync {
    /// Read a value
    fn get(&self, section: &str, key: &str) -> Option<toml::Value>;

    /// Write a value in memory.
    ///
    /// Fails with `ConfigError::UnknownKey` for keys outside the schema and
    /// with `ConfigError::InvalidValue` when the value has the wrong type.
    fn set(&mut self, section: &str, key: &str, value: toml::Value) -> Result<(), ConfigError>;

    /// Re-read the backing file, discarding unsaved writes
    fn reload(&mut self) -> Result<(), ConfigError>;

    /// Persist to `path`, or to the store's own path when `None`
    fn save(&self, path: Option<&Path>) -> Result<(), ConfigError>;

    /// Typed snapshot of the current configuration
    fn snapshot(&self) -> AppConfig;

    /// Backing file path
    fn path(&self) -> &Path;
}
