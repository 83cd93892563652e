//! TOML-backed configuration store

use std::path::{Path, PathBuf};

use toml::{Table, Value};

use super::AppConfig;
use crate::error::ConfigError;
use crate::traits::ConfigStore;

/// Configuration store backed by a TOML file.
///
/// The in-memory document is the file content layered over the defaults,
/// so every key of the schema is readable even when the file omits it.
/// Writes only touch memory until [`ConfigStore::save`] is called.
pub struct TomlConfigStore {
    path: PathBuf,
    /// Defaults rendered as TOML; defines which keys exist
    schema: Table,
    document: Table,
    snapshot: AppConfig,
}

impl TomlConfigStore {
    /// Open the store at `path`, falling back to defaults if the file is absent
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let schema = default_table()?;
        let mut store = Self {
            path: path.into(),
            document: schema.clone(),
            schema,
            snapshot: AppConfig::default(),
        };
        store.reload()?;
        Ok(store)
    }

    /// Store that lives in memory until saved
    pub fn in_memory(path: impl Into<PathBuf>, config: &AppConfig) -> Result<Self, ConfigError> {
        let schema = default_table()?;
        let mut document = schema.clone();
        merge(&mut document, to_table(config)?);
        Ok(Self {
            path: path.into(),
            schema,
            document,
            snapshot: config.clone(),
        })
    }

    fn read_file(&self) -> Result<Option<Table>, ConfigError> {
        match super::load_config(&self.path) {
            Ok(table) => Ok(Some(table)),
            Err(ConfigError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl ConfigStore for TomlConfigStore {
    fn get(&self, section: &str, key: &str) -> Option<Value> {
        lookup(&self.document, section, key).cloned()
    }

    fn set(&mut self, section: &str, key: &str, value: Value) -> Result<(), ConfigError> {
        if lookup(&self.schema, section, key).is_none() {
            tracing::warn!("Rejecting write to unknown config key {}.{}", section, key);
            return Err(ConfigError::UnknownKey {
                section: section.to_string(),
                key: key.to_string(),
            });
        }

        let mut candidate = self.document.clone();
        let slot = lookup_mut(&mut candidate, section, key).ok_or_else(|| {
            ConfigError::UnknownKey {
                section: section.to_string(),
                key: key.to_string(),
            }
        })?;
        *slot = value;

        let snapshot: AppConfig = Value::Table(candidate.clone())
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::InvalidValue {
                section: section.to_string(),
                key: key.to_string(),
                reason: e.message().to_string(),
            })?;

        tracing::debug!("Config {}.{} updated", section, key);
        self.document = candidate;
        self.snapshot = snapshot;
        Ok(())
    }

    fn reload(&mut self) -> Result<(), ConfigError> {
        let mut document = self.schema.clone();
        match self.read_file()? {
            Some(file) => merge(&mut document, file),
            None => tracing::info!("Config file {:?} not found, using defaults", self.path),
        }

        let snapshot: AppConfig = Value::Table(document.clone()).try_into()?;
        self.document = document;
        self.snapshot = snapshot;
        tracing::debug!("Configuration reloaded from {:?}", self.path);
        Ok(())
    }

    fn save(&self, path: Option<&Path>) -> Result<(), ConfigError> {
        let target = path.unwrap_or(&self.path);
        super::save_config(target, &self.document)?;
        tracing::info!("Configuration saved to {:?}", target);
        Ok(())
    }

    fn snapshot(&self) -> AppConfig {
        self.snapshot.clone()
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

fn to_table(config: &AppConfig) -> Result<Table, ConfigError> {
    match Value::try_from(config)? {
        Value::Table(table) => Ok(table),
        other => Err(ConfigError::Invalid(format!(
            "Expected a table, got {}",
            other.type_str()
        ))),
    }
}

fn default_table() -> Result<Table, ConfigError> {
    to_table(&AppConfig::default())
}

/// Overlay `overlay` onto `base`, descending into nested tables
fn merge(base: &mut Table, overlay: Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(Value::Table(existing)), Value::Table(nested)) => merge(existing, nested),
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Resolve `section` and a possibly dotted `key` (e.g. `backoff.initial`)
fn lookup<'a>(table: &'a Table, section: &str, key: &str) -> Option<&'a Value> {
    let mut current = table.get(section)?;
    for part in key.split('.') {
        current = current.as_table()?.get(part)?;
    }
    Some(current)
}

fn lookup_mut<'a>(table: &'a mut Table, section: &str, key: &str) -> Option<&'a mut Value> {
    let mut current = table.get_mut(section)?;
    for part in key.split('.') {
        current = current.as_table_mut()?.get_mut(part)?;
    }
    Some(current)
}
