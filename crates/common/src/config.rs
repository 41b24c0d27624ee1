//! Named configuration lookup.
//!
//! Every component receives a [`ConfigProvider`] instead of reading the
//! process environment itself, so tests can hand in a [`MapConfig`].

use std::collections::HashMap;
use std::path::Path;

use crate::error::{Error, Result};

pub trait ConfigProvider: Send + Sync {
    /// The value for `key`, or `None` when it is not set.
    fn get_optional(&self, key: &str) -> Option<String>;

    /// The value for `key`, failing with [`Error::ConfigMissing`] when unset.
    fn get(&self, key: &str) -> Result<String> {
        self.get_optional(key).ok_or_else(|| Error::ConfigMissing { key: key.to_string() })
    }
}

/// Reads process environment variables, optionally behind a common prefix.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    prefix: Option<String>,
}

impl EnvConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up `<prefix><key>`, e.g. `BATCHLINE_BUCKET` for `with_prefix("BATCHLINE_")`.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self { prefix: Some(prefix.into()) }
    }
}

impl ConfigProvider for EnvConfig {
    fn get_optional(&self, key: &str) -> Option<String> {
        let name = match &self.prefix {
            Some(prefix) => format!("{prefix}{key}"),
            None => key.to_string(),
        };
        std::env::var(name).ok()
    }
}

/// Fixed key/value pairs.
#[derive(Debug, Clone, Default)]
pub struct MapConfig {
    values: HashMap<String, String>,
}

impl MapConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapConfig {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl ConfigProvider for MapConfig {
    fn get_optional(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// A TOML file overlaid by prefixed environment variables.
///
/// Keys are case-insensitive: `BUCKET` matches `bucket = "..."` in the file
/// and `<PREFIX>_BUCKET` in the environment, the environment winning.
#[derive(Debug)]
pub struct LayeredConfig {
    inner: config::Config,
}

impl LayeredConfig {
    pub fn load(file: Option<&Path>, env_prefix: &str) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let inner = builder
            .add_source(config::Environment::with_prefix(env_prefix))
            .build()
            .map_err(|e| Error::ConfigInvalid {
                key: file.map(|p| p.display().to_string()).unwrap_or_else(|| env_prefix.to_string()),
                reason: e.to_string(),
            })?;
        Ok(Self { inner })
    }
}

impl ConfigProvider for LayeredConfig {
    fn get_optional(&self, key: &str) -> Option<String> {
        self.inner.get_string(&key.to_ascii_lowercase()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_map_config_missing_key() {
        let config = MapConfig::new().with("BUCKET", "data");
        assert_eq!(config.get("BUCKET").unwrap(), "data");

        let err = config.get("TABLE").unwrap_err();
        assert!(matches!(err, Error::ConfigMissing { ref key } if key == "TABLE"));
    }

    #[test]
    fn test_env_config_with_prefix() {
        std::env::set_var("BATCHLINE_TEST_ENV_CONFIG_BUCKET", "from-env");
        let config = EnvConfig::with_prefix("BATCHLINE_TEST_ENV_CONFIG_");
        assert_eq!(config.get("BUCKET").unwrap(), "from-env");
        assert!(config.get_optional("UNSET_KEY").is_none());
    }

    #[test]
    fn test_layered_config_reads_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "bucket = \"data\"\nbatch_size = 250").unwrap();

        let config = LayeredConfig::load(Some(file.path()), "BATCHLINE_LAYERED_TEST").unwrap();
        assert_eq!(config.get("BUCKET").unwrap(), "data");
        assert_eq!(config.get("BATCH_SIZE").unwrap(), "250");
        assert!(config.get("TABLE").is_err());
    }

    #[test]
    fn test_layered_config_missing_file_is_invalid() {
        let err = LayeredConfig::load(Some(Path::new("/nonexistent/batchline.toml")), "BATCHLINE")
            .unwrap_err();
        assert!(matches!(err, Error::ConfigInvalid { .. }));
    }
}
