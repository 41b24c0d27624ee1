//! The pipeline's settings, read once from a [`ConfigProvider`].

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use batchline_common::{ConfigProvider, Error, Result};
use batchline_connector_objectstore::{ObjectFormat, ParseMode, PartitionScheme};
use batchline_connector_warehouse::DEFAULT_BATCH_SIZE;

pub const BUCKET: &str = "BUCKET";
pub const PREFIX: &str = "PREFIX";
pub const TABLE: &str = "TABLE";
pub const SCHEMA: &str = "SCHEMA";
pub const SECRET_NAME: &str = "SECRET_NAME";
pub const REGION_NAME: &str = "REGION_NAME";
pub const DATABASE: &str = "DATABASE";
pub const BATCH_SIZE: &str = "BATCH_SIZE";
pub const PARSE_MODE: &str = "PARSE_MODE";
pub const OBJECT_FORMAT: &str = "OBJECT_FORMAT";
pub const PARTITION_LEVELS: &str = "PARTITION_LEVELS";
pub const SECRET_SOURCE: &str = "SECRET_SOURCE";
pub const STORAGE_ENDPOINT: &str = "STORAGE_ENDPOINT";

/// Where the warehouse credential is looked up.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SecretSource {
    /// A process environment variable holding the JSON document.
    #[default]
    Env,
    /// `<dir>/<secret>.json` (or `.bin`) files.
    File(PathBuf),
}

impl FromStr for SecretSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("env") {
            return Ok(SecretSource::Env);
        }
        match s.split_once(':') {
            Some((scheme, dir)) if scheme.eq_ignore_ascii_case("file") && !dir.is_empty() => {
                Ok(SecretSource::File(PathBuf::from(dir)))
            }
            _ => Err(Error::ConfigInvalid {
                key: SECRET_SOURCE.to_string(),
                reason: format!("expected 'env' or 'file:<dir>', got '{s}'"),
            }),
        }
    }
}

impl fmt::Display for SecretSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretSource::Env => f.write_str("env"),
            SecretSource::File(dir) => write!(f, "file:{}", dir.display()),
        }
    }
}

/// Everything a run needs to know, fixed before the first backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub bucket: String,
    pub prefix: String,
    pub table: String,
    pub schema: String,
    pub secret_name: String,
    pub region_name: String,
    pub database: String,
    pub batch_size: usize,
    pub parse_mode: ParseMode,
    pub object_format: ObjectFormat,
    pub partition_scheme: PartitionScheme,
    pub secret_source: SecretSource,
    pub storage_endpoint: Option<String>,
}

impl PipelineConfig {
    /// Read every key, failing on the first required one that is unset.
    pub fn from_provider(provider: &dyn ConfigProvider) -> Result<Self> {
        Ok(Self {
            bucket: provider.get(BUCKET)?,
            prefix: provider.get(PREFIX)?,
            table: provider.get(TABLE)?,
            schema: provider.get(SCHEMA)?,
            secret_name: provider.get(SECRET_NAME)?,
            region_name: provider.get(REGION_NAME)?,
            database: provider.get(DATABASE)?,
            batch_size: parse_batch_size(provider.get_optional(BATCH_SIZE))?,
            parse_mode: parse_or_default(provider, PARSE_MODE)?,
            object_format: parse_or_default(provider, OBJECT_FORMAT)?,
            partition_scheme: parse_or_default(provider, PARTITION_LEVELS)?,
            secret_source: parse_or_default(provider, SECRET_SOURCE)?,
            storage_endpoint: provider.get_optional(STORAGE_ENDPOINT).filter(|e| !e.trim().is_empty()),
        })
    }
}

fn parse_or_default<T>(provider: &dyn ConfigProvider, key: &str) -> Result<T>
where
    T: FromStr<Err = Error> + Default,
{
    match provider.get_optional(key) {
        Some(value) if !value.trim().is_empty() => value.parse(),
        _ => Ok(T::default()),
    }
}

fn parse_batch_size(value: Option<String>) -> Result<usize> {
    let Some(value) = value.filter(|v| !v.trim().is_empty()) else {
        return Ok(DEFAULT_BATCH_SIZE);
    };
    match value.trim().parse::<usize>() {
        Ok(size) if size > 0 => Ok(size),
        _ => Err(Error::ConfigInvalid {
            key: BATCH_SIZE.to_string(),
            reason: format!("expected a positive integer, got '{value}'"),
        }),
    }
}
