use std::fmt;

use thiserror::Error;

/// Boxed backend error kept as the source of a wrapped failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The pipeline stage a failure belongs to, reported to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Configuration,
    Secrets,
    CatalogDiscovery,
    ObjectRead,
    WarehouseWrite,
    WarehouseQuery,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Configuration => "configuration",
            Stage::Secrets => "secret resolution",
            Stage::CatalogDiscovery => "catalog discovery",
            Stage::ObjectRead => "object read",
            Stage::WarehouseWrite => "warehouse write",
            Stage::WarehouseQuery => "warehouse query",
        };
        f.write_str(name)
    }
}

/// A named level of the partition hierarchy. `depth` starts at 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HierarchyLevel {
    pub depth: usize,
    pub name: String,
}

impl fmt::Display for HierarchyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (level {})", self.name, self.depth)
    }
}

/// Unified error type for Batchline crates.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration key '{key}' is not set")]
    ConfigMissing { key: String },

    #[error("configuration key '{key}' is invalid: {reason}")]
    ConfigInvalid { key: String, reason: String },

    #[error("secret '{secret_id}' is unavailable: {reason}")]
    SecretUnavailable { secret_id: String, reason: String },

    #[error("listing {bucket}/{prefix} failed")]
    CatalogUnavailable {
        bucket: String,
        prefix: String,
        #[source]
        source: BoxError,
    },

    #[error("object {bucket}/{key} is unavailable")]
    ObjectUnavailable {
        bucket: String,
        key: String,
        #[source]
        source: BoxError,
    },

    #[error("no partitions under {bucket}/{prefix}{}", describe_level(.level))]
    EmptyHierarchy {
        bucket: String,
        prefix: String,
        level: Option<HierarchyLevel>,
    },

    #[error("malformed record in {key}{}: {reason}", describe_line(.line))]
    MalformedRecord {
        key: String,
        line: Option<usize>,
        reason: String,
    },

    #[error("warehouse unavailable: {context}")]
    WarehouseUnavailable {
        stage: Stage,
        context: String,
        #[source]
        source: BoxError,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

fn describe_level(level: &Option<HierarchyLevel>) -> String {
    match level {
        Some(level) => format!(" at {level}"),
        None => String::new(),
    }
}

fn describe_line(line: &Option<usize>) -> String {
    match line {
        Some(line) => format!(" at line {line}"),
        None => String::new(),
    }
}

impl Error {
    pub fn catalog(bucket: &str, prefix: &str, source: impl Into<BoxError>) -> Self {
        Error::CatalogUnavailable {
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            source: source.into(),
        }
    }

    pub fn object(bucket: &str, key: &str, source: impl Into<BoxError>) -> Self {
        Error::ObjectUnavailable {
            bucket: bucket.to_string(),
            key: key.to_string(),
            source: source.into(),
        }
    }

    pub fn malformed(key: &str, line: Option<usize>, reason: impl Into<String>) -> Self {
        Error::MalformedRecord {
            key: key.to_string(),
            line,
            reason: reason.into(),
        }
    }

    pub fn secret(secret_id: &str, reason: impl Into<String>) -> Self {
        Error::SecretUnavailable {
            secret_id: secret_id.to_string(),
            reason: reason.into(),
        }
    }

    pub fn warehouse(stage: Stage, context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Error::WarehouseUnavailable {
            stage,
            context: context.into(),
            source: source.into(),
        }
    }

    /// The stage an operator should look at when this error ends a run.
    pub fn stage(&self) -> Stage {
        match self {
            Error::ConfigMissing { .. } | Error::ConfigInvalid { .. } => Stage::Configuration,
            Error::SecretUnavailable { .. } => Stage::Secrets,
            Error::CatalogUnavailable { .. } | Error::EmptyHierarchy { .. } => {
                Stage::CatalogDiscovery
            }
            Error::ObjectUnavailable { .. } | Error::MalformedRecord { .. } => Stage::ObjectRead,
            Error::WarehouseUnavailable { stage, .. } => *stage,
        }
    }

    /// Whether the caller may reasonably retry later or relax parsing.
    /// Everything else is fatal to the current run.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::EmptyHierarchy { .. } | Error::MalformedRecord { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_hierarchy_names_level() {
        let err = Error::EmptyHierarchy {
            bucket: "data".to_string(),
            prefix: "raw/2024/".to_string(),
            level: Some(HierarchyLevel { depth: 2, name: "month".to_string() }),
        };
        assert_eq!(err.to_string(), "no partitions under data/raw/2024/ at month (level 2)");
        assert_eq!(err.stage(), Stage::CatalogDiscovery);
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_malformed_record_names_line() {
        let err = Error::malformed("raw/a.jsonl", Some(3), "expected value");
        assert_eq!(err.to_string(), "malformed record in raw/a.jsonl at line 3: expected value");
        assert_eq!(err.stage(), Stage::ObjectRead);
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_backend_failures_are_fatal_and_keep_source() {
        let err = Error::catalog("data", "raw/", "access denied");
        assert!(!err.is_recoverable());
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("access denied"));

        let err = Error::warehouse(Stage::WarehouseWrite, "insert into s.t", "connection reset");
        assert_eq!(err.stage(), Stage::WarehouseWrite);
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_config_missing_message() {
        let err = Error::ConfigMissing { key: "BUCKET".to_string() };
        assert_eq!(err.to_string(), "configuration key 'BUCKET' is not set");
        assert_eq!(err.stage(), Stage::Configuration);
    }
}
