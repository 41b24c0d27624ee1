//! Common crate
//!
//! Shared types, configuration lookup and error handling for Batchline.
//!
//! # Example
//! ```rust
//! use batchline_common::{ConfigProvider, MapConfig};
//! let config = MapConfig::new().with("BUCKET", "data");
//! assert_eq!(config.get("BUCKET").unwrap(), "data");
//! ```

pub mod config;
pub mod credential;
pub mod error;
pub mod keys;
pub mod rowset;

pub use config::{ConfigProvider, EnvConfig, LayeredConfig, MapConfig};
pub use credential::Credential;
pub use error::{BoxError, Error, HierarchyLevel, Result, Stage};
pub use keys::{ObjectKey, Prefix, DELIMITER};
pub use rowset::{Record, RowSet};
