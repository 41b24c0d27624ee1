//! Batchline
//!
//! Finds the newest partition of a date-partitioned bucket, parses its
//! objects into rows and appends them to a warehouse table.
//!
//! ```no_run
//! # async fn run() -> batchline_common::Result<()> {
//! use batchline::Pipeline;
//! use batchline_common::EnvConfig;
//!
//! let pipeline = Pipeline::from_config(&EnvConfig::new())?;
//! let report = pipeline.ingest_latest().await?;
//! println!("appended {} rows from {}", report.rows_appended, report.batch);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod pipeline;

pub use config::{PipelineConfig, SecretSource};
pub use pipeline::{BatchListing, IngestReport, Pipeline};
