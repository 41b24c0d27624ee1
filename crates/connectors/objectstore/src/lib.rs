//! Object storage connector
//!
//! Discovers the newest partition of a time-bucketed bucket layout
//! ([`ObjectCatalog`]) and parses its objects into row sets
//! ([`ObjectReader`]). Both talk to storage through [`StorageBackend`], with
//! an `object_store` adapter for real buckets and an in-memory backend.

pub mod backend;
pub mod catalog;
pub mod memory;
pub mod partition;
pub mod reader;
pub mod store;
pub mod upload;

pub use backend::{ListPage, ListRequest, StorageBackend, DEFAULT_MAX_KEYS};
pub use catalog::ObjectCatalog;
pub use memory::MemoryBackend;
pub use partition::{BatchLocation, PartitionLevel, PartitionScheme};
pub use reader::{ObjectFormat, ObjectReader, ObjectRows, ParseMode, SkippedLine};
pub use store::ObjectStoreBackend;
pub use upload::upload_object;
