//! The storage seam: one page of a listing, one whole object.
//!
//! Listing follows the common object-storage model: a request names a
//! bucket, a key prefix and optionally a delimiter. With a delimiter the
//! page separates direct child "folders" (`common_prefixes`) from the
//! objects that sit directly under the prefix. Pages are chained through an
//! opaque continuation token until the backend stops returning one.

use async_trait::async_trait;
use batchline_common::Result;
use bytes::Bytes;

/// Page size asked of backends unless the caller overrides it.
pub const DEFAULT_MAX_KEYS: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRequest {
    pub bucket: String,
    pub prefix: String,
    pub delimiter: Option<String>,
    pub continuation: Option<String>,
    pub max_keys: usize,
}

impl ListRequest {
    /// A request for the direct children of `prefix`.
    pub fn delimited(bucket: &str, prefix: &str, delimiter: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            delimiter: Some(delimiter.to_string()),
            continuation: None,
            max_keys: DEFAULT_MAX_KEYS,
        }
    }

    /// A request for every key under `prefix`.
    pub fn recursive(bucket: &str, prefix: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            delimiter: None,
            continuation: None,
            max_keys: DEFAULT_MAX_KEYS,
        }
    }

    pub fn with_max_keys(mut self, max_keys: usize) -> Self {
        self.max_keys = max_keys.max(1);
        self
    }

    pub fn with_continuation(mut self, continuation: Option<String>) -> Self {
        self.continuation = continuation;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub common_prefixes: Vec<String>,
    pub keys: Vec<String>,
    /// Present when more results follow this page.
    pub next_continuation: Option<String>,
}

/// An object storage service.
///
/// Listing failures are reported as `CatalogUnavailable`; fetch and store
/// failures as `ObjectUnavailable`.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn list_page(&self, request: &ListRequest) -> Result<ListPage>;

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes>;

    async fn put_object(&self, bucket: &str, key: &str, body: Bytes) -> Result<()>;
}
