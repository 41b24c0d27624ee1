//! [`StorageBackend`] over the `object_store` crate.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use batchline_common::{Error, Result, DELIMITER};
use bytes::Bytes;
use futures::StreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path;
use object_store::ObjectStore;
use tracing::debug;

use crate::backend::{ListPage, ListRequest, StorageBackend};

/// Routes bucket names to registered `ObjectStore` instances.
///
/// `object_store` paths are segment based, so prefixes are matched on whole
/// segments (`raw/2024/` matches `raw/2024/01/x` but `raw/20` matches
/// nothing). Delimited listings come back as a single page because
/// `list_with_delimiter` already drains the remote pagination. Recursive
/// listings are paged with `list_with_offset`, which relies on the store
/// listing in key order (true of S3 and the in-memory store).
#[derive(Default, Clone)]
pub struct ObjectStoreBackend {
    stores: HashMap<String, Arc<dyn ObjectStore>>,
}

impl std::fmt::Debug for ObjectStoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStoreBackend")
            .field("buckets", &self.stores.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ObjectStoreBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(mut self, bucket: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        self.stores.insert(bucket.into(), store);
        self
    }

    /// An S3 store for `bucket`, credentials taken from the standard AWS
    /// environment. `endpoint` points at an S3-compatible service instead.
    pub fn s3_from_env(bucket: &str, region: &str, endpoint: Option<&str>) -> Result<Self> {
        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .with_region(region);
        if let Some(endpoint) = endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"));
        }
        let store = builder.build().map_err(|e| Error::catalog(bucket, "", e))?;
        Ok(Self::new().with_store(bucket, Arc::new(store)))
    }

    fn store(&self, bucket: &str) -> Option<&Arc<dyn ObjectStore>> {
        self.stores.get(bucket)
    }
}

fn prefix_path(prefix: &str) -> Option<Path> {
    let trimmed = prefix.trim_end_matches(DELIMITER);
    if trimmed.is_empty() {
        None
    } else {
        Some(Path::from(trimmed))
    }
}

#[async_trait]
impl StorageBackend for ObjectStoreBackend {
    async fn list_page(&self, request: &ListRequest) -> Result<ListPage> {
        let store = self
            .store(&request.bucket)
            .ok_or_else(|| Error::catalog(&request.bucket, &request.prefix, "bucket is not registered"))?;
        let prefix = prefix_path(&request.prefix);

        match request.delimiter.as_deref() {
            Some(DELIMITER) => {
                let listing = store
                    .list_with_delimiter(prefix.as_ref())
                    .await
                    .map_err(|e| Error::catalog(&request.bucket, &request.prefix, e))?;
                let mut common_prefixes: Vec<String> =
                    listing.common_prefixes.iter().map(|p| format!("{p}{DELIMITER}")).collect();
                let mut keys: Vec<String> = listing.objects.iter().map(|o| o.location.to_string()).collect();
                common_prefixes.sort();
                keys.sort();
                Ok(ListPage { common_prefixes, keys, next_continuation: None })
            }
            Some(other) => Err(Error::catalog(
                &request.bucket,
                &request.prefix,
                format!("unsupported delimiter '{other}'"),
            )),
            None => {
                let mut stream = match request.continuation.as_deref() {
                    Some(offset) => store.list_with_offset(prefix.as_ref(), &Path::from(offset)),
                    None => store.list(prefix.as_ref()),
                };
                let mut keys = Vec::new();
                while let Some(meta) = stream.next().await {
                    let meta = meta.map_err(|e| Error::catalog(&request.bucket, &request.prefix, e))?;
                    keys.push(meta.location.to_string());
                    if keys.len() > request.max_keys {
                        break;
                    }
                }
                let next_continuation = if keys.len() > request.max_keys {
                    keys.truncate(request.max_keys);
                    keys.last().cloned()
                } else {
                    None
                };
                debug!(bucket = %request.bucket, prefix = %request.prefix, keys = keys.len(), "listed object page");
                Ok(ListPage { common_prefixes: Vec::new(), keys, next_continuation })
            }
        }
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes> {
        let store = self
            .store(bucket)
            .ok_or_else(|| Error::object(bucket, key, "bucket is not registered"))?;
        let result = store
            .get(&Path::from(key))
            .await
            .map_err(|e| Error::object(bucket, key, e))?;
        result.bytes().await.map_err(|e| Error::object(bucket, key, e))
    }

    async fn put_object(&self, bucket: &str, key: &str, body: Bytes) -> Result<()> {
        let store = self
            .store(bucket)
            .ok_or_else(|| Error::object(bucket, key, "bucket is not registered"))?;
        store
            .put(&Path::from(key), body)
            .await
            .map_err(|e| Error::object(bucket, key, e))?;
        Ok(())
    }
}
