//! An in-memory [`StorageBackend`] with object-storage listing semantics.

use std::collections::BTreeMap;

use async_trait::async_trait;
use batchline_common::{Error, Result};
use bytes::Bytes;
use tokio::sync::RwLock;

use crate::backend::{ListPage, ListRequest, StorageBackend};

/// Buckets of objects held in ordered maps.
///
/// Listings are returned in key order and cut into pages of at most
/// `page_size` entries (a common prefix counts as one entry), with the last
/// entry of a page as the continuation token.
pub struct MemoryBackend {
    buckets: RwLock<BTreeMap<String, BTreeMap<String, Bytes>>>,
    page_size: usize,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_page_size(usize::MAX)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            buckets: RwLock::new(BTreeMap::new()),
            page_size: page_size.max(1),
        }
    }

    pub async fn create_bucket(&self, bucket: &str) {
        self.buckets.write().await.entry(bucket.to_string()).or_default();
    }

    pub async fn insert(&self, bucket: &str, key: &str, body: impl Into<Bytes>) {
        self.buckets
            .write()
            .await
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), body.into());
    }
}

enum Entry {
    CommonPrefix(String),
    Key(String),
}

impl Entry {
    fn name(&self) -> &str {
        match self {
            Entry::CommonPrefix(name) | Entry::Key(name) => name,
        }
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn list_page(&self, request: &ListRequest) -> Result<ListPage> {
        let buckets = self.buckets.read().await;
        let objects = buckets
            .get(&request.bucket)
            .ok_or_else(|| Error::catalog(&request.bucket, &request.prefix, "no such bucket"))?;

        let limit = request.max_keys.min(self.page_size).max(1);
        let mut page = ListPage::default();
        let mut emitted = 0;
        let mut last: Option<String> = None;

        for key in objects.range(request.prefix.clone()..).map(|(key, _)| key) {
            if !key.starts_with(&request.prefix) {
                break;
            }
            let rest = &key[request.prefix.len()..];
            let entry = match request.delimiter.as_deref().and_then(|d| rest.find(d).map(|idx| idx + d.len())) {
                Some(end) => Entry::CommonPrefix(key[..request.prefix.len() + end].to_string()),
                None => Entry::Key(key.clone()),
            };

            // Keys grouped under an already emitted common prefix collapse into it.
            if let Some(token) = request.continuation.as_deref() {
                if entry.name() <= token {
                    continue;
                }
            }
            if last.as_deref() == Some(entry.name()) {
                continue;
            }
            if emitted == limit {
                page.next_continuation = last;
                break;
            }

            emitted += 1;
            last = Some(entry.name().to_string());
            match entry {
                Entry::CommonPrefix(prefix) => page.common_prefixes.push(prefix),
                Entry::Key(key) => page.keys.push(key),
            }
        }
        Ok(page)
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes> {
        self.buckets
            .read()
            .await
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .cloned()
            .ok_or_else(|| Error::object(bucket, key, "no such key"))
    }

    async fn put_object(&self, bucket: &str, key: &str, body: Bytes) -> Result<()> {
        self.insert(bucket, key, body).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn backend(page_size: usize) -> MemoryBackend {
        let backend = MemoryBackend::with_page_size(page_size);
        for key in ["raw/2023/12/a.jsonl", "raw/2024/01/a.jsonl", "raw/2024/01/b.jsonl", "raw/2024/02/a.jsonl", "raw/top.jsonl"] {
            backend.insert("data", key, "{}").await;
        }
        backend
    }

    #[tokio::test]
    async fn test_delimited_listing_groups_children() {
        let backend = backend(100).await;
        let page = backend.list_page(&ListRequest::delimited("data", "raw/", "/")).await.unwrap();
        assert_eq!(page.common_prefixes, vec!["raw/2023/", "raw/2024/"]);
        assert_eq!(page.keys, vec!["raw/top.jsonl"]);
        assert_eq!(page.next_continuation, None);
    }

    #[tokio::test]
    async fn test_pages_chain_through_continuation() {
        let backend = backend(1).await;
        let mut request = ListRequest::delimited("data", "raw/2024/", "/");

        let first = backend.list_page(&request).await.unwrap();
        assert_eq!(first.common_prefixes, vec!["raw/2024/01/"]);
        assert_eq!(first.next_continuation.as_deref(), Some("raw/2024/01/"));

        request = request.with_continuation(first.next_continuation);
        let second = backend.list_page(&request).await.unwrap();
        assert_eq!(second.common_prefixes, vec!["raw/2024/02/"]);
        assert_eq!(second.next_continuation, None);
    }

    #[tokio::test]
    async fn test_unknown_bucket_and_key() {
        let backend = MemoryBackend::new();
        let err = backend.list_page(&ListRequest::recursive("missing", "")).await.unwrap_err();
        assert!(matches!(err, Error::CatalogUnavailable { .. }));

        let err = backend.get_object("missing", "a").await.unwrap_err();
        assert!(matches!(err, Error::ObjectUnavailable { .. }));
    }
}
