use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use batchline_common::{Error, ObjectKey, Prefix, Result};
use batchline_connector_objectstore::{
    ListPage, ListRequest, MemoryBackend, ObjectCatalog, PartitionLevel, PartitionScheme, StorageBackend,
};
use bytes::Bytes;
use futures::TryStreamExt;

async fn hierarchy(page_size: usize, keys: &[&str]) -> Arc<MemoryBackend> {
    let backend = MemoryBackend::with_page_size(page_size);
    for key in keys {
        backend.insert("data", key, "{}").await;
    }
    Arc::new(backend)
}

/// Serves a fixed sequence of pages and counts the requests it sees.
struct ScriptedBackend {
    pages: Vec<ListPage>,
    requests: AtomicUsize,
}

#[async_trait]
impl StorageBackend for ScriptedBackend {
    async fn list_page(&self, request: &ListRequest) -> Result<ListPage> {
        let index = match request.continuation.as_deref() {
            None => 0,
            Some(token) => token.parse::<usize>().unwrap(),
        };
        self.requests.fetch_add(1, Ordering::SeqCst);
        Ok(self.pages[index].clone())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes> {
        Err(Error::object(bucket, key, "not scripted"))
    }

    async fn put_object(&self, bucket: &str, key: &str, _body: Bytes) -> Result<()> {
        Err(Error::object(bucket, key, "not scripted"))
    }
}

struct UnreachableBackend;

#[async_trait]
impl StorageBackend for UnreachableBackend {
    async fn list_page(&self, request: &ListRequest) -> Result<ListPage> {
        Err(Error::catalog(&request.bucket, &request.prefix, "connection refused"))
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes> {
        Err(Error::object(bucket, key, "connection refused"))
    }

    async fn put_object(&self, bucket: &str, key: &str, _body: Bytes) -> Result<()> {
        Err(Error::object(bucket, key, "connection refused"))
    }
}

fn page(prefixes: &[&str], next: Option<&str>) -> ListPage {
    ListPage {
        common_prefixes: prefixes.iter().map(|p| p.to_string()).collect(),
        keys: Vec::new(),
        next_continuation: next.map(str::to_string),
    }
}

#[tokio::test]
async fn test_latest_child_is_lexicographic_max() {
    let backend = hierarchy(1000, &["raw/2022/x", "raw/2024/x", "raw/2023/x", "raw/2019/x"]).await;
    let catalog = ObjectCatalog::new(backend);

    let latest = catalog.latest_child("data", "raw/").await.unwrap();
    assert_eq!(latest, Prefix::from("raw/2024/"));
}

#[tokio::test]
async fn test_three_pages_yield_union_without_duplicates() {
    let backend = Arc::new(ScriptedBackend {
        pages: vec![
            page(&["raw/01/", "raw/02/"], Some("1")),
            page(&["raw/03/", "raw/02/"], Some("2")),
            page(&["raw/05/", "raw/04/"], None),
        ],
        requests: AtomicUsize::new(0),
    });
    let catalog = ObjectCatalog::new(backend.clone());

    let children: Vec<Prefix> = catalog.list_child_prefixes("data", "raw/").await.unwrap().into_iter().collect();
    let expected: Vec<Prefix> = ["raw/01/", "raw/02/", "raw/03/", "raw/04/", "raw/05/"]
        .into_iter()
        .map(Prefix::from)
        .collect();
    assert_eq!(children, expected);
    assert_eq!(backend.requests.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_memory_pagination_lists_every_child() {
    let keys: Vec<String> = (1..=6).map(|m| format!("raw/2024/{m:02}/part.jsonl")).collect();
    let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
    let catalog = ObjectCatalog::new(hierarchy(2, &keys).await).with_page_size(2);

    let children = catalog.list_child_prefixes("data", "raw/2024/").await.unwrap();
    assert_eq!(children.len(), 6);
    assert_eq!(children.last(), Some(&Prefix::from("raw/2024/06/")));
}

#[tokio::test]
async fn test_no_children_is_empty_set() {
    let catalog = ObjectCatalog::new(hierarchy(1000, &["raw/2024/part.jsonl"]).await);
    assert!(catalog.list_child_prefixes("data", "raw/2024/").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_latest_batch_single_branch() {
    let backend = hierarchy(1000, &["raw/2024/01/15/09/part-0000.jsonl"]).await;
    let catalog = ObjectCatalog::new(backend);

    let batch = catalog.latest_batch("data", "raw/").await.unwrap();
    assert_eq!(batch.prefix().as_str(), "raw/2024/01/15/09/");
    assert_eq!(batch.path().len(), 4);
    let segments: Vec<(&str, &str)> = batch.segments().collect();
    assert_eq!(segments, vec![("year", "2024"), ("month", "01"), ("day", "15"), ("hour", "09")]);
}

#[tokio::test]
async fn test_latest_batch_takes_four_sequential_maxima() {
    let backend = hierarchy(
        2,
        &[
            "raw/2023/12/31/23/a.jsonl",
            "raw/2024/01/31/23/a.jsonl",
            "raw/2024/02/01/00/a.jsonl",
            "raw/2024/02/01/07/a.jsonl",
            "raw/2024/02/01/10/a.jsonl",
            "raw/2024/02/01/10/b.jsonl",
        ],
    )
    .await;
    let catalog = ObjectCatalog::new(backend).with_page_size(2);

    let batch = catalog.latest_batch("data", "raw").await.unwrap();
    assert_eq!(batch.prefix().as_str(), "raw/2024/02/01/10/");
}

#[tokio::test]
async fn test_latest_batch_reports_first_empty_level() {
    // The latest month has no day partitions yet.
    let backend = hierarchy(1000, &["raw/2024/01/15/09/a.jsonl", "raw/2024/02/manifest.json"]).await;
    let catalog = ObjectCatalog::new(backend);

    match catalog.latest_batch("data", "raw/").await.unwrap_err() {
        Error::EmptyHierarchy { bucket, prefix, level } => {
            assert_eq!(bucket, "data");
            assert_eq!(prefix, "raw/2024/02/");
            let level = level.unwrap();
            assert_eq!(level.depth, 3);
            assert_eq!(level.name, "day");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_latest_batch_ignores_non_conforming_partitions() {
    let backend = hierarchy(1000, &["raw/2024/01/15/09/a.jsonl", "raw/_temporary/x", "raw/2024/9/01/00/a.jsonl"]).await;
    let catalog = ObjectCatalog::new(backend);

    let batch = catalog.latest_batch("data", "raw/").await.unwrap();
    assert_eq!(batch.prefix().as_str(), "raw/2024/01/15/09/");
}

#[tokio::test]
async fn test_custom_scheme_depth() {
    let backend = hierarchy(1000, &["exports/2024-01-01/run-1/a.csv", "exports/2024-01-02/run-2/a.csv"]).await;
    let scheme = PartitionScheme::new(vec![PartitionLevel::new("date", None), PartitionLevel::new("run", None)]);
    let catalog = ObjectCatalog::new(backend).with_scheme(scheme);

    let batch = catalog.latest_batch("data", "exports/").await.unwrap();
    assert_eq!(batch.prefix().as_str(), "exports/2024-01-02/run-2/");
    assert_eq!(batch.timestamp(), None);
}

#[tokio::test]
async fn test_list_objects_pages_lazily() {
    let backend = hierarchy(
        2,
        &["raw/2024/01/a.jsonl", "raw/2024/01/b.jsonl", "raw/2024/01/c.jsonl", "raw/2024/01/d/e.jsonl", "raw/2025/x"],
    )
    .await;
    let catalog = ObjectCatalog::new(backend).with_page_size(2);

    let keys: Vec<ObjectKey> = catalog.list_objects("data", "raw/2024/01/").try_collect().await.unwrap();
    let keys: Vec<&str> = keys.iter().map(ObjectKey::as_str).collect();
    assert_eq!(keys, vec!["raw/2024/01/a.jsonl", "raw/2024/01/b.jsonl", "raw/2024/01/c.jsonl", "raw/2024/01/d/e.jsonl"]);
}

#[tokio::test]
async fn test_unreachable_backend_is_catalog_unavailable() {
    let catalog = ObjectCatalog::new(Arc::new(UnreachableBackend));

    let err = catalog.latest_batch("data", "raw/").await.unwrap_err();
    assert!(matches!(err, Error::CatalogUnavailable { .. }));
    assert!(!err.is_recoverable());

    let err = catalog.list_objects("data", "raw/").try_collect::<Vec<_>>().await.unwrap_err();
    assert!(matches!(err, Error::CatalogUnavailable { .. }));
}

#[tokio::test]
async fn test_repeated_continuation_token_is_catalog_unavailable() {
    let backend = Arc::new(ScriptedBackend {
        pages: vec![page(&["raw/01/"], Some("1")), page(&["raw/02/"], Some("1"))],
        requests: AtomicUsize::new(0),
    });
    let catalog = ObjectCatalog::new(backend.clone());

    let err = catalog.list_child_prefixes("data", "raw/").await.unwrap_err();
    assert!(matches!(err, Error::CatalogUnavailable { .. }), "{err}");
    assert_eq!(backend.requests.load(Ordering::SeqCst), 2);

    let err = catalog.list_objects("data", "raw/").try_collect::<Vec<_>>().await.unwrap_err();
    assert!(matches!(err, Error::CatalogUnavailable { .. }), "{err}");
    assert_eq!(backend.requests.load(Ordering::SeqCst), 4);
}
