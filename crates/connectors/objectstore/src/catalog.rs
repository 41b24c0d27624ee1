use std::collections::BTreeSet;
use std::sync::Arc;

use batchline_common::{Error, ObjectKey, Prefix, Result, DELIMITER};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use tracing::{debug, info, warn};

use crate::backend::{ListRequest, StorageBackend, DEFAULT_MAX_KEYS};
use crate::partition::{BatchLocation, PartitionScheme};

/// Walks a bucket's prefix hierarchy to find the newest partition.
///
/// Listings are requested one page at a time; the next page is only asked
/// for once the previous one has been consumed.
#[derive(Clone)]
pub struct ObjectCatalog {
    backend: Arc<dyn StorageBackend>,
    scheme: PartitionScheme,
    page_size: usize,
}

impl ObjectCatalog {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            scheme: PartitionScheme::default(),
            page_size: DEFAULT_MAX_KEYS,
        }
    }

    pub fn with_scheme(mut self, scheme: PartitionScheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn scheme(&self) -> &PartitionScheme {
        &self.scheme
    }

    /// Direct child prefixes of `prefix`, sorted, across every page.
    pub async fn list_child_prefixes(&self, bucket: &str, prefix: &str) -> Result<BTreeSet<Prefix>> {
        let mut children = BTreeSet::new();
        let mut continuation = None;
        let mut pages = 0usize;
        loop {
            let request = ListRequest::delimited(bucket, prefix, DELIMITER)
                .with_max_keys(self.page_size)
                .with_continuation(continuation);
            let page = self.backend.list_page(&request).await?;
            pages += 1;
            debug!(bucket, prefix, page = pages, prefixes = page.common_prefixes.len(), "listed prefix page");
            children.extend(page.common_prefixes.into_iter().map(Prefix::from));
            match page.next_continuation {
                Some(token) => {
                    check_progress(bucket, prefix, request.continuation.as_deref(), &token)?;
                    continuation = Some(token);
                }
                None => break,
            }
        }
        Ok(children)
    }

    /// Every object key under `prefix`, fetched lazily page by page.
    ///
    /// The stream is finite and cannot be restarted; call again to re-list.
    pub fn list_objects<'a>(&'a self, bucket: &'a str, prefix: &'a str) -> BoxStream<'a, Result<ObjectKey>> {
        enum Cursor {
            Start,
            Next(String),
            Done,
        }

        stream::try_unfold(Cursor::Start, move |cursor| async move {
            let continuation = match cursor {
                Cursor::Done => return Ok::<_, Error>(None),
                Cursor::Start => None,
                Cursor::Next(token) => Some(token),
            };
            let request = ListRequest::recursive(bucket, prefix)
                .with_max_keys(self.page_size)
                .with_continuation(continuation);
            let page = self.backend.list_page(&request).await?;
            debug!(bucket, prefix, keys = page.keys.len(), "listed object page");
            let next = match page.next_continuation {
                Some(token) => {
                    check_progress(bucket, prefix, request.continuation.as_deref(), &token)?;
                    Cursor::Next(token)
                }
                None => Cursor::Done,
            };
            let keys = stream::iter(page.keys.into_iter().map(|key| Ok::<_, Error>(ObjectKey::from(key))));
            Ok::<_, Error>(Some((keys, next)))
        })
        .try_flatten()
        .boxed()
    }

    /// The lexicographically greatest child of `prefix`.
    pub async fn latest_child(&self, bucket: &str, prefix: &str) -> Result<Prefix> {
        self.list_child_prefixes(bucket, prefix)
            .await?
            .pop_last()
            .ok_or_else(|| Error::EmptyHierarchy {
                bucket: bucket.to_string(),
                prefix: prefix.to_string(),
                level: None,
            })
    }

    /// Descend one level per entry of the partition scheme, taking the
    /// latest child each time.
    ///
    /// Children whose segment does not fit the level's width are ignored, so
    /// stray folders such as `_temporary/` never win the lexicographic race.
    pub async fn latest_batch(&self, bucket: &str, base_prefix: &str) -> Result<BatchLocation> {
        let mut current = Prefix::from(normalise_base(base_prefix));
        let mut path = Vec::with_capacity(self.scheme.depth());

        for (index, level) in self.scheme.levels().iter().enumerate() {
            let children = self.list_child_prefixes(bucket, current.as_str()).await?;
            let total = children.len();
            let latest = children
                .into_iter()
                .filter(|child| {
                    let accepted = level.accepts(child.last_segment());
                    if !accepted {
                        warn!(bucket, prefix = %child, level = %level.name, "ignoring partition that does not match the level format");
                    }
                    accepted
                })
                .last();

            let Some(latest) = latest else {
                return Err(Error::EmptyHierarchy {
                    bucket: bucket.to_string(),
                    prefix: current.into_string(),
                    level: Some(self.scheme.hierarchy_level(index)),
                });
            };
            debug!(bucket, level = %level.name, candidates = total, chosen = %latest, "descended partition level");
            path.push(latest.clone());
            current = latest;
        }

        info!(bucket, prefix = %current, "resolved latest batch");
        Ok(BatchLocation::new(bucket, current, path, self.scheme.clone()))
    }
}

/// A backend that hands back the token it was just given would be listed
/// forever.
fn check_progress(bucket: &str, prefix: &str, previous: Option<&str>, next: &str) -> Result<()> {
    if previous == Some(next) {
        return Err(Error::catalog(
            bucket,
            prefix,
            format!("backend repeated continuation token '{next}'"),
        ));
    }
    Ok(())
}

/// Listing `raw` with a delimiter would return `raw/` itself, so a
/// non-empty base always ends with the delimiter.
fn normalise_base(base_prefix: &str) -> String {
    if base_prefix.is_empty() || base_prefix.ends_with(DELIMITER) {
        base_prefix.to_string()
    } else {
        format!("{base_prefix}{DELIMITER}")
    }
}
