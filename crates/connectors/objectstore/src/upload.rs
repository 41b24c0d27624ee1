use std::path::Path;

use batchline_common::{Error, ObjectKey, Result};
use bytes::Bytes;
use tracing::info;

use crate::backend::StorageBackend;

/// Store the contents of a local file as one object. Returns the byte count.
pub async fn upload_object(backend: &dyn StorageBackend, bucket: &str, key: &ObjectKey, path: &Path) -> Result<usize> {
    let body = tokio::fs::read(path).await.map_err(|e| Error::object(bucket, key.as_str(), e))?;
    let size = body.len();
    backend.put_object(bucket, key.as_str(), Bytes::from(body)).await?;
    info!(bucket, key = %key, source = %path.display(), bytes = size, "uploaded object");
    Ok(size)
}
