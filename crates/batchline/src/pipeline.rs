use std::path::Path;
use std::sync::Arc;

use batchline_common::{ConfigProvider, ObjectKey, Prefix, Result, RowSet, DELIMITER};
use batchline_connector_objectstore::{
    upload_object, BatchLocation, ObjectCatalog, ObjectReader, ObjectStoreBackend, SkippedLine, StorageBackend,
};
use batchline_connector_warehouse::{PostgresWarehouse, Warehouse, WarehouseSink};
use batchline_secrets::{EnvSecretStore, FileSecretStore, SecretStore};
use futures::TryStreamExt;
use tracing::{debug, info};

use crate::config::{PipelineConfig, SecretSource};

/// The latest batch and the objects stored under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchListing {
    pub location: BatchLocation,
    pub objects: Vec<ObjectKey>,
}

/// What one ingest run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub batch: Prefix,
    pub objects_read: usize,
    pub rows_appended: u64,
    /// Lines dropped by a lenient read, with the object they came from.
    pub skipped: Vec<(ObjectKey, SkippedLine)>,
}

/// Storage, secrets and warehouse wired together for one configuration.
///
/// The warehouse credential is resolved for each warehouse operation and
/// handed straight to the sink; the pipeline itself never keeps it.
pub struct Pipeline {
    config: PipelineConfig,
    backend: Arc<dyn StorageBackend>,
    catalog: ObjectCatalog,
    reader: ObjectReader,
    secrets: Arc<dyn SecretStore>,
    warehouse: Arc<dyn Warehouse>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        backend: Arc<dyn StorageBackend>,
        secrets: Arc<dyn SecretStore>,
        warehouse: Arc<dyn Warehouse>,
    ) -> Self {
        let catalog = ObjectCatalog::new(backend.clone()).with_scheme(config.partition_scheme.clone());
        let reader = ObjectReader::new(backend.clone()).with_mode(config.parse_mode);
        Self {
            config,
            backend,
            catalog,
            reader,
            secrets,
            warehouse,
        }
    }

    /// Production wiring: S3 for storage, the configured secret source and a
    /// PostgreSQL-wire warehouse.
    pub fn from_config(provider: &dyn ConfigProvider) -> Result<Self> {
        let config = PipelineConfig::from_provider(provider)?;
        let backend = ObjectStoreBackend::s3_from_env(
            &config.bucket,
            &config.region_name,
            config.storage_endpoint.as_deref(),
        )?;
        let secrets: Arc<dyn SecretStore> = match &config.secret_source {
            SecretSource::Env => Arc::new(EnvSecretStore::new()),
            SecretSource::File(dir) => Arc::new(FileSecretStore::new(dir.clone())),
        };
        info!(
            bucket = %config.bucket,
            prefix = %config.prefix,
            table = %config.table,
            schema = %config.schema,
            secrets = %config.secret_source,
            "pipeline configured"
        );
        Ok(Self::new(config, Arc::new(backend), secrets, Arc::new(PostgresWarehouse::new())))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn latest_batch(&self) -> Result<BatchLocation> {
        self.catalog.latest_batch(&self.config.bucket, &self.config.prefix).await
    }

    pub async fn list_batch_objects(&self) -> Result<BatchListing> {
        let location = self.latest_batch().await?;
        let objects: Vec<ObjectKey> = self
            .catalog
            .list_objects(&self.config.bucket, location.prefix().as_str())
            .try_collect()
            .await?;
        debug!(batch = %location.prefix(), objects = objects.len(), "listed batch objects");
        Ok(BatchListing { location, objects })
    }

    /// Read every object of the latest batch, then append all of their rows
    /// to the configured table in one transaction. Nothing is written unless
    /// every object was read, so a failed run can be repeated as a whole.
    pub async fn ingest_latest(&self) -> Result<IngestReport> {
        let sink = self.sink().await?;
        let listing = self.list_batch_objects().await?;
        let mut report = IngestReport {
            batch: listing.location.prefix().clone(),
            objects_read: 0,
            rows_appended: 0,
            skipped: Vec::new(),
        };

        let mut rows = RowSet::new();
        for key in listing.objects {
            // Zero-byte folder markers.
            if key.as_str().ends_with(DELIMITER) {
                continue;
            }
            let object = self.reader.read(&self.config.bucket, &key, self.config.object_format).await?;
            debug!(key = %key, rows = object.rows.len(), "read batch object");
            rows.extend(object.rows);
            report.objects_read += 1;
            report.skipped.extend(object.skipped.into_iter().map(|line| (key.clone(), line)));
        }

        report.rows_appended = sink.append(&self.config.table, &self.config.schema, &rows).await?;
        info!(
            batch = %report.batch,
            objects = report.objects_read,
            rows = report.rows_appended,
            skipped = report.skipped.len(),
            "ingested latest batch"
        );
        Ok(report)
    }

    pub async fn query(&self, sql: &str) -> Result<RowSet> {
        self.sink().await?.query(sql).await
    }

    /// Store a local file under `key` in the configured bucket.
    pub async fn upload(&self, local: &Path, key: &ObjectKey) -> Result<usize> {
        upload_object(self.backend.as_ref(), &self.config.bucket, key, local).await
    }

    async fn sink(&self) -> Result<WarehouseSink> {
        let credential = self.secrets.resolve(&self.config.secret_name).await?;
        Ok(WarehouseSink::new(self.warehouse.clone(), credential, self.config.database.clone())
            .with_batch_size(self.config.batch_size))
    }
}
