use std::sync::Arc;

use batchline_common::{BoxError, Credential, Error, Result, RowSet, Stage};
use tracing::{debug, info, warn};

use crate::connection::{Warehouse, WarehouseConnection};
use crate::sql::{insert_statements, qualified_table, Dialect};

/// Rows per `INSERT` round trip unless configured otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Appends row sets to warehouse tables and runs read queries.
///
/// Each call opens its own connection and closes it before returning,
/// whether the call succeeded or not. Appends never overwrite: rows are
/// only ever inserted, all batches of one call inside one transaction.
pub struct WarehouseSink {
    warehouse: Arc<dyn Warehouse>,
    credential: Credential,
    database: String,
    batch_size: usize,
}

impl WarehouseSink {
    pub fn new(warehouse: Arc<dyn Warehouse>, credential: Credential, database: impl Into<String>) -> Self {
        Self {
            warehouse,
            credential,
            database: database.into(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Insert every row of `rows` into `schema.table`, returning the number
    /// of rows written. An empty row set does not open a connection.
    pub async fn append(&self, table: &str, schema: &str, rows: &RowSet) -> Result<u64> {
        let dialect = Dialect::for_engine(&self.credential.engine);
        let statements = insert_statements(table, schema, rows, self.batch_size, dialect);
        let target = qualified_table(table, schema);
        if statements.is_empty() {
            if rows.is_empty() {
                debug!(table = %target, "nothing to append");
            } else {
                warn!(table = %target, dropped = rows.len(), "rows have no columns, nothing appended");
            }
            return Ok(0);
        }

        let mut connection = self.open(Stage::WarehouseWrite).await?;
        let written = write_batches(connection.as_mut(), &target, &statements).await;
        let written = release(connection, Stage::WarehouseWrite, written).await?;

        info!(table = %target, rows = written, batches = statements.len(), "appended rows");
        Ok(written)
    }

    /// Run a read query and return its rows.
    pub async fn query(&self, sql: &str) -> Result<RowSet> {
        let mut connection = self.open(Stage::WarehouseQuery).await?;
        let rows = connection
            .query(sql)
            .await
            .map_err(|e| Error::warehouse(Stage::WarehouseQuery, "running query", e));
        let rows = release(connection, Stage::WarehouseQuery, rows).await?;

        info!(rows = rows.len(), columns = rows.columns().len(), "query returned");
        Ok(rows)
    }

    async fn open(&self, stage: Stage) -> Result<Box<dyn WarehouseConnection>> {
        debug!(url = %self.credential.redacted_url(&self.database), "connecting to warehouse");
        self.warehouse
            .connect(&self.credential, &self.database)
            .await
            .map_err(|e| {
                Error::warehouse(
                    stage,
                    format!("connecting to {}", self.credential.redacted_url(&self.database)),
                    e,
                )
            })
    }
}

async fn write_batches(connection: &mut dyn WarehouseConnection, target: &str, statements: &[String]) -> Result<u64> {
    connection
        .execute("BEGIN")
        .await
        .map_err(|e| Error::warehouse(Stage::WarehouseWrite, "starting transaction", e))?;

    let mut written = 0;
    for (idx, statement) in statements.iter().enumerate() {
        match connection.execute(statement).await {
            Ok(count) => {
                written += count;
                debug!(table = target, batch = idx + 1, rows = count, "inserted batch");
            }
            Err(e) => {
                if let Err(rollback) = connection.execute("ROLLBACK").await {
                    warn!(table = target, error = %rollback, "rollback failed");
                }
                return Err(Error::warehouse(
                    Stage::WarehouseWrite,
                    format!("inserting batch {} of {} into {target}", idx + 1, statements.len()),
                    e,
                ));
            }
        }
    }

    connection
        .execute("COMMIT")
        .await
        .map_err(|e| Error::warehouse(Stage::WarehouseWrite, format!("committing into {target}"), e))?;
    Ok(written)
}

/// Close the connection on every path. A failure of the operation itself
/// wins over a failure to close.
async fn release<T>(mut connection: Box<dyn WarehouseConnection>, stage: Stage, outcome: Result<T>) -> Result<T> {
    let closed: std::result::Result<(), BoxError> = connection.close().await;
    match (outcome, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(Error::warehouse(stage, "closing connection", e)),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(e)) => {
            warn!(error = %e, "closing warehouse connection failed after an earlier error");
            Err(err)
        }
    }
}
