use async_trait::async_trait;
use batchline_common::{BoxError, Credential, RowSet};

/// An open warehouse session.
///
/// Errors are the driver's own; the sink wraps them with the stage and
/// statement they belong to.
#[async_trait]
pub trait WarehouseConnection: Send {
    /// Run a statement, returning the number of rows it affected.
    async fn execute(&mut self, sql: &str) -> Result<u64, BoxError>;

    /// Run a read query. Values come back as text, SQL `NULL` as JSON null.
    async fn query(&mut self, sql: &str) -> Result<RowSet, BoxError>;

    /// Release the session. Further calls fail.
    async fn close(&mut self) -> Result<(), BoxError>;
}

/// Opens warehouse sessions from a resolved credential.
#[async_trait]
pub trait Warehouse: Send + Sync {
    async fn connect(&self, credential: &Credential, database: &str) -> Result<Box<dyn WarehouseConnection>, BoxError>;
}
