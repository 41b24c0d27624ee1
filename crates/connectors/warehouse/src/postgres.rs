//! PostgreSQL-wire warehouses (PostgreSQL itself, Redshift).

use async_trait::async_trait;
use batchline_common::{BoxError, Credential, Record, RowSet};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_postgres::{Client, NoTls, SimpleQueryMessage};
use tracing::{debug, error};

use crate::connection::{Warehouse, WarehouseConnection};

/// Engines spoken over the PostgreSQL wire protocol.
pub const SUPPORTED_ENGINES: &[&str] = &["postgres", "postgresql", "redshift"];

/// Connects with `tokio-postgres`. No pooling: every connect is a fresh
/// session that lives until the caller closes it.
#[derive(Debug, Clone)]
pub struct PostgresWarehouse {
    application_name: String,
}

impl Default for PostgresWarehouse {
    fn default() -> Self {
        Self {
            application_name: "batchline".to_string(),
        }
    }
}

impl PostgresWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn supports(engine: &str) -> bool {
        SUPPORTED_ENGINES.contains(&engine.to_ascii_lowercase().as_str())
    }
}

#[async_trait]
impl Warehouse for PostgresWarehouse {
    async fn connect(
        &self,
        credential: &Credential,
        database: &str,
    ) -> Result<Box<dyn WarehouseConnection>, BoxError> {
        if !Self::supports(&credential.engine) {
            return Err(format!(
                "unsupported engine '{}', expected one of {}",
                credential.engine,
                SUPPORTED_ENGINES.join(", ")
            )
            .into());
        }

        let mut config = tokio_postgres::Config::new();
        config
            .user(&credential.username)
            .password(&credential.password)
            .host(&credential.host)
            .port(credential.port)
            .dbname(database)
            .application_name(&self.application_name);

        let (client, connection) = config.connect(NoTls).await?;
        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "warehouse connection error");
            }
        });
        debug!(url = %credential.redacted_url(database), "opened warehouse connection");

        Ok(Box::new(PostgresConnection {
            client: Some(client),
            driver: Some(driver),
        }))
    }
}

pub struct PostgresConnection {
    client: Option<Client>,
    driver: Option<JoinHandle<()>>,
}

impl PostgresConnection {
    fn client(&self) -> Result<&Client, BoxError> {
        self.client.as_ref().ok_or_else(|| "connection is closed".into())
    }
}

#[async_trait]
impl WarehouseConnection for PostgresConnection {
    async fn execute(&mut self, sql: &str) -> Result<u64, BoxError> {
        Ok(self.client()?.execute(sql, &[]).await?)
    }

    async fn query(&mut self, sql: &str) -> Result<RowSet, BoxError> {
        let messages = self.client()?.simple_query(sql).await?;
        let mut rows = RowSet::new();
        for message in messages {
            if let SimpleQueryMessage::Row(row) = message {
                let record: Record = row
                    .columns()
                    .iter()
                    .enumerate()
                    .map(|(idx, column)| {
                        let value = row.get(idx).map(|v| Value::String(v.to_string())).unwrap_or(Value::Null);
                        (column.name().to_string(), value)
                    })
                    .collect();
                rows.push(record);
            }
        }
        Ok(rows)
    }

    async fn close(&mut self) -> Result<(), BoxError> {
        // Dropping the client ends the connection task.
        drop(self.client.take());
        if let Some(driver) = self.driver.take() {
            driver.await?;
        }
        debug!("closed warehouse connection");
        Ok(())
    }
}
