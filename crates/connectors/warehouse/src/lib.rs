//! Warehouse connector
//!
//! Appends row sets to warehouse tables and reads query results back,
//! opening and releasing one connection per operation.

pub mod connection;
pub mod postgres;
pub mod sink;
pub mod sql;

pub use connection::{Warehouse, WarehouseConnection};
pub use postgres::PostgresWarehouse;
pub use sink::{WarehouseSink, DEFAULT_BATCH_SIZE};
pub use sql::Dialect;
