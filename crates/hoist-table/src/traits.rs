//! The [`TableStore`] trait defining the table storage interface.
//!
//! Any backend (emulator, vendor client) implements this trait. Backends
//! report failures in their own vocabulary through [`TableError`]; callers
//! decide what the codes mean.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::TryStreamExt;

use crate::batch::{TableBatch, UpdateMode};
use crate::error::TableResult;
use crate::query::Query;
use crate::row::Row;

/// A client bound to one table.
///
/// Implementations must be thread-safe (`Send + Sync`). Single-row
/// operations are atomic. Multi-row atomicity is only available through
/// [`TableStore::submit_transaction`], and only within one partition.
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Name of the table this client is bound to.
    fn table_name(&self) -> &str;

    /// Create the table. Fails with an "already exists" code if it does.
    async fn create_table(&self) -> TableResult<()>;

    /// Delete the table and every row in it.
    async fn delete_table(&self) -> TableResult<()>;

    /// Insert a row. Fails with an "already exists" code if a row with the
    /// same partition and row key is present.
    async fn create_entity(&self, row: Row) -> TableResult<()>;

    /// Read one row. Fails with a "not found" code if absent.
    async fn get_entity(&self, partition_key: &str, row_key: &str) -> TableResult<Row>;

    /// Update an existing row. Fails with a "not found" code if absent.
    async fn update_entity(&self, row: Row, mode: UpdateMode) -> TableResult<()>;

    /// Delete one row. Fails with a "not found" code if absent.
    async fn delete_entity(&self, partition_key: &str, row_key: &str) -> TableResult<()>;

    /// Scan one partition.
    ///
    /// The stream is lazy: nothing is fetched until it is polled. Each call
    /// starts a fresh scan, and every scan terminates.
    fn list_entities(&self, query: Query) -> BoxStream<'_, TableResult<Row>>;

    /// Apply every operation of `batch` atomically, or none of them.
    async fn submit_transaction(&self, batch: TableBatch) -> TableResult<()>;

    /// Scan one partition and collect the result.
    async fn query_all(&self, query: Query) -> TableResult<Vec<Row>> {
        self.list_entities(query).try_collect().await
    }
}
