//! In-process table emulator for tests and local development.
//!
//! [`InMemoryTableStore`] keeps every row in a `BTreeMap` ordered by
//! `(partition_key, row_key)`, so partition scans are ordinary range walks.
//! Failures are reported the way a hosted table service reports them: HTTP
//! status as the raw code and the vendor code in a structured payload.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use tracing::trace;

use crate::batch::{BatchOperation, TableBatch, UpdateMode};
use crate::error::{codes, TableError, TableResult};
use crate::query::Query;
use crate::row::Row;
use crate::traits::TableStore;

/// Largest accepted string property, in bytes.
pub const MAX_PROPERTY_BYTES: usize = 64 * 1024;

/// Largest accepted row, in bytes.
pub const MAX_ENTITY_BYTES: usize = 1024 * 1024;

/// Table name used by [`InMemoryTableStore::new`].
pub const DEFAULT_TABLE_NAME: &str = "storagev2";

type RowAddress = (String, String);

#[derive(Default)]
struct TableState {
    exists: bool,
    rows: BTreeMap<RowAddress, Row>,
    version: u64,
}

impl TableState {
    fn ensure_exists(&self) -> TableResult<()> {
        if self.exists {
            Ok(())
        } else {
            Err(TableError::odata(
                404,
                codes::TABLE_NOT_FOUND,
                "The table specified does not exist.",
            ))
        }
    }

    fn next_etag(&mut self) -> String {
        self.version += 1;
        format!("W/\"{}\"", self.version)
    }
}

/// An in-memory implementation of [`TableStore`].
///
/// Besides the trait, it offers a few hooks for tests: an operation counter
/// and injectable failures, either for one partition or for every call.
pub struct InMemoryTableStore {
    name: String,
    state: RwLock<TableState>,
    partition_faults: RwLock<HashMap<String, String>>,
    global_fault: RwLock<Option<String>>,
    operations: AtomicU64,
}

impl InMemoryTableStore {
    /// A store for [`DEFAULT_TABLE_NAME`] whose table has not been created yet.
    pub fn new() -> Self {
        Self::named(DEFAULT_TABLE_NAME)
    }

    /// A store bound to the table `name`, not yet created.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(TableState::default()),
            partition_faults: RwLock::new(HashMap::new()),
            global_fault: RwLock::new(None),
            operations: AtomicU64::new(0),
        }
    }

    /// A store whose table already exists.
    pub fn with_table() -> Self {
        let store = Self::new();
        store.write_state().exists = true;
        store
    }

    /// Number of trait calls made against this store.
    pub fn operation_count(&self) -> u64 {
        self.operations.load(Ordering::SeqCst)
    }

    /// Number of rows currently stored.
    pub fn row_count(&self) -> usize {
        self.read_state().rows.len()
    }

    /// Returns `true` if a row exists at the address.
    pub fn contains(&self, partition_key: &str, row_key: &str) -> bool {
        self.read_state()
            .rows
            .contains_key(&(partition_key.to_string(), row_key.to_string()))
    }

    /// Make every call touching `partition_key` fail with `code`.
    pub fn fail_partition(&self, partition_key: &str, code: &str) {
        self.partition_faults
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(partition_key.to_string(), code.to_string());
    }

    /// Make every call fail with `code`.
    pub fn fail_all(&self, code: &str) {
        *self
            .global_fault
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(code.to_string());
    }

    /// Remove every injected failure.
    pub fn clear_faults(&self) {
        self.partition_faults
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        *self
            .global_fault
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn read_state(&self) -> RwLockReadGuard<'_, TableState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, TableState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count the call and apply injected failures.
    fn begin(&self, partition_key: Option<&str>) -> TableResult<()> {
        self.operations.fetch_add(1, Ordering::SeqCst);
        let global = self
            .global_fault
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(code) = global {
            return Err(TableError::new(code, "injected failure"));
        }
        if let Some(pk) = partition_key {
            let faults = self
                .partition_faults
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(code) = faults.get(pk) {
                return Err(TableError::new(
                    code.clone(),
                    format!("injected failure on partition {pk:?}"),
                ));
            }
        }
        Ok(())
    }

    fn scan(&self, query: &Query) -> TableResult<Vec<Row>> {
        self.begin(Some(&query.partition_key))?;
        let state = self.read_state();
        state.ensure_exists()?;
        let start = (query.partition_key.clone(), String::new());
        let rows: Vec<Row> = state
            .rows
            .range(start..)
            .take_while(|((pk, _), _)| *pk == query.partition_key)
            .filter(|((_, rk), _)| query.rows.matches(rk))
            .map(|(_, row)| row.clone())
            .collect();
        trace!(partition = %query.partition_key, matched = rows.len(), "partition scanned");
        Ok(rows)
    }
}

impl Default for InMemoryTableStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryTableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.read_state();
        f.debug_struct("InMemoryTableStore")
            .field("name", &self.name)
            .field("exists", &state.exists)
            .field("row_count", &state.rows.len())
            .finish()
    }
}

fn not_found() -> TableError {
    TableError::odata(
        404,
        codes::RESOURCE_NOT_FOUND,
        "The specified resource does not exist.",
    )
}

fn check_size(row: &Row) -> TableResult<()> {
    for (name, value) in &row.properties {
        if value.encoded_len() > MAX_PROPERTY_BYTES {
            return Err(TableError::odata(
                400,
                codes::PROPERTY_VALUE_TOO_LARGE,
                &format!("The property value of {name:?} exceeds the maximum allowed size."),
            ));
        }
    }
    if row.encoded_len() > MAX_ENTITY_BYTES {
        return Err(TableError::odata(
            413,
            codes::ENTITY_TOO_LARGE,
            "The entity is larger than the maximum allowed size.",
        ));
    }
    Ok(())
}

fn updated(stored: &Row, row: Row, mode: UpdateMode) -> Row {
    match mode {
        UpdateMode::Replace => row,
        UpdateMode::Merge => {
            let mut merged = stored.clone();
            merged.properties.extend(row.properties);
            merged
        }
    }
}

#[async_trait]
impl TableStore for InMemoryTableStore {
    fn table_name(&self) -> &str {
        &self.name
    }

    async fn create_table(&self) -> TableResult<()> {
        self.begin(None)?;
        let mut state = self.write_state();
        if state.exists {
            return Err(TableError::odata(
                409,
                codes::TABLE_ALREADY_EXISTS,
                "The table specified already exists.",
            ));
        }
        state.exists = true;
        trace!(table = %self.name, "table created");
        Ok(())
    }

    async fn delete_table(&self) -> TableResult<()> {
        self.begin(None)?;
        let mut state = self.write_state();
        state.ensure_exists()?;
        state.exists = false;
        state.rows.clear();
        Ok(())
    }

    async fn create_entity(&self, mut row: Row) -> TableResult<()> {
        self.begin(Some(&row.partition_key))?;
        check_size(&row)?;
        let mut state = self.write_state();
        state.ensure_exists()?;
        let address = (row.partition_key.clone(), row.row_key.clone());
        if state.rows.contains_key(&address) {
            return Err(TableError::odata(
                409,
                codes::ENTITY_ALREADY_EXISTS,
                "The specified entity already exists.",
            ));
        }
        row.etag = Some(state.next_etag());
        state.rows.insert(address, row);
        Ok(())
    }

    async fn get_entity(&self, partition_key: &str, row_key: &str) -> TableResult<Row> {
        self.begin(Some(partition_key))?;
        let state = self.read_state();
        state.ensure_exists()?;
        state
            .rows
            .get(&(partition_key.to_string(), row_key.to_string()))
            .cloned()
            .ok_or_else(not_found)
    }

    async fn update_entity(&self, row: Row, mode: UpdateMode) -> TableResult<()> {
        self.begin(Some(&row.partition_key))?;
        let mut state = self.write_state();
        state.ensure_exists()?;
        let address = (row.partition_key.clone(), row.row_key.clone());
        let stored = state.rows.get(&address).ok_or_else(not_found)?;
        let mut next = updated(stored, row, mode);
        check_size(&next)?;
        next.etag = Some(state.next_etag());
        state.rows.insert(address, next);
        Ok(())
    }

    async fn delete_entity(&self, partition_key: &str, row_key: &str) -> TableResult<()> {
        self.begin(Some(partition_key))?;
        let mut state = self.write_state();
        state.ensure_exists()?;
        state
            .rows
            .remove(&(partition_key.to_string(), row_key.to_string()))
            .map(|_| ())
            .ok_or_else(not_found)
    }

    fn list_entities(&self, query: Query) -> BoxStream<'_, TableResult<Row>> {
        stream::once(async move { self.scan(&query) })
            .map_ok(|rows| stream::iter(rows.into_iter().map(Ok::<Row, TableError>)))
            .try_flatten()
            .boxed()
    }

    async fn submit_transaction(&self, batch: TableBatch) -> TableResult<()> {
        self.begin(Some(batch.partition_key()))?;
        let mut state = self.write_state();
        state.ensure_exists()?;

        // Validate and stage everything before touching the map.
        let mut seen = HashSet::new();
        let mut staged: Vec<(RowAddress, Option<Row>)> = Vec::with_capacity(batch.len());
        for operation in batch.operations() {
            if !seen.insert(operation.row_key()) {
                return Err(TableError::odata(
                    400,
                    codes::INVALID_DUPLICATE_ROW,
                    "The batch request contains multiple changes with the same row key.",
                ));
            }
            let address = (
                batch.partition_key().to_string(),
                operation.row_key().to_string(),
            );
            let stored = state.rows.get(&address).ok_or_else(not_found)?;
            match operation {
                BatchOperation::Delete { .. } => staged.push((address, None)),
                BatchOperation::Update { row, mode } => {
                    let next = updated(stored, row.clone(), *mode);
                    check_size(&next)?;
                    staged.push((address, Some(next)));
                }
            }
        }

        for (address, row) in staged {
            match row {
                None => {
                    state.rows.remove(&address);
                }
                Some(mut row) => {
                    row.etag = Some(state.next_etag());
                    state.rows.insert(address, row);
                }
            }
        }
        trace!(partition = %batch.partition_key(), operations = batch.len(), "batch applied");
        Ok(())
    }
}
