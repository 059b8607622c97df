//! Partitioned key-value table store for Hoist.
//!
//! A table is a flat set of rows addressed by a two-part key: a coarse
//! *partition key* and a fine *row key*. Within one partition, rows sort by
//! row key, which makes range scans cheap. Across partitions nothing is
//! ordered and nothing is transactional.
//!
//! # Capabilities
//!
//! - Point reads and create-if-absent writes
//! - Merge and replace updates on existing rows
//! - Row-key range scans within one partition ([`Query`], [`RowFilter`])
//! - Atomic multi-row batches scoped to one partition ([`TableBatch`])
//!
//! # Storage Backends
//!
//! All backends implement the [`TableStore`] trait:
//!
//! - [`InMemoryTableStore`]: `BTreeMap`-based emulator for tests and local development
//!
//! Backend failures are reported as [`TableError`], which carries the raw
//! vendor code and, when the backend provides one, a structured JSON payload.
//! Interpreting those codes is left to the caller.

pub mod batch;
pub mod error;
pub mod memory;
pub mod query;
pub mod row;
pub mod traits;

pub use batch::{BatchOperation, TableBatch, UpdateMode};
pub use error::{codes, TableError, TableResult};
pub use memory::{InMemoryTableStore, DEFAULT_TABLE_NAME};
pub use query::{Query, RowFilter};
pub use row::{Property, Row};
pub use traits::TableStore;
