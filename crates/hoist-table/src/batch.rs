//! Atomic multi-row batches scoped to a single partition.

use crate::error::{codes, TableError, TableResult};
use crate::row::Row;

/// How an update treats properties absent from the new row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateMode {
    /// Absent properties keep their stored values.
    Merge,
    /// The stored row is replaced wholesale.
    Replace,
}

/// One operation inside a [`TableBatch`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchOperation {
    Delete { row_key: String },
    Update { row: Row, mode: UpdateMode },
}

impl BatchOperation {
    pub fn row_key(&self) -> &str {
        match self {
            Self::Delete { row_key } => row_key,
            Self::Update { row, .. } => &row.row_key,
        }
    }
}

/// A set of operations on one partition, applied all-or-nothing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableBatch {
    partition_key: String,
    operations: Vec<BatchOperation>,
}

impl TableBatch {
    pub fn new(partition_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            operations: Vec::new(),
        }
    }

    pub fn delete(&mut self, row_key: impl Into<String>) {
        self.operations.push(BatchOperation::Delete {
            row_key: row_key.into(),
        });
    }

    /// Queue an update. Fails if the row belongs to another partition.
    pub fn update(&mut self, row: Row, mode: UpdateMode) -> TableResult<()> {
        if row.partition_key != self.partition_key {
            return Err(TableError::new(
                codes::BATCH_PARTITION_MISMATCH,
                format!(
                    "row in partition {:?} cannot join a batch on {:?}",
                    row.partition_key, self.partition_key
                ),
            ));
        }
        self.operations.push(BatchOperation::Update { row, mode });
        Ok(())
    }

    pub fn partition_key(&self) -> &str {
        &self.partition_key
    }

    pub fn operations(&self) -> &[BatchOperation] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_operations() {
        let mut batch = TableBatch::new("p");
        assert!(batch.is_empty());
        batch.delete("a");
        batch
            .update(Row::new("p", "b"), UpdateMode::Merge)
            .unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.operations()[1].row_key(), "b");
    }

    #[test]
    fn rejects_foreign_partition() {
        let mut batch = TableBatch::new("p");
        let err = batch
            .update(Row::new("q", "b"), UpdateMode::Replace)
            .unwrap_err();
        assert_eq!(err.code, codes::BATCH_PARTITION_MISMATCH);
        assert!(batch.is_empty());
    }
}
