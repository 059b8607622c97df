//! Children listing and cascading delete over the flat key space.

use futures::future::{try_join_all, BoxFuture};
use futures::FutureExt;
use hoist_table::{Query, Row, RowFilter, TableBatch, TableStore};
use tracing::{debug, warn};

use crate::error::{StorageError, StorageResult};
use crate::keys::{self, RANGE_END};
use crate::pointer;

/// Pointers are followed at most this many hops deep.
const MAX_POINTER_DEPTH: usize = 1;

/// List the children of the row `parent_row_key` in `partition_key`.
///
/// Children are the rows whose key falls strictly inside `child_prefix`'s
/// range. A child that is a pointer is replaced by what a scan of the
/// pointed-at partition yields for the same prefix. The parent row itself is
/// not returned.
///
/// Fails with `NotFound` if the parent row does not exist, even when rows
/// inside its range do.
pub async fn children(
    table: &dyn TableStore,
    partition_key: &str,
    parent_row_key: &str,
    child_prefix: &str,
) -> StorageResult<Vec<Row>> {
    scan(
        table,
        partition_key.to_string(),
        parent_row_key.to_string(),
        child_prefix,
        0,
    )
    .await
}

fn scan<'a>(
    table: &'a dyn TableStore,
    partition_key: String,
    exact_row_key: String,
    child_prefix: &'a str,
    depth: usize,
) -> BoxFuture<'a, StorageResult<Vec<Row>>> {
    async move {
        let filter = RowFilter::Eq(exact_row_key.clone()).or(keys::children_range(child_prefix));
        let rows = table
            .query_all(Query::new(partition_key.clone(), filter))
            .await?;

        if !rows.iter().any(|row| row.row_key == exact_row_key) {
            if depth == 0 {
                return Err(StorageError::not_found(format!(
                    "nothing stored at {partition_key:?}/{exact_row_key:?}"
                )));
            }
            warn!(
                partition = %partition_key,
                row = %exact_row_key,
                orphans = rows.len(),
                "pointer target is gone"
            );
            return Ok(Vec::new());
        }

        let mut leaves = Vec::new();
        let mut hops = Vec::new();
        for row in rows {
            // The parent is the starting point of a top-level scan, and the
            // very row being looked for after a hop.
            if depth == 0 && row.row_key == exact_row_key {
                continue;
            }
            match pointer::target_of(&row) {
                Some(_) if depth >= MAX_POINTER_DEPTH => {
                    return Err(StorageError::other(format!(
                        "pointer at {:?}/{:?} names another pointer",
                        row.partition_key, row.row_key
                    )));
                }
                Some(target) => hops.push(scan(
                    table,
                    target.partition_key,
                    target.row_key,
                    child_prefix,
                    depth + 1,
                )),
                None => leaves.push(row),
            }
        }

        for nested in try_join_all(hops).await? {
            leaves.extend(nested);
        }
        Ok(leaves)
    }
    .boxed()
}

/// Delete an entity row and its whole subtree in one atomic batch.
///
/// Covers `entity_row_key` and every row key in `[prefix, prefix + "~")` of
/// the partition. Makes no write if nothing matches. Returns the number of
/// rows deleted.
pub async fn cascade_delete(
    table: &dyn TableStore,
    partition_key: &str,
    entity_row_key: &str,
    prefix: &str,
) -> StorageResult<usize> {
    let filter = RowFilter::Eq(entity_row_key.to_string())
        .or(RowFilter::from_until(prefix, format!("{prefix}{RANGE_END}")));
    let rows = table
        .query_all(Query::new(partition_key, filter))
        .await?;
    if rows.is_empty() {
        return Ok(0);
    }

    let mut batch = TableBatch::new(partition_key);
    for row in &rows {
        batch.delete(row.row_key.as_str());
    }
    let count = batch.len();
    table.submit_transaction(batch).await?;
    debug!(partition = partition_key, root = entity_row_key, count, "subtree deleted");
    Ok(count)
}
