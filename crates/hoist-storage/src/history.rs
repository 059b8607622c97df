//! Bounded package history, one blob per deployment.
//!
//! The blob holds the JSON array of packages, oldest first. The deployment
//! row's `package` property mirrors the newest entry after every change.

use bytes::Bytes;
use hoist_blob::BlobStore;
use hoist_table::{TableStore, UpdateMode};
use hoist_types::Package;
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::keys::{self, Address};
use crate::mapper;

/// Most packages a deployment's history keeps.
pub const MAX_HISTORY_LENGTH: usize = 50;

/// Append `package`, clearing the rollout of the previous newest entry and
/// evicting the oldest entries beyond [`MAX_HISTORY_LENGTH`].
pub fn push_bounded(history: &mut Vec<Package>, package: Package) {
    if let Some(last) = history.last_mut() {
        last.rollout = None;
    }
    history.push(package);
    truncate_oldest(history);
}

fn truncate_oldest(history: &mut Vec<Package>) {
    if history.len() > MAX_HISTORY_LENGTH {
        let excess = history.len() - MAX_HISTORY_LENGTH;
        history.drain(..excess);
    }
}

/// Label for the next package: `v1` for an empty history, else one past the
/// numeric suffix of the newest label.
pub fn next_label(history: &[Package]) -> String {
    let last = history
        .last()
        .and_then(|p| p.label.strip_prefix('v'))
        .and_then(|n| n.parse::<u64>().ok())
        .unwrap_or(0);
    format!("v{}", last + 1)
}

/// Package history of the deployments stored in one blob container.
pub struct History<'a> {
    table: &'a dyn TableStore,
    blobs: &'a dyn BlobStore,
    container: &'a str,
}

impl<'a> History<'a> {
    pub fn new(table: &'a dyn TableStore, blobs: &'a dyn BlobStore, container: &'a str) -> Self {
        Self {
            table,
            blobs,
            container,
        }
    }

    pub async fn read(&self, deployment_id: &str) -> StorageResult<Vec<Package>> {
        keys::validate("deploymentId", deployment_id)?;
        let body = self
            .blobs
            .download_to_buffer(self.container, deployment_id)
            .await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn write(&self, deployment_id: &str, history: &[Package]) -> StorageResult<()> {
        let body = Bytes::from(serde_json::to_vec(history)?);
        self.blobs
            .upload_block_blob(self.container, deployment_id, body)
            .await?;
        Ok(())
    }

    /// Start an empty history for a new deployment.
    pub async fn create(&self, deployment_id: &str) -> StorageResult<()> {
        keys::validate("deploymentId", deployment_id)?;
        self.write(deployment_id, &[]).await
    }

    /// Append a package, assigning its label. Returns the stored package.
    pub async fn append(
        &self,
        app_id: &str,
        deployment_id: &str,
        mut package: Package,
    ) -> StorageResult<Package> {
        let at = keys::deployment_address(app_id, deployment_id)?;
        let mut history = self.read(deployment_id).await?;
        package.label = next_label(&history);
        push_bounded(&mut history, package.clone());

        self.sync_row(&at, history.last()).await?;
        self.write(deployment_id, &history).await?;
        debug!(app_id, deployment_id, label = %package.label, length = history.len(), "package appended");
        Ok(package)
    }

    /// Overwrite the history. Oversize input keeps its newest entries.
    pub async fn replace(
        &self,
        app_id: &str,
        deployment_id: &str,
        mut history: Vec<Package>,
    ) -> StorageResult<()> {
        let at = keys::deployment_address(app_id, deployment_id)?;
        if history.is_empty() {
            return Err(StorageError::invalid(
                "package history must not be empty; clear it instead",
            ));
        }
        truncate_oldest(&mut history);

        self.sync_row(&at, history.last()).await?;
        self.write(deployment_id, &history).await?;
        debug!(app_id, deployment_id, length = history.len(), "package history replaced");
        Ok(())
    }

    pub async fn clear(&self, app_id: &str, deployment_id: &str) -> StorageResult<()> {
        let at = keys::deployment_address(app_id, deployment_id)?;
        self.sync_row(&at, None).await?;
        self.write(deployment_id, &[]).await?;
        debug!(app_id, deployment_id, "package history cleared");
        Ok(())
    }

    /// Remove the history blob entirely.
    pub async fn delete(&self, deployment_id: &str) -> StorageResult<()> {
        keys::validate("deploymentId", deployment_id)?;
        self.blobs
            .delete_blob(self.container, deployment_id)
            .await?;
        Ok(())
    }

    /// Mirror the newest package onto the deployment row, or drop the
    /// mirror when there is none.
    async fn sync_row(&self, at: &Address, newest: Option<&Package>) -> StorageResult<()> {
        match newest {
            Some(package) => {
                let row = mapper::package_row(at, package)?;
                self.table.update_entity(row, UpdateMode::Merge).await?;
            }
            None => {
                let mut row = self.table.get_entity(&at.partition_key, &at.row_key).await?;
                if row.remove(mapper::PACKAGE).is_some() {
                    self.table.update_entity(row, UpdateMode::Replace).await?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use hoist_blob::InMemoryBlobStore;
    use hoist_table::{InMemoryTableStore, Row};

    const CONTAINER: &str = "packagehistoryv1";

    fn package(hash: &str, rollout: Option<u8>) -> Package {
        Package {
            package_hash: hash.into(),
            rollout,
            ..Default::default()
        }
    }

    async fn fixture() -> (InMemoryTableStore, InMemoryBlobStore) {
        let table = InMemoryTableStore::with_table();
        let blobs = InMemoryBlobStore::new();
        blobs.create_container(CONTAINER).await.unwrap();
        let at = keys::deployment_address("p1", "d1").unwrap();
        table
            .create_entity(Row::new(&at.partition_key, &at.row_key).with("name", "Staging"))
            .await
            .unwrap();
        History::new(&table, &blobs, CONTAINER)
            .create("d1")
            .await
            .unwrap();
        (table, blobs)
    }

    async fn stored_package(table: &InMemoryTableStore) -> Option<Package> {
        let at = keys::deployment_address("p1", "d1").unwrap();
        let row = table.get_entity(&at.partition_key, &at.row_key).await.unwrap();
        row.get_str(mapper::PACKAGE)
            .map(|json| serde_json::from_str(json).unwrap())
    }

    // -----------------------------------------------------------------------
    // Pure helpers
    // -----------------------------------------------------------------------

    #[test]
    fn labels() {
        assert_eq!(next_label(&[]), "v1");
        let mut p = package("h", None);
        p.label = "v9".into();
        assert_eq!(next_label(&[p.clone()]), "v10");
        p.label = "weird".into();
        assert_eq!(next_label(&[p]), "v1");
    }

    #[test]
    fn push_clears_previous_rollout() {
        let mut history = vec![package("a", Some(10)), package("b", Some(20))];
        push_bounded(&mut history, package("c", Some(30)));
        assert_eq!(history[0].rollout, Some(10));
        assert_eq!(history[1].rollout, None);
        assert_eq!(history[2].rollout, Some(30));
    }

    #[test]
    fn push_onto_full_history_evicts_oldest() {
        let mut history: Vec<Package> = (0..MAX_HISTORY_LENGTH)
            .map(|i| package(&format!("h{i}"), Some(5)))
            .collect();
        push_bounded(&mut history, package("new", None));
        assert_eq!(history.len(), MAX_HISTORY_LENGTH);
        assert_eq!(history[0].package_hash, "h1");
        assert_eq!(history[0].rollout, Some(5));
        assert_eq!(history[MAX_HISTORY_LENGTH - 2].rollout, None);
        assert_eq!(history[MAX_HISTORY_LENGTH - 1].package_hash, "new");
    }

    // -----------------------------------------------------------------------
    // Store
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn append_labels_and_mirrors() {
        let (table, blobs) = fixture().await;
        let history = History::new(&table, &blobs, CONTAINER);
        let first = history.append("p1", "d1", package("a", None)).await.unwrap();
        let second = history.append("p1", "d1", package("b", Some(50))).await.unwrap();
        assert_eq!(first.label, "v1");
        assert_eq!(second.label, "v2");

        let stored = history.read("d1").await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored_package(&table).await, Some(second));
    }

    #[tokio::test]
    async fn append_caps_length() {
        let (table, blobs) = fixture().await;
        let history = History::new(&table, &blobs, CONTAINER);
        for i in 0..MAX_HISTORY_LENGTH + 3 {
            history
                .append("p1", "d1", package(&format!("h{i}"), None))
                .await
                .unwrap();
        }
        let stored = history.read("d1").await.unwrap();
        assert_eq!(stored.len(), MAX_HISTORY_LENGTH);
        assert_eq!(stored[0].package_hash, "h3");
        assert_eq!(stored.last().unwrap().label, format!("v{}", MAX_HISTORY_LENGTH + 3));
    }

    #[tokio::test]
    async fn append_to_missing_deployment_fails() {
        let (table, blobs) = fixture().await;
        let history = History::new(&table, &blobs, CONTAINER);
        let err = history.append("p1", "nope", package("a", None)).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn replace_truncates_and_rejects_empty() {
        let (table, blobs) = fixture().await;
        let history = History::new(&table, &blobs, CONTAINER);
        let err = history.replace("p1", "d1", Vec::new()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Invalid);

        let long: Vec<Package> = (0..MAX_HISTORY_LENGTH + 5)
            .map(|i| package(&format!("h{i}"), None))
            .collect();
        history.replace("p1", "d1", long).await.unwrap();
        let stored = history.read("d1").await.unwrap();
        assert_eq!(stored.len(), MAX_HISTORY_LENGTH);
        assert_eq!(stored[0].package_hash, "h5");
        assert_eq!(
            stored_package(&table).await.map(|p| p.package_hash),
            Some(format!("h{}", MAX_HISTORY_LENGTH + 4))
        );
    }

    #[tokio::test]
    async fn clear_empties_blob_and_row() {
        let (table, blobs) = fixture().await;
        let history = History::new(&table, &blobs, CONTAINER);
        history.append("p1", "d1", package("a", None)).await.unwrap();
        history.clear("p1", "d1").await.unwrap();
        assert!(history.read("d1").await.unwrap().is_empty());
        assert_eq!(stored_package(&table).await, None);

        let at = keys::deployment_address("p1", "d1").unwrap();
        let row = table.get_entity(&at.partition_key, &at.row_key).await.unwrap();
        assert_eq!(row.get_str("name"), Some("Staging"));
    }

    #[tokio::test]
    async fn invalid_ids_make_no_calls() {
        let (table, blobs) = fixture().await;
        let (t, b) = (table.operation_count(), blobs.operation_count());
        let history = History::new(&table, &blobs, CONTAINER);
        assert!(history.append("p 1", "d1", package("a", None)).await.is_err());
        assert!(history.read("d*1").await.is_err());
        assert!(history.clear("p1", "d 1").await.is_err());
        assert_eq!(table.operation_count(), t);
        assert_eq!(blobs.operation_count(), b);
    }
}
