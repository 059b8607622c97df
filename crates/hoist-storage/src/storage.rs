use std::sync::Arc;

use bytes::Bytes;
use hoist_blob::{BlobStore, InMemoryBlobStore};
use hoist_table::{InMemoryTableStore, TableStore};
use tracing::{debug, warn};

use crate::config::{StorageConfig, ENV_EMULATED};
use crate::error::{ErrorCode, StorageError, StorageResult};
use crate::history::History;
use crate::keys;
use crate::lifecycle::{Backends, Containers, Lifecycle, Status};

/// Entity-level storage for accounts, apps, deployments, and packages.
///
/// Operations are spread over several files, one per entity, each adding an
/// `impl Storage` block. All of them wait for provisioning to finish first.
pub struct Storage {
    lifecycle: Lifecycle,
    config: StorageConfig,
}

impl Storage {
    /// Storage over caller-supplied stores.
    ///
    /// The table client is expected to be bound to `config.table_name`; a
    /// mismatch is logged and the client's own table wins.
    pub fn new(
        table: Arc<dyn TableStore>,
        blobs: Arc<dyn BlobStore>,
        config: StorageConfig,
    ) -> Self {
        if table.table_name() != config.table_name {
            warn!(
                configured = %config.table_name,
                bound = table.table_name(),
                "table client is bound to a different table"
            );
        }
        let containers = Containers {
            blob: config.blob_container.clone(),
            history: config.history_container.clone(),
        };
        Self {
            lifecycle: Lifecycle::new(Backends::new(table, blobs), containers),
            config,
        }
    }

    /// Storage backed by fresh in-process emulators.
    pub fn emulated(config: StorageConfig) -> Self {
        let blobs = InMemoryBlobStore::with_endpoint(config.emulator_blob_endpoint.as_str());
        Self::new(
            Arc::new(InMemoryTableStore::named(config.table_name.as_str())),
            Arc::new(blobs),
            config,
        )
    }

    /// Storage for a resolved configuration.
    ///
    /// Only the emulated backend ships with this crate; hosted backends are
    /// wired in through [`Storage::new`].
    pub fn from_config(config: StorageConfig) -> StorageResult<Self> {
        config.validate()?;
        if config.emulated {
            Ok(Self::emulated(config))
        } else {
            Err(StorageError::invalid(format!(
                "no hosted backend is linked into this build; set {ENV_EMULATED}=1 \
                 or construct Storage::new with your own stores"
            )))
        }
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn status(&self) -> Status {
        self.lifecycle.status()
    }

    pub(crate) async fn backends(&self) -> StorageResult<Arc<Backends>> {
        self.lifecycle.ready().await
    }

    pub(crate) fn history<'a>(&'a self, backends: &'a Backends) -> History<'a> {
        History::new(
            backends.table.as_ref(),
            backends.blobs.as_ref(),
            &self.config.history_container,
        )
    }

    // -----------------------------------------------------------------------
    // Administration
    // -----------------------------------------------------------------------

    pub async fn check_health(&self) -> StorageResult<()> {
        self.lifecycle.check_health().await
    }

    /// Provision again with new backend handles, e.g. after a credential
    /// rotation.
    pub async fn reinitialize(
        &self,
        table: Arc<dyn TableStore>,
        blobs: Arc<dyn BlobStore>,
    ) -> StorageResult<()> {
        self.lifecycle
            .reinitialize(Backends::new(table, blobs))
            .await
    }

    /// Delete every table row and blob. The next operation provisions anew.
    pub async fn drop_all(&self) -> StorageResult<()> {
        self.lifecycle.drop_all().await
    }

    // -----------------------------------------------------------------------
    // Package blobs
    // -----------------------------------------------------------------------

    pub async fn add_blob(&self, blob_id: &str, body: Bytes) -> StorageResult<String> {
        keys::validate("blobId", blob_id)?;
        let backends = self.backends().await?;
        let size = body.len();
        backends
            .blobs
            .upload_block_blob(&self.config.blob_container, blob_id, body)
            .await?;
        debug!(blob_id, size, "blob added");
        Ok(blob_id.to_string())
    }

    pub async fn get_blob_url(&self, blob_id: &str) -> StorageResult<String> {
        keys::validate("blobId", blob_id)?;
        let backends = self.backends().await?;
        Ok(backends.blobs.blob_url(&self.config.blob_container, blob_id))
    }

    pub async fn remove_blob(&self, blob_id: &str) -> StorageResult<()> {
        keys::validate("blobId", blob_id)?;
        let backends = self.backends().await?;
        backends
            .blobs
            .delete_blob(&self.config.blob_container, blob_id)
            .await?;
        debug!(blob_id, "blob removed");
        Ok(())
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("lifecycle", &self.lifecycle)
            .field("config", &self.config.redacted())
            .finish()
    }
}

/// Log a failed cleanup step and carry on. Missing targets count as done.
pub(crate) fn swallow(step: &str, target: &str, result: StorageResult<()>) {
    match result {
        Ok(()) => {}
        Err(err) if err.is(ErrorCode::NotFound) => {}
        Err(err) => warn!(step, target, error = %err, "best-effort cleanup failed"),
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Emulated storage plus direct handles to its emulators.
    pub(crate) struct Fixture {
        pub storage: Storage,
        pub table: Arc<InMemoryTableStore>,
        pub blobs: Arc<InMemoryBlobStore>,
    }

    pub(crate) fn fixture() -> Fixture {
        let table = Arc::new(InMemoryTableStore::new());
        let blobs = Arc::new(InMemoryBlobStore::new());
        let storage = Storage::new(table.clone(), blobs.clone(), StorageConfig::emulated());
        Fixture {
            storage,
            table,
            blobs,
        }
    }

    /// Provisioned storage with a fresh account for `email`. Returns the id.
    pub(crate) async fn with_account(email: &str) -> (Fixture, String) {
        let fx = fixture();
        let id = fx
            .storage
            .add_account(&hoist_types::Account::new(email, "Test", 1))
            .await
            .unwrap();
        (fx, id)
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::fixture;
    use super::*;

    #[tokio::test]
    async fn blobs_round_trip() {
        let fx = fixture();
        let id = fx
            .storage
            .add_blob("b1", Bytes::from_static(b"zip"))
            .await
            .unwrap();
        assert_eq!(id, "b1");
        assert!(fx.blobs.contains("storagev2", "b1"));
        assert_eq!(
            fx.storage.get_blob_url("b1").await.unwrap(),
            format!("{}/storagev2/b1", hoist_blob::DEFAULT_EMULATOR_ENDPOINT)
        );
        fx.storage.remove_blob("b1").await.unwrap();
        let err = fx.storage.remove_blob("b1").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn first_operation_provisions() {
        let fx = fixture();
        assert_eq!(fx.storage.status(), Status::Uninitialized);
        fx.storage.check_health().await.unwrap();
        assert_eq!(fx.storage.status(), Status::Ready);
    }

    #[tokio::test]
    async fn invalid_blob_id_makes_no_calls() {
        let fx = fixture();
        let err = fx.storage.add_blob("a b", Bytes::new()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Invalid);
        assert_eq!(fx.blobs.operation_count(), 0);
        assert_eq!(fx.table.operation_count(), 0);
    }

    #[test]
    fn hosted_config_is_refused() {
        let config = StorageConfig {
            account: Some("acct".into()),
            access_key: Some("key".into()),
            ..StorageConfig::default()
        };
        let err = Storage::from_config(config).unwrap_err();
        assert_eq!(err.code, ErrorCode::Invalid);
        assert!(Storage::from_config(StorageConfig::emulated()).is_ok());
    }

    #[tokio::test]
    async fn emulated_table_follows_config() {
        let config = StorageConfig {
            table_name: "releases".into(),
            ..StorageConfig::emulated()
        };
        let storage = Storage::emulated(config);
        let backends = storage.backends().await.unwrap();
        assert_eq!(backends.table.table_name(), "releases");
    }

    #[tokio::test]
    async fn drop_all_then_reprovision() {
        let fx = fixture();
        fx.storage.add_blob("b1", Bytes::from("x")).await.unwrap();
        fx.storage.drop_all().await.unwrap();
        assert_eq!(fx.storage.status(), Status::Uninitialized);
        fx.storage.check_health().await.unwrap();
        assert!(!fx.blobs.contains("storagev2", "b1"));
    }

    #[tokio::test]
    async fn reinitialize_with_new_stores() {
        let fx = fixture();
        fx.storage.check_health().await.unwrap();
        let table = Arc::new(InMemoryTableStore::new());
        fx.storage
            .reinitialize(table.clone(), fx.blobs.clone())
            .await
            .unwrap();
        assert!(table.contains(keys::HEALTH, keys::HEALTH));
    }
}
