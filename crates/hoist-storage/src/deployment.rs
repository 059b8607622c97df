use hoist_table::UpdateMode;
use hoist_types::{generate_id, Deployment, DeploymentInfo};
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::hierarchy;
use crate::keys;
use crate::lifecycle::Backends;
use crate::mapper;
use crate::pointer;
use crate::storage::{swallow, Storage};

impl Storage {
    /// Add a deployment to an app and return its id.
    ///
    /// Writes, in order: the deployment-key pointer (which makes the key
    /// unique), the deployment row, and an empty history. Anything already
    /// written is removed again if a later step fails.
    pub async fn add_deployment(
        &self,
        account_id: &str,
        app_id: &str,
        deployment: &Deployment,
    ) -> StorageResult<String> {
        keys::validate("accountId", account_id)?;
        let deployment_id = generate_id();
        let app_at = keys::app_address(app_id)?;
        let row_at = keys::deployment_address(app_id, &deployment_id)?;
        let key_at = keys::deployment_key_address(&deployment.key)?;
        let backends = self.backends().await?;
        let table = backends.table.as_ref();

        table.get_entity(&app_at.partition_key, &app_at.row_key).await?;
        let info = DeploymentInfo {
            app_id: app_id.to_string(),
            deployment_id: deployment_id.clone(),
        };
        table
            .create_entity(pointer::deployment_row(&key_at, &info))
            .await?;

        let mut stored = deployment.clone();
        stored.id = deployment_id.clone();
        stored.package = None;
        let written: StorageResult<()> = async {
            table
                .create_entity(mapper::deployment_row(&row_at, &stored))
                .await?;
            self.history(&backends).create(&deployment_id).await
        }
        .await;
        if let Err(err) = written {
            let (row, key) = tokio::join!(
                table.delete_entity(&row_at.partition_key, &row_at.row_key),
                table.delete_entity(&key_at.partition_key, &key_at.row_key),
            );
            swallow("remove deployment", &deployment_id, row.map_err(Into::into));
            swallow("remove deployment key", &deployment_id, key.map_err(Into::into));
            return Err(err);
        }

        debug!(account_id, app_id, deployment_id = %deployment_id, "deployment added");
        Ok(deployment_id)
    }

    pub async fn get_deployment(
        &self,
        account_id: &str,
        app_id: &str,
        deployment_id: &str,
    ) -> StorageResult<Deployment> {
        keys::validate("accountId", account_id)?;
        let at = keys::deployment_address(app_id, deployment_id)?;
        let backends = self.backends().await?;
        let row = backends
            .table
            .get_entity(&at.partition_key, &at.row_key)
            .await?;
        mapper::deployment_from_row(&row)
    }

    /// Every deployment of an app. Fails with `NotFound` if the app does not
    /// exist.
    pub async fn get_deployments(&self, account_id: &str, app_id: &str) -> StorageResult<Vec<Deployment>> {
        keys::validate("accountId", account_id)?;
        let at = keys::app_address(app_id)?;
        let prefix = keys::app_prefix(app_id)?;
        let backends = self.backends().await?;
        let rows =
            hierarchy::children(backends.table.as_ref(), &at.partition_key, &at.row_key, &prefix)
                .await?;
        rows.iter()
            .filter(|row| keys::is_deployment_key(&row.row_key))
            .map(mapper::deployment_from_row)
            .collect()
    }

    /// Resolve a deployment key to its app and deployment.
    pub async fn get_deployment_info(&self, deployment_key: &str) -> StorageResult<DeploymentInfo> {
        keys::deployment_key_address(deployment_key)?;
        let backends = self.backends().await?;
        pointer::resolve_deployment(backends.table.as_ref(), deployment_key).await
    }

    /// Merge the deployment's name and key. A new key gets a new pointer
    /// before the old one is dropped; if the merge fails the new pointer is
    /// removed again.
    pub async fn update_deployment(
        &self,
        account_id: &str,
        app_id: &str,
        deployment: &Deployment,
    ) -> StorageResult<()> {
        keys::validate("accountId", account_id)?;
        let at = keys::deployment_address(app_id, &deployment.id)?;
        let new_key_at = keys::deployment_key_address(&deployment.key)?;
        let backends = self.backends().await?;
        let table = backends.table.as_ref();

        let stored = mapper::deployment_from_row(
            &table.get_entity(&at.partition_key, &at.row_key).await?,
        )?;
        let rekeyed = stored.key != deployment.key;
        if rekeyed {
            let info = DeploymentInfo {
                app_id: app_id.to_string(),
                deployment_id: deployment.id.clone(),
            };
            table
                .create_entity(pointer::deployment_row(&new_key_at, &info))
                .await?;
        }
        if let Err(err) = table
            .update_entity(mapper::deployment_update_row(&at, deployment), UpdateMode::Merge)
            .await
        {
            if rekeyed {
                let undo = table
                    .delete_entity(&new_key_at.partition_key, &new_key_at.row_key)
                    .await;
                swallow("remove deployment key", &deployment.id, undo.map_err(Into::into));
            }
            return Err(err.into());
        }
        if rekeyed {
            let old_key_at = keys::deployment_key_address(&stored.key)?;
            let undo = table
                .delete_entity(&old_key_at.partition_key, &old_key_at.row_key)
                .await;
            swallow("remove deployment key", &deployment.id, undo.map_err(Into::into));
        }
        debug!(account_id, app_id, deployment_id = %deployment.id, rekeyed, "deployment updated");
        Ok(())
    }

    /// Delete a deployment, its key pointer, and its history.
    pub async fn remove_deployment(
        &self,
        account_id: &str,
        app_id: &str,
        deployment_id: &str,
    ) -> StorageResult<()> {
        keys::validate("accountId", account_id)?;
        let at = keys::deployment_address(app_id, deployment_id)?;
        let prefix = keys::deployment_prefix(app_id, deployment_id)?;
        let backends = self.backends().await?;
        let table = backends.table.as_ref();

        let stored = mapper::deployment_from_row(
            &table.get_entity(&at.partition_key, &at.row_key).await?,
        )?;
        hierarchy::cascade_delete(table, &at.partition_key, &at.row_key, &prefix).await?;
        self.forget_deployment(&backends, &stored).await;
        debug!(account_id, app_id, deployment_id, "deployment removed");
        Ok(())
    }

    /// Best-effort removal of what a deployment leaves outside its app
    /// partition.
    pub(crate) async fn forget_deployment(&self, backends: &Backends, deployment: &Deployment) {
        let key_removal = async {
            let at = keys::deployment_key_address(&deployment.key)?;
            backends
                .table
                .delete_entity(&at.partition_key, &at.row_key)
                .await
                .map_err(StorageError::from)
        };
        let store = self.history(backends);
        let (key, history) = tokio::join!(key_removal, store.delete(&deployment.id));
        swallow("remove deployment key", &deployment.id, key);
        swallow("remove package history", &deployment.id, history);
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ErrorCode;
    use crate::keys;
    use crate::storage::fixtures::{with_account, Fixture};
    use hoist_types::{App, Deployment};

    async fn app(fx: &Fixture, owner: &str) -> String {
        fx.storage
            .add_app(owner, &App::new("demo", 1))
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn add_and_get() {
        let (fx, owner) = with_account("owner@x.io").await;
        let app_id = app(&fx, &owner).await;
        let id = fx
            .storage
            .add_deployment(&owner, &app_id, &Deployment::new("Staging", "k1", 5))
            .await
            .unwrap();

        let stored = fx.storage.get_deployment(&owner, &app_id, &id).await.unwrap();
        assert_eq!(stored.id, id);
        assert_eq!(stored.name, "Staging");
        assert_eq!(stored.package, None);

        let info = fx.storage.get_deployment_info("k1").await.unwrap();
        assert_eq!(info.app_id, app_id);
        assert_eq!(info.deployment_id, id);

        assert!(fx.blobs.contains("packagehistoryv1", &id));
        assert!(fx
            .storage
            .get_package_history(&owner, &app_id, &id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn listing() {
        let (fx, owner) = with_account("owner@x.io").await;
        let app_id = app(&fx, &owner).await;
        assert!(fx.storage.get_deployments(&owner, &app_id).await.unwrap().is_empty());

        for (name, key) in [("Staging", "k1"), ("Production", "k2")] {
            fx.storage
                .add_deployment(&owner, &app_id, &Deployment::new(name, key, 1))
                .await
                .unwrap();
        }
        let mut names: Vec<_> = fx
            .storage
            .get_deployments(&owner, &app_id)
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["Production", "Staging"]);

        let err = fx.storage.get_deployments(&owner, "nope").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn keys_are_unique() {
        let (fx, owner) = with_account("owner@x.io").await;
        let app_id = app(&fx, &owner).await;
        fx.storage
            .add_deployment(&owner, &app_id, &Deployment::new("Staging", "k1", 1))
            .await
            .unwrap();
        let rows = fx.table.row_count();
        let err = fx
            .storage
            .add_deployment(&owner, &app_id, &Deployment::new("Other", "k1", 1))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::AlreadyExists);
        assert_eq!(fx.table.row_count(), rows);
    }

    #[tokio::test]
    async fn failed_history_write_rolls_back() {
        let (fx, owner) = with_account("owner@x.io").await;
        let app_id = app(&fx, &owner).await;
        fx.blobs.fail_container("packagehistoryv1", "ECONNRESET");
        let rows = fx.table.row_count();
        let err = fx
            .storage
            .add_deployment(&owner, &app_id, &Deployment::new("Staging", "k1", 1))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ConnectionFailed);
        assert_eq!(fx.table.row_count(), rows);
        assert_eq!(
            fx.storage.get_deployment_info("k1").await.unwrap_err().code,
            ErrorCode::NotFound
        );
    }

    #[tokio::test]
    async fn deployment_needs_app() {
        let (fx, owner) = with_account("owner@x.io").await;
        let err = fx
            .storage
            .add_deployment(&owner, "ghost", &Deployment::new("Staging", "k1", 1))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn update_renames_and_rekeys() {
        let (fx, owner) = with_account("owner@x.io").await;
        let app_id = app(&fx, &owner).await;
        let id = fx
            .storage
            .add_deployment(&owner, &app_id, &Deployment::new("Staging", "k1", 1))
            .await
            .unwrap();

        let mut changed = fx.storage.get_deployment(&owner, &app_id, &id).await.unwrap();
        changed.name = "QA".into();
        changed.key = "k2".into();
        fx.storage.update_deployment(&owner, &app_id, &changed).await.unwrap();

        let stored = fx.storage.get_deployment(&owner, &app_id, &id).await.unwrap();
        assert_eq!(stored.name, "QA");
        assert_eq!(stored.created_time, 1);
        assert_eq!(fx.storage.get_deployment_info("k2").await.unwrap().deployment_id, id);
        assert_eq!(
            fx.storage.get_deployment_info("k1").await.unwrap_err().code,
            ErrorCode::NotFound
        );
    }

    #[tokio::test]
    async fn failed_rekey_removes_new_key() {
        let (fx, owner) = with_account("owner@x.io").await;
        let app_id = app(&fx, &owner).await;
        let id = fx
            .storage
            .add_deployment(&owner, &app_id, &Deployment::new("Staging", "k1", 1))
            .await
            .unwrap();

        let mut changed = fx.storage.get_deployment(&owner, &app_id, &id).await.unwrap();
        changed.name = "x".repeat(hoist_table::memory::MAX_PROPERTY_BYTES + 1);
        changed.key = "k2".into();
        assert!(fx.storage.update_deployment(&owner, &app_id, &changed).await.is_err());

        let k2 = keys::deployment_key_address("k2").unwrap();
        assert!(!fx.table.contains(&k2.partition_key, &k2.row_key));
        assert_eq!(fx.storage.get_deployment_info("k1").await.unwrap().deployment_id, id);
        assert_eq!(
            fx.storage.get_deployment(&owner, &app_id, &id).await.unwrap().key,
            "k1"
        );

        changed.name = "QA".into();
        fx.storage.update_deployment(&owner, &app_id, &changed).await.unwrap();
        assert_eq!(fx.storage.get_deployment_info("k2").await.unwrap().deployment_id, id);
    }

    #[tokio::test]
    async fn remove_cleans_up() {
        let (fx, owner) = with_account("owner@x.io").await;
        let app_id = app(&fx, &owner).await;
        let keep = fx
            .storage
            .add_deployment(&owner, &app_id, &Deployment::new("Production", "k0", 1))
            .await
            .unwrap();
        let id = fx
            .storage
            .add_deployment(&owner, &app_id, &Deployment::new("Staging", "k1", 1))
            .await
            .unwrap();

        fx.storage.remove_deployment(&owner, &app_id, &id).await.unwrap();
        assert_eq!(
            fx.storage.get_deployment(&owner, &app_id, &id).await.unwrap_err().code,
            ErrorCode::NotFound
        );
        assert!(!fx.blobs.contains("packagehistoryv1", &id));
        assert!(fx.storage.get_deployment_info("k1").await.is_err());

        let left = fx.storage.get_deployments(&owner, &app_id).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, keep);

        assert_eq!(
            fx.storage.remove_deployment(&owner, &app_id, &id).await.unwrap_err().code,
            ErrorCode::NotFound
        );
    }

    #[tokio::test]
    async fn invalid_ids_make_no_calls() {
        let (fx, owner) = with_account("owner@x.io").await;
        let app_id = app(&fx, &owner).await;
        let (t, b) = (fx.table.operation_count(), fx.blobs.operation_count());
        let bad = Deployment::new("Staging", "has space", 1);
        assert_eq!(
            fx.storage.add_deployment(&owner, &app_id, &bad).await.unwrap_err().code,
            ErrorCode::Invalid
        );
        assert_eq!(
            fx.storage.get_deployment(&owner, &app_id, "d*").await.unwrap_err().code,
            ErrorCode::Invalid
        );
        assert_eq!(
            fx.storage.get_deployment_info("a b").await.unwrap_err().code,
            ErrorCode::Invalid
        );
        assert!(keys::deployment_key_address("a*b").is_err());
        assert_eq!(fx.table.operation_count(), t);
        assert_eq!(fx.blobs.operation_count(), b);
    }
}
