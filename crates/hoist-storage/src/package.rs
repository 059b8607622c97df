use hoist_types::Package;

use crate::error::StorageResult;
use crate::keys;
use crate::pointer;
use crate::storage::Storage;

impl Storage {
    /// Release `package` to a deployment.
    ///
    /// The package gets the next label and is stamped with the committing
    /// account's email. Returns the package as stored.
    pub async fn commit_package(
        &self,
        account_id: &str,
        app_id: &str,
        deployment_id: &str,
        package: &Package,
    ) -> StorageResult<Package> {
        keys::deployment_address(app_id, deployment_id)?;
        let account = self.get_account(account_id).await?;
        let backends = self.backends().await?;

        let mut package = package.clone();
        package.released_by = Some(account.email);
        self.history(&backends)
            .append(app_id, deployment_id, package)
            .await
    }

    /// Packages of a deployment, oldest first.
    pub async fn get_package_history(
        &self,
        account_id: &str,
        app_id: &str,
        deployment_id: &str,
    ) -> StorageResult<Vec<Package>> {
        keys::validate("accountId", account_id)?;
        keys::deployment_address(app_id, deployment_id)?;
        let backends = self.backends().await?;
        self.history(&backends).read(deployment_id).await
    }

    pub async fn get_package_history_from_deployment_key(
        &self,
        deployment_key: &str,
    ) -> StorageResult<Vec<Package>> {
        keys::deployment_key_address(deployment_key)?;
        let backends = self.backends().await?;
        let info = pointer::resolve_deployment(backends.table.as_ref(), deployment_key).await?;
        self.history(&backends).read(&info.deployment_id).await
    }

    /// Overwrite a deployment's history, e.g. after editing a release.
    pub async fn update_package_history(
        &self,
        account_id: &str,
        app_id: &str,
        deployment_id: &str,
        history: Vec<Package>,
    ) -> StorageResult<()> {
        keys::validate("accountId", account_id)?;
        keys::deployment_address(app_id, deployment_id)?;
        let backends = self.backends().await?;
        self.history(&backends)
            .replace(app_id, deployment_id, history)
            .await
    }

    pub async fn clear_package_history(
        &self,
        account_id: &str,
        app_id: &str,
        deployment_id: &str,
    ) -> StorageResult<()> {
        keys::validate("accountId", account_id)?;
        keys::deployment_address(app_id, deployment_id)?;
        let backends = self.backends().await?;
        self.history(&backends).clear(app_id, deployment_id).await
    }
}
