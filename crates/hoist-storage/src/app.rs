use futures::future::join_all;
use hoist_table::UpdateMode;
use hoist_types::{generate_id, App, Collaborator, CollaboratorMap, Permission};
use tracing::debug;

use crate::error::{ErrorCode, StorageError, StorageResult};
use crate::hierarchy;
use crate::keys;
use crate::mapper::{self, Collaborators};
use crate::pointer;
use crate::storage::{swallow, Storage};

impl Storage {
    /// Create an app owned by `account_id`. Returns the stored app.
    pub async fn add_app(&self, account_id: &str, app: &App) -> StorageResult<App> {
        let app_id = generate_id();
        let app_at = keys::app_address(&app_id)?;
        let pointer_at = keys::app_pointer_address(account_id, &app_id)?;
        let owner = self.get_account(account_id).await?;
        let backends = self.backends().await?;
        let table = backends.table.as_ref();

        let mut stored = app.clone();
        stored.id = app_id.clone();
        stored.collaborators = CollaboratorMap::from([(
            owner.email.clone(),
            Collaborator::owner(account_id),
        )]);
        table
            .create_entity(mapper::app_row(&app_at, &stored, Collaborators::Include)?)
            .await?;
        if let Err(err) = table
            .create_entity(pointer::address_row(&pointer_at, &app_at))
            .await
        {
            let undo = table
                .delete_entity(&app_at.partition_key, &app_at.row_key)
                .await;
            swallow("remove app", &app_id, undo.map_err(Into::into));
            return Err(err.into());
        }

        debug!(account_id, app_id = %app_id, "app added");
        stored.mark_current_account(account_id);
        Ok(stored)
    }

    /// Every app `account_id` collaborates on.
    pub async fn get_apps(&self, account_id: &str) -> StorageResult<Vec<App>> {
        let at = keys::account_address(account_id)?;
        let prefix = keys::account_prefix(account_id)?;
        let backends = self.backends().await?;
        let rows =
            hierarchy::children(backends.table.as_ref(), &at.partition_key, &at.row_key, &prefix)
                .await?;
        rows.iter()
            .filter(|row| keys::is_app_key(&row.row_key))
            .map(|row| mapper::app_from_row(row, Some(account_id)))
            .collect()
    }

    pub async fn get_app(&self, account_id: &str, app_id: &str) -> StorageResult<App> {
        keys::validate("accountId", account_id)?;
        let at = keys::app_address(app_id)?;
        let backends = self.backends().await?;
        let row = backends
            .table
            .get_entity(&at.partition_key, &at.row_key)
            .await?;
        mapper::app_from_row(&row, Some(account_id))
    }

    /// Merge the app's own fields. Collaborators are left as stored.
    pub async fn update_app(&self, account_id: &str, app: &App) -> StorageResult<()> {
        keys::validate("accountId", account_id)?;
        let at = keys::app_address(&app.id)?;
        let backends = self.backends().await?;
        backends
            .table
            .update_entity(
                mapper::app_row(&at, app, Collaborators::Omit)?,
                UpdateMode::Merge,
            )
            .await?;
        debug!(account_id, app_id = %app.id, "app updated");
        Ok(())
    }

    /// Delete an app with all of its deployments.
    ///
    /// Collaborator pointers and deployment leftovers are cleaned up on a
    /// best-effort basis; the app subtree itself goes in one atomic batch.
    pub async fn remove_app(&self, account_id: &str, app_id: &str) -> StorageResult<()> {
        keys::validate("accountId", account_id)?;
        let app_at = keys::app_address(app_id)?;
        let prefix = keys::app_prefix(app_id)?;
        let backends = self.backends().await?;
        let table = backends.table.as_ref();

        let app = mapper::app_from_row(
            &table.get_entity(&app_at.partition_key, &app_at.row_key).await?,
            None,
        )?;
        let deployments = hierarchy::children(table, &app_at.partition_key, &app_at.row_key, &prefix)
            .await?
            .iter()
            .filter(|row| keys::is_deployment_key(&row.row_key))
            .map(mapper::deployment_from_row)
            .collect::<StorageResult<Vec<_>>>()?;

        let removals = app.collaborators.values().map(|collaborator| async move {
            let at = keys::app_pointer_address(&collaborator.account_id, app_id)?;
            table
                .delete_entity(&at.partition_key, &at.row_key)
                .await
                .map_err(StorageError::from)
        });
        for (collaborator, result) in app.collaborators.values().zip(join_all(removals).await) {
            swallow("remove app pointer", &collaborator.account_id, result);
        }

        let deleted =
            hierarchy::cascade_delete(table, &app_at.partition_key, &app_at.row_key, &prefix)
                .await?;
        join_all(
            deployments
                .iter()
                .map(|deployment| self.forget_deployment(&backends, deployment)),
        )
        .await;
        debug!(account_id, app_id, rows = deleted, "app removed");
        Ok(())
    }

    /// Make the account registered under `email` the owner of the app.
    ///
    /// The previous owner stays on as a collaborator. The app row and the new
    /// owner's pointer are separate writes.
    pub async fn transfer_app(&self, account_id: &str, app_id: &str, email: &str) -> StorageResult<()> {
        keys::validate("accountId", account_id)?;
        let app_at = keys::app_address(app_id)?;
        keys::email_address(email)?;
        let (mut app, target) =
            tokio::try_join!(self.get_app(account_id, app_id), self.get_account_by_email(email))?;
        let backends = self.backends().await?;
        let table = backends.table.as_ref();

        let key = app
            .collaborator_email(&target.email)
            .unwrap_or(&target.email)
            .to_string();
        let added = app.transfer_ownership(&key, &target.id);
        table
            .update_entity(
                mapper::app_row(&app_at, &app, Collaborators::Include)?,
                UpdateMode::Merge,
            )
            .await?;
        if added {
            let pointer_at = keys::app_pointer_address(&target.id, app_id)?;
            match table
                .create_entity(pointer::address_row(&pointer_at, &app_at))
                .await
                .map_err(StorageError::from)
            {
                Err(err) if !err.is(ErrorCode::AlreadyExists) => return Err(err),
                _ => {}
            }
        }
        debug!(account_id, app_id, new_owner = %target.id, "app transferred");
        Ok(())
    }

    pub async fn add_collaborator(&self, account_id: &str, app_id: &str, email: &str) -> StorageResult<()> {
        keys::validate("accountId", account_id)?;
        let app_at = keys::app_address(app_id)?;
        keys::email_address(email)?;
        let (mut app, target) =
            tokio::try_join!(self.get_app(account_id, app_id), self.get_account_by_email(email))?;
        let present = app.collaborator_email(&target.email).is_some()
            || app.email_for_account(&target.id).is_some();
        if present {
            return Err(StorageError::already_exists(
                "The given account is already a collaborator for this app.",
            ));
        }
        let backends = self.backends().await?;
        let table = backends.table.as_ref();

        app.collaborators.insert(
            target.email.clone(),
            Collaborator::new(target.id.as_str(), Permission::Collaborator),
        );
        table
            .update_entity(
                mapper::app_row(&app_at, &app, Collaborators::Include)?,
                UpdateMode::Merge,
            )
            .await?;
        let pointer_at = keys::app_pointer_address(&target.id, app_id)?;
        table
            .create_entity(pointer::address_row(&pointer_at, &app_at))
            .await?;
        debug!(account_id, app_id, collaborator = %target.id, "collaborator added");
        Ok(())
    }

    pub async fn get_collaborators(&self, account_id: &str, app_id: &str) -> StorageResult<CollaboratorMap> {
        Ok(self.get_app(account_id, app_id).await?.collaborators)
    }

    pub async fn remove_collaborator(&self, account_id: &str, app_id: &str, email: &str) -> StorageResult<()> {
        let app_at = keys::app_address(app_id)?;
        keys::email_address(email)?;
        let mut app = self.get_app(account_id, app_id).await?;
        let key = app.collaborator_email(email).map(str::to_string).ok_or_else(|| {
            StorageError::not_found("The given email is not a collaborator for this app.")
        })?;
        if app.is_owner(&key) {
            return Err(StorageError::already_exists(
                "Cannot remove the owner of the app from the collaborator list.",
            ));
        }
        let Some(removed) = app.collaborators.remove(&key) else {
            return Err(StorageError::not_found(
                "The given email is not a collaborator for this app.",
            ));
        };
        let backends = self.backends().await?;
        let table = backends.table.as_ref();

        table
            .update_entity(
                mapper::app_row(&app_at, &app, Collaborators::Include)?,
                UpdateMode::Merge,
            )
            .await?;
        let pointer_at = keys::app_pointer_address(&removed.account_id, app_id)?;
        let undo = table
            .delete_entity(&pointer_at.partition_key, &pointer_at.row_key)
            .await;
        swallow("remove app pointer", &removed.account_id, undo.map_err(Into::into));
        debug!(account_id, app_id, collaborator = %removed.account_id, "collaborator removed");
        Ok(())
    }
}
