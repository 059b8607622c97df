use hoist_table::{Query, UpdateMode};
use hoist_types::{generate_id, AccessKey};
use tracing::debug;

use crate::error::StorageResult;
use crate::keys;
use crate::mapper;
use crate::pointer;
use crate::storage::{swallow, Storage};

impl Storage {
    /// Store a new access key for an account and return its id.
    ///
    /// The key row goes first, then the credential shortcut; a failed
    /// shortcut write removes the row again.
    pub async fn add_access_key(&self, account_id: &str, key: &AccessKey) -> StorageResult<String> {
        let id = generate_id();
        let row_at = keys::access_key_address(account_id, &id)?;
        let pointer_at = keys::access_key_pointer_address(&key.name)?;
        let backends = self.backends().await?;
        let table = backends.table.as_ref();

        let mut stored = key.clone();
        stored.id = id.clone();
        table
            .create_entity(mapper::access_key_row(&row_at, &stored))
            .await?;
        let shortcut = pointer::access_key_row(&pointer_at, account_id, stored.expires);
        if let Err(err) = table.create_entity(shortcut).await {
            let undo = table
                .delete_entity(&row_at.partition_key, &row_at.row_key)
                .await;
            swallow("remove access key", &id, undo.map_err(Into::into));
            return Err(err.into());
        }
        debug!(account_id, access_key_id = %id, "access key added");
        Ok(id)
    }

    pub async fn get_access_key(&self, account_id: &str, access_key_id: &str) -> StorageResult<AccessKey> {
        let at = keys::access_key_address(account_id, access_key_id)?;
        let backends = self.backends().await?;
        let row = backends
            .table
            .get_entity(&at.partition_key, &at.row_key)
            .await?;
        mapper::access_key_from_row(&row)
    }

    /// Every access key of an account. Empty if there are none.
    pub async fn get_access_keys(&self, account_id: &str) -> StorageResult<Vec<AccessKey>> {
        let partition_key = keys::account_partition_key(account_id)?;
        let range = keys::access_keys_range(account_id)?;
        let backends = self.backends().await?;
        let rows = backends
            .table
            .query_all(Query::new(partition_key, range))
            .await?;
        rows.iter().map(mapper::access_key_from_row).collect()
    }

    /// Merge the mutable fields of `key` and move its shortcut's expiry.
    pub async fn update_access_key(&self, account_id: &str, key: &AccessKey) -> StorageResult<()> {
        let at = keys::access_key_address(account_id, &key.id)?;
        let backends = self.backends().await?;
        let table = backends.table.as_ref();

        let stored = mapper::access_key_from_row(
            &table.get_entity(&at.partition_key, &at.row_key).await?,
        )?;
        table
            .update_entity(mapper::access_key_update_row(&at, key), UpdateMode::Merge)
            .await?;
        let pointer_at = keys::access_key_pointer_address(&stored.name)?;
        table
            .update_entity(
                pointer::access_key_expiry_row(&pointer_at, key.expires),
                UpdateMode::Merge,
            )
            .await?;
        debug!(account_id, access_key_id = %key.id, expires = key.expires, "access key updated");
        Ok(())
    }

    pub async fn remove_access_key(&self, account_id: &str, access_key_id: &str) -> StorageResult<()> {
        let at = keys::access_key_address(account_id, access_key_id)?;
        let backends = self.backends().await?;
        let table = backends.table.as_ref();

        let stored = mapper::access_key_from_row(
            &table.get_entity(&at.partition_key, &at.row_key).await?,
        )?;
        table.delete_entity(&at.partition_key, &at.row_key).await?;
        let pointer_at = keys::access_key_pointer_address(&stored.name)?;
        let undo = table
            .delete_entity(&pointer_at.partition_key, &pointer_at.row_key)
            .await;
        swallow("remove access key shortcut", access_key_id, undo.map_err(Into::into));
        debug!(account_id, access_key_id, "access key removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ErrorCode;
    use crate::storage::fixtures::with_account;
    use hoist_types::{now_ms, AccessKey};

    fn key(name: &str, expires: i64) -> AccessKey {
        AccessKey {
            id: String::new(),
            name: name.into(),
            friendly_name: format!("{name} laptop"),
            description: None,
            created_by: "cli".into(),
            created_time: 1,
            expires,
            is_session: false,
        }
    }

    fn far_future() -> i64 {
        now_ms() + 60 * 60 * 1000
    }

    #[tokio::test]
    async fn add_resolve_and_list() {
        let (fx, account_id) = with_account("dev@x.io").await;
        let id = fx
            .storage
            .add_access_key(&account_id, &key("secret1", far_future()))
            .await
            .unwrap();
        fx.storage
            .add_access_key(&account_id, &key("secret2", far_future()))
            .await
            .unwrap();

        let stored = fx.storage.get_access_key(&account_id, &id).await.unwrap();
        assert_eq!(stored.name, "secret1");
        assert_eq!(stored.id, id);
        assert_eq!(
            fx.storage
                .get_account_id_from_access_key("secret1")
                .await
                .unwrap(),
            account_id
        );
        assert_eq!(fx.storage.get_access_keys(&account_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn listing_without_keys_is_empty() {
        let (fx, account_id) = with_account("dev@x.io").await;
        fx.storage
            .add_app(&account_id, &hoist_types::App::new("demo", 1))
            .await
            .unwrap();
        assert!(fx.storage.get_access_keys(&account_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn expired_key_does_not_resolve() {
        let (fx, account_id) = with_account("dev@x.io").await;
        fx.storage
            .add_access_key(&account_id, &key("old", now_ms() - 1))
            .await
            .unwrap();
        let err = fx
            .storage
            .get_account_id_from_access_key("old")
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Expired);
    }

    #[tokio::test]
    async fn update_moves_expiry() {
        let (fx, account_id) = with_account("dev@x.io").await;
        let id = fx
            .storage
            .add_access_key(&account_id, &key("secret", far_future()))
            .await
            .unwrap();

        let mut changed = fx.storage.get_access_key(&account_id, &id).await.unwrap();
        changed.expires = now_ms() - 1;
        changed.friendly_name = "renamed".into();
        fx.storage.update_access_key(&account_id, &changed).await.unwrap();

        let stored = fx.storage.get_access_key(&account_id, &id).await.unwrap();
        assert_eq!(stored.friendly_name, "renamed");
        assert_eq!(
            fx.storage
                .get_account_id_from_access_key("secret")
                .await
                .unwrap_err()
                .code,
            ErrorCode::Expired
        );
    }

    #[tokio::test]
    async fn remove_drops_shortcut() {
        let (fx, account_id) = with_account("dev@x.io").await;
        let id = fx
            .storage
            .add_access_key(&account_id, &key("secret", far_future()))
            .await
            .unwrap();
        fx.storage.remove_access_key(&account_id, &id).await.unwrap();
        assert_eq!(
            fx.storage.get_access_key(&account_id, &id).await.unwrap_err().code,
            ErrorCode::NotFound
        );
        assert_eq!(
            fx.storage
                .get_account_id_from_access_key("secret")
                .await
                .unwrap_err()
                .code,
            ErrorCode::NotFound
        );
        assert_eq!(
            fx.storage.remove_access_key(&account_id, &id).await.unwrap_err().code,
            ErrorCode::NotFound
        );
    }

    #[tokio::test]
    async fn duplicate_secret_is_rejected_without_orphans() {
        let (fx, account_id) = with_account("dev@x.io").await;
        fx.storage
            .add_access_key(&account_id, &key("same", far_future()))
            .await
            .unwrap();
        let err = fx
            .storage
            .add_access_key(&account_id, &key("same", far_future()))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::AlreadyExists);
        assert_eq!(fx.storage.get_access_keys(&account_id).await.unwrap().len(), 1);
    }
}
