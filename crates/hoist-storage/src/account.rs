use hoist_table::UpdateMode;
use hoist_types::{generate_id, now_ms, Account, AccountUpdate};
use tracing::debug;

use crate::error::{ErrorCode, StorageError, StorageResult};
use crate::keys;
use crate::mapper;
use crate::pointer;
use crate::storage::{swallow, Storage};

const UNKNOWN_EMAIL: &str = "The specified e-mail address doesn't represent a registered user";

impl Storage {
    /// Register an account and return its new id.
    ///
    /// The canonical record and the id pointer are written concurrently. If
    /// only one of them lands it is removed again.
    pub async fn add_account(&self, account: &Account) -> StorageResult<String> {
        let id = generate_id();
        let canonical_at = keys::email_address(&account.email)?;
        let pointer_at = keys::account_address(&id)?;
        let backends = self.backends().await?;
        let table = backends.table.as_ref();

        let mut stored = account.clone();
        stored.id = id.clone();
        let (canonical, pointer) = tokio::join!(
            table.create_entity(mapper::account_row(&canonical_at, &stored)),
            table.create_entity(pointer::address_row(&pointer_at, &canonical_at)),
        );
        match (canonical, pointer) {
            (Ok(()), Ok(())) => {
                debug!(account_id = %id, "account added");
                Ok(id)
            }
            (Err(err), Ok(())) => {
                let undo = table
                    .delete_entity(&pointer_at.partition_key, &pointer_at.row_key)
                    .await;
                swallow("remove account pointer", &id, undo.map_err(Into::into));
                Err(err.into())
            }
            (Ok(()), Err(err)) => {
                let undo = table
                    .delete_entity(&canonical_at.partition_key, &canonical_at.row_key)
                    .await;
                swallow("remove account record", &id, undo.map_err(Into::into));
                Err(err.into())
            }
            (Err(err), Err(_)) => Err(err.into()),
        }
    }

    pub async fn get_account(&self, account_id: &str) -> StorageResult<Account> {
        let at = keys::account_address(account_id)?;
        let backends = self.backends().await?;
        let row = pointer::resolve(backends.table.as_ref(), &at).await?;
        mapper::account_from_row(&row)
    }

    /// Look up an account by email, ignoring case.
    pub async fn get_account_by_email(&self, email: &str) -> StorageResult<Account> {
        let at = keys::email_address(email)?;
        let backends = self.backends().await?;
        let row = backends
            .table
            .get_entity(&at.partition_key, &at.row_key)
            .await
            .map_err(|e| StorageError::from(e).with_message_for(ErrorCode::NotFound, UNKNOWN_EMAIL))?;
        mapper::account_from_row(&row)
    }

    /// Merge the given fields into the account registered under `email`.
    pub async fn update_account(&self, email: &str, update: &AccountUpdate) -> StorageResult<()> {
        let at = keys::email_address(email)?;
        if update.is_empty() {
            return Ok(());
        }
        let backends = self.backends().await?;
        backends
            .table
            .update_entity(mapper::account_update_row(&at, update), UpdateMode::Merge)
            .await
            .map_err(|e| StorageError::from(e).with_message_for(ErrorCode::NotFound, UNKNOWN_EMAIL))?;
        debug!(partition = %at.partition_key, "account updated");
        Ok(())
    }

    /// Resolve a credential to the id of the account it belongs to.
    pub async fn get_account_id_from_access_key(&self, access_key: &str) -> StorageResult<String> {
        keys::access_key_pointer_address(access_key)?;
        let backends = self.backends().await?;
        pointer::resolve_access_key(backends.table.as_ref(), access_key, now_ms()).await
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ErrorCode;
    use crate::keys;
    use crate::storage::fixtures::{fixture, with_account};
    use hoist_types::{Account, AccountUpdate};

    #[tokio::test]
    async fn add_and_get() {
        let (fx, id) = with_account("Dev@Example.com").await;
        let by_id = fx.storage.get_account(&id).await.unwrap();
        assert_eq!(by_id.id, id);
        assert_eq!(by_id.email, "Dev@Example.com");

        let by_email = fx.storage.get_account_by_email("dev@example.COM").await.unwrap();
        assert_eq!(by_email, by_id);
    }

    #[tokio::test]
    async fn email_is_unique_ignoring_case() {
        let (fx, _) = with_account("dev@example.com").await;
        let rows = fx.table.row_count();
        let err = fx
            .storage
            .add_account(&Account::new("DEV@example.com", "Other", 2))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::AlreadyExists);
        // The orphaned id pointer of the loser is cleaned up.
        assert_eq!(fx.table.row_count(), rows);
    }

    #[tokio::test]
    async fn unknown_email_message() {
        let fx = fixture();
        let err = fx.storage.get_account_by_email("nobody@x.io").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
        assert_eq!(
            err.message,
            "The specified e-mail address doesn't represent a registered user"
        );
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let fx = fixture();
        let err = fx.storage.get_account("nope").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn failed_record_write_removes_pointer() {
        let fx = fixture();
        fx.storage.check_health().await.unwrap();
        let email_at = keys::email_address("a@x.io").unwrap();
        fx.table.fail_partition(&email_at.partition_key, "ECONNRESET");
        let rows = fx.table.row_count();
        let err = fx
            .storage
            .add_account(&Account::new("a@x.io", "A", 1))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ConnectionFailed);
        assert_eq!(fx.table.row_count(), rows);
    }

    #[tokio::test]
    async fn update_merges_fields() {
        let (fx, id) = with_account("dev@example.com").await;
        fx.storage
            .update_account(
                "DEV@example.com",
                &AccountUpdate {
                    git_hub_id: Some("octo".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let account = fx.storage.get_account(&id).await.unwrap();
        assert_eq!(account.git_hub_id.as_deref(), Some("octo"));
        assert_eq!(account.name, "Test");
    }

    #[tokio::test]
    async fn update_unknown_account() {
        let fx = fixture();
        let err = fx
            .storage
            .update_account(
                "ghost@x.io",
                &AccountUpdate {
                    name: Some("x".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn invalid_ids_make_no_calls() {
        let (fx, _) = with_account("dev@example.com").await;
        let before = fx.table.operation_count();
        for bad in ["a b", "a*b"] {
            assert_eq!(
                fx.storage.get_account(bad).await.unwrap_err().code,
                ErrorCode::Invalid
            );
            assert_eq!(
                fx.storage.get_account_by_email(bad).await.unwrap_err().code,
                ErrorCode::Invalid
            );
            assert_eq!(
                fx.storage
                    .get_account_id_from_access_key(bad)
                    .await
                    .unwrap_err()
                    .code,
                ErrorCode::Invalid
            );
        }
        assert_eq!(fx.table.operation_count(), before);
    }
}
