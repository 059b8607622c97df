//! Pointer rows: small records that redirect an alternate key to an entity.
//!
//! Three shapes exist. A generic pointer names a target address; a
//! deployment-key pointer names an `(app, deployment)` pair; an access-key
//! pointer names an account and an expiry. Dereferencing is exactly one hop.

use hoist_table::{Row, TableStore};
use hoist_types::{access_key, DeploymentInfo};
use tracing::debug;

use crate::error::{ErrorCode, StorageError, StorageResult};
use crate::keys::{self, Address};

pub const PARTITION_KEY_POINTER: &str = "partitionKeyPointer";
pub const ROW_KEY_POINTER: &str = "rowKeyPointer";
const APP_ID: &str = "appId";
const DEPLOYMENT_ID: &str = "deploymentId";
const ACCOUNT_ID: &str = "accountId";
const EXPIRES: &str = "expires";

/// A generic pointer stored at `at` and naming `target`.
pub fn address_row(at: &Address, target: &Address) -> Row {
    Row::new(&at.partition_key, &at.row_key)
        .with(PARTITION_KEY_POINTER, target.partition_key.as_str())
        .with(ROW_KEY_POINTER, target.row_key.as_str())
}

/// The target of a generic pointer, or `None` if `row` is not one.
///
/// Both pointer fields must be present and the partition key non-empty. The
/// row key may be empty: canonical account records live at `email <addr>`/``.
pub fn target_of(row: &Row) -> Option<Address> {
    let partition_key = row.get_str(PARTITION_KEY_POINTER).filter(|s| !s.is_empty())?;
    let row_key = row.get_str(ROW_KEY_POINTER)?;
    Some(Address::new(partition_key, row_key))
}

pub fn deployment_row(at: &Address, info: &DeploymentInfo) -> Row {
    Row::new(&at.partition_key, &at.row_key)
        .with(APP_ID, info.app_id.as_str())
        .with(DEPLOYMENT_ID, info.deployment_id.as_str())
}

pub fn access_key_row(at: &Address, account_id: &str, expires: i64) -> Row {
    Row::new(&at.partition_key, &at.row_key)
        .with(ACCOUNT_ID, account_id)
        .with(EXPIRES, expires)
}

/// A partial access-key pointer carrying only a new expiry, for merges.
pub fn access_key_expiry_row(at: &Address, expires: i64) -> Row {
    Row::new(&at.partition_key, &at.row_key).with(EXPIRES, expires)
}

/// Follow the generic pointer at `at` and return the row it names.
pub async fn resolve(table: &dyn TableStore, at: &Address) -> StorageResult<Row> {
    let pointer = table.get_entity(&at.partition_key, &at.row_key).await?;
    let target = target_of(&pointer)
        .ok_or_else(|| StorageError::other(format!("row at {at} is not a pointer")))?;
    let row = table
        .get_entity(&target.partition_key, &target.row_key)
        .await?;
    if target_of(&row).is_some() {
        return Err(StorageError::other(format!(
            "pointer at {at} names another pointer at {target}"
        )));
    }
    debug!(from = %at, to = %target, "pointer resolved");
    Ok(row)
}

pub async fn resolve_deployment(
    table: &dyn TableStore,
    deployment_key: &str,
) -> StorageResult<DeploymentInfo> {
    let at = keys::deployment_key_address(deployment_key)?;
    let row = table.get_entity(&at.partition_key, &at.row_key).await?;
    match (row.get_str(APP_ID), row.get_str(DEPLOYMENT_ID)) {
        (Some(app_id), Some(deployment_id)) => Ok(DeploymentInfo {
            app_id: app_id.to_string(),
            deployment_id: deployment_id.to_string(),
        }),
        _ => Err(StorageError::other(format!(
            "deployment key pointer at {at} is malformed"
        ))),
    }
}

/// Resolve a credential to its account id, enforcing the expiry.
///
/// An expired pointer is left in place.
pub async fn resolve_access_key(
    table: &dyn TableStore,
    access_key_name: &str,
    now_ms: i64,
) -> StorageResult<String> {
    let at = keys::access_key_pointer_address(access_key_name)?;
    let row = table
        .get_entity(&at.partition_key, &at.row_key)
        .await
        .map_err(|e| {
            StorageError::from(e)
                .with_message_for(ErrorCode::NotFound, "The access key does not exist.")
        })?;
    let account_id = row
        .get_str(ACCOUNT_ID)
        .ok_or_else(|| StorageError::other(format!("access key pointer at {at} is malformed")))?;
    if let Some(expires) = row.get_i64(EXPIRES) {
        if access_key::is_expired(expires, now_ms) {
            return Err(StorageError::expired("The access key has expired."));
        }
    }
    Ok(account_id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoist_table::InMemoryTableStore;

    fn addr(pk: &str, rk: &str) -> Address {
        Address::new(pk, rk)
    }

    #[test]
    fn target_needs_both_fields() {
        let row = address_row(&addr("a", "b"), &addr("c", "d"));
        assert_eq!(target_of(&row), Some(addr("c", "d")));

        let half = Row::new("a", "b").with(PARTITION_KEY_POINTER, "c");
        assert_eq!(target_of(&half), None);

        let no_partition = Row::new("a", "b")
            .with(PARTITION_KEY_POINTER, "")
            .with(ROW_KEY_POINTER, "d");
        assert_eq!(target_of(&no_partition), None);

        let empty_row_key = Row::new("a", "b")
            .with(PARTITION_KEY_POINTER, "c")
            .with(ROW_KEY_POINTER, "");
        assert_eq!(target_of(&empty_row_key), Some(addr("c", "")));
    }

    #[tokio::test]
    async fn resolve_to_empty_row_key() {
        let table = InMemoryTableStore::with_table();
        table
            .create_entity(Row::new("email a@x.io", "").with("name", "x"))
            .await
            .unwrap();
        table
            .create_entity(address_row(&addr("accountId a1", "accountId* a1"), &addr("email a@x.io", "")))
            .await
            .unwrap();
        let row = resolve(&table, &addr("accountId a1", "accountId* a1")).await.unwrap();
        assert_eq!(row.get_str("name"), Some("x"));
    }

    #[tokio::test]
    async fn resolve_one_hop() {
        let table = InMemoryTableStore::with_table();
        table
            .create_entity(Row::new("c", "d").with("name", "x"))
            .await
            .unwrap();
        table
            .create_entity(address_row(&addr("a", "b"), &addr("c", "d")))
            .await
            .unwrap();
        let row = resolve(&table, &addr("a", "b")).await.unwrap();
        assert_eq!(row.get_str("name"), Some("x"));
    }

    #[tokio::test]
    async fn second_hop_is_other() {
        let table = InMemoryTableStore::with_table();
        table.create_entity(Row::new("e", "f")).await.unwrap();
        table
            .create_entity(address_row(&addr("c", "d"), &addr("e", "f")))
            .await
            .unwrap();
        table
            .create_entity(address_row(&addr("a", "b"), &addr("c", "d")))
            .await
            .unwrap();
        let err = resolve(&table, &addr("a", "b")).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Other);
    }

    #[tokio::test]
    async fn dangling_pointer_is_not_found() {
        let table = InMemoryTableStore::with_table();
        table
            .create_entity(address_row(&addr("a", "b"), &addr("c", "d")))
            .await
            .unwrap();
        let err = resolve(&table, &addr("a", "b")).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn deployment_key_resolution() {
        let table = InMemoryTableStore::with_table();
        let info = DeploymentInfo {
            app_id: "p1".into(),
            deployment_id: "d1".into(),
        };
        let at = keys::deployment_key_address("key1").unwrap();
        table.create_entity(deployment_row(&at, &info)).await.unwrap();
        assert_eq!(resolve_deployment(&table, "key1").await.unwrap(), info);
        let err = resolve_deployment(&table, "other").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn access_key_expiry_is_enforced() {
        let table = InMemoryTableStore::with_table();
        let at = keys::access_key_pointer_address("secret").unwrap();
        table
            .create_entity(access_key_row(&at, "a1", 1_000))
            .await
            .unwrap();

        assert_eq!(
            resolve_access_key(&table, "secret", 999).await.unwrap(),
            "a1"
        );
        let err = resolve_access_key(&table, "secret", 1_000).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Expired);
        assert!(table.contains(&at.partition_key, &at.row_key));
    }

    #[tokio::test]
    async fn unknown_access_key() {
        let table = InMemoryTableStore::with_table();
        let err = resolve_access_key(&table, "nope", 0).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
        assert_eq!(err.message, "The access key does not exist.");
    }
}
