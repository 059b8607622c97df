//! Conversion between domain entities and flat table rows.
//!
//! Scalars become typed properties. Nested structures (the collaborator map,
//! the current package) are stored as JSON strings.

use hoist_table::Row;
use hoist_types::{AccessKey, Account, AccountUpdate, App, CollaboratorMap, Deployment, Package};

use crate::error::{StorageError, StorageResult};
use crate::keys::Address;

const ID: &str = "id";
const EMAIL: &str = "email";
const NAME: &str = "name";
const CREATED_TIME: &str = "createdTime";
const AZURE_AD_ID: &str = "azureAdId";
const GIT_HUB_ID: &str = "gitHubId";
const MICROSOFT_ID: &str = "microsoftId";
const FRIENDLY_NAME: &str = "friendlyName";
const DESCRIPTION: &str = "description";
const CREATED_BY: &str = "createdBy";
const EXPIRES: &str = "expires";
const IS_SESSION: &str = "isSession";
const COLLABORATORS: &str = "collaborators";
const KEY: &str = "key";
pub const PACKAGE: &str = "package";

/// Whether an app row carries its collaborator map.
///
/// Rows written without it leave the stored map untouched on merge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Collaborators {
    Include,
    Omit,
}

fn required_str(row: &Row, name: &str) -> StorageResult<String> {
    row.get_str(name).map(str::to_string).ok_or_else(|| {
        StorageError::other(format!(
            "row {:?}/{:?} has no string property {name:?}",
            row.partition_key, row.row_key
        ))
    })
}

fn required_i64(row: &Row, name: &str) -> StorageResult<i64> {
    row.get_i64(name).ok_or_else(|| {
        StorageError::other(format!(
            "row {:?}/{:?} has no integer property {name:?}",
            row.partition_key, row.row_key
        ))
    })
}

fn optional_str(row: &Row, name: &str) -> Option<String> {
    row.get_str(name).map(str::to_string)
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

pub fn account_row(at: &Address, account: &Account) -> Row {
    let mut row = Row::new(&at.partition_key, &at.row_key)
        .with(ID, account.id.as_str())
        .with(EMAIL, account.email.as_str())
        .with(NAME, account.name.as_str())
        .with(CREATED_TIME, account.created_time);
    row.set_opt(AZURE_AD_ID, account.azure_ad_id.as_deref());
    row.set_opt(GIT_HUB_ID, account.git_hub_id.as_deref());
    row.set_opt(MICROSOFT_ID, account.microsoft_id.as_deref());
    row
}

/// A partial account row for a merge.
pub fn account_update_row(at: &Address, update: &AccountUpdate) -> Row {
    let mut row = Row::new(&at.partition_key, &at.row_key);
    row.set_opt(NAME, update.name.as_deref());
    row.set_opt(AZURE_AD_ID, update.azure_ad_id.as_deref());
    row.set_opt(GIT_HUB_ID, update.git_hub_id.as_deref());
    row.set_opt(MICROSOFT_ID, update.microsoft_id.as_deref());
    row
}

pub fn account_from_row(row: &Row) -> StorageResult<Account> {
    Ok(Account {
        id: required_str(row, ID)?,
        email: required_str(row, EMAIL)?,
        name: required_str(row, NAME)?,
        created_time: required_i64(row, CREATED_TIME)?,
        azure_ad_id: optional_str(row, AZURE_AD_ID),
        git_hub_id: optional_str(row, GIT_HUB_ID),
        microsoft_id: optional_str(row, MICROSOFT_ID),
    })
}

// ---------------------------------------------------------------------------
// Access keys
// ---------------------------------------------------------------------------

pub fn access_key_row(at: &Address, key: &AccessKey) -> Row {
    let mut row = Row::new(&at.partition_key, &at.row_key)
        .with(ID, key.id.as_str())
        .with(NAME, key.name.as_str())
        .with(FRIENDLY_NAME, key.friendly_name.as_str())
        .with(CREATED_BY, key.created_by.as_str())
        .with(CREATED_TIME, key.created_time)
        .with(EXPIRES, key.expires)
        .with(IS_SESSION, key.is_session);
    row.set_opt(DESCRIPTION, key.description.as_deref());
    row
}

/// The mutable fields of an access key, for a merge.
pub fn access_key_update_row(at: &Address, key: &AccessKey) -> Row {
    let mut row = Row::new(&at.partition_key, &at.row_key)
        .with(FRIENDLY_NAME, key.friendly_name.as_str())
        .with(EXPIRES, key.expires);
    row.set_opt(DESCRIPTION, key.description.as_deref());
    row
}

pub fn access_key_from_row(row: &Row) -> StorageResult<AccessKey> {
    Ok(AccessKey {
        id: required_str(row, ID)?,
        name: required_str(row, NAME)?,
        friendly_name: required_str(row, FRIENDLY_NAME)?,
        description: optional_str(row, DESCRIPTION),
        created_by: required_str(row, CREATED_BY)?,
        created_time: required_i64(row, CREATED_TIME)?,
        expires: required_i64(row, EXPIRES)?,
        is_session: row.get_bool(IS_SESSION).unwrap_or(false),
    })
}

// ---------------------------------------------------------------------------
// Apps
// ---------------------------------------------------------------------------

/// Flatten an app. Per-viewer flags are never persisted.
pub fn app_row(at: &Address, app: &App, collaborators: Collaborators) -> StorageResult<Row> {
    let mut row = Row::new(&at.partition_key, &at.row_key)
        .with(ID, app.id.as_str())
        .with(NAME, app.name.as_str())
        .with(CREATED_TIME, app.created_time);
    if collaborators == Collaborators::Include {
        let mut stored = app.clone();
        stored.clear_current_account();
        row.set(COLLABORATORS, serde_json::to_string(&stored.collaborators)?);
    }
    Ok(row)
}

/// Unflatten an app, marking the collaborator that matches `requester`.
pub fn app_from_row(row: &Row, requester: Option<&str>) -> StorageResult<App> {
    let collaborators: CollaboratorMap = match row.get_str(COLLABORATORS) {
        Some(json) => serde_json::from_str(json)?,
        None => CollaboratorMap::new(),
    };
    let mut app = App {
        id: required_str(row, ID)?,
        name: required_str(row, NAME)?,
        collaborators,
        created_time: required_i64(row, CREATED_TIME)?,
    };
    match requester {
        Some(account_id) => app.mark_current_account(account_id),
        None => app.clear_current_account(),
    }
    Ok(app)
}

// ---------------------------------------------------------------------------
// Deployments
// ---------------------------------------------------------------------------

/// Flatten a deployment. The package snapshot is never part of this row;
/// it is maintained by the history store.
pub fn deployment_row(at: &Address, deployment: &Deployment) -> Row {
    Row::new(&at.partition_key, &at.row_key)
        .with(ID, deployment.id.as_str())
        .with(NAME, deployment.name.as_str())
        .with(KEY, deployment.key.as_str())
        .with(CREATED_TIME, deployment.created_time)
}

/// The renameable fields of a deployment, for a merge.
pub fn deployment_update_row(at: &Address, deployment: &Deployment) -> Row {
    Row::new(&at.partition_key, &at.row_key)
        .with(NAME, deployment.name.as_str())
        .with(KEY, deployment.key.as_str())
}

pub fn deployment_from_row(row: &Row) -> StorageResult<Deployment> {
    let package = match row.get_str(PACKAGE) {
        Some(json) => Some(serde_json::from_str::<Package>(json)?),
        None => None,
    };
    Ok(Deployment {
        id: required_str(row, ID)?,
        name: required_str(row, NAME)?,
        key: required_str(row, KEY)?,
        created_time: required_i64(row, CREATED_TIME)?,
        package,
    })
}

/// A partial deployment row carrying only the package snapshot.
pub fn package_row(at: &Address, package: &Package) -> StorageResult<Row> {
    Ok(Row::new(&at.partition_key, &at.row_key).with(PACKAGE, serde_json::to_string(package)?))
}
