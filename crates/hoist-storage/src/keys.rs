//! Hierarchical key encoding over a two-level key space.
//!
//! Every key is a run of `field value` segments joined by a single space.
//! A key that addresses a concrete entity (a *leaf*) carries `*` right after
//! the field name of its last segment:
//!
//! ```text
//! appId 42                   prefix of everything under app 42
//! appId* 42                  the app row itself
//! appId 42 deploymentId* 7   a deployment of app 42
//! ```
//!
//! Since `~` sorts after every character an identifier may contain, the
//! children of a prefix `p` are exactly the row keys in `(p, p + "~")`.
//! Identifiers that contain the delimiter or the marker are rejected before
//! any key is built.

use hoist_table::RowFilter;

use crate::error::{StorageError, StorageResult};

pub const DELIMITER: char = ' ';
pub const LEAF_MARKER: char = '*';
/// Upper bound of a children range.
pub const RANGE_END: char = '~';

const FORBIDDEN_CHARS: &[char] = &[DELIMITER, LEAF_MARKER];

const ACCOUNT_ID: &str = "accountId";
const ACCESS_KEY_ID: &str = "accessKeyId";
const APP_ID: &str = "appId";
const DEPLOYMENT_ID: &str = "deploymentId";
const EMAIL: &str = "email";
const DEPLOYMENT_KEY: &str = "deploymentKey";
const ACCESS_KEY: &str = "accessKey";

/// Partition and row key of the health sentinel.
pub const HEALTH: &str = "health";

/// A row address: partition key plus row key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    pub partition_key: String,
    pub row_key: String,
}

impl Address {
    pub fn new(partition_key: impl Into<String>, row_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            row_key: row_key.into(),
        }
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}/{:?}", self.partition_key, self.row_key)
    }
}

/// Validate one identifier value.
pub fn validate(field: &str, value: &str) -> StorageResult<()> {
    if value.is_empty() {
        return Err(StorageError::invalid(format!("{field} must not be empty")));
    }
    for ch in FORBIDDEN_CHARS {
        if value.contains(*ch) {
            return Err(StorageError::invalid(format!(
                "{field} {value:?} contains forbidden character {ch:?}"
            )));
        }
    }
    Ok(())
}

fn delimit(field: &str, value: &str, prepend_delimiter: bool, leaf: bool) -> String {
    let mut out = String::with_capacity(field.len() + value.len() + 3);
    if prepend_delimiter {
        out.push(DELIMITER);
    }
    out.push_str(field);
    if leaf {
        out.push(LEAF_MARKER);
    }
    out.push(DELIMITER);
    out.push_str(value);
    out
}

/// Join `(field, value)` segments into a key, marking the last one if `leaf`.
///
/// Every value is validated before anything is built.
pub fn hierarchical_key(segments: &[(&str, &str)], leaf: bool) -> StorageResult<String> {
    for (field, value) in segments {
        validate(field, value)?;
    }
    let last = segments.len().saturating_sub(1);
    Ok(segments
        .iter()
        .enumerate()
        .map(|(i, (field, value))| delimit(field, value, i > 0, leaf && i == last))
        .collect())
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

pub fn account_partition_key(account_id: &str) -> StorageResult<String> {
    hierarchical_key(&[(ACCOUNT_ID, account_id)], false)
}

/// Prefix of everything in an account's subtree.
pub fn account_prefix(account_id: &str) -> StorageResult<String> {
    hierarchical_key(&[(ACCOUNT_ID, account_id)], false)
}

/// Where the account-by-id pointer lives.
pub fn account_address(account_id: &str) -> StorageResult<Address> {
    Ok(Address::new(
        account_partition_key(account_id)?,
        hierarchical_key(&[(ACCOUNT_ID, account_id)], true)?,
    ))
}

/// Canonical account record, keyed by lower-cased email.
pub fn email_address(email: &str) -> StorageResult<Address> {
    let partition_key = hierarchical_key(&[(EMAIL, &email.to_lowercase())], false)?;
    Ok(Address::new(partition_key, ""))
}

/// Pointer to an app, stored in a collaborator's account subtree.
pub fn app_pointer_address(account_id: &str, app_id: &str) -> StorageResult<Address> {
    Ok(Address::new(
        account_partition_key(account_id)?,
        hierarchical_key(&[(ACCOUNT_ID, account_id), (APP_ID, app_id)], true)?,
    ))
}

// ---------------------------------------------------------------------------
// Access keys
// ---------------------------------------------------------------------------

pub fn access_key_address(account_id: &str, access_key_id: &str) -> StorageResult<Address> {
    Ok(Address::new(
        account_partition_key(account_id)?,
        hierarchical_key(
            &[(ACCOUNT_ID, account_id), (ACCESS_KEY_ID, access_key_id)],
            true,
        )?,
    ))
}

/// Row-key range covering every access key of an account.
pub fn access_keys_range(account_id: &str) -> StorageResult<RowFilter> {
    let prefix = format!("{}{DELIMITER}{ACCESS_KEY_ID}", account_prefix(account_id)?);
    Ok(children_range(&prefix))
}

/// Shortcut pointer from a credential to its account. The credential itself
/// never appears in a key; only its hash does.
pub fn access_key_pointer_address(access_key_name: &str) -> StorageResult<Address> {
    validate(ACCESS_KEY, access_key_name)?;
    let hash = hex::encode(blake3::hash(access_key_name.as_bytes()).as_bytes());
    Ok(Address::new(hierarchical_key(&[(ACCESS_KEY, &hash)], false)?, ""))
}

// ---------------------------------------------------------------------------
// Apps and deployments
// ---------------------------------------------------------------------------

pub fn app_partition_key(app_id: &str) -> StorageResult<String> {
    hierarchical_key(&[(APP_ID, app_id)], false)
}

pub fn app_address(app_id: &str) -> StorageResult<Address> {
    Ok(Address::new(
        app_partition_key(app_id)?,
        hierarchical_key(&[(APP_ID, app_id)], true)?,
    ))
}

/// Prefix of everything under an app.
pub fn app_prefix(app_id: &str) -> StorageResult<String> {
    hierarchical_key(&[(APP_ID, app_id)], false)
}

pub fn deployment_address(app_id: &str, deployment_id: &str) -> StorageResult<Address> {
    Ok(Address::new(
        app_partition_key(app_id)?,
        hierarchical_key(&[(APP_ID, app_id), (DEPLOYMENT_ID, deployment_id)], true)?,
    ))
}

/// Prefix of everything under a deployment.
pub fn deployment_prefix(app_id: &str, deployment_id: &str) -> StorageResult<String> {
    hierarchical_key(&[(APP_ID, app_id), (DEPLOYMENT_ID, deployment_id)], false)
}

pub fn deployment_key_address(deployment_key: &str) -> StorageResult<Address> {
    Ok(Address::new(
        hierarchical_key(&[(DEPLOYMENT_KEY, deployment_key)], false)?,
        "",
    ))
}

pub fn health_address() -> Address {
    Address::new(HEALTH, HEALTH)
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

pub fn is_deployment_key(row_key: &str) -> bool {
    row_key.contains(&format!("{DEPLOYMENT_ID}{LEAF_MARKER}"))
}

pub fn is_app_key(row_key: &str) -> bool {
    row_key.contains(&format!("{APP_ID}{LEAF_MARKER}"))
}

/// Row keys strictly inside the subtree of `prefix`.
pub fn children_range(prefix: &str) -> RowFilter {
    RowFilter::between(prefix, format!("{prefix}{RANGE_END}"))
}
