use serde::{Deserialize, Serialize};

use crate::error::{StorageError, StorageResult};

pub const ENV_STORAGE_ACCOUNT: &str = "HOIST_STORAGE_ACCOUNT";
pub const ENV_STORAGE_ACCESS_KEY: &str = "HOIST_STORAGE_ACCESS_KEY";
pub const ENV_EMULATED: &str = "HOIST_EMULATED";
pub const ENV_TABLE_NAME: &str = "HOIST_TABLE_NAME";
pub const ENV_BLOB_CONTAINER: &str = "HOIST_BLOB_CONTAINER";
pub const ENV_HISTORY_CONTAINER: &str = "HOIST_HISTORY_CONTAINER";
pub const ENV_EMULATOR_BLOB_ENDPOINT: &str = "HOIST_EMULATOR_BLOB_ENDPOINT";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub account: Option<String>,
    pub access_key: Option<String>,
    /// Use the local emulators instead of a hosted backend.
    pub emulated: bool,
    pub table_name: String,
    /// Container for package contents.
    pub blob_container: String,
    /// Container for per-deployment package history.
    pub history_container: String,
    pub emulator_blob_endpoint: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            account: None,
            access_key: None,
            emulated: false,
            table_name: "storagev2".into(),
            blob_container: "storagev2".into(),
            history_container: "packagehistoryv1".into(),
            emulator_blob_endpoint: hoist_blob::DEFAULT_EMULATOR_ENDPOINT.into(),
        }
    }
}

impl StorageConfig {
    /// Defaults for running against the local emulators.
    pub fn emulated() -> Self {
        Self {
            emulated: true,
            ..Self::default()
        }
    }

    /// Resolve from the process environment.
    pub fn from_env() -> StorageResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve from an arbitrary variable source. Unset and blank variables
    /// keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> StorageResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();
        let config = Self {
            account: get(ENV_STORAGE_ACCOUNT),
            access_key: get(ENV_STORAGE_ACCESS_KEY),
            emulated: get(ENV_EMULATED).is_some_and(|v| parse_flag(&v)),
            table_name: get(ENV_TABLE_NAME).unwrap_or(defaults.table_name),
            blob_container: get(ENV_BLOB_CONTAINER).unwrap_or(defaults.blob_container),
            history_container: get(ENV_HISTORY_CONTAINER).unwrap_or(defaults.history_container),
            emulator_blob_endpoint: get(ENV_EMULATOR_BLOB_ENDPOINT)
                .unwrap_or(defaults.emulator_blob_endpoint),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> StorageResult<()> {
        if !self.emulated && (self.account.is_none() || self.access_key.is_none()) {
            return Err(StorageError::invalid(format!(
                "{ENV_STORAGE_ACCOUNT} and {ENV_STORAGE_ACCESS_KEY} are required unless {ENV_EMULATED} is set"
            )));
        }
        for (name, value) in [
            ("table name", &self.table_name),
            ("blob container", &self.blob_container),
            ("history container", &self.history_container),
        ] {
            if value.is_empty() {
                return Err(StorageError::invalid(format!("{name} must not be empty")));
            }
        }
        if self.blob_container == self.history_container {
            return Err(StorageError::invalid(
                "blob container and history container must differ",
            ));
        }
        Ok(())
    }

    /// A copy safe to print: the access key is masked.
    pub fn redacted(&self) -> Self {
        Self {
            access_key: self.access_key.as_ref().map(|_| "********".to_string()),
            ..self.clone()
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
