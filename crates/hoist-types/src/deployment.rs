use serde::{Deserialize, Serialize};

use crate::package::Package;

/// A release channel of an app (e.g. "Staging", "Production").
///
/// `key` is the globally unique credential clients use to ask for updates.
/// `package` is only a snapshot of the newest release; the full history lives
/// elsewhere.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    /// Assigned by the storage layer on creation; ignored on input.
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub key: String,
    pub created_time: i64,
    #[serde(default)]
    pub package: Option<Package>,
}

impl Deployment {
    pub fn new(name: impl Into<String>, key: impl Into<String>, created_time: i64) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            key: key.into(),
            created_time,
            package: None,
        }
    }
}

/// What a deployment key resolves to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentInfo {
    pub app_id: String,
    pub deployment_id: String,
}
