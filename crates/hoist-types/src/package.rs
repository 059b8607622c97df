use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Download location of a diff against an earlier package.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageDiff {
    pub size: u64,
    pub url: String,
}

/// An immutable release descriptor.
///
/// Packages only exist inside a deployment's history. The single exception is
/// the copy of the newest package kept on the deployment itself.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    pub app_version: String,
    pub blob_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_package_map: Option<BTreeMap<String, PackageDiff>>,
    #[serde(default)]
    pub is_disabled: bool,
    #[serde(default)]
    pub is_mandatory: bool,
    /// Assigned on commit (`v1`, `v2`, ...).
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_blob_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_deployment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_label: Option<String>,
    pub package_hash: String,
    /// Email of the committing account, stamped on commit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub released_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_method: Option<String>,
    /// Rollout percentage. Only meaningful while this is the newest package.
    #[serde(default)]
    pub rollout: Option<u8>,
    pub size: u64,
    pub upload_time: i64,
}
