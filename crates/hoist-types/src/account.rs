use serde::{Deserialize, Serialize};

/// A registered user.
///
/// Accounts are unique by email, compared case-insensitively. The original
/// casing of `email` is preserved and is what collaborator maps record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Assigned by the storage layer on creation; ignored on input.
    #[serde(default)]
    pub id: String,
    pub email: String,
    pub name: String,
    /// Milliseconds since the UNIX epoch.
    pub created_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_ad_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_hub_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub microsoft_id: Option<String>,
}

impl Account {
    /// A new account with no external identities linked.
    pub fn new(email: impl Into<String>, name: impl Into<String>, created_time: i64) -> Self {
        Self {
            id: String::new(),
            email: email.into(),
            name: name.into(),
            created_time,
            azure_ad_id: None,
            git_hub_id: None,
            microsoft_id: None,
        }
    }
}

/// Partial update applied to an existing account.
///
/// Only `Some` fields are written; everything else is left as stored.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountUpdate {
    pub name: Option<String>,
    pub azure_ad_id: Option<String>,
    pub git_hub_id: Option<String>,
    pub microsoft_id: Option<String>,
}

impl AccountUpdate {
    /// Returns `true` if the update would not change anything.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.azure_ad_id.is_none()
            && self.git_hub_id.is_none()
            && self.microsoft_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_uses_camel_case() {
        let mut account = Account::new("a@example.com", "A", 1000);
        account.git_hub_id = Some("gh-1".into());
        let json = serde_json::to_value(&account).unwrap();
        assert_eq!(json["createdTime"], 1000);
        assert_eq!(json["gitHubId"], "gh-1");
        assert!(json.get("azureAdId").is_none());
    }

    #[test]
    fn empty_update() {
        assert!(AccountUpdate::default().is_empty());
        let update = AccountUpdate {
            microsoft_id: Some("ms".into()),
            ..Default::default()
        };
        assert!(!update.is_empty());
    }
}
