use serde::{Deserialize, Serialize};

/// A credential belonging to an account.
///
/// `name` is the secret itself. It is never used verbatim as a key: the
/// storage layer addresses the credential by a hash of it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessKey {
    /// Assigned by the storage layer on creation; ignored on input.
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub friendly_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_by: String,
    pub created_time: i64,
    /// Milliseconds since the UNIX epoch after which the key is rejected.
    pub expires: i64,
    #[serde(default)]
    pub is_session: bool,
}

/// Returns `true` if a key expiring at `expires` is rejected at `now_ms`.
pub fn is_expired(expires: i64, now_ms: i64) -> bool {
    now_ms >= expires
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(expires: i64) -> AccessKey {
        AccessKey {
            id: String::new(),
            name: "secret".into(),
            friendly_name: "laptop".into(),
            description: None,
            created_by: "cli".into(),
            created_time: 0,
            expires,
            is_session: false,
        }
    }

    #[test]
    fn expiry_boundary() {
        assert!(!is_expired(100, 99));
        assert!(is_expired(100, 100));
        assert!(is_expired(100, 101));
    }

    #[test]
    fn serde_roundtrip() {
        let json = serde_json::to_string(&key(5)).unwrap();
        assert!(json.contains("friendlyName"));
        let parsed: AccessKey = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, key(5));
    }
}
