//! Error type reported by table store backends.

use serde_json::json;

/// Vendor error codes produced by the emulator and recognized by callers.
pub mod codes {
    pub const RESOURCE_NOT_FOUND: &str = "ResourceNotFound";
    pub const TABLE_NOT_FOUND: &str = "TableNotFound";
    pub const ENTITY_ALREADY_EXISTS: &str = "EntityAlreadyExists";
    pub const TABLE_ALREADY_EXISTS: &str = "TableAlreadyExists";
    pub const ENTITY_TOO_LARGE: &str = "EntityTooLarge";
    pub const PROPERTY_VALUE_TOO_LARGE: &str = "PropertyValueTooLarge";
    pub const INVALID_INPUT: &str = "InvalidInput";
    pub const BATCH_PARTITION_MISMATCH: &str = "CommandsInBatchActOnDifferentPartitions";
    pub const INVALID_DUPLICATE_ROW: &str = "InvalidDuplicateRow";
}

/// A failure reported by a table backend.
///
/// `code` is whatever the transport surfaced first: an HTTP status, a socket
/// error name, or a vendor code. `body`, when present, is the structured
/// error payload of the form
/// `{"odata.error": {"code": "...", "message": {"value": "..."}}}`, and is
/// the more precise of the two.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("table error {code}: {message}")]
pub struct TableError {
    pub code: String,
    pub message: String,
    pub body: Option<String>,
}

impl TableError {
    /// An error with a raw code and no structured payload.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            body: None,
        }
    }

    /// An error as a table service reports it: HTTP status as the raw code,
    /// vendor code and message inside the structured payload.
    pub fn odata(status: u16, code: &str, message: &str) -> Self {
        let body = json!({
            "odata.error": {
                "code": code,
                "message": { "lang": "en-US", "value": message },
            }
        });
        Self {
            code: status.to_string(),
            message: body.to_string(),
            body: Some(body.to_string()),
        }
    }
}

/// Result alias for table operations.
pub type TableResult<T> = Result<T, TableError>;
