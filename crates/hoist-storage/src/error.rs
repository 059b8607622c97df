//! Canonical storage errors and translation from backend failures.
//!
//! Backends speak their own dialect: HTTP statuses, vendor codes hidden in a
//! JSON payload, socket error names. Everything that leaves this crate is a
//! [`StorageError`] carrying one of seven [`ErrorCode`]s.

use std::fmt;

use hoist_blob::BlobError;
use hoist_table::TableError;
use serde::{Deserialize, Serialize};

/// The canonical failure classes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    NotFound,
    AlreadyExists,
    TooLarge,
    Expired,
    ConnectionFailed,
    Invalid,
    Other,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 7] = [
        Self::NotFound,
        Self::AlreadyExists,
        Self::TooLarge,
        Self::Expired,
        Self::ConnectionFailed,
        Self::Invalid,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "NotFound",
            Self::AlreadyExists => "AlreadyExists",
            Self::TooLarge => "TooLarge",
            Self::Expired => "Expired",
            Self::ConnectionFailed => "ConnectionFailed",
            Self::Invalid => "Invalid",
            Self::Other => "Other",
        }
    }

    /// Parse a canonical code name.
    pub fn from_canonical(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|code| code.as_str() == name)
    }

    /// Classify a vendor error code. Canonical names map to themselves.
    pub fn from_vendor(code: &str) -> Self {
        if let Some(canonical) = Self::from_canonical(code) {
            return canonical;
        }
        match code {
            "ResourceNotFound" | "TableNotFound" | "BlobNotFound" | "ContainerNotFound" => {
                Self::NotFound
            }
            "EntityAlreadyExists"
            | "TableAlreadyExists"
            | "ContainerAlreadyExists"
            | "BlobAlreadyExists" => Self::AlreadyExists,
            "EntityTooLarge" | "PropertyValueTooLarge" | "RequestBodyTooLarge" => Self::TooLarge,
            "ETIMEDOUT" | "ESOCKETTIMEDOUT" | "ECONNRESET" | "ECONNREFUSED" | "ENOTFOUND" => {
                Self::ConnectionFailed
            }
            _ => Self::Other,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A storage failure in canonical form.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct StorageError {
    pub code: ErrorCode,
    pub message: String,
}

impl StorageError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AlreadyExists, message)
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Invalid, message)
    }

    pub fn expired(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Expired, message)
    }

    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConnectionFailed, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Other, message)
    }

    pub fn is(&self, code: ErrorCode) -> bool {
        self.code == code
    }

    /// Replace the message if this error carries `code`.
    pub fn with_message_for(mut self, code: ErrorCode, message: &str) -> Self {
        if self.code == code {
            self.message = message.to_string();
        }
        self
    }
}

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// The raw shape of a backend failure.
pub trait BackendFailure {
    /// Whatever code the transport surfaced first.
    fn raw_code(&self) -> &str;

    fn raw_message(&self) -> &str;

    /// Structured error payload, if the backend sent one.
    fn payload(&self) -> Option<&str> {
        None
    }
}

impl BackendFailure for TableError {
    fn raw_code(&self) -> &str {
        &self.code
    }

    fn raw_message(&self) -> &str {
        &self.message
    }

    fn payload(&self) -> Option<&str> {
        self.body.as_deref()
    }
}

impl BackendFailure for BlobError {
    fn raw_code(&self) -> &str {
        &self.code
    }

    fn raw_message(&self) -> &str {
        &self.message
    }
}

/// Vendor code and message from an `{"odata.error": {...}}` payload.
fn parse_payload(payload: &str) -> Option<(String, String)> {
    let value: serde_json::Value = serde_json::from_str(payload).ok()?;
    let error = value.get("odata.error")?;
    let code = error.get("code")?.as_str()?.to_string();
    let message = error
        .get("message")
        .and_then(|m| m.get("value"))
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    Some((code, message))
}

/// Translate a backend failure into canonical form.
///
/// The structured payload wins over the raw code when it parses.
pub fn translate(failure: &dyn BackendFailure) -> StorageError {
    let (code, message) = failure
        .payload()
        .and_then(parse_payload)
        .unwrap_or_else(|| {
            (
                failure.raw_code().to_string(),
                failure.raw_message().to_string(),
            )
        });
    StorageError::new(ErrorCode::from_vendor(&code), message)
}

impl From<TableError> for StorageError {
    fn from(err: TableError) -> Self {
        translate(&err)
    }
}

impl From<BlobError> for StorageError {
    fn from(err: BlobError) -> Self {
        translate(&err)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::other(format!("malformed stored payload: {err}"))
    }
}
