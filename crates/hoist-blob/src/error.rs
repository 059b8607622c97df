//! Error type reported by blob store backends.

/// Vendor error codes produced by the emulator and recognized by callers.
pub mod codes {
    pub const BLOB_NOT_FOUND: &str = "BlobNotFound";
    pub const CONTAINER_NOT_FOUND: &str = "ContainerNotFound";
    pub const CONTAINER_ALREADY_EXISTS: &str = "ContainerAlreadyExists";
    pub const BLOB_ALREADY_EXISTS: &str = "BlobAlreadyExists";
    pub const REQUEST_BODY_TOO_LARGE: &str = "RequestBodyTooLarge";
}

/// A failure reported by a blob backend.
///
/// `code` is the vendor error code, or a socket error name when the request
/// never reached the service.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("blob error {code}: {message}")]
pub struct BlobError {
    pub code: String,
    pub message: String,
}

impl BlobError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn blob_not_found(container: &str, name: &str) -> Self {
        Self::new(
            codes::BLOB_NOT_FOUND,
            format!("The specified blob {container}/{name} does not exist."),
        )
    }

    pub fn container_not_found(container: &str) -> Self {
        Self::new(
            codes::CONTAINER_NOT_FOUND,
            format!("The specified container {container} does not exist."),
        )
    }
}

/// Result alias for blob operations.
pub type BlobResult<T> = Result<T, BlobError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code() {
        let err = BlobError::blob_not_found("c", "b");
        assert_eq!(err.code, codes::BLOB_NOT_FOUND);
        assert!(err.to_string().starts_with("blob error BlobNotFound:"));
        assert!(err.message.contains("c/b"));
    }
}
