use async_trait::async_trait;
use bytes::Bytes;

use crate::error::BlobResult;

/// Container-scoped blob store.
///
/// Implementations must satisfy:
/// - `upload_block_blob` replaces any existing blob of the same name.
/// - Reads and deletes of a missing blob fail with `BlobNotFound`; any
///   operation on a missing container fails with `ContainerNotFound`.
/// - `create_container` on an existing container fails with
///   `ContainerAlreadyExists`.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn create_container(&self, container: &str) -> BlobResult<()>;

    /// Delete a container and every blob in it.
    async fn delete_container(&self, container: &str) -> BlobResult<()>;

    async fn upload_block_blob(&self, container: &str, name: &str, body: Bytes)
        -> BlobResult<()>;

    async fn download_to_buffer(&self, container: &str, name: &str) -> BlobResult<Bytes>;

    async fn delete_blob(&self, container: &str, name: &str) -> BlobResult<()>;

    /// Public URL of a blob. Pure; makes no request and does not check that
    /// the blob exists.
    fn blob_url(&self, container: &str, name: &str) -> String;
}
