use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::trace;

use crate::error::{codes, BlobError, BlobResult};
use crate::traits::BlobStore;

/// Endpoint of the local storage emulator's blob service.
pub const DEFAULT_EMULATOR_ENDPOINT: &str = "http://127.0.0.1:10000/devstoreaccount1";

type Containers = HashMap<String, HashMap<String, Bytes>>;

/// In-memory, HashMap-based blob store.
///
/// Bodies are `Bytes`, so reads hand out cheap clones of the stored buffer.
/// Like the table emulator it counts calls and can be told to fail calls on
/// one container.
pub struct InMemoryBlobStore {
    endpoint: String,
    max_blob_size: Option<usize>,
    containers: RwLock<Containers>,
    faults: RwLock<HashMap<String, String>>,
    operations: AtomicU64,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::with_endpoint(DEFAULT_EMULATOR_ENDPOINT)
    }

    /// A store whose URLs are rooted at `endpoint`.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            max_blob_size: None,
            containers: RwLock::new(HashMap::new()),
            faults: RwLock::new(HashMap::new()),
            operations: AtomicU64::new(0),
        }
    }

    /// Reject uploads larger than `bytes` with `RequestBodyTooLarge`.
    pub fn with_max_blob_size(mut self, bytes: usize) -> Self {
        self.max_blob_size = Some(bytes);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Number of trait calls made against this store. `blob_url` is not a
    /// call.
    pub fn operation_count(&self) -> u64 {
        self.operations.load(Ordering::SeqCst)
    }

    pub fn has_container(&self, container: &str) -> bool {
        self.read().contains_key(container)
    }

    /// Number of blobs in `container`, zero if it does not exist.
    pub fn blob_count(&self, container: &str) -> usize {
        self.read().get(container).map_or(0, HashMap::len)
    }

    pub fn contains(&self, container: &str, name: &str) -> bool {
        self.read()
            .get(container)
            .is_some_and(|blobs| blobs.contains_key(name))
    }

    /// Make every call on `container` fail with `code`.
    pub fn fail_container(&self, container: &str, code: &str) {
        self.faults
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(container.to_string(), code.to_string());
    }

    pub fn clear_faults(&self) {
        self.faults
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn read(&self) -> RwLockReadGuard<'_, Containers> {
        self.containers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Containers> {
        self.containers.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self, container: &str) -> BlobResult<()> {
        self.operations.fetch_add(1, Ordering::SeqCst);
        let faults = self.faults.read().unwrap_or_else(PoisonError::into_inner);
        match faults.get(container) {
            Some(code) => Err(BlobError::new(
                code.clone(),
                format!("injected failure on container {container:?}"),
            )),
            None => Ok(()),
        }
    }
}

impl Default for InMemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBlobStore")
            .field("endpoint", &self.endpoint)
            .field("containers", &self.read().len())
            .finish()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn create_container(&self, container: &str) -> BlobResult<()> {
        self.begin(container)?;
        let mut containers = self.write();
        if containers.contains_key(container) {
            return Err(BlobError::new(
                codes::CONTAINER_ALREADY_EXISTS,
                format!("The specified container {container} already exists."),
            ));
        }
        containers.insert(container.to_string(), HashMap::new());
        Ok(())
    }

    async fn delete_container(&self, container: &str) -> BlobResult<()> {
        self.begin(container)?;
        self.write()
            .remove(container)
            .map(|_| ())
            .ok_or_else(|| BlobError::container_not_found(container))
    }

    async fn upload_block_blob(
        &self,
        container: &str,
        name: &str,
        body: Bytes,
    ) -> BlobResult<()> {
        self.begin(container)?;
        if let Some(max) = self.max_blob_size {
            if body.len() > max {
                return Err(BlobError::new(
                    codes::REQUEST_BODY_TOO_LARGE,
                    format!("The request body is too large: {} > {max} bytes.", body.len()),
                ));
            }
        }
        let mut containers = self.write();
        let blobs = containers
            .get_mut(container)
            .ok_or_else(|| BlobError::container_not_found(container))?;
        trace!(container, name, size = body.len(), "blob uploaded");
        blobs.insert(name.to_string(), body);
        Ok(())
    }

    async fn download_to_buffer(&self, container: &str, name: &str) -> BlobResult<Bytes> {
        self.begin(container)?;
        let containers = self.read();
        let blobs = containers
            .get(container)
            .ok_or_else(|| BlobError::container_not_found(container))?;
        blobs
            .get(name)
            .cloned()
            .ok_or_else(|| BlobError::blob_not_found(container, name))
    }

    async fn delete_blob(&self, container: &str, name: &str) -> BlobResult<()> {
        self.begin(container)?;
        let mut containers = self.write();
        let blobs = containers
            .get_mut(container)
            .ok_or_else(|| BlobError::container_not_found(container))?;
        blobs
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| BlobError::blob_not_found(container, name))
    }

    fn blob_url(&self, container: &str, name: &str) -> String {
        format!("{}/{container}/{name}", self.endpoint)
    }
}
