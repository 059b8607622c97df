//! One-time provisioning that gates every storage operation.
//!
//! The state lives in a `tokio::sync::watch` channel so any number of callers
//! can wait on the same provisioning attempt. The attempt itself runs on a
//! spawned task; a caller that gives up waiting does not abandon it. A
//! supervising task turns a panicked attempt into `Failed`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use bytes::Bytes;
use hoist_blob::BlobStore;
use hoist_table::{Row, TableStore, UpdateMode};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::{ErrorCode, StorageError, StorageResult};
use crate::keys::{self, HEALTH};

/// Handles to the two backing stores.
#[derive(Clone)]
pub struct Backends {
    pub table: Arc<dyn TableStore>,
    pub blobs: Arc<dyn BlobStore>,
}

impl Backends {
    pub fn new(table: Arc<dyn TableStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { table, blobs }
    }
}

impl std::fmt::Debug for Backends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backends").finish_non_exhaustive()
    }
}

/// Names of the blob containers provisioning creates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Containers {
    pub blob: String,
    pub history: String,
}

#[derive(Clone)]
enum State {
    Uninitialized,
    /// Carries the generation of the attempt in flight.
    Provisioning(u64),
    Ready(Arc<Backends>),
    Failed(StorageError),
}

/// Externally visible lifecycle state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Status {
    Uninitialized,
    Provisioning,
    Ready,
    Failed(StorageError),
}

pub struct Lifecycle {
    state: Arc<watch::Sender<State>>,
    backends: RwLock<Backends>,
    containers: Containers,
    generation: AtomicU64,
}

impl Lifecycle {
    pub fn new(backends: Backends, containers: Containers) -> Self {
        let (state, _) = watch::channel(State::Uninitialized);
        Self {
            state: Arc::new(state),
            backends: RwLock::new(backends),
            containers,
            generation: AtomicU64::new(0),
        }
    }

    pub fn status(&self) -> Status {
        match &*self.state.borrow() {
            State::Uninitialized => Status::Uninitialized,
            State::Provisioning(_) => Status::Provisioning,
            State::Ready(_) => Status::Ready,
            State::Failed(err) => Status::Failed(err.clone()),
        }
    }

    /// Wait until provisioning has succeeded, starting it if nobody has.
    ///
    /// A failed attempt stays failed until [`Lifecycle::reinitialize`].
    pub async fn ready(&self) -> StorageResult<Arc<Backends>> {
        let mut rx = self.state.subscribe();
        loop {
            let current = rx.borrow_and_update().clone();
            match current {
                State::Ready(backends) => return Ok(backends),
                State::Failed(err) => return Err(err),
                State::Uninitialized => self.start(),
                State::Provisioning(_) => rx
                    .changed()
                    .await
                    .map_err(|_| StorageError::other("storage lifecycle was dropped"))?,
            }
        }
    }

    fn start(&self) {
        let mut claimed = None;
        self.state.send_if_modified(|state| {
            if !matches!(state, State::Uninitialized) {
                return false;
            }
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            *state = State::Provisioning(generation);
            claimed = Some(generation);
            true
        });
        let Some(generation) = claimed else {
            return;
        };

        let backends = self
            .backends
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let containers = self.containers.clone();
        let state = Arc::clone(&self.state);
        info!(generation, table = backends.table.table_name(), "provisioning storage");
        tokio::spawn(async move {
            let attempt = {
                let backends = backends.clone();
                tokio::spawn(async move { provision(&backends, &containers).await })
            };
            // A panicked attempt ends in Failed.
            let outcome = attempt.await.unwrap_or_else(|join| {
                Err(StorageError::other(format!("storage provisioning aborted: {join}")))
            });
            state.send_if_modified(move |current| {
                // A reinitialize since this attempt started wins.
                if !matches!(current, State::Provisioning(g) if *g == generation) {
                    return false;
                }
                *current = match outcome {
                    Ok(()) => {
                        info!(generation, "storage ready");
                        State::Ready(Arc::new(backends))
                    }
                    Err(err) => {
                        warn!(generation, error = %err, "storage provisioning failed");
                        State::Failed(err)
                    }
                };
                true
            });
        });
    }

    /// Swap in new backend handles and provision them.
    pub async fn reinitialize(&self, backends: Backends) -> StorageResult<()> {
        *self
            .backends
            .write()
            .unwrap_or_else(PoisonError::into_inner) = backends;
        self.state.send_replace(State::Uninitialized);
        info!("storage reinitializing");
        self.ready().await.map(|_| ())
    }

    /// Read back every health sentinel.
    pub async fn check_health(&self) -> StorageResult<()> {
        let backends = self.ready().await?;
        let health = keys::health_address();
        let (row, blob, history) = tokio::join!(
            backends
                .table
                .get_entity(&health.partition_key, &health.row_key),
            backends.blobs.download_to_buffer(&self.containers.blob, HEALTH),
            backends
                .blobs
                .download_to_buffer(&self.containers.history, HEALTH),
        );
        let row_ok = row.is_ok_and(|r| r.get_str(HEALTH) == Some(HEALTH));
        let blob_ok = blob.is_ok_and(|b| &b[..] == HEALTH.as_bytes());
        let history_ok = history.is_ok_and(|b| &b[..] == HEALTH.as_bytes());
        if row_ok && blob_ok && history_ok {
            Ok(())
        } else {
            warn!(row_ok, blob_ok, history_ok, "health check failed");
            Err(StorageError::connection_failed(
                "The storage backend is unreachable or has not been provisioned.",
            ))
        }
    }

    /// Delete the table and both containers and forget provisioning.
    pub async fn drop_all(&self) -> StorageResult<()> {
        let backends = self
            .backends
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let (table, blob, history) = tokio::join!(
            backends.table.delete_table(),
            backends.blobs.delete_container(&self.containers.blob),
            backends.blobs.delete_container(&self.containers.history),
        );
        self.state.send_replace(State::Uninitialized);
        tolerate(table.map_err(StorageError::from), ErrorCode::NotFound)?;
        tolerate(blob.map_err(StorageError::from), ErrorCode::NotFound)?;
        tolerate(history.map_err(StorageError::from), ErrorCode::NotFound)?;
        info!("storage dropped");
        Ok(())
    }
}

impl std::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifecycle")
            .field("status", &self.status())
            .field("containers", &self.containers)
            .finish()
    }
}

fn tolerate(result: StorageResult<()>, code: ErrorCode) -> StorageResult<()> {
    match result {
        Err(err) if err.is(code) => Ok(()),
        other => other,
    }
}

async fn provision(backends: &Backends, containers: &Containers) -> StorageResult<()> {
    let (table, blob, history) = tokio::join!(
        backends.table.create_table(),
        backends.blobs.create_container(&containers.blob),
        backends.blobs.create_container(&containers.history),
    );
    tolerate(table.map_err(StorageError::from), ErrorCode::AlreadyExists)?;
    tolerate(blob.map_err(StorageError::from), ErrorCode::AlreadyExists)?;
    tolerate(history.map_err(StorageError::from), ErrorCode::AlreadyExists)?;

    let health = keys::health_address();
    let sentinel = Row::new(&health.partition_key, &health.row_key).with(HEALTH, HEALTH);
    let body = Bytes::from_static(HEALTH.as_bytes());
    let (row, blob, history) = tokio::join!(
        put_row(backends.table.as_ref(), sentinel),
        backends
            .blobs
            .upload_block_blob(&containers.blob, HEALTH, body.clone()),
        backends
            .blobs
            .upload_block_blob(&containers.history, HEALTH, body),
    );
    row?;
    blob?;
    history?;
    Ok(())
}

/// Create the row, or replace it if it already exists.
async fn put_row(table: &dyn TableStore, row: Row) -> StorageResult<()> {
    match table.create_entity(row.clone()).await {
        Ok(()) => Ok(()),
        Err(err) => {
            let err = StorageError::from(err);
            if err.is(ErrorCode::AlreadyExists) {
                table.update_entity(row, UpdateMode::Replace).await?;
                Ok(())
            } else {
                Err(err)
            }
        }
    }
}
