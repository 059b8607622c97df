//! Hierarchical entity storage for Hoist.
//!
//! Accounts own apps, apps own deployments, deployments own a package
//! history. Neither backing store knows about any of this: the table store
//! offers rows under a two-part key, the blob store offers named byte blobs.
//! This crate maps the entity tree onto that flat space.
//!
//! # Modules
//!
//! - [`keys`]: hierarchical key encoding and identifier validation
//! - [`pointer`]: one-hop redirect rows for alternate lookups
//! - [`mapper`]: entity to row conversion
//! - [`hierarchy`]: children listing and cascading delete
//! - [`history`]: bounded package history in blobs
//! - [`lifecycle`]: provisioning and health checks
//! - [`error`]: the canonical error taxonomy
//!
//! [`Storage`] ties them together and exposes one method per entity
//! operation.

mod access_key;
mod account;
mod app;
mod deployment;
mod package;

pub mod config;
pub mod error;
pub mod hierarchy;
pub mod history;
pub mod keys;
pub mod lifecycle;
pub mod mapper;
pub mod pointer;
pub mod storage;

pub use config::StorageConfig;
pub use error::{ErrorCode, StorageError, StorageResult};
pub use history::MAX_HISTORY_LENGTH;
pub use lifecycle::Status;
pub use storage::Storage;
