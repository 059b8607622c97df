//! Domain types for the Hoist storage layer.
//!
//! Every other Hoist crate depends on `hoist-types`. The types here are plain
//! data: they know nothing about how they are keyed or persisted.
//!
//! # Key Types
//!
//! - [`Account`]: a registered user, unique by (case-insensitive) email
//! - [`AccessKey`]: a credential belonging to an account, with an expiry
//! - [`App`]: an application and its [`CollaboratorMap`]
//! - [`Deployment`]: a release channel of an app, addressed externally by its key
//! - [`Package`]: an immutable release descriptor in a deployment's history
//! - [`DeploymentInfo`]: the `(app, deployment)` pair a deployment key resolves to

pub mod access_key;
pub mod account;
pub mod app;
pub mod deployment;
pub mod id;
pub mod package;
pub mod temporal;

pub use access_key::AccessKey;
pub use account::{Account, AccountUpdate};
pub use app::{App, Collaborator, CollaboratorMap, Permission};
pub use deployment::{Deployment, DeploymentInfo};
pub use id::generate_id;
pub use package::{Package, PackageDiff};
pub use temporal::now_ms;
