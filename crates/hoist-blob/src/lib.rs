//! Blob object store for Hoist.
//!
//! Blobs are opaque byte strings addressed by a flat name inside a named
//! container. Uploads overwrite; there is no listing and no partial read.
//!
//! All backends implement the [`BlobStore`] trait:
//!
//! - [`InMemoryBlobStore`]: `HashMap`-based emulator for tests and local development
//!
//! Failures are reported as [`BlobError`] with the vendor error code intact.

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{codes, BlobError, BlobResult};
pub use memory::{InMemoryBlobStore, DEFAULT_EMULATOR_ENDPOINT};
pub use traits::BlobStore;
