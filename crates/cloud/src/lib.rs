//! Remote object storage for packaged job results.
//!
//! - [`ObjectStore`]: the narrow `put(key, path) -> url` seam used by result
//!   delivery.
//! - [`S3ObjectStore`]: S3-compatible implementation (Cloudflare R2).
//! - [`DirectoryObjectStore`]: copies objects into a local directory, for
//!   single-host deployments and tests.

pub mod config;
pub mod local;
pub mod s3;
pub mod store;

pub use config::R2Config;
pub use local::DirectoryObjectStore;
pub use s3::S3ObjectStore;
pub use store::{ObjectStore, StorageError};
