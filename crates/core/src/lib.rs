//! Domain building blocks for the mixbuster separation service.
//!
//! Everything here is free of HTTP and object-store concerns so that the
//! pipeline, worker and API crates can share one vocabulary for jobs,
//! backends, tuning parameters and model descriptors.

pub mod backend;
pub mod catalog;
pub mod error;
pub mod hashing;
pub mod job;
pub mod naming;
pub mod params;
pub mod registry;
pub mod request;
pub mod types;
