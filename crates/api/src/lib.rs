//! HTTP surface of the mixbuster separation service.
//!
//! Job submission (JSON or multipart upload), status polling, result
//! download, cleanup and model listing, plus the root-level compatibility
//! routes used by existing clients.

pub mod background;
pub mod config;
pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
