//! Shared response envelope types for API handlers.
//!
//! Versioned API responses use a `{ "data": ... }` envelope. The root-level
//! compatibility routes return bare payloads instead.

use serde::Serialize;

/// Standard `{ "data": T }` response envelope.
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}
