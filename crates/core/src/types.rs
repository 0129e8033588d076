/// Opaque job identifier (UUID v4 string unless supplied by the caller).
pub type JobId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
