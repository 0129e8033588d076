//! Job execution for mixbuster: the separation worker, the dispatcher and
//! bounded worker pool in front of it, and the engine wiring that builds
//! both from environment configuration.

pub mod config;
pub mod engine;
pub mod error;
pub mod handler;
pub mod pool;
pub mod telemetry;
pub mod worker;

pub use config::{ConfigError, EngineConfig, StorageConfig};
pub use engine::{Engine, PoolSettings};
pub use error::WorkerError;
pub use pool::{JobCancellations, JobDispatcher, QueuedJob, WorkerPool};
pub use worker::SeparationWorker;
