pub mod jobs;
pub mod legacy;
pub mod models;
