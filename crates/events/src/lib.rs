//! Outbound notifications for finished jobs.
//!
//! - [`delivery::callback`]: the completion callback a remote job owner
//!   registers to learn where its results were published.

pub mod delivery;

pub use delivery::callback::{CallbackClient, CallbackError, CompletionNotice};
