//! Host-side error types.
//!
//! Foreign exceptions never appear here; they travel as
//! [`causeway_types::Fault`] through every callback boundary. This module
//! only covers misuse of the host machinery itself.

use thiserror::Error;

/// Errors from driving the event loop.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum LoopError {
    /// `run_until_idle` or `tick` was called from inside a running job.
    /// The loop is strictly single-threaded and non-reentrant.
    #[error("event loop re-entered from inside a running job")]
    ReentrantRun,
}
