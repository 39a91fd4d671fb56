//! Runner-level error type.

use thiserror::Error;

/// Errors returned by a task runner's `execute_task` method.
///
/// A runner error means the hand-off itself broke (runner unreachable,
/// crashed mid-execution).  A task that ran and failed is not an error —
/// that is [`crate::TaskOutcome::Failure`].
#[derive(Debug, Error, Clone)]
pub enum RunnerError {
    /// The runner could not be reached at all.
    #[error("task runner unavailable: {0}")]
    Unavailable(String),

    /// The runner accepted the task but broke off before reporting an outcome.
    #[error("task runner interrupted: {0}")]
    Interrupted(String),
}
