//! Engine-level error taxonomy.
//!
//! `exec_failed` is deliberately absent: a task that ran and failed is a
//! record *state*, not an error returned by the engine.

use thiserror::Error;

/// Errors produced by the workflow engine (validation + lifecycle).
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed input, missing fields, unknown template.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A referenced entity is absent.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// A state-machine precondition was violated (non-current step, step
    /// already operated, unique-name collision, concurrent transition).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The caller is not allowed to perform this transition.
    #[error("unauthorized: {0}")]
    Unauthorized(&'static str),

    /// An invariant was found broken on read; surfaced, not recovered.
    #[error("data conflict: {0}")]
    DataConflict(String),

    /// The underlying transactional store failed.
    #[error("storage error: {0}")]
    Storage(#[from] db::DbError),

    /// A collaborator lookup failed (directory unreachable at creation).
    #[error("collaborator error: {0}")]
    Runner(#[from] runner::RunnerError),
}

impl EngineError {
    /// Wrap a storage error, turning a unique-constraint violation into the
    /// given `Conflict` so racing writers surface as state conflicts.
    pub(crate) fn conflict_on_unique(err: db::DbError, conflict: &str) -> Self {
        match &err {
            db::DbError::Sqlx(sqlx::Error::Database(dbe)) if dbe.is_unique_violation() => {
                EngineError::Conflict(conflict.to_owned())
            }
            _ => EngineError::Storage(err),
        }
    }
}
