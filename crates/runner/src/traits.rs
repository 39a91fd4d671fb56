//! The `TaskRunner` trait — the contract for the execution hand-off.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::RunnerError;

/// What the runner reports back once a task has run to completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum TaskOutcome {
    /// The SQL was applied to the target instance.
    Success,
    /// The task ran and failed; the reason is surfaced to operators.
    Failure { reason: String },
}

/// The execution seam.
///
/// The engine hands over a task id and awaits the outcome; awaiting the
/// returned future *is* the completion callback.  Implementations may take
/// arbitrarily long — the engine keeps the record in `executing` until the
/// future resolves.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    /// Execute the task against its target instance and report the outcome.
    async fn execute_task(&self, task_id: Uuid) -> Result<TaskOutcome, RunnerError>;
}
