//! A stand-in runner for deployments where the driver layer is not wired up.

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use crate::{
    traits::{TaskOutcome, TaskRunner},
    RunnerError,
};

/// Logs the hand-off and reports success without touching any instance.
///
/// The standalone binary uses this until a driver-backed runner from the
/// execution service is plugged in; state transitions behave exactly as
/// they would in production.
#[derive(Debug, Default)]
pub struct LoggingTaskRunner;

#[async_trait]
impl TaskRunner for LoggingTaskRunner {
    async fn execute_task(&self, task_id: Uuid) -> Result<TaskOutcome, RunnerError> {
        info!("task {task_id} handed to logging runner; reporting success");
        Ok(TaskOutcome::Success)
    }
}
