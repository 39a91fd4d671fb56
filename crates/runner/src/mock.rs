//! Test doubles for [`TaskRunner`] and [`Directory`].
//!
//! Useful in unit and integration tests where a real driver layer or
//! directory is either unavailable or irrelevant.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    directory::{Directory, OperationCode},
    traits::{TaskOutcome, TaskRunner},
    RunnerError,
};

/// Behaviour injected into `MockTaskRunner` at construction time.
pub enum MockRunnerBehaviour {
    /// Report a specific outcome.
    ReturnOutcome(TaskOutcome),
    /// Fail the hand-off itself.
    FailUnavailable(String),
}

/// A mock runner that records every task id it receives and reports a
/// programmer-specified outcome.
pub struct MockTaskRunner {
    pub behaviour: MockRunnerBehaviour,
    /// All task ids seen by this runner (in call order).
    pub calls: Arc<Mutex<Vec<Uuid>>>,
}

impl MockTaskRunner {
    /// Create a mock that always reports success.
    pub fn succeeding() -> Self {
        Self {
            behaviour: MockRunnerBehaviour::ReturnOutcome(TaskOutcome::Success),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock whose tasks run and fail with the given reason.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            behaviour: MockRunnerBehaviour::ReturnOutcome(TaskOutcome::Failure {
                reason: reason.into(),
            }),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock whose hand-off breaks entirely.
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self {
            behaviour: MockRunnerBehaviour::FailUnavailable(msg.into()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Number of tasks handed to this runner.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl TaskRunner for MockTaskRunner {
    async fn execute_task(&self, task_id: Uuid) -> Result<TaskOutcome, RunnerError> {
        self.calls.lock().unwrap().push(task_id);
        match &self.behaviour {
            MockRunnerBehaviour::ReturnOutcome(outcome) => Ok(outcome.clone()),
            MockRunnerBehaviour::FailUnavailable(msg) => {
                Err(RunnerError::Unavailable(msg.clone()))
            }
        }
    }
}

/// A mock directory with a fixed grant table.
#[derive(Default)]
pub struct MockDirectory {
    grants: HashMap<(Uuid, i32), Vec<Uuid>>,
    /// All lookups seen by this directory (in call order).
    pub calls: Arc<Mutex<Vec<(Uuid, i32)>>>,
}

impl MockDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant `code` on `instance_id` to the given users.
    pub fn grant(mut self, instance_id: Uuid, code: OperationCode, users: &[Uuid]) -> Self {
        self.grants.insert((instance_id, code.0), users.to_vec());
        self
    }

    /// Number of lookups this directory has served.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Directory for MockDirectory {
    async fn users_with_operation_code(
        &self,
        instance_id: Uuid,
        code: OperationCode,
    ) -> Result<Vec<Uuid>, RunnerError> {
        self.calls.lock().unwrap().push((instance_id, code.0));
        Ok(self
            .grants
            .get(&(instance_id, code.0))
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OP_WORKFLOW_AUDIT;

    #[tokio::test]
    async fn succeeding_runner_records_calls() {
        let runner = MockTaskRunner::succeeding();
        let task = Uuid::new_v4();

        let outcome = runner.execute_task(task).await.expect("hand-off works");
        assert_eq!(outcome, TaskOutcome::Success);
        assert_eq!(runner.call_count(), 1);
        assert_eq!(runner.calls.lock().unwrap()[0], task);
    }

    #[tokio::test]
    async fn failing_runner_reports_reason() {
        let runner = MockTaskRunner::failing("syntax error near WHERE");
        let outcome = runner.execute_task(Uuid::new_v4()).await.expect("hand-off works");
        assert_eq!(
            outcome,
            TaskOutcome::Failure { reason: "syntax error near WHERE".into() }
        );
    }

    #[tokio::test]
    async fn unavailable_runner_breaks_hand_off() {
        let runner = MockTaskRunner::unavailable("connection refused");
        let result = runner.execute_task(Uuid::new_v4()).await;
        assert!(matches!(result, Err(RunnerError::Unavailable(_))));
    }

    #[tokio::test]
    async fn directory_serves_grants_and_defaults_to_empty() {
        let instance = Uuid::new_v4();
        let eve = Uuid::new_v4();
        let frank = Uuid::new_v4();
        let directory = MockDirectory::new().grant(instance, OP_WORKFLOW_AUDIT, &[eve, frank]);

        let users = directory
            .users_with_operation_code(instance, OP_WORKFLOW_AUDIT)
            .await
            .expect("lookup works");
        assert_eq!(users, vec![eve, frank]);

        let none = directory
            .users_with_operation_code(Uuid::new_v4(), OP_WORKFLOW_AUDIT)
            .await
            .expect("lookup works");
        assert!(none.is_empty());
        assert_eq!(directory.call_count(), 2);
    }
}
