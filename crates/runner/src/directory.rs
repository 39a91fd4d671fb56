//! The `Directory` trait — read-only identity & authorization lookups.

use async_trait::async_trait;
use uuid::Uuid;

use crate::RunnerError;

/// A discrete authorization capability attached to a user via a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationCode(pub i32);

/// Grants the holder the right to audit workflows on an instance; steps
/// flagged `approved_by_authorized` resolve their assignees from it.
pub const OP_WORKFLOW_AUDIT: OperationCode = OperationCode(20100);

/// Read surface of the identity directory.
///
/// The engine queries it exactly once per workflow creation; the result is
/// snapshotted into the step's assignee set and never refreshed.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Users holding the given operation code on an instance.
    async fn users_with_operation_code(
        &self,
        instance_id: Uuid,
        code: OperationCode,
    ) -> Result<Vec<Uuid>, RunnerError>;
}
