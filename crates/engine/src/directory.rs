//! Store-backed implementation of the identity directory.
//!
//! The grants table lives in the same Postgres instance as the engine's own
//! state; deployments with a separate directory service swap in their own
//! [`Directory`] implementation.

use async_trait::async_trait;
use uuid::Uuid;

use db::{repository::directory as directory_repo, DbPool};
use runner::{Directory, OperationCode, RunnerError};

/// Resolves operation-code grants from the `user_operation_codes` table.
pub struct DbDirectory {
    pool: DbPool,
}

impl DbDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Directory for DbDirectory {
    async fn users_with_operation_code(
        &self,
        instance_id: Uuid,
        code: OperationCode,
    ) -> Result<Vec<Uuid>, RunnerError> {
        directory_repo::users_with_operation_code(&self.pool, instance_id, code.0)
            .await
            .map_err(|err| RunnerError::Unavailable(err.to_string()))
    }
}
