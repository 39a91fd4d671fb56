//! Operation-code grant lookups for the identity directory.
//!
//! The grants table is owned by the surrounding platform; the engine reads
//! it once per workflow creation to snapshot dynamic assignees.

use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// Users holding the given operation code on an instance.
pub async fn users_with_operation_code(
    pool: &PgPool,
    instance_id: Uuid,
    op_code: i32,
) -> Result<Vec<Uuid>, DbError> {
    let user_ids = sqlx::query_scalar::<_, Uuid>(
        "SELECT user_id FROM user_operation_codes \
         WHERE instance_id = $1 AND op_code = $2 ORDER BY user_id",
    )
    .bind(instance_id)
    .bind(op_code)
    .fetch_all(pool)
    .await?;
    Ok(user_ids)
}
