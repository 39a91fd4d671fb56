//! Read access to the externally-owned tasks table.

use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::TaskRow, DbError};

/// Fetch a live task by its primary key.
pub async fn get_task(pool: &PgPool, id: Uuid) -> Result<Option<TaskRow>, DbError> {
    let row = sqlx::query_as::<_, TaskRow>(
        "SELECT id, instance_id, status, created_at FROM tasks \
         WHERE id = $1 AND deleted_at IS NULL",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}
