//! Workflow record persistence.
//!
//! Mutating lifecycle operations lock the current record with
//! `SELECT … FOR UPDATE` so transitions on one workflow are serialised;
//! the loser of a concurrent transition re-reads state that no longer
//! satisfies its precondition and fails fast.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::{models::WorkflowRecordRow, DbError};

const RECORD_COLUMNS: &str =
    "id, task_id, current_step_id, status, scheduled_at, schedule_user_id, created_at";

/// Fetch a record row and take a row-level lock on it for the duration of
/// the transaction.
pub async fn lock_record(
    tx: &mut Transaction<'_, Postgres>,
    record_id: Uuid,
) -> Result<WorkflowRecordRow, DbError> {
    let row = sqlx::query_as::<_, WorkflowRecordRow>(&format!(
        "SELECT {RECORD_COLUMNS} FROM workflow_records \
         WHERE id = $1 AND deleted_at IS NULL FOR UPDATE"
    ))
    .bind(record_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or(DbError::NotFound)?;
    Ok(row)
}

/// Fetch a record without locking.
pub async fn get_record(pool: &PgPool, id: Uuid) -> Result<Option<WorkflowRecordRow>, DbError> {
    let row = sqlx::query_as::<_, WorkflowRecordRow>(&format!(
        "SELECT {RECORD_COLUMNS} FROM workflow_records WHERE id = $1 AND deleted_at IS NULL"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Superseded records of a workflow, oldest first.
pub async fn history_records(
    pool: &PgPool,
    workflow_id: Uuid,
) -> Result<Vec<WorkflowRecordRow>, DbError> {
    let rows = sqlx::query_as::<_, WorkflowRecordRow>(
        r#"
        SELECT wr.id, wr.task_id, wr.current_step_id, wr.status,
               wr.scheduled_at, wr.schedule_user_id, wr.created_at
        FROM workflow_records wr
        JOIN workflow_record_history wrh ON wr.id = wrh.workflow_record_id
        WHERE wrh.workflow_id = $1
        ORDER BY wr.created_at, wr.id
        "#,
    )
    .bind(workflow_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Insert a fresh record (used by re-submit; creation goes through
/// `workflows::create_workflow`).
pub async fn insert_record(
    tx: &mut Transaction<'_, Postgres>,
    record_id: Uuid,
    task_id: Uuid,
    current_step_id: Option<Uuid>,
    now: DateTime<Utc>,
) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO workflow_records (id, task_id, current_step_id, status, created_at)
        VALUES ($1, $2, $3, 'on_process', $4)
        "#,
    )
    .bind(record_id)
    .bind(task_id)
    .bind(current_step_id)
    .bind(now)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Update a record's status and current-step pointer.
pub async fn update_status(
    tx: &mut Transaction<'_, Postgres>,
    record_id: Uuid,
    status: &str,
    current_step_id: Option<Uuid>,
) -> Result<(), DbError> {
    sqlx::query("UPDATE workflow_records SET status = $1, current_step_id = $2 WHERE id = $3")
        .bind(status)
        .bind(current_step_id)
        .bind(record_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Set or clear a record's schedule.
pub async fn update_schedule(
    tx: &mut Transaction<'_, Postgres>,
    record_id: Uuid,
    scheduled_at: Option<DateTime<Utc>>,
    schedule_user_id: Option<Uuid>,
) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE workflow_records SET scheduled_at = $1, schedule_user_id = $2 WHERE id = $3",
    )
    .bind(scheduled_at)
    .bind(schedule_user_id)
    .bind(record_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Append the superseded record to the workflow's history.
pub async fn push_history(
    tx: &mut Transaction<'_, Postgres>,
    workflow_id: Uuid,
    record_id: Uuid,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO workflow_record_history (workflow_id, workflow_record_id) VALUES ($1, $2)",
    )
    .bind(workflow_id)
    .bind(record_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Point the workflow at a new current record.
pub async fn set_current_record(
    tx: &mut Transaction<'_, Postgres>,
    workflow_id: Uuid,
    record_id: Uuid,
) -> Result<(), DbError> {
    sqlx::query("UPDATE workflows SET workflow_record_id = $1 WHERE id = $2")
        .bind(record_id)
        .bind(workflow_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Whether any of the given tasks has a record still on process.
pub async fn task_workflow_running(pool: &PgPool, task_ids: &[Uuid]) -> Result<bool, DbError> {
    let running = sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM workflow_records
            WHERE status = 'on_process' AND task_id = ANY($1) AND deleted_at IS NULL
        )
        "#,
    )
    .bind(task_ids)
    .fetch_one(pool)
    .await?;
    Ok(running)
}
