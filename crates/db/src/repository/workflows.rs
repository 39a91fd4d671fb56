//! Workflow aggregate persistence.
//!
//! Creation and deletion touch several tables and always run inside one
//! transaction.  Point reads filter soft-deleted rows.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    models::{NewWorkflowStep, WorkflowRecordRef, WorkflowRow},
    repository::steps,
    DbError,
};

const WORKFLOW_COLUMNS: &str =
    "id, subject, description, create_user_id, workflow_record_id, created_at";

/// Persist a new workflow, its first record, and the record's steps with
/// their assignee snapshots, all in one transaction.
///
/// The record's `current_step_id` points at the first step (creation with an
/// empty step list is refused upstream).
#[allow(clippy::too_many_arguments)]
pub async fn create_workflow(
    pool: &PgPool,
    workflow_id: Uuid,
    subject: &str,
    description: &str,
    create_user_id: Uuid,
    record_id: Uuid,
    task_id: Uuid,
    steps: &[NewWorkflowStep],
    now: DateTime<Utc>,
) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO workflow_records (id, task_id, current_step_id, status, created_at)
        VALUES ($1, $2, $3, 'on_process', $4)
        "#,
    )
    .bind(record_id)
    .bind(task_id)
    .bind(steps.first().map(|s| s.id))
    .bind(now)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO workflows
            (id, subject, description, create_user_id, workflow_record_id, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(workflow_id)
    .bind(subject)
    .bind(description)
    .bind(create_user_id)
    .bind(record_id)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    steps::insert_steps(&mut tx, steps, now).await?;

    tx.commit().await?;
    Ok(())
}

/// Fetch a single live workflow by its primary key.
pub async fn get_workflow(pool: &PgPool, id: Uuid) -> Result<Option<WorkflowRow>, DbError> {
    let row = sqlx::query_as::<_, WorkflowRow>(&format!(
        "SELECT {WORKFLOW_COLUMNS} FROM workflows WHERE id = $1 AND deleted_at IS NULL"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Fetch a live workflow by subject.
pub async fn get_workflow_by_subject(
    pool: &PgPool,
    subject: &str,
) -> Result<Option<WorkflowRow>, DbError> {
    let row = sqlx::query_as::<_, WorkflowRow>(&format!(
        "SELECT {WORKFLOW_COLUMNS} FROM workflows \
         WHERE subject = $1 AND deleted_at IS NULL LIMIT 1"
    ))
    .bind(subject)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// The most recently created live workflow.
pub async fn get_last_workflow(pool: &PgPool) -> Result<Option<WorkflowRow>, DbError> {
    let row = sqlx::query_as::<_, WorkflowRow>(&format!(
        "SELECT {WORKFLOW_COLUMNS} FROM workflows WHERE deleted_at IS NULL \
         ORDER BY created_at DESC, id DESC LIMIT 1"
    ))
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Find the workflow governing a task, searching the current record and the
/// record history.
pub async fn get_workflow_by_task_id(
    pool: &PgPool,
    task_id: Uuid,
) -> Result<Option<WorkflowRow>, DbError> {
    let row = sqlx::query_as::<_, WorkflowRow>(
        r#"
        SELECT DISTINCT w.id, w.subject, w.description, w.create_user_id,
               w.workflow_record_id, w.created_at
        FROM workflows w
        LEFT JOIN workflow_records wr ON w.workflow_record_id = wr.id
        LEFT JOIN workflow_record_history wrh ON w.id = wrh.workflow_id
        LEFT JOIN workflow_records hwr ON wrh.workflow_record_id = hwr.id
        WHERE w.deleted_at IS NULL AND (wr.task_id = $1 OR hwr.task_id = $1)
        LIMIT 1
        "#,
    )
    .bind(task_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Resolve the target instance of a workflow through its current record's task.
pub async fn get_instance_id_by_workflow_id(
    pool: &PgPool,
    workflow_id: Uuid,
) -> Result<Option<Uuid>, DbError> {
    let instance_id = sqlx::query_scalar::<_, Uuid>(
        r#"
        SELECT t.instance_id
        FROM workflows w
        JOIN workflow_records wr ON wr.id = w.workflow_record_id
        JOIN tasks t ON t.id = wr.task_id
        WHERE w.id = $1
        LIMIT 1
        "#,
    )
    .bind(workflow_id)
    .fetch_optional(pool)
    .await?;
    Ok(instance_id)
}

/// Workflows whose schedule has come due and whose record is still waiting.
pub async fn due_workflows(
    pool: &PgPool,
    now: DateTime<Utc>,
) -> Result<Vec<WorkflowRecordRef>, DbError> {
    let rows = sqlx::query_as::<_, WorkflowRecordRef>(
        r#"
        SELECT w.id AS workflow_id, wr.id AS workflow_record_id
        FROM workflows w
        JOIN workflow_records wr ON w.workflow_record_id = wr.id
        WHERE w.deleted_at IS NULL
          AND wr.scheduled_at IS NOT NULL
          AND wr.scheduled_at <= $1
          AND wr.status = 'on_process'
        "#,
    )
    .bind(now)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Workflows created before `cutoff` whose record has reached a sweepable
/// terminal state (or has no record at all).
pub async fn expired_workflows(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
) -> Result<Vec<Uuid>, DbError> {
    let ids = sqlx::query_scalar::<_, Uuid>(
        r#"
        SELECT w.id
        FROM workflows w
        LEFT JOIN workflow_records wr ON w.workflow_record_id = wr.id
        WHERE w.deleted_at IS NULL
          AND w.created_at < $1
          AND (wr.status = 'finished' OR wr.status = 'canceled' OR wr.status IS NULL)
        "#,
    )
    .bind(cutoff)
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

/// Remove a workflow with all its records, steps, assignee snapshots, and
/// history rows in one transaction.
pub async fn delete_workflow(pool: &PgPool, workflow_id: Uuid) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;

    let record_ids = sqlx::query_scalar::<_, Uuid>(
        r#"
        SELECT workflow_record_id FROM workflow_record_history WHERE workflow_id = $1
        UNION
        SELECT workflow_record_id FROM workflows
        WHERE id = $1 AND workflow_record_id IS NOT NULL
        "#,
    )
    .bind(workflow_id)
    .fetch_all(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        DELETE FROM workflow_step_user su
        USING workflow_steps s
        WHERE su.workflow_step_id = s.id AND s.workflow_id = $1
        "#,
    )
    .bind(workflow_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM workflow_steps WHERE workflow_id = $1")
        .bind(workflow_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM workflow_records WHERE id = ANY($1)")
        .bind(&record_ids)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM workflow_record_history WHERE workflow_id = $1")
        .bind(workflow_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM workflows WHERE id = $1")
        .bind(workflow_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}
