//! Aggregate queries backing the reporting surface.
//!
//! Best-effort by design: no locks are taken, counts may be momentarily
//! inconsistent with concurrent transitions, and an empty result is a valid
//! answer — nothing here returns `NotFound`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// Count of workflows whose current record's status is in the set.
pub async fn count_by_status(pool: &PgPool, statuses: &[String]) -> Result<i64, DbError> {
    if statuses.is_empty() {
        return Ok(0);
    }
    let count = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*)
        FROM workflows w
        LEFT JOIN workflow_records wr ON w.workflow_record_id = wr.id
        WHERE w.deleted_at IS NULL AND wr.status = ANY($1)
        "#,
    )
    .bind(statuses)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Count of workflows whose current step's template type is in the set.
pub async fn count_by_step_type(pool: &PgPool, step_types: &[String]) -> Result<i64, DbError> {
    if step_types.is_empty() {
        return Ok(0);
    }
    let count = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*)
        FROM workflows w
        LEFT JOIN workflow_records wr ON w.workflow_record_id = wr.id
        LEFT JOIN workflow_steps s ON wr.current_step_id = s.id
        LEFT JOIN workflow_step_templates st ON s.workflow_step_template_id = st.id
        WHERE w.deleted_at IS NULL AND st.step_type = ANY($1)
        "#,
    )
    .bind(step_types)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Count of workflows whose task's status is in the set.
pub async fn count_by_task_status(pool: &PgPool, statuses: &[String]) -> Result<i64, DbError> {
    if statuses.is_empty() {
        return Ok(0);
    }
    let count = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*)
        FROM workflows w
        LEFT JOIN workflow_records wr ON w.workflow_record_id = wr.id
        LEFT JOIN tasks t ON wr.task_id = t.id
        WHERE w.deleted_at IS NULL AND t.status = ANY($1)
        "#,
    )
    .bind(statuses)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Workflows whose review chain is fully cleared: already finished, or
/// currently sitting on their execute step.
pub async fn count_approved(pool: &PgPool) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*)
        FROM workflows w
        LEFT JOIN workflow_records wr ON w.workflow_record_id = wr.id
        LEFT JOIN workflow_steps s ON wr.current_step_id = s.id
        LEFT JOIN workflow_step_templates st ON s.workflow_step_template_id = st.id
        WHERE w.deleted_at IS NULL
          AND (wr.status = 'finished' OR st.step_type = 'sql_execute')
        "#,
    )
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// For every workflow, the penultimate step of its current record (by
/// descending step number) when that step is approved — i.e. the step whose
/// approval cleared the review chain.  Records with fewer than two steps are
/// filtered out by the offset.
pub async fn audited_step_ids(pool: &PgPool) -> Result<Vec<Uuid>, DbError> {
    let ids = sqlx::query_scalar::<_, Uuid>(
        r#"
        SELECT s.id
        FROM workflow_steps s
        JOIN workflows w ON w.workflow_record_id = s.workflow_record_id
        WHERE w.deleted_at IS NULL
          AND s.state = 'approved'
          AND s.id = (
              SELECT id FROM workflow_steps
              WHERE workflow_record_id = s.workflow_record_id
              ORDER BY step_number DESC, id DESC
              LIMIT 1 OFFSET 1
          )
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

/// Sum of whole minutes between each workflow's creation and the operation
/// time of the given steps.
pub async fn audit_duration_minutes(pool: &PgPool, step_ids: &[Uuid]) -> Result<i64, DbError> {
    if step_ids.is_empty() {
        return Ok(0);
    }
    let minutes = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COALESCE(
            SUM(FLOOR(EXTRACT(EPOCH FROM (s.operate_at - w.created_at)) / 60))::BIGINT, 0)
        FROM workflows w
        JOIN workflow_steps s ON s.workflow_record_id = w.workflow_record_id
        WHERE s.id = ANY($1)
        "#,
    )
    .bind(step_ids)
    .fetch_one(pool)
    .await?;
    Ok(minutes)
}

/// Count of workflows created in the interval.
pub async fn count_between(
    pool: &PgPool,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM workflows \
         WHERE deleted_at IS NULL AND created_at BETWEEN $1 AND $2",
    )
    .bind(start)
    .bind(end)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Count of all live workflows.
pub async fn count_all(pool: &PgPool) -> Result<i64, DbError> {
    let count =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM workflows WHERE deleted_at IS NULL")
            .fetch_one(pool)
            .await?;
    Ok(count)
}
