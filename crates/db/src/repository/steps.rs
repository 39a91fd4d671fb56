//! Workflow step persistence, including the per-step assignee snapshot.

use chrono::{DateTime, Utc};
use sqlx::{Executor, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::{
    models::{NewWorkflowStep, StepUserRow, WorkflowStepRow},
    DbError,
};

const STEP_COLUMNS: &str = "id, workflow_id, workflow_record_id, workflow_step_template_id, \
     step_number, state, operation_user_id, operate_at, reason, created_at";

/// The steps of one record, in step order.
///
/// Generic over the executor so the locked lifecycle paths can re-read the
/// steps inside their transaction.
pub async fn steps_for_record<'e, E>(
    executor: E,
    record_id: Uuid,
) -> Result<Vec<WorkflowStepRow>, DbError>
where
    E: Executor<'e, Database = Postgres>,
{
    let rows = sqlx::query_as::<_, WorkflowStepRow>(&format!(
        "SELECT {STEP_COLUMNS} FROM workflow_steps \
         WHERE workflow_record_id = $1 ORDER BY step_number"
    ))
    .bind(record_id)
    .fetch_all(executor)
    .await?;
    Ok(rows)
}

/// The steps of several records at once (history loading).
pub async fn steps_for_records(
    pool: &PgPool,
    record_ids: &[Uuid],
) -> Result<Vec<WorkflowStepRow>, DbError> {
    let rows = sqlx::query_as::<_, WorkflowStepRow>(&format!(
        "SELECT {STEP_COLUMNS} FROM workflow_steps \
         WHERE workflow_record_id = ANY($1) ORDER BY workflow_record_id, step_number"
    ))
    .bind(record_ids)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Assignee snapshot entries for every step of a record.
pub async fn step_users_for_record<'e, E>(
    executor: E,
    record_id: Uuid,
) -> Result<Vec<StepUserRow>, DbError>
where
    E: Executor<'e, Database = Postgres>,
{
    let rows = sqlx::query_as::<_, StepUserRow>(
        r#"
        SELECT su.workflow_step_id, su.user_id
        FROM workflow_step_user su
        JOIN workflow_steps s ON s.id = su.workflow_step_id
        WHERE s.workflow_record_id = $1
        "#,
    )
    .bind(record_id)
    .fetch_all(executor)
    .await?;
    Ok(rows)
}

/// Assignee snapshot entries for the steps of several records.
pub async fn step_users_for_records(
    pool: &PgPool,
    record_ids: &[Uuid],
) -> Result<Vec<StepUserRow>, DbError> {
    let rows = sqlx::query_as::<_, StepUserRow>(
        r#"
        SELECT su.workflow_step_id, su.user_id
        FROM workflow_step_user su
        JOIN workflow_steps s ON s.id = su.workflow_step_id
        WHERE s.workflow_record_id = ANY($1)
        "#,
    )
    .bind(record_ids)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Insert steps and their assignee snapshots.
pub async fn insert_steps(
    tx: &mut Transaction<'_, Postgres>,
    steps: &[NewWorkflowStep],
    now: DateTime<Utc>,
) -> Result<(), DbError> {
    for step in steps {
        sqlx::query(
            r#"
            INSERT INTO workflow_steps
                (id, workflow_id, workflow_record_id, workflow_step_template_id,
                 step_number, state, created_at)
            VALUES ($1, $2, $3, $4, $5, 'initialized', $6)
            "#,
        )
        .bind(step.id)
        .bind(step.workflow_id)
        .bind(step.workflow_record_id)
        .bind(step.workflow_step_template_id)
        .bind(step.step_number)
        .bind(now)
        .execute(&mut **tx)
        .await?;

        for user_id in &step.assignee_ids {
            sqlx::query(
                "INSERT INTO workflow_step_user (workflow_step_id, user_id) VALUES ($1, $2)",
            )
            .bind(step.id)
            .bind(user_id)
            .execute(&mut **tx)
            .await?;
        }
    }
    Ok(())
}

/// Record the outcome of an operated step.
pub async fn update_step_operation(
    tx: &mut Transaction<'_, Postgres>,
    step_id: Uuid,
    state: &str,
    operation_user_id: Uuid,
    operate_at: DateTime<Utc>,
    reason: Option<&str>,
) -> Result<(), DbError> {
    sqlx::query(
        r#"
        UPDATE workflow_steps
        SET state = $1, operation_user_id = $2, operate_at = $3, reason = $4
        WHERE id = $5
        "#,
    )
    .bind(state)
    .bind(operation_user_id)
    .bind(operate_at)
    .bind(reason)
    .bind(step_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
