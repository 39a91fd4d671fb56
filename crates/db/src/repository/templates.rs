//! Workflow template registry operations.

use chrono::{DateTime, Utc};
use sqlx::{Executor, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::{
    models::{NewStepTemplate, TemplateUserRow, WorkflowStepTemplateRow, WorkflowTemplateRow},
    DbError,
};

const TEMPLATE_COLUMNS: &str =
    "id, name, description, allow_submit_when_less_audit_level, created_at";

const STEP_TEMPLATE_COLUMNS: &str = "id, workflow_template_id, step_number, step_type, \
     description, approved_by_authorized, created_at";

/// Insert a template together with its ordered step-template list and the
/// static assignee sets, all in one transaction.
pub async fn create_template(
    pool: &PgPool,
    id: Uuid,
    name: &str,
    description: &str,
    allow_submit_when_less_audit_level: Option<&str>,
    steps: &[NewStepTemplate],
    now: DateTime<Utc>,
) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO workflow_templates
            (id, name, description, allow_submit_when_less_audit_level, created_at)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(id)
    .bind(name)
    .bind(description)
    .bind(allow_submit_when_less_audit_level)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    insert_step_templates(&mut tx, id, steps, now).await?;

    tx.commit().await?;
    Ok(())
}

/// Replace a template's ordered step list atomically.
///
/// Existing step templates are detached (`workflow_template_id` cleared) so
/// historical workflow steps keep a valid reference, then the fresh ordered
/// sequence is inserted with its assignee sets.
pub async fn update_template_steps(
    pool: &PgPool,
    template_id: Uuid,
    steps: &[NewStepTemplate],
    now: DateTime<Utc>,
) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        "UPDATE workflow_step_templates SET workflow_template_id = NULL \
         WHERE workflow_template_id = $1",
    )
    .bind(template_id)
    .execute(&mut *tx)
    .await?;

    insert_step_templates(&mut tx, template_id, steps, now).await?;

    tx.commit().await?;
    Ok(())
}

async fn insert_step_templates(
    tx: &mut Transaction<'_, Postgres>,
    template_id: Uuid,
    steps: &[NewStepTemplate],
    now: DateTime<Utc>,
) -> Result<(), DbError> {
    for step in steps {
        sqlx::query(
            r#"
            INSERT INTO workflow_step_templates
                (id, workflow_template_id, step_number, step_type, description,
                 approved_by_authorized, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(step.id)
        .bind(template_id)
        .bind(step.step_number)
        .bind(&step.step_type)
        .bind(&step.description)
        .bind(step.approved_by_authorized)
        .bind(now)
        .execute(&mut **tx)
        .await?;

        for user_id in &step.user_ids {
            sqlx::query(
                "INSERT INTO workflow_step_template_user \
                 (workflow_step_template_id, user_id) VALUES ($1, $2)",
            )
            .bind(step.id)
            .bind(user_id)
            .execute(&mut **tx)
            .await?;
        }
    }
    Ok(())
}

/// Replace the set of instances a template is bound to.
pub async fn bind_instances(
    pool: &PgPool,
    template_id: Uuid,
    instance_ids: &[Uuid],
) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM workflow_template_instance WHERE workflow_template_id = $1")
        .bind(template_id)
        .execute(&mut *tx)
        .await?;

    for instance_id in instance_ids {
        sqlx::query(
            "INSERT INTO workflow_template_instance (workflow_template_id, instance_id) \
             VALUES ($1, $2)",
        )
        .bind(template_id)
        .bind(instance_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Fetch a live template by its unique name.
pub async fn get_template_by_name(
    pool: &PgPool,
    name: &str,
) -> Result<Option<WorkflowTemplateRow>, DbError> {
    let row = sqlx::query_as::<_, WorkflowTemplateRow>(&format!(
        "SELECT {TEMPLATE_COLUMNS} FROM workflow_templates \
         WHERE name = $1 AND deleted_at IS NULL"
    ))
    .bind(name)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Fetch a live template by its primary key.
pub async fn get_template_by_id(
    pool: &PgPool,
    id: Uuid,
) -> Result<Option<WorkflowTemplateRow>, DbError> {
    let row = sqlx::query_as::<_, WorkflowTemplateRow>(&format!(
        "SELECT {TEMPLATE_COLUMNS} FROM workflow_templates \
         WHERE id = $1 AND deleted_at IS NULL"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// The live template bound to the given instance, if any.
pub async fn template_for_instance(
    pool: &PgPool,
    instance_id: Uuid,
) -> Result<Option<WorkflowTemplateRow>, DbError> {
    let row = sqlx::query_as::<_, WorkflowTemplateRow>(
        r#"
        SELECT t.id, t.name, t.description, t.allow_submit_when_less_audit_level, t.created_at
        FROM workflow_templates t
        JOIN workflow_template_instance ti ON ti.workflow_template_id = t.id
        WHERE ti.instance_id = $1 AND t.deleted_at IS NULL
        LIMIT 1
        "#,
    )
    .bind(instance_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Names of all live templates, for pickers.
pub async fn list_template_names(pool: &PgPool) -> Result<Vec<String>, DbError> {
    let names = sqlx::query_scalar::<_, String>(
        "SELECT name FROM workflow_templates WHERE deleted_at IS NULL ORDER BY name",
    )
    .fetch_all(pool)
    .await?;
    Ok(names)
}

/// The attached step templates of a template, in step order.
pub async fn step_templates_for_template(
    pool: &PgPool,
    template_id: Uuid,
) -> Result<Vec<WorkflowStepTemplateRow>, DbError> {
    let rows = sqlx::query_as::<_, WorkflowStepTemplateRow>(&format!(
        "SELECT {STEP_TEMPLATE_COLUMNS} FROM workflow_step_templates \
         WHERE workflow_template_id = $1 ORDER BY step_number"
    ))
    .bind(template_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Step templates by primary key.  Detached and soft-deleted rows are
/// included on purpose: historical workflow steps reference them by id.
///
/// Generic over the executor so the locked lifecycle paths can resolve step
/// types inside their transaction.
pub async fn step_templates_by_ids<'e, E>(
    executor: E,
    ids: &[Uuid],
) -> Result<Vec<WorkflowStepTemplateRow>, DbError>
where
    E: Executor<'e, Database = Postgres>,
{
    let rows = sqlx::query_as::<_, WorkflowStepTemplateRow>(&format!(
        "SELECT {STEP_TEMPLATE_COLUMNS} FROM workflow_step_templates WHERE id = ANY($1)"
    ))
    .bind(ids)
    .fetch_all(executor)
    .await?;
    Ok(rows)
}

/// Static assignee sets for all step templates of a template.
pub async fn step_template_users(
    pool: &PgPool,
    template_id: Uuid,
) -> Result<Vec<TemplateUserRow>, DbError> {
    let rows = sqlx::query_as::<_, TemplateUserRow>(
        r#"
        SELECT tu.workflow_step_template_id, tu.user_id
        FROM workflow_step_template_user tu
        JOIN workflow_step_templates st ON st.id = tu.workflow_step_template_id
        WHERE st.workflow_template_id = $1
        "#,
    )
    .bind(template_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Instance ids the template is bound to.
pub async fn instances_for_template(
    pool: &PgPool,
    template_id: Uuid,
) -> Result<Vec<Uuid>, DbError> {
    let ids = sqlx::query_scalar::<_, Uuid>(
        "SELECT instance_id FROM workflow_template_instance WHERE workflow_template_id = $1",
    )
    .bind(template_id)
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

/// Whether any workflow step references one of the template's steps.
pub async fn template_is_referenced(pool: &PgPool, template_id: Uuid) -> Result<bool, DbError> {
    let referenced = sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS (
            SELECT 1
            FROM workflow_steps s
            JOIN workflow_step_templates st ON st.id = s.workflow_step_template_id
            WHERE st.workflow_template_id = $1
        )
        "#,
    )
    .bind(template_id)
    .fetch_one(pool)
    .await?;
    Ok(referenced)
}

/// Soft-delete a template.  Returns `NotFound` if no live row matched.
pub async fn delete_template(pool: &PgPool, id: Uuid, now: DateTime<Utc>) -> Result<(), DbError> {
    let result =
        sqlx::query("UPDATE workflow_templates SET deleted_at = $1 WHERE id = $2 AND deleted_at IS NULL")
            .bind(now)
            .bind(id)
            .execute(pool)
            .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}
