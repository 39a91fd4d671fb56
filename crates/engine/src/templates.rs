//! Template registry.
//!
//! Templates are the reusable shape of a workflow: an ordered step list and
//! a set of bound instances.  Step-list replacement detaches the previous
//! step templates instead of deleting them, because historical workflow
//! steps keep referencing them by id.

use chrono::Utc;
use tracing::{info, instrument};
use uuid::Uuid;

use db::models::NewStepTemplate;
use db::repository::templates as templates_repo;
use db::DbPool;

use crate::error::EngineError;
use crate::models::{StepTemplate, StepType, WorkflowTemplate};

/// Input for one step of a template; the position in the list becomes the
/// step number.
#[derive(Debug, Clone)]
pub struct TemplateStepInput {
    pub step_type: StepType,
    pub description: String,
    pub approved_by_authorized: Option<bool>,
    pub user_ids: Vec<Uuid>,
}

/// Input for [`TemplateService::create`].
#[derive(Debug, Clone)]
pub struct CreateTemplate {
    pub name: String,
    pub description: String,
    pub allow_submit_when_less_audit_level: Option<String>,
    pub steps: Vec<TemplateStepInput>,
}

/// CRUD over workflow templates and their ordered step lists.
pub struct TemplateService {
    pool: DbPool,
}

impl TemplateService {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create a template with its ordered steps.
    #[instrument(skip(self, req), fields(name = %req.name))]
    pub async fn create(&self, req: CreateTemplate) -> Result<WorkflowTemplate, EngineError> {
        if req.name.trim().is_empty() {
            return Err(EngineError::BadRequest("template name must not be empty".into()));
        }
        if req.steps.is_empty() {
            return Err(EngineError::BadRequest("template must define at least one step".into()));
        }
        if templates_repo::get_template_by_name(&self.pool, &req.name).await?.is_some() {
            return Err(EngineError::Conflict(format!(
                "workflow template {} already exists",
                req.name
            )));
        }

        let id = Uuid::new_v4();
        let steps = to_new_step_templates(&req.steps);
        templates_repo::create_template(
            &self.pool,
            id,
            &req.name,
            &req.description,
            req.allow_submit_when_less_audit_level.as_deref(),
            &steps,
            Utc::now(),
        )
        .await
        .map_err(|err| {
            EngineError::conflict_on_unique(
                err,
                &format!("workflow template {} already exists", req.name),
            )
        })?;

        info!("workflow template {} created", req.name);
        self.get_by_id(id).await
    }

    /// Replace a template's ordered step list atomically.
    #[instrument(skip(self, steps), fields(name = %name))]
    pub async fn update_steps(
        &self,
        name: &str,
        steps: Vec<TemplateStepInput>,
    ) -> Result<WorkflowTemplate, EngineError> {
        if steps.is_empty() {
            return Err(EngineError::BadRequest("template must define at least one step".into()));
        }
        let row = templates_repo::get_template_by_name(&self.pool, name)
            .await?
            .ok_or(EngineError::NotFound("workflow template"))?;

        let new_steps = to_new_step_templates(&steps);
        templates_repo::update_template_steps(&self.pool, row.id, &new_steps, Utc::now()).await?;

        info!("workflow template {name} steps replaced ({})", new_steps.len());
        self.get_by_id(row.id).await
    }

    /// Replace the set of instances the template is bound to.
    pub async fn bind_instances(
        &self,
        name: &str,
        instance_ids: Vec<Uuid>,
    ) -> Result<WorkflowTemplate, EngineError> {
        let row = templates_repo::get_template_by_name(&self.pool, name)
            .await?
            .ok_or(EngineError::NotFound("workflow template"))?;
        templates_repo::bind_instances(&self.pool, row.id, &instance_ids).await?;
        self.get_by_id(row.id).await
    }

    /// Fetch a template with its steps, static assignees, and bound
    /// instances.
    pub async fn get_by_name(&self, name: &str) -> Result<WorkflowTemplate, EngineError> {
        let row = templates_repo::get_template_by_name(&self.pool, name)
            .await?
            .ok_or(EngineError::NotFound("workflow template"))?;
        self.load(row).await
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<WorkflowTemplate, EngineError> {
        let row = templates_repo::get_template_by_id(&self.pool, id)
            .await?
            .ok_or(EngineError::NotFound("workflow template"))?;
        self.load(row).await
    }

    /// Names of all live templates.
    pub async fn list_names(&self) -> Result<Vec<String>, EngineError> {
        Ok(templates_repo::list_template_names(&self.pool).await?)
    }

    /// Soft-delete a template.  Refused while any workflow step references
    /// one of its step templates.
    #[instrument(skip(self), fields(name = %name))]
    pub async fn delete(&self, name: &str) -> Result<(), EngineError> {
        let row = templates_repo::get_template_by_name(&self.pool, name)
            .await?
            .ok_or(EngineError::NotFound("workflow template"))?;
        if templates_repo::template_is_referenced(&self.pool, row.id).await? {
            return Err(EngineError::Conflict(format!(
                "workflow template {name} is referenced by existing workflows"
            )));
        }
        templates_repo::delete_template(&self.pool, row.id, Utc::now()).await?;
        info!("workflow template {name} deleted");
        Ok(())
    }

    async fn load(
        &self,
        row: db::models::WorkflowTemplateRow,
    ) -> Result<WorkflowTemplate, EngineError> {
        let step_rows = templates_repo::step_templates_for_template(&self.pool, row.id).await?;
        let user_rows = templates_repo::step_template_users(&self.pool, row.id).await?;
        let instance_ids = templates_repo::instances_for_template(&self.pool, row.id).await?;

        let mut steps = Vec::with_capacity(step_rows.len());
        for step_row in step_rows {
            let step_type: StepType =
                step_row.step_type.parse().map_err(EngineError::DataConflict)?;
            let user_ids: Vec<Uuid> = user_rows
                .iter()
                .filter(|u| u.workflow_step_template_id == step_row.id)
                .map(|u| u.user_id)
                .collect();
            steps.push(StepTemplate {
                id: step_row.id,
                number: step_row.step_number,
                step_type,
                description: step_row.description,
                approved_by_authorized: step_row.approved_by_authorized,
                user_ids,
            });
        }

        Ok(WorkflowTemplate {
            id: row.id,
            name: row.name,
            description: row.description,
            allow_submit_when_less_audit_level: row.allow_submit_when_less_audit_level,
            steps,
            instance_ids,
            created_at: row.created_at,
        })
    }
}

fn to_new_step_templates(steps: &[TemplateStepInput]) -> Vec<NewStepTemplate> {
    steps
        .iter()
        .enumerate()
        .map(|(i, step)| NewStepTemplate {
            id: Uuid::new_v4(),
            step_number: i as i32 + 1,
            step_type: step.step_type.to_string(),
            description: step.description.clone(),
            approved_by_authorized: step.approved_by_authorized,
            user_ids: step.user_ids.clone(),
        })
        .collect()
}
