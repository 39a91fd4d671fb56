//! Workflow template handlers.

use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use engine::{CreateTemplate, StepType, TemplateStepInput, WorkflowTemplate};

use crate::error::{ApiResult, Envelope};
use crate::AppState;

#[derive(serde::Deserialize)]
pub struct TemplateStepDto {
    #[serde(rename = "type")]
    pub step_type: StepType,
    #[serde(default)]
    pub desc: String,
    pub approved_by_authorized: Option<bool>,
    #[serde(default)]
    pub user_ids: Vec<Uuid>,
}

impl From<TemplateStepDto> for TemplateStepInput {
    fn from(dto: TemplateStepDto) -> Self {
        Self {
            step_type: dto.step_type,
            description: dto.desc,
            approved_by_authorized: dto.approved_by_authorized,
            user_ids: dto.user_ids,
        }
    }
}

#[derive(serde::Deserialize)]
pub struct CreateTemplateDto {
    pub name: String,
    #[serde(default)]
    pub desc: String,
    pub allow_submit_when_less_audit_level: Option<String>,
    pub steps: Vec<TemplateStepDto>,
}

pub async fn create(
    State(state): State<AppState>,
    Json(payload): Json<CreateTemplateDto>,
) -> ApiResult<Json<Envelope<WorkflowTemplate>>> {
    let template = state
        .templates
        .create(CreateTemplate {
            name: payload.name,
            description: payload.desc,
            allow_submit_when_less_audit_level: payload.allow_submit_when_less_audit_level,
            steps: payload.steps.into_iter().map(Into::into).collect(),
        })
        .await?;
    Ok(Envelope::ok(template))
}

pub async fn list(State(state): State<AppState>) -> ApiResult<Json<Envelope<Vec<String>>>> {
    let names = state.templates.list_names().await?;
    Ok(Envelope::ok(names))
}

pub async fn get(
    Path(name): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Json<Envelope<WorkflowTemplate>>> {
    let template = state.templates.get_by_name(&name).await?;
    Ok(Envelope::ok(template))
}

/// Partial update: replace the step list and/or the instance binding.
#[derive(serde::Deserialize)]
pub struct UpdateTemplateDto {
    pub steps: Option<Vec<TemplateStepDto>>,
    pub instance_ids: Option<Vec<Uuid>>,
}

pub async fn update(
    Path(name): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<UpdateTemplateDto>,
) -> ApiResult<Json<Envelope<WorkflowTemplate>>> {
    if let Some(steps) = payload.steps {
        state
            .templates
            .update_steps(&name, steps.into_iter().map(Into::into).collect())
            .await?;
    }
    if let Some(instance_ids) = payload.instance_ids {
        state.templates.bind_instances(&name, instance_ids).await?;
    }
    let template = state.templates.get_by_name(&name).await?;
    Ok(Envelope::ok(template))
}

pub async fn delete(
    Path(name): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Json<Envelope<()>>> {
    state.templates.delete(&name).await?;
    Ok(Envelope::empty())
}
