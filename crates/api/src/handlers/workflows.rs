//! Workflow lifecycle handlers.

use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use engine::{CreateWorkflow, Workflow, WorkflowRecord};

use crate::error::{ApiResult, Envelope};
use crate::extract::Identity;
use crate::AppState;

#[derive(serde::Deserialize)]
pub struct CreateWorkflowDto {
    pub subject: String,
    #[serde(default)]
    pub desc: String,
    pub task_id: Uuid,
    pub template_id: Option<Uuid>,
}

pub async fn create(
    State(state): State<AppState>,
    Identity(caller): Identity,
    Json(payload): Json<CreateWorkflowDto>,
) -> ApiResult<Json<Envelope<Workflow>>> {
    let workflow = state
        .workflows
        .create(CreateWorkflow {
            subject: payload.subject,
            description: payload.desc,
            creator: caller.id,
            task_id: payload.task_id,
            template_id: payload.template_id,
        })
        .await?;
    Ok(Envelope::ok(workflow))
}

pub async fn get(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> ApiResult<Json<Envelope<Workflow>>> {
    let workflow = state.workflows.get(id).await?;
    Ok(Envelope::ok(workflow))
}

pub async fn history(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> ApiResult<Json<Envelope<Vec<WorkflowRecord>>>> {
    let records = state.workflows.history(id).await?;
    Ok(Envelope::ok(records))
}

pub async fn approve(
    Path((id, step_id)): Path<(Uuid, Uuid)>,
    State(state): State<AppState>,
    Identity(caller): Identity,
) -> ApiResult<Json<Envelope<Workflow>>> {
    let workflow = state.workflows.approve(id, step_id, &caller).await?;
    Ok(Envelope::ok(workflow))
}

#[derive(serde::Deserialize)]
pub struct RejectDto {
    pub reason: String,
}

pub async fn reject(
    Path((id, step_id)): Path<(Uuid, Uuid)>,
    State(state): State<AppState>,
    Identity(caller): Identity,
    Json(payload): Json<RejectDto>,
) -> ApiResult<Json<Envelope<Workflow>>> {
    let workflow = state
        .workflows
        .reject(id, step_id, &caller, payload.reason)
        .await?;
    Ok(Envelope::ok(workflow))
}

pub async fn cancel(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Identity(caller): Identity,
) -> ApiResult<Json<Envelope<Workflow>>> {
    let workflow = state.workflows.cancel(id, &caller).await?;
    Ok(Envelope::ok(workflow))
}

#[derive(serde::Deserialize)]
pub struct ScheduleDto {
    pub scheduled_at: DateTime<Utc>,
}

pub async fn schedule(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Identity(caller): Identity,
    Json(payload): Json<ScheduleDto>,
) -> ApiResult<Json<Envelope<Workflow>>> {
    let workflow = state
        .workflows
        .schedule(id, &caller, payload.scheduled_at)
        .await?;
    Ok(Envelope::ok(workflow))
}

pub async fn unschedule(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Identity(caller): Identity,
) -> ApiResult<Json<Envelope<Workflow>>> {
    let workflow = state.workflows.unschedule(id, &caller).await?;
    Ok(Envelope::ok(workflow))
}

#[derive(serde::Deserialize)]
pub struct ResubmitDto {
    pub task_id: Uuid,
}

pub async fn resubmit(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Identity(caller): Identity,
    Json(payload): Json<ResubmitDto>,
) -> ApiResult<Json<Envelope<Workflow>>> {
    let workflow = state
        .workflows
        .resubmit(id, payload.task_id, &caller)
        .await?;
    Ok(Envelope::ok(workflow))
}

pub async fn delete(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Identity(caller): Identity,
) -> ApiResult<Json<Envelope<()>>> {
    state.workflows.delete(id, &caller).await?;
    Ok(Envelope::empty())
}
