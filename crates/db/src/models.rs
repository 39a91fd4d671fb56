//! Row structs that map 1-to-1 onto database tables.
//!
//! These are *persistence* models — they carry no domain behaviour.
//! Domain types (typed statuses, aggregates, transition rules) live in the
//! `engine` crate; statuses and step states are plain strings here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// workflow_templates
// ---------------------------------------------------------------------------

/// A persisted workflow template row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowTemplateRow {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    /// Opaque tag interpreted by the surrounding auditing subsystem.
    pub allow_submit_when_less_audit_level: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A persisted step template row.
///
/// `workflow_template_id` is `None` once the step has been detached by a
/// template-steps update; historical workflow steps keep referencing it by id.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowStepTemplateRow {
    pub id: Uuid,
    pub workflow_template_id: Option<Uuid>,
    pub step_number: i32,
    pub step_type: String,
    pub description: String,
    pub approved_by_authorized: Option<bool>,
    pub created_at: DateTime<Utc>,
}

/// Input for inserting one step template.  Ordering follows `step_number`.
#[derive(Debug, Clone)]
pub struct NewStepTemplate {
    pub id: Uuid,
    pub step_number: i32,
    pub step_type: String,
    pub description: String,
    pub approved_by_authorized: Option<bool>,
    pub user_ids: Vec<Uuid>,
}

/// One statically-assigned user from `workflow_step_template_user`.
#[derive(Debug, Clone, FromRow)]
pub struct TemplateUserRow {
    pub workflow_step_template_id: Uuid,
    pub user_id: Uuid,
}

// ---------------------------------------------------------------------------
// workflows
// ---------------------------------------------------------------------------

/// A persisted workflow row.  `workflow_record_id` points at the current
/// record; prior records hang off `workflow_record_history`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowRow {
    pub id: Uuid,
    pub subject: String,
    pub description: String,
    pub create_user_id: Uuid,
    pub workflow_record_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// workflow_records
// ---------------------------------------------------------------------------

/// A persisted workflow record row — one attempt through the approval chain.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowRecordRow {
    pub id: Uuid,
    pub task_id: Uuid,
    pub current_step_id: Option<Uuid>,
    pub status: String,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub schedule_user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// workflow_steps
// ---------------------------------------------------------------------------

/// A persisted workflow step row.
///
/// `step_number` snapshots the template numbering at record creation so the
/// step order survives template edits (and UUID keys carry no order).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowStepRow {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub workflow_record_id: Uuid,
    pub workflow_step_template_id: Uuid,
    pub step_number: i32,
    pub state: String,
    pub operation_user_id: Option<Uuid>,
    pub operate_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One assignee snapshot entry from `workflow_step_user`.
#[derive(Debug, Clone, FromRow)]
pub struct StepUserRow {
    pub workflow_step_id: Uuid,
    pub user_id: Uuid,
}

/// Input for inserting one workflow step together with its assignee snapshot.
#[derive(Debug, Clone)]
pub struct NewWorkflowStep {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub workflow_record_id: Uuid,
    pub workflow_step_template_id: Uuid,
    pub step_number: i32,
    pub assignee_ids: Vec<Uuid>,
}

// ---------------------------------------------------------------------------
// tasks
// ---------------------------------------------------------------------------

/// A task row.  Tasks are owned by the external task collaborator; the
/// engine reads the instance linkage and joins on status for reporting.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TaskRow {
    pub id: Uuid,
    pub instance_id: Uuid,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// scheduler scan results
// ---------------------------------------------------------------------------

/// Workflow/record id pair returned by the due-scan and expiry-scan queries.
#[derive(Debug, Clone, Copy, FromRow)]
pub struct WorkflowRecordRef {
    pub workflow_id: Uuid,
    pub workflow_record_id: Uuid,
}
