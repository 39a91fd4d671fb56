//! Core domain models for the workflow engine.
//!
//! A `Workflow` owns exactly one current `WorkflowRecord`; a record owns an
//! ordered list of `WorkflowStep`s mirroring the template numbering at the
//! time the record was created.  Prior records accumulate in the history
//! when a rejected workflow is re-submitted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Step types
// ---------------------------------------------------------------------------

/// What a step template asks of its assignees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    SqlReview,
    SqlExecute,
    CreateWorkflow,
    UpdateWorkflow,
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SqlReview => write!(f, "sql_review"),
            Self::SqlExecute => write!(f, "sql_execute"),
            Self::CreateWorkflow => write!(f, "create_workflow"),
            Self::UpdateWorkflow => write!(f, "update_workflow"),
        }
    }
}

impl std::str::FromStr for StepType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sql_review" => Ok(Self::SqlReview),
            "sql_execute" => Ok(Self::SqlExecute),
            "create_workflow" => Ok(Self::CreateWorkflow),
            "update_workflow" => Ok(Self::UpdateWorkflow),
            other => Err(format!("unknown step type: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Record status
// ---------------------------------------------------------------------------

/// Lifecycle status of one record (one attempt through the approval chain).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    OnProcess,
    Rejected,
    Canceled,
    ExecScheduled,
    Executing,
    ExecFailed,
    Finished,
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OnProcess => write!(f, "on_process"),
            Self::Rejected => write!(f, "rejected"),
            Self::Canceled => write!(f, "canceled"),
            Self::ExecScheduled => write!(f, "exec_scheduled"),
            Self::Executing => write!(f, "executing"),
            Self::ExecFailed => write!(f, "exec_failed"),
            Self::Finished => write!(f, "finished"),
        }
    }
}

impl std::str::FromStr for RecordStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "on_process" => Ok(Self::OnProcess),
            "rejected" => Ok(Self::Rejected),
            "canceled" => Ok(Self::Canceled),
            "exec_scheduled" => Ok(Self::ExecScheduled),
            "executing" => Ok(Self::Executing),
            "exec_failed" => Ok(Self::ExecFailed),
            "finished" => Ok(Self::Finished),
            other => Err(format!("unknown record status: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Step state
// ---------------------------------------------------------------------------

/// State of one approval step.  Transitions are monotone: `initialized`
/// moves to `approved` or `rejected` exactly once and is terminal after.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Initialized,
    Approved,
    Rejected,
}

impl std::fmt::Display for StepState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initialized => write!(f, "initialized"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

impl std::str::FromStr for StepState {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initialized" => Ok(Self::Initialized),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown step state: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Caller
// ---------------------------------------------------------------------------

/// Identity performing an operation.  Authentication happens upstream; the
/// engine only checks assignee membership, creatorship, and the admin flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub id: Uuid,
    pub admin: bool,
}

impl Caller {
    pub fn user(id: Uuid) -> Self {
        Self { id, admin: false }
    }

    pub fn admin(id: Uuid) -> Self {
        Self { id, admin: true }
    }

    /// Identity used by the scheduler's internal sweeps.
    pub fn system() -> Self {
        Self { id: Uuid::nil(), admin: true }
    }
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

/// One stage in a template's ordered step list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepTemplate {
    pub id: Uuid,
    /// 1-based position within the template.
    pub number: i32,
    pub step_type: StepType,
    pub description: String,
    /// When `Some(true)`, assignees are resolved at workflow creation from
    /// users holding `WORKFLOW_AUDIT` on the target instance instead of the
    /// static `user_ids` set.
    pub approved_by_authorized: Option<bool>,
    pub user_ids: Vec<Uuid>,
}

/// The reusable shape of a workflow: ordered steps plus bound instances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    /// Opaque tag interpreted by the surrounding auditing subsystem.
    pub allow_submit_when_less_audit_level: Option<String>,
    pub steps: Vec<StepTemplate>,
    pub instance_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Workflow aggregate
// ---------------------------------------------------------------------------

/// One approval stage within a record, with its assignee snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub record_id: Uuid,
    pub step_template_id: Uuid,
    /// Mirrors the template numbering at record creation.
    pub number: i32,
    pub step_type: StepType,
    pub state: StepState,
    pub operation_user_id: Option<Uuid>,
    pub operate_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
    /// Assignee snapshot; directory changes never alter it retroactively.
    pub assignees: Vec<Uuid>,
}

impl WorkflowStep {
    pub(crate) fn operate(
        &mut self,
        state: StepState,
        user_id: Uuid,
        at: DateTime<Utc>,
        reason: Option<String>,
    ) {
        self.state = state;
        self.operation_user_id = Some(user_id);
        self.operate_at = Some(at);
        self.reason = reason;
    }
}

/// One attempt through the approval chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub id: Uuid,
    pub task_id: Uuid,
    pub current_step_id: Option<Uuid>,
    pub status: RecordStatus,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub schedule_user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    /// Steps in template order.
    pub steps: Vec<WorkflowStep>,
}

impl WorkflowRecord {
    pub fn step(&self, id: Uuid) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub(crate) fn step_index(&self, id: Uuid) -> Option<usize> {
        self.steps.iter().position(|s| s.id == id)
    }

    /// The step awaiting operation, if any.
    pub fn current_step(&self) -> Option<&WorkflowStep> {
        self.current_step_id.and_then(|id| self.step(id))
    }

    /// The step after the current one in template order.
    pub fn next_step(&self) -> Option<&WorkflowStep> {
        let idx = self.step_index(self.current_step_id?)?;
        self.steps.get(idx + 1)
    }

    /// The last step of the record (the execute step in most templates).
    pub fn final_step(&self) -> Option<&WorkflowStep> {
        self.steps.last()
    }
}

/// An instance of the approval process for one SQL task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Uuid,
    pub subject: String,
    pub description: String,
    pub create_user_id: Uuid,
    pub created_at: DateTime<Utc>,
    /// The current record.
    pub record: WorkflowRecord,
    /// Superseded records, oldest first.  Empty unless explicitly loaded.
    pub history: Vec<WorkflowRecord>,
}

impl Workflow {
    pub fn current_step(&self) -> Option<&WorkflowStep> {
        self.record.current_step()
    }

    /// Whether the user belongs to the current step's assignee snapshot.
    pub fn is_operation_user(&self, user_id: Uuid) -> bool {
        self.current_step()
            .map(|s| s.assignees.contains(&user_id))
            .unwrap_or(false)
    }

    /// Whether `record` is the workflow's earliest record.
    ///
    /// Records are ordered by creation timestamp with the id as tiebreaker;
    /// the history must be loaded before calling this.
    pub fn is_first_record(&self, record: &WorkflowRecord) -> bool {
        let first = self
            .history
            .iter()
            .chain(std::iter::once(&self.record))
            .min_by_key(|r| (r.created_at, r.id));
        first.map(|r| r.id == record.id).unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// Step materialisation
// ---------------------------------------------------------------------------

/// Materialise a record's steps from an ordered template list.
///
/// Steps flagged `approved_by_authorized` snapshot `inspectors` (users
/// holding `WORKFLOW_AUDIT` on the target instance) instead of the static
/// user set.
pub fn steps_from_templates(
    step_templates: &[StepTemplate],
    inspectors: &[Uuid],
    workflow_id: Uuid,
    record_id: Uuid,
) -> Vec<WorkflowStep> {
    step_templates
        .iter()
        .map(|st| WorkflowStep {
            id: Uuid::new_v4(),
            workflow_id,
            record_id,
            step_template_id: st.id,
            number: st.number,
            step_type: st.step_type,
            state: StepState::Initialized,
            operation_user_id: None,
            operate_at: None,
            reason: None,
            assignees: if st.approved_by_authorized.unwrap_or(false) {
                inspectors.to_vec()
            } else {
                st.user_ids.clone()
            },
        })
        .collect()
}

/// Clone a record's step list for re-submission: fresh ids, assignees reused
/// verbatim from the previous snapshot, states reset to `initialized`.
pub fn clone_steps_for_resubmit(
    record: &WorkflowRecord,
    workflow_id: Uuid,
    new_record_id: Uuid,
) -> Vec<WorkflowStep> {
    record
        .steps
        .iter()
        .map(|step| WorkflowStep {
            id: Uuid::new_v4(),
            workflow_id,
            record_id: new_record_id,
            step_template_id: step.step_template_id,
            number: step.number,
            step_type: step.step_type,
            state: StepState::Initialized,
            operation_user_id: None,
            operate_at: None,
            reason: None,
            assignees: step.assignees.clone(),
        })
        .collect()
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn step_template(number: i32, step_type: StepType, users: Vec<Uuid>) -> StepTemplate {
        StepTemplate {
            id: Uuid::new_v4(),
            number,
            step_type,
            description: String::new(),
            approved_by_authorized: None,
            user_ids: users,
        }
    }

    fn record_with_steps(steps: Vec<WorkflowStep>) -> WorkflowRecord {
        WorkflowRecord {
            id: steps.first().map(|s| s.record_id).unwrap_or_else(Uuid::new_v4),
            task_id: Uuid::new_v4(),
            current_step_id: steps.first().map(|s| s.id),
            status: RecordStatus::OnProcess,
            scheduled_at: None,
            schedule_user_id: None,
            created_at: Utc::now(),
            steps,
        }
    }

    #[test]
    fn steps_are_materialised_in_template_order() {
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let templates = vec![
            step_template(1, StepType::SqlReview, vec![alice]),
            step_template(2, StepType::SqlExecute, vec![bob]),
        ];

        let workflow_id = Uuid::new_v4();
        let record_id = Uuid::new_v4();
        let steps = steps_from_templates(&templates, &[], workflow_id, record_id);

        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].number, 1);
        assert_eq!(steps[0].assignees, vec![alice]);
        assert_eq!(steps[1].step_type, StepType::SqlExecute);
        assert!(steps.iter().all(|s| s.state == StepState::Initialized));
        assert!(steps.iter().all(|s| s.record_id == record_id));
    }

    #[test]
    fn authorized_flag_snapshots_inspectors_instead_of_static_users() {
        let static_user = Uuid::new_v4();
        let eve = Uuid::new_v4();
        let frank = Uuid::new_v4();

        let mut flagged = step_template(1, StepType::SqlReview, vec![static_user]);
        flagged.approved_by_authorized = Some(true);
        let plain = step_template(2, StepType::SqlExecute, vec![static_user]);

        let steps = steps_from_templates(
            &[flagged, plain],
            &[eve, frank],
            Uuid::new_v4(),
            Uuid::new_v4(),
        );

        assert_eq!(steps[0].assignees, vec![eve, frank]);
        assert_eq!(steps[1].assignees, vec![static_user]);
    }

    #[test]
    fn next_and_final_step_follow_template_order() {
        let workflow_id = Uuid::new_v4();
        let record_id = Uuid::new_v4();
        let templates = vec![
            step_template(1, StepType::SqlReview, vec![Uuid::new_v4()]),
            step_template(2, StepType::SqlReview, vec![Uuid::new_v4()]),
            step_template(3, StepType::SqlExecute, vec![Uuid::new_v4()]),
        ];
        let steps = steps_from_templates(&templates, &[], workflow_id, record_id);
        let record = record_with_steps(steps);

        assert_eq!(record.current_step().unwrap().number, 1);
        assert_eq!(record.next_step().unwrap().number, 2);
        assert_eq!(record.final_step().unwrap().number, 3);
    }

    #[test]
    fn resubmit_clone_resets_state_and_keeps_assignees() {
        let alice = Uuid::new_v4();
        let workflow_id = Uuid::new_v4();
        let templates = vec![step_template(1, StepType::SqlReview, vec![alice])];
        let mut steps = steps_from_templates(&templates, &[], workflow_id, Uuid::new_v4());
        steps[0].operate(StepState::Rejected, alice, Utc::now(), Some("needs index".into()));
        let record = record_with_steps(steps);

        let new_record_id = Uuid::new_v4();
        let cloned = clone_steps_for_resubmit(&record, workflow_id, new_record_id);

        assert_eq!(cloned.len(), 1);
        assert_ne!(cloned[0].id, record.steps[0].id);
        assert_eq!(cloned[0].state, StepState::Initialized);
        assert_eq!(cloned[0].assignees, vec![alice]);
        assert_eq!(cloned[0].step_template_id, record.steps[0].step_template_id);
        assert!(cloned[0].operation_user_id.is_none());
        assert!(cloned[0].reason.is_none());
    }

    #[test]
    fn first_record_is_earliest_by_creation_then_id() {
        let now = Utc::now();
        let make_record = |created_at| WorkflowRecord {
            id: Uuid::new_v4(),
            task_id: Uuid::new_v4(),
            current_step_id: None,
            status: RecordStatus::Rejected,
            scheduled_at: None,
            schedule_user_id: None,
            created_at,
            steps: vec![],
        };

        let oldest = make_record(now - Duration::hours(2));
        let middle = make_record(now - Duration::hours(1));
        let current = make_record(now);

        let workflow = Workflow {
            id: Uuid::new_v4(),
            subject: "s".into(),
            description: String::new(),
            create_user_id: Uuid::new_v4(),
            created_at: now - Duration::hours(2),
            record: current.clone(),
            history: vec![oldest.clone(), middle.clone()],
        };

        assert!(workflow.is_first_record(&oldest));
        assert!(!workflow.is_first_record(&middle));
        assert!(!workflow.is_first_record(&current));
    }

    #[test]
    fn unknown_enum_strings_are_rejected() {
        assert!("bogus".parse::<RecordStatus>().is_err());
        assert!("bogus".parse::<StepState>().is_err());
        assert!("bogus".parse::<StepType>().is_err());
        assert_eq!(
            "exec_scheduled".parse::<RecordStatus>().unwrap(),
            RecordStatus::ExecScheduled
        );
    }
}
