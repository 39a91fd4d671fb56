//! Workflow lifecycle manager.
//!
//! `WorkflowService` is the state machine's transactional envelope: every
//! mutating operation loads the aggregate under a `FOR UPDATE` lock on the
//! current record, applies a pure transition from [`crate::transitions`],
//! persists the result, and commits.  Cancellation is drop semantics — a
//! caller that gives up before commit rolls the transaction back and the
//! workflow is unchanged.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{Postgres, Transaction};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use db::models::{
    NewWorkflowStep, StepUserRow, WorkflowRecordRow, WorkflowRow, WorkflowStepRow,
    WorkflowStepTemplateRow,
};
use db::repository::{
    records, reports, steps as steps_repo, tasks, templates as templates_repo,
    workflows as workflows_repo,
};
use db::{DbError, DbPool};
use runner::{Directory, TaskOutcome, TaskRunner, OP_WORKFLOW_AUDIT};

use crate::error::EngineError;
use crate::models::{
    clone_steps_for_resubmit, steps_from_templates, Caller, RecordStatus, StepState, StepTemplate,
    StepType, Workflow, WorkflowRecord, WorkflowStep,
};
use crate::transitions::{self, ApproveOutcome};

/// Input for [`WorkflowService::create`].
#[derive(Debug, Clone)]
pub struct CreateWorkflow {
    pub subject: String,
    pub description: String,
    pub creator: Uuid,
    pub task_id: Uuid,
    /// Explicit template choice; when absent the template bound to the
    /// task's instance is used.
    pub template_id: Option<Uuid>,
}

/// The workflow lifecycle manager.
pub struct WorkflowService {
    pool: DbPool,
    directory: Arc<dyn Directory>,
    runner: Arc<dyn TaskRunner>,
}

impl WorkflowService {
    pub fn new(pool: DbPool, directory: Arc<dyn Directory>, runner: Arc<dyn TaskRunner>) -> Self {
        Self { pool, directory, runner }
    }

    // -----------------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------------

    /// Create a workflow: one record, one step per template entry, current
    /// step pointing at the first.  All writes happen in one transaction.
    #[instrument(skip(self, req), fields(task_id = %req.task_id))]
    pub async fn create(&self, req: CreateWorkflow) -> Result<Workflow, EngineError> {
        if req.subject.trim().is_empty() {
            return Err(EngineError::BadRequest("subject must not be empty".into()));
        }

        let task = tasks::get_task(&self.pool, req.task_id)
            .await?
            .ok_or(EngineError::NotFound("task"))?;

        let template_row = match req.template_id {
            Some(id) => {
                let row = templates_repo::get_template_by_id(&self.pool, id)
                    .await?
                    .ok_or_else(|| EngineError::BadRequest("unknown workflow template".into()))?;
                let bound = templates_repo::instances_for_template(&self.pool, row.id).await?;
                if !bound.is_empty() && !bound.contains(&task.instance_id) {
                    return Err(EngineError::BadRequest(
                        "workflow template is not bound to the task's instance".into(),
                    ));
                }
                row
            }
            None => templates_repo::template_for_instance(&self.pool, task.instance_id)
                .await?
                .ok_or_else(|| {
                    EngineError::BadRequest(
                        "no workflow template is bound to the task's instance".into(),
                    )
                })?,
        };

        let step_template_rows =
            templates_repo::step_templates_for_template(&self.pool, template_row.id).await?;
        if step_template_rows.is_empty() {
            return Err(EngineError::BadRequest(
                "workflow template has no steps".into(),
            ));
        }
        let template_users = templates_repo::step_template_users(&self.pool, template_row.id).await?;
        let step_templates = compose_step_templates(step_template_rows, &template_users)?;

        // Dynamic assignees are a creation-time snapshot; an empty set would
        // leave the workflow unadvanceable, so creation is refused.
        let inspectors = if step_templates
            .iter()
            .any(|st| st.approved_by_authorized.unwrap_or(false))
        {
            let users = self
                .directory
                .users_with_operation_code(task.instance_id, OP_WORKFLOW_AUDIT)
                .await?;
            if users.is_empty() {
                return Err(EngineError::BadRequest(
                    "no user holds the workflow audit code on the target instance".into(),
                ));
            }
            users
        } else {
            Vec::new()
        };

        let workflow_id = Uuid::new_v4();
        let record_id = Uuid::new_v4();
        let steps = steps_from_templates(&step_templates, &inspectors, workflow_id, record_id);
        let new_steps: Vec<NewWorkflowStep> = steps.iter().map(to_new_step).collect();

        workflows_repo::create_workflow(
            &self.pool,
            workflow_id,
            &req.subject,
            &req.description,
            req.creator,
            record_id,
            task.id,
            &new_steps,
            Utc::now(),
        )
        .await?;

        info!("workflow {workflow_id} created with {} steps", steps.len());
        self.get(workflow_id).await
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Fetch a workflow with its current record and steps.
    pub async fn get(&self, workflow_id: Uuid) -> Result<Workflow, EngineError> {
        let wf_row = self.workflow_row(workflow_id).await?;
        let record_id = current_record_id(&wf_row)?;
        let record_row = records::get_record(&self.pool, record_id)
            .await?
            .ok_or_else(|| EngineError::DataConflict("workflow record not exist".into()))?;

        let step_rows = steps_repo::steps_for_record(&self.pool, record_id).await?;
        let user_rows = steps_repo::step_users_for_record(&self.pool, record_id).await?;
        let template_rows = self.step_templates_for(&step_rows).await?;

        compose_workflow(wf_row, record_row, step_rows, user_rows, &template_rows)
    }

    /// Superseded records with their steps, oldest first.  Steps still
    /// `initialized` when the record was superseded are elided.
    pub async fn history(&self, workflow_id: Uuid) -> Result<Vec<WorkflowRecord>, EngineError> {
        self.workflow_row(workflow_id).await?;

        let record_rows = records::history_records(&self.pool, workflow_id).await?;
        if record_rows.is_empty() {
            return Ok(Vec::new());
        }

        let record_ids: Vec<Uuid> = record_rows.iter().map(|r| r.id).collect();
        let step_rows = steps_repo::steps_for_records(&self.pool, &record_ids).await?;
        let user_rows = steps_repo::step_users_for_records(&self.pool, &record_ids).await?;
        let template_rows = self.step_templates_for(&step_rows).await?;

        let mut history = Vec::with_capacity(record_rows.len());
        for row in record_rows {
            let record_id = row.id;
            let steps: Vec<WorkflowStepRow> = step_rows
                .iter()
                .filter(|s| s.workflow_record_id == record_id)
                .cloned()
                .collect();
            let mut record = compose_record(row, steps, &user_rows, &template_rows)?;
            record.steps.retain(|s| s.state != StepState::Initialized);
            history.push(record);
        }
        Ok(history)
    }

    /// Whether `record_id` is the workflow's earliest record by creation
    /// time (id as tiebreaker).
    pub async fn is_first_record(
        &self,
        workflow_id: Uuid,
        record_id: Uuid,
    ) -> Result<bool, EngineError> {
        let mut workflow = self.get(workflow_id).await?;
        workflow.history = self.history(workflow_id).await?;

        let record = workflow
            .history
            .iter()
            .chain(std::iter::once(&workflow.record))
            .find(|r| r.id == record_id)
            .cloned()
            .ok_or(EngineError::NotFound("workflow record"))?;
        Ok(workflow.is_first_record(&record))
    }

    /// Id of the workflow governing a task (current record or history).
    pub async fn find_by_task_id(&self, task_id: Uuid) -> Result<Option<Uuid>, EngineError> {
        let row = workflows_repo::get_workflow_by_task_id(&self.pool, task_id).await?;
        Ok(row.map(|r| r.id))
    }

    /// Id of the live workflow with the given subject.
    pub async fn find_by_subject(&self, subject: &str) -> Result<Option<Uuid>, EngineError> {
        let row = workflows_repo::get_workflow_by_subject(&self.pool, subject).await?;
        Ok(row.map(|r| r.id))
    }

    /// Id of the most recently created workflow.
    pub async fn find_last(&self) -> Result<Option<Uuid>, EngineError> {
        let row = workflows_repo::get_last_workflow(&self.pool).await?;
        Ok(row.map(|r| r.id))
    }

    /// The instance targeted by a workflow's current task.
    pub async fn instance_id_for_workflow(
        &self,
        workflow_id: Uuid,
    ) -> Result<Option<Uuid>, EngineError> {
        Ok(workflows_repo::get_instance_id_by_workflow_id(&self.pool, workflow_id).await?)
    }

    /// Whether any of the tasks has a record still on process.
    pub async fn task_workflow_is_running(&self, task_ids: &[Uuid]) -> Result<bool, EngineError> {
        Ok(records::task_workflow_running(&self.pool, task_ids).await?)
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Approve the current step.  Advances the record, finishes it, or —
    /// when the execute step was approved with no schedule pending — hands
    /// the task to the runner immediately.
    #[instrument(skip(self, caller), fields(workflow_id = %workflow_id, step_id = %step_id))]
    pub async fn approve(
        &self,
        workflow_id: Uuid,
        step_id: Uuid,
        caller: &Caller,
    ) -> Result<Workflow, EngineError> {
        let wf_row = self.workflow_row(workflow_id).await?;
        let now = Utc::now();

        let mut tx = self.begin().await?;
        let mut workflow = self.lock_and_load(&mut tx, &wf_row).await?;
        let outcome = transitions::approve(&mut workflow, step_id, caller, now)?;

        steps_repo::update_step_operation(
            &mut tx,
            step_id,
            &StepState::Approved.to_string(),
            caller.id,
            now,
            None,
        )
        .await?;
        self.persist_record(&mut tx, &workflow.record).await?;
        tx.commit().await.map_err(DbError::from)?;

        info!("step {step_id} approved, outcome {outcome:?}");
        if outcome == ApproveOutcome::ReadyToExecute {
            return self.execute(workflow_id).await;
        }
        self.get(workflow_id).await
    }

    /// Reject the current step; the record moves to `rejected` and later
    /// steps stay `initialized` indefinitely.
    #[instrument(skip(self, caller, reason), fields(workflow_id = %workflow_id, step_id = %step_id))]
    pub async fn reject(
        &self,
        workflow_id: Uuid,
        step_id: Uuid,
        caller: &Caller,
        reason: String,
    ) -> Result<Workflow, EngineError> {
        let wf_row = self.workflow_row(workflow_id).await?;
        let now = Utc::now();

        let mut tx = self.begin().await?;
        let mut workflow = self.lock_and_load(&mut tx, &wf_row).await?;
        transitions::reject(&mut workflow, step_id, caller, reason.clone(), now)?;

        steps_repo::update_step_operation(
            &mut tx,
            step_id,
            &StepState::Rejected.to_string(),
            caller.id,
            now,
            Some(&reason),
        )
        .await?;
        self.persist_record(&mut tx, &workflow.record).await?;
        tx.commit().await.map_err(DbError::from)?;

        info!("step {step_id} rejected");
        self.get(workflow_id).await
    }

    /// Supersede a rejected record with a fresh clone of its step list.
    #[instrument(skip(self, caller), fields(workflow_id = %workflow_id, task_id = %task_id))]
    pub async fn resubmit(
        &self,
        workflow_id: Uuid,
        task_id: Uuid,
        caller: &Caller,
    ) -> Result<Workflow, EngineError> {
        let wf_row = self.workflow_row(workflow_id).await?;
        let task = tasks::get_task(&self.pool, task_id)
            .await?
            .ok_or(EngineError::NotFound("task"))?;

        let mut tx = self.begin().await?;
        let workflow = self.lock_and_load(&mut tx, &wf_row).await?;
        transitions::check_resubmit(&workflow, caller)?;

        let now = Utc::now();
        let new_record_id = Uuid::new_v4();
        let cloned = clone_steps_for_resubmit(&workflow.record, workflow.id, new_record_id);
        let new_steps: Vec<NewWorkflowStep> = cloned.iter().map(to_new_step).collect();

        records::insert_record(&mut tx, new_record_id, task.id, cloned.first().map(|s| s.id), now)
            .await?;
        steps_repo::insert_steps(&mut tx, &new_steps, now).await?;
        records::push_history(&mut tx, workflow.id, workflow.record.id).await?;
        records::set_current_record(&mut tx, workflow.id, new_record_id).await?;
        tx.commit().await.map_err(DbError::from)?;

        info!("workflow {workflow_id} re-submitted as record {new_record_id}");
        self.get(workflow_id).await
    }

    /// Cancel the workflow.  A no-op success when already canceled.
    #[instrument(skip(self, caller), fields(workflow_id = %workflow_id))]
    pub async fn cancel(&self, workflow_id: Uuid, caller: &Caller) -> Result<Workflow, EngineError> {
        let wf_row = self.workflow_row(workflow_id).await?;

        let mut tx = self.begin().await?;
        let mut workflow = self.lock_and_load(&mut tx, &wf_row).await?;
        let changed = transitions::cancel(&mut workflow, caller)?;
        if changed {
            self.persist_record(&mut tx, &workflow.record).await?;
        }
        tx.commit().await.map_err(DbError::from)?;

        if changed {
            info!("workflow {workflow_id} canceled");
        }
        self.get(workflow_id).await
    }

    /// Set the execution schedule.
    #[instrument(skip(self, caller), fields(workflow_id = %workflow_id))]
    pub async fn schedule(
        &self,
        workflow_id: Uuid,
        caller: &Caller,
        when: DateTime<Utc>,
    ) -> Result<Workflow, EngineError> {
        let wf_row = self.workflow_row(workflow_id).await?;

        let mut tx = self.begin().await?;
        let mut workflow = self.lock_and_load(&mut tx, &wf_row).await?;
        transitions::schedule(&mut workflow, caller, when)?;
        records::update_schedule(&mut tx, workflow.record.id, Some(when), Some(caller.id)).await?;
        tx.commit().await.map_err(DbError::from)?;

        info!("workflow {workflow_id} scheduled at {when}");
        self.get(workflow_id).await
    }

    /// Clear the execution schedule.
    #[instrument(skip(self, caller), fields(workflow_id = %workflow_id))]
    pub async fn unschedule(
        &self,
        workflow_id: Uuid,
        caller: &Caller,
    ) -> Result<Workflow, EngineError> {
        let wf_row = self.workflow_row(workflow_id).await?;

        let mut tx = self.begin().await?;
        let mut workflow = self.lock_and_load(&mut tx, &wf_row).await?;
        transitions::unschedule(&mut workflow, caller)?;
        records::update_schedule(&mut tx, workflow.record.id, None, None).await?;
        tx.commit().await.map_err(DbError::from)?;

        self.get(workflow_id).await
    }

    /// Due-scan entry point: move a due record off `on_process` and execute.
    pub async fn launch_scheduled(&self, workflow_id: Uuid) -> Result<Workflow, EngineError> {
        let wf_row = self.workflow_row(workflow_id).await?;

        let mut tx = self.begin().await?;
        let mut workflow = self.lock_and_load(&mut tx, &wf_row).await?;
        transitions::mark_exec_scheduled(&mut workflow)?;
        self.persist_record(&mut tx, &workflow.record).await?;
        tx.commit().await.map_err(DbError::from)?;

        self.execute(workflow_id).await
    }

    /// Hand the task to the runner: `exec_scheduled → executing`, then
    /// `finished` or `exec_failed` from the runner's outcome.  A runner
    /// failure is a state, not an error — the transition is never rolled
    /// back.
    #[instrument(skip(self), fields(workflow_id = %workflow_id))]
    pub async fn execute(&self, workflow_id: Uuid) -> Result<Workflow, EngineError> {
        let wf_row = self.workflow_row(workflow_id).await?;

        // Claim the hand-off.
        let task_id = {
            let mut tx = self.begin().await?;
            let mut workflow = self.lock_and_load(&mut tx, &wf_row).await?;
            transitions::start_execution(&mut workflow)?;
            self.persist_record(&mut tx, &workflow.record).await?;
            tx.commit().await.map_err(DbError::from)?;
            workflow.record.task_id
        };

        info!("executing task {task_id}");
        let success = match self.runner.execute_task(task_id).await {
            Ok(TaskOutcome::Success) => true,
            Ok(TaskOutcome::Failure { reason }) => {
                warn!("task {task_id} failed: {reason}");
                false
            }
            Err(err) => {
                warn!("task runner broke off for task {task_id}: {err}");
                false
            }
        };

        // Settle the outcome.
        let mut tx = self.begin().await?;
        let mut workflow = self.lock_and_load(&mut tx, &wf_row).await?;
        transitions::finish_execution(&mut workflow, success)?;
        self.persist_record(&mut tx, &workflow.record).await?;
        tx.commit().await.map_err(DbError::from)?;

        self.get(workflow_id).await
    }

    /// Remove the workflow with all records, steps, and history entries.
    /// Admin only; callers above enforce any finer policy.
    #[instrument(skip(self, caller), fields(workflow_id = %workflow_id))]
    pub async fn delete(&self, workflow_id: Uuid, caller: &Caller) -> Result<(), EngineError> {
        if !caller.admin {
            return Err(EngineError::Unauthorized(
                "only an admin may delete a workflow",
            ));
        }
        self.workflow_row(workflow_id).await?;
        workflows_repo::delete_workflow(&self.pool, workflow_id).await?;
        info!("workflow {workflow_id} deleted");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Scheduler scans
    // -----------------------------------------------------------------------

    /// Workflow ids whose schedule has come due.
    pub async fn due_workflow_ids(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, EngineError> {
        let refs = workflows_repo::due_workflows(&self.pool, now).await?;
        Ok(refs.into_iter().map(|r| r.workflow_id).collect())
    }

    /// Workflow ids eligible for the expiry sweep.
    pub async fn expired_workflow_ids(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, EngineError> {
        Ok(workflows_repo::expired_workflows(&self.pool, cutoff).await?)
    }

    // -----------------------------------------------------------------------
    // Reporting
    // -----------------------------------------------------------------------

    pub async fn count_by_status(&self, statuses: &[RecordStatus]) -> Result<i64, EngineError> {
        let strings: Vec<String> = statuses.iter().map(|s| s.to_string()).collect();
        Ok(reports::count_by_status(&self.pool, &strings).await?)
    }

    pub async fn count_by_step_type(&self, types: &[StepType]) -> Result<i64, EngineError> {
        let strings: Vec<String> = types.iter().map(|t| t.to_string()).collect();
        Ok(reports::count_by_step_type(&self.pool, &strings).await?)
    }

    /// Task statuses are owned by the external task collaborator and travel
    /// as plain strings.
    pub async fn count_by_task_status(&self, statuses: &[String]) -> Result<i64, EngineError> {
        Ok(reports::count_by_task_status(&self.pool, statuses).await?)
    }

    pub async fn count_approved(&self) -> Result<i64, EngineError> {
        Ok(reports::count_approved(&self.pool).await?)
    }

    pub async fn audited_step_ids(&self) -> Result<Vec<Uuid>, EngineError> {
        Ok(reports::audited_step_ids(&self.pool).await?)
    }

    pub async fn audit_duration_minutes(&self, step_ids: &[Uuid]) -> Result<i64, EngineError> {
        Ok(reports::audit_duration_minutes(&self.pool, step_ids).await?)
    }

    pub async fn count_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64, EngineError> {
        Ok(reports::count_between(&self.pool, start, end).await?)
    }

    pub async fn count_all(&self) -> Result<i64, EngineError> {
        Ok(reports::count_all(&self.pool).await?)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn begin(&self) -> Result<Transaction<'_, Postgres>, EngineError> {
        Ok(self.pool.begin().await.map_err(DbError::from)?)
    }

    async fn workflow_row(&self, workflow_id: Uuid) -> Result<WorkflowRow, EngineError> {
        workflows_repo::get_workflow(&self.pool, workflow_id)
            .await?
            .ok_or(EngineError::NotFound("workflow"))
    }

    /// Load the aggregate inside the transaction, holding a row-level lock
    /// on the current record for the transaction's lifetime.
    async fn lock_and_load(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        wf_row: &WorkflowRow,
    ) -> Result<Workflow, EngineError> {
        let record_id = current_record_id(wf_row)?;
        let record_row = records::lock_record(tx, record_id).await.map_err(|err| match err {
            DbError::NotFound => EngineError::DataConflict("workflow record not exist".into()),
            other => other.into(),
        })?;
        let step_rows = steps_repo::steps_for_record(&mut **tx, record_id).await?;
        let user_rows = steps_repo::step_users_for_record(&mut **tx, record_id).await?;
        let template_ids: Vec<Uuid> =
            step_rows.iter().map(|s| s.workflow_step_template_id).collect();
        let template_rows =
            templates_repo::step_templates_by_ids(&mut **tx, &template_ids).await?;
        compose_workflow(wf_row.clone(), record_row, step_rows, user_rows, &template_rows)
    }

    async fn persist_record(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        record: &WorkflowRecord,
    ) -> Result<(), EngineError> {
        records::update_status(tx, record.id, &record.status.to_string(), record.current_step_id)
            .await?;
        Ok(())
    }

    async fn step_templates_for(
        &self,
        step_rows: &[WorkflowStepRow],
    ) -> Result<Vec<WorkflowStepTemplateRow>, EngineError> {
        let ids: Vec<Uuid> = step_rows.iter().map(|s| s.workflow_step_template_id).collect();
        Ok(templates_repo::step_templates_by_ids(&self.pool, &ids).await?)
    }
}

// ---------------------------------------------------------------------------
// Row → domain composition
// ---------------------------------------------------------------------------

fn current_record_id(wf_row: &WorkflowRow) -> Result<Uuid, EngineError> {
    wf_row
        .workflow_record_id
        .ok_or_else(|| EngineError::DataConflict("workflow has no current record".into()))
}

fn compose_workflow(
    wf_row: WorkflowRow,
    record_row: WorkflowRecordRow,
    step_rows: Vec<WorkflowStepRow>,
    user_rows: Vec<StepUserRow>,
    template_rows: &[WorkflowStepTemplateRow],
) -> Result<Workflow, EngineError> {
    let record = compose_record(record_row, step_rows, &user_rows, template_rows)?;
    Ok(Workflow {
        id: wf_row.id,
        subject: wf_row.subject,
        description: wf_row.description,
        create_user_id: wf_row.create_user_id,
        created_at: wf_row.created_at,
        record,
        history: Vec::new(),
    })
}

fn compose_record(
    record_row: WorkflowRecordRow,
    step_rows: Vec<WorkflowStepRow>,
    user_rows: &[StepUserRow],
    template_rows: &[WorkflowStepTemplateRow],
) -> Result<WorkflowRecord, EngineError> {
    let status: RecordStatus = record_row
        .status
        .parse()
        .map_err(EngineError::DataConflict)?;

    let mut steps = Vec::with_capacity(step_rows.len());
    for row in step_rows {
        let template = template_rows
            .iter()
            .find(|t| t.id == row.workflow_step_template_id)
            .ok_or_else(|| EngineError::DataConflict("workflow step template missing".into()))?;
        let step_type: StepType = template.step_type.parse().map_err(EngineError::DataConflict)?;
        let state: StepState = row.state.parse().map_err(EngineError::DataConflict)?;
        let assignees: Vec<Uuid> = user_rows
            .iter()
            .filter(|u| u.workflow_step_id == row.id)
            .map(|u| u.user_id)
            .collect();

        steps.push(WorkflowStep {
            id: row.id,
            workflow_id: row.workflow_id,
            record_id: row.workflow_record_id,
            step_template_id: row.workflow_step_template_id,
            number: row.step_number,
            step_type,
            state,
            operation_user_id: row.operation_user_id,
            operate_at: row.operate_at,
            reason: row.reason,
            assignees,
        });
    }

    Ok(WorkflowRecord {
        id: record_row.id,
        task_id: record_row.task_id,
        current_step_id: record_row.current_step_id,
        status,
        scheduled_at: record_row.scheduled_at,
        schedule_user_id: record_row.schedule_user_id,
        created_at: record_row.created_at,
        steps,
    })
}

fn compose_step_templates(
    rows: Vec<WorkflowStepTemplateRow>,
    users: &[db::models::TemplateUserRow],
) -> Result<Vec<StepTemplate>, EngineError> {
    rows.into_iter()
        .map(|row| {
            let step_type: StepType = row.step_type.parse().map_err(EngineError::DataConflict)?;
            let user_ids: Vec<Uuid> = users
                .iter()
                .filter(|u| u.workflow_step_template_id == row.id)
                .map(|u| u.user_id)
                .collect();
            Ok(StepTemplate {
                id: row.id,
                number: row.step_number,
                step_type,
                description: row.description,
                approved_by_authorized: row.approved_by_authorized,
                user_ids,
            })
        })
        .collect()
}

fn to_new_step(step: &WorkflowStep) -> NewWorkflowStep {
    NewWorkflowStep {
        id: step.id,
        workflow_id: step.workflow_id,
        workflow_record_id: step.record_id,
        workflow_step_template_id: step.step_template_id,
        step_number: step.number,
        assignee_ids: step.assignees.clone(),
    }
}
