//! Pure state-machine transitions.
//!
//! Every function checks its preconditions against an already-loaded
//! aggregate and mutates it in memory; nothing here touches storage.  The
//! lifecycle service calls these inside a transaction that holds a row-level
//! lock on the record, so a caller that lost a race re-reads state which no
//! longer satisfies the precondition and fails here with `Conflict`.
//!
//! Record status graph:
//!
//! ```text
//!   on_process ──approve execute step── exec_scheduled ── executing ── finished
//!       │              (or due-scan)                            └────── exec_failed
//!       ├── reject ─→ rejected ── resubmit ─→ (new record: on_process)
//!       └── cancel ─→ canceled          (also from rejected, exec_scheduled,
//!                                        exec_failed)
//! ```

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::{Caller, RecordStatus, StepState, StepType, Workflow};

/// What an approval did to the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApproveOutcome {
    /// A later step is now current; the record stays on process.
    Advanced,
    /// The final step was a plain review; the record is finished.
    Finished,
    /// The execute step was approved with no schedule pending; the caller
    /// should hand the task to the runner now.
    ReadyToExecute,
}

/// Approve the record's current step.
pub fn approve(
    workflow: &mut Workflow,
    step_id: Uuid,
    caller: &Caller,
    now: DateTime<Utc>,
) -> Result<ApproveOutcome, EngineError> {
    let idx = operable_step_index(workflow, step_id, caller)?;
    let record = &mut workflow.record;
    let step_type = record.steps[idx].step_type;

    if step_type == StepType::SqlExecute {
        // Approving the execute step is the manual execution trigger; a
        // pending schedule owns the hand-off until it is cleared.
        if record.scheduled_at.is_some() {
            return Err(EngineError::Conflict(
                "execution is scheduled; unschedule before executing manually".into(),
            ));
        }
        record.steps[idx].operate(StepState::Approved, caller.id, now, None);
        record.status = RecordStatus::ExecScheduled;
        return Ok(ApproveOutcome::ReadyToExecute);
    }

    record.steps[idx].operate(StepState::Approved, caller.id, now, None);
    match record.steps.get(idx + 1) {
        Some(next) => {
            record.current_step_id = Some(next.id);
            Ok(ApproveOutcome::Advanced)
        }
        None => {
            record.status = RecordStatus::Finished;
            Ok(ApproveOutcome::Finished)
        }
    }
}

/// Reject the record's current step; later steps stay `initialized` forever.
pub fn reject(
    workflow: &mut Workflow,
    step_id: Uuid,
    caller: &Caller,
    reason: String,
    now: DateTime<Utc>,
) -> Result<(), EngineError> {
    let idx = operable_step_index(workflow, step_id, caller)?;
    let record = &mut workflow.record;
    record.steps[idx].operate(StepState::Rejected, caller.id, now, Some(reason));
    record.status = RecordStatus::Rejected;
    Ok(())
}

/// Cancel the workflow.  Returns `false` when the record was already
/// canceled (idempotent no-op).
pub fn cancel(workflow: &mut Workflow, caller: &Caller) -> Result<bool, EngineError> {
    if !caller.admin && caller.id != workflow.create_user_id {
        return Err(EngineError::Unauthorized(
            "only the creator or an admin may cancel a workflow",
        ));
    }
    match workflow.record.status {
        RecordStatus::Canceled => Ok(false),
        RecordStatus::OnProcess
        | RecordStatus::Rejected
        | RecordStatus::ExecScheduled
        | RecordStatus::ExecFailed => {
            workflow.record.status = RecordStatus::Canceled;
            Ok(true)
        }
        status => Err(EngineError::Conflict(format!(
            "cannot cancel a workflow in status {status}"
        ))),
    }
}

/// Set the execution schedule.
///
/// Only valid while the record is on process and every review step is
/// already approved, i.e. the only remaining step is the final execute step.
pub fn schedule(
    workflow: &mut Workflow,
    caller: &Caller,
    when: DateTime<Utc>,
) -> Result<(), EngineError> {
    if caller.id != workflow.create_user_id {
        return Err(EngineError::Unauthorized(
            "only the creator may schedule execution",
        ));
    }
    let record = &mut workflow.record;
    if record.status != RecordStatus::OnProcess {
        return Err(EngineError::Conflict(format!(
            "cannot schedule a workflow in status {}",
            record.status
        )));
    }
    let review_pending = match (record.current_step(), record.final_step()) {
        (Some(current), Some(last)) => {
            current.id != last.id || last.step_type != StepType::SqlExecute
        }
        _ => true,
    };
    if review_pending {
        return Err(EngineError::Conflict(
            "review steps are still pending; scheduling requires a fully approved record".into(),
        ));
    }
    record.scheduled_at = Some(when);
    record.schedule_user_id = Some(caller.id);
    Ok(())
}

/// Clear the execution schedule.  Valid until execution has begun.
pub fn unschedule(workflow: &mut Workflow, caller: &Caller) -> Result<(), EngineError> {
    if caller.id != workflow.create_user_id {
        return Err(EngineError::Unauthorized(
            "only the creator may unschedule execution",
        ));
    }
    let record = &mut workflow.record;
    match record.status {
        RecordStatus::OnProcess | RecordStatus::ExecScheduled => {
            record.scheduled_at = None;
            record.schedule_user_id = None;
            Ok(())
        }
        status => Err(EngineError::Conflict(format!(
            "cannot unschedule a workflow in status {status}"
        ))),
    }
}

/// Due-scan pickup: a scheduled record leaves `on_process` for
/// `exec_scheduled` once its schedule has come due.
pub fn mark_exec_scheduled(workflow: &mut Workflow) -> Result<(), EngineError> {
    let record = &mut workflow.record;
    if record.status != RecordStatus::OnProcess {
        return Err(EngineError::Conflict(format!(
            "cannot launch a workflow in status {}",
            record.status
        )));
    }
    if record.scheduled_at.is_none() {
        return Err(EngineError::Conflict(
            "workflow has no execution schedule".into(),
        ));
    }
    record.status = RecordStatus::ExecScheduled;
    Ok(())
}

/// Execution hand-off begins: `exec_scheduled → executing`.
pub fn start_execution(workflow: &mut Workflow) -> Result<(), EngineError> {
    let record = &mut workflow.record;
    if record.status != RecordStatus::ExecScheduled {
        return Err(EngineError::Conflict(format!(
            "cannot execute a workflow in status {}",
            record.status
        )));
    }
    record.status = RecordStatus::Executing;
    Ok(())
}

/// Execution finished: `executing → finished | exec_failed`.
///
/// Failure is a state, not an error — the record stays `exec_failed`
/// awaiting operator action.
pub fn finish_execution(workflow: &mut Workflow, success: bool) -> Result<(), EngineError> {
    let record = &mut workflow.record;
    if record.status != RecordStatus::Executing {
        return Err(EngineError::Conflict(format!(
            "cannot finish execution of a workflow in status {}",
            record.status
        )));
    }
    record.status = if success {
        RecordStatus::Finished
    } else {
        RecordStatus::ExecFailed
    };
    Ok(())
}

/// Gate for re-submission: only a rejected record may be superseded, and
/// only by the creator or an admin.
pub fn check_resubmit(workflow: &Workflow, caller: &Caller) -> Result<(), EngineError> {
    if !caller.admin && caller.id != workflow.create_user_id {
        return Err(EngineError::Unauthorized(
            "only the creator or an admin may re-submit a workflow",
        ));
    }
    if workflow.record.status != RecordStatus::Rejected {
        return Err(EngineError::Conflict(format!(
            "only a rejected workflow can be re-submitted, current status is {}",
            workflow.record.status
        )));
    }
    Ok(())
}

/// Shared gate for approve/reject: the record must be on process, the step
/// must be the current one and still `initialized`, and the caller must be
/// in its assignee snapshot.  Returns the step's index.
fn operable_step_index(
    workflow: &Workflow,
    step_id: Uuid,
    caller: &Caller,
) -> Result<usize, EngineError> {
    let record = &workflow.record;
    if record.status != RecordStatus::OnProcess {
        return Err(EngineError::Conflict(format!(
            "workflow is not awaiting approval, status is {}",
            record.status
        )));
    }
    let current_id = record.current_step_id.ok_or_else(|| {
        EngineError::DataConflict("record on process has no current step".into())
    })?;
    if current_id != step_id {
        return Err(EngineError::Conflict(
            "step is not the record's current step".into(),
        ));
    }
    let idx = record
        .step_index(step_id)
        .ok_or_else(|| EngineError::DataConflict("current step is not part of the record".into()))?;
    let step = &record.steps[idx];
    if !step.assignees.contains(&caller.id) {
        return Err(EngineError::Unauthorized(
            "caller is not among the current step's assignees",
        ));
    }
    if step.state != StepState::Initialized {
        return Err(EngineError::Conflict(
            "step has already been operated".into(),
        ));
    }
    Ok(idx)
}
