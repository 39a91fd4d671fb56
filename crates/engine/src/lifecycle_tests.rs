//! Scenario tests for the approval state machine.
//!
//! These exercise the pure transition layer against in-memory aggregates,
//! so no Postgres connection is required.  The lifecycle service adds only
//! the transaction/locking envelope around exactly these functions; tests
//! that need a live database belong in a `tests/it/` harness gated behind
//! an `integration` feature.

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::models::{
    clone_steps_for_resubmit, steps_from_templates, Caller, RecordStatus, StepState, StepTemplate,
    StepType, Workflow, WorkflowRecord,
};
use crate::transitions::{
    approve, cancel, check_resubmit, finish_execution, mark_exec_scheduled, reject, schedule,
    start_execution, unschedule, ApproveOutcome,
};
use crate::EngineError;

struct Fixture {
    workflow: Workflow,
    alice: Uuid,
    bob: Uuid,
    carol: Uuid,
    dave: Uuid,
}

/// Template T1: [review/alice, review/bob, sql_execute/carol], created by dave.
fn linear_fixture() -> Fixture {
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let carol = Uuid::new_v4();
    let dave = Uuid::new_v4();

    let templates = vec![
        step_template(1, StepType::SqlReview, vec![alice]),
        step_template(2, StepType::SqlReview, vec![bob]),
        step_template(3, StepType::SqlExecute, vec![carol]),
    ];

    let workflow = workflow_from_templates(&templates, dave);
    Fixture { workflow, alice, bob, carol, dave }
}

fn workflow_from_templates(templates: &[StepTemplate], creator: Uuid) -> Workflow {
    let workflow_id = Uuid::new_v4();
    let record_id = Uuid::new_v4();
    let steps = steps_from_templates(templates, &[], workflow_id, record_id);
    let first_step = steps.first().map(|s| s.id);

    Workflow {
        id: workflow_id,
        subject: "add index to orders".into(),
        description: String::new(),
        create_user_id: creator,
        created_at: Utc::now(),
        record: WorkflowRecord {
            id: record_id,
            task_id: Uuid::new_v4(),
            current_step_id: first_step,
            status: RecordStatus::OnProcess,
            scheduled_at: None,
            schedule_user_id: None,
            created_at: Utc::now(),
            steps,
        },
        history: vec![],
    }
}

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

fn current_step_id(workflow: &Workflow) -> Uuid {
    workflow.record.current_step_id.expect("record has a current step")
}

// ============================================================
// Scenario 1 — linear approval through scheduled execution
// ============================================================

#[test]
fn linear_approval_reaches_finished_through_schedule() {
    let Fixture { mut workflow, alice, bob, dave, .. } = linear_fixture();
    let now = Utc::now();

    // alice clears step 1; step 2 becomes current, record stays on process.
    let step = current_step_id(&workflow);
    let outcome = approve(&mut workflow, step, &Caller::user(alice), now).expect("alice approves");
    assert_eq!(outcome, ApproveOutcome::Advanced);
    assert_eq!(workflow.current_step().unwrap().number, 2);
    assert_eq!(workflow.record.status, RecordStatus::OnProcess);

    // bob clears step 2; the execute step becomes current, still on process
    // so the creator can schedule and the due-scan can pick it up.
    let step = current_step_id(&workflow);
    let outcome = approve(&mut workflow, step, &Caller::user(bob), now).expect("bob approves");
    assert_eq!(outcome, ApproveOutcome::Advanced);
    assert_eq!(workflow.current_step().unwrap().step_type, StepType::SqlExecute);
    assert_eq!(workflow.record.status, RecordStatus::OnProcess);

    // dave schedules execution for one hour later.
    let at = now + Duration::hours(1);
    schedule(&mut workflow, &Caller::user(dave), at).expect("dave schedules");
    assert_eq!(workflow.record.scheduled_at, Some(at));
    assert_eq!(workflow.record.schedule_user_id, Some(dave));

    // The due-scan launches it once the schedule comes due.
    mark_exec_scheduled(&mut workflow).expect("due-scan launch");
    assert_eq!(workflow.record.status, RecordStatus::ExecScheduled);
    start_execution(&mut workflow).expect("hand-off");
    assert_eq!(workflow.record.status, RecordStatus::Executing);
    finish_execution(&mut workflow, true).expect("runner success");
    assert_eq!(workflow.record.status, RecordStatus::Finished);

    // Subject/task linkage survived the whole round trip.
    assert_eq!(workflow.subject, "add index to orders");
    assert_eq!(
        workflow.record.steps.iter().filter(|s| s.state == StepState::Approved).count(),
        2
    );
}

#[test]
fn approving_execute_step_without_schedule_triggers_immediate_execution() {
    let Fixture { mut workflow, alice, bob, carol, .. } = linear_fixture();
    let now = Utc::now();

    let step = current_step_id(&workflow);
    approve(&mut workflow, step, &Caller::user(alice), now).unwrap();
    let step = current_step_id(&workflow);
    approve(&mut workflow, step, &Caller::user(bob), now).unwrap();

    let step = current_step_id(&workflow);
    let outcome = approve(&mut workflow, step, &Caller::user(carol), now)
        .expect("carol triggers execution");
    assert_eq!(outcome, ApproveOutcome::ReadyToExecute);
    assert_eq!(workflow.record.status, RecordStatus::ExecScheduled);
    let exec_step = workflow.record.final_step().unwrap();
    assert_eq!(exec_step.state, StepState::Approved);
    assert_eq!(exec_step.operation_user_id, Some(carol));

    start_execution(&mut workflow).unwrap();
    finish_execution(&mut workflow, false).expect("runner failure");
    assert_eq!(workflow.record.status, RecordStatus::ExecFailed);
}

#[test]
fn manual_execution_is_refused_while_a_schedule_is_pending() {
    let Fixture { mut workflow, alice, bob, carol, dave } = linear_fixture();
    let now = Utc::now();

    let step = current_step_id(&workflow);
    approve(&mut workflow, step, &Caller::user(alice), now).unwrap();
    let step = current_step_id(&workflow);
    approve(&mut workflow, step, &Caller::user(bob), now).unwrap();
    schedule(&mut workflow, &Caller::user(dave), now + Duration::hours(1)).unwrap();

    let step = current_step_id(&workflow);
    let err = approve(&mut workflow, step, &Caller::user(carol), now)
        .expect_err("manual trigger must be refused");
    assert!(matches!(err, EngineError::Conflict(_)));
    assert_eq!(workflow.record.status, RecordStatus::OnProcess);

    // After unscheduling, the manual trigger goes through.
    unschedule(&mut workflow, &Caller::user(dave)).unwrap();
    let step = current_step_id(&workflow);
    let outcome = approve(&mut workflow, step, &Caller::user(carol), now)
        .expect("manual trigger after unschedule");
    assert_eq!(outcome, ApproveOutcome::ReadyToExecute);
}

// ============================================================
// Scenario 2 — rejection and re-submit
// ============================================================

#[test]
fn rejection_freezes_later_steps_and_resubmit_starts_a_fresh_record() {
    let Fixture { mut workflow, alice, bob, dave, .. } = linear_fixture();
    let now = Utc::now();

    let step = current_step_id(&workflow);
    approve(&mut workflow, step, &Caller::user(alice), now).unwrap();
    let step = current_step_id(&workflow);
    reject(&mut workflow, step, &Caller::user(bob), "needs index".into(), now)
        .expect("bob rejects");

    assert_eq!(workflow.record.status, RecordStatus::Rejected);
    let rejected = workflow.record.steps.iter().find(|s| s.number == 2).unwrap();
    assert_eq!(rejected.state, StepState::Rejected);
    assert_eq!(rejected.reason.as_deref(), Some("needs index"));
    // The execute step stays initialized forever.
    assert_eq!(workflow.record.final_step().unwrap().state, StepState::Initialized);

    // Re-submit gate passes for the creator, and the cloned record starts
    // over with the same assignee snapshots.
    check_resubmit(&workflow, &Caller::user(dave)).expect("creator may re-submit");
    let new_record_id = Uuid::new_v4();
    let cloned = clone_steps_for_resubmit(&workflow.record, workflow.id, new_record_id);
    assert_eq!(cloned.len(), 3);
    assert!(cloned.iter().all(|s| s.state == StepState::Initialized));
    assert_eq!(cloned[1].assignees, vec![bob]);

    // A record that is still on process cannot be superseded.
    let fresh = linear_fixture();
    let err = check_resubmit(&fresh.workflow, &Caller::user(fresh.dave)).unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));
}

// ============================================================
// Scenario 3 — unauthorized approve
// ============================================================

#[test]
fn approve_by_non_assignee_is_unauthorized_and_leaves_state_untouched() {
    let Fixture { mut workflow, bob, .. } = linear_fixture();
    let step_id = current_step_id(&workflow);

    let err = approve(&mut workflow, step_id, &Caller::user(bob), Utc::now())
        .expect_err("bob is not assigned to step 1");
    assert!(matches!(err, EngineError::Unauthorized(_)));

    assert_eq!(workflow.record.status, RecordStatus::OnProcess);
    assert_eq!(workflow.record.current_step_id, Some(step_id));
    assert!(workflow.record.steps.iter().all(|s| s.state == StepState::Initialized));
}

#[test]
fn approving_a_non_current_step_is_a_conflict() {
    let Fixture { mut workflow, bob, .. } = linear_fixture();
    let step_two = workflow.record.steps[1].id;

    let err = approve(&mut workflow, step_two, &Caller::user(bob), Utc::now())
        .expect_err("step 2 is not current yet");
    assert!(matches!(err, EngineError::Conflict(_)));
}

// ============================================================
// Scenario 5 — concurrent approve (loser re-reads winner's write)
// ============================================================

#[test]
fn duplicate_approve_on_an_operated_step_is_a_conflict() {
    let Fixture { mut workflow, alice, .. } = linear_fixture();
    let step_id = current_step_id(&workflow);

    // The winner's transaction committed: the step is approved but this
    // loser re-read the record before the current-step pointer moved.
    workflow.record.steps[0].operate(StepState::Approved, alice, Utc::now(), None);

    let err = approve(&mut workflow, step_id, &Caller::user(alice), Utc::now())
        .expect_err("second approve must lose");
    assert!(matches!(err, EngineError::Conflict(_)));

    let operated: Vec<_> = workflow
        .record
        .steps
        .iter()
        .filter(|s| s.state == StepState::Approved)
        .collect();
    assert_eq!(operated.len(), 1);
    assert_eq!(operated[0].operation_user_id, Some(alice));
}

// ============================================================
// Cancellation
// ============================================================

#[test]
fn cancel_is_idempotent_and_gated_on_creator_or_admin() {
    let Fixture { mut workflow, alice, dave, .. } = linear_fixture();

    let err = cancel(&mut workflow, &Caller::user(alice)).unwrap_err();
    assert!(matches!(err, EngineError::Unauthorized(_)));

    assert!(cancel(&mut workflow, &Caller::user(dave)).expect("creator cancels"));
    assert_eq!(workflow.record.status, RecordStatus::Canceled);

    // Second cancel is a no-op success.
    assert!(!cancel(&mut workflow, &Caller::user(dave)).expect("idempotent"));
    assert_eq!(workflow.record.status, RecordStatus::Canceled);

    // An admin who is not the creator may cancel too.
    let Fixture { mut workflow, .. } = linear_fixture();
    assert!(cancel(&mut workflow, &Caller::admin(Uuid::new_v4())).expect("admin cancels"));
}

#[test]
fn cancel_is_refused_mid_execution_but_allowed_after_failure() {
    let Fixture { mut workflow, dave, .. } = linear_fixture();

    workflow.record.status = RecordStatus::Executing;
    let err = cancel(&mut workflow, &Caller::user(dave)).unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));

    workflow.record.status = RecordStatus::ExecFailed;
    assert!(cancel(&mut workflow, &Caller::user(dave)).expect("cancel after failure"));

    let Fixture { mut workflow, dave, .. } = linear_fixture();
    workflow.record.status = RecordStatus::ExecScheduled;
    assert!(cancel(&mut workflow, &Caller::user(dave)).expect("cancel while scheduled"));
}

// ============================================================
// Scheduling gates
// ============================================================

#[test]
fn schedule_requires_all_reviews_approved_and_the_creator() {
    let Fixture { mut workflow, alice, bob, dave, .. } = linear_fixture();
    let at = Utc::now() + Duration::hours(1);

    // Reviews still pending.
    let err = schedule(&mut workflow, &Caller::user(dave), at).unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));

    let step = current_step_id(&workflow);
    approve(&mut workflow, step, &Caller::user(alice), Utc::now()).unwrap();
    let step = current_step_id(&workflow);
    approve(&mut workflow, step, &Caller::user(bob), Utc::now()).unwrap();

    // Only the creator may schedule.
    let err = schedule(&mut workflow, &Caller::user(alice), at).unwrap_err();
    assert!(matches!(err, EngineError::Unauthorized(_)));

    schedule(&mut workflow, &Caller::user(dave), at).expect("creator schedules");

    // Unschedule mirrors the same gates and clears both fields.
    unschedule(&mut workflow, &Caller::user(dave)).expect("creator unschedules");
    assert!(workflow.record.scheduled_at.is_none());
    assert!(workflow.record.schedule_user_id.is_none());

    workflow.record.status = RecordStatus::Executing;
    let err = unschedule(&mut workflow, &Caller::user(dave)).unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));
}

#[test]
fn due_scan_launch_requires_a_schedule_and_on_process_status() {
    let Fixture { mut workflow, .. } = linear_fixture();

    // No schedule set.
    let err = mark_exec_scheduled(&mut workflow).unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));

    workflow.record.scheduled_at = Some(Utc::now());
    mark_exec_scheduled(&mut workflow).expect("launch");

    // A second launch loses: the record already left on_process.
    let err = mark_exec_scheduled(&mut workflow).unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));
}

// ============================================================
// Review-only templates
// ============================================================

#[test]
fn approving_the_last_review_of_an_execute_free_template_finishes_the_record() {
    let alice = Uuid::new_v4();
    let dave = Uuid::new_v4();
    let templates = vec![step_template(1, StepType::SqlReview, vec![alice])];
    let mut workflow = workflow_from_templates(&templates, dave);

    let step = current_step_id(&workflow);
    let outcome = approve(&mut workflow, step, &Caller::user(alice), Utc::now()).unwrap();
    assert_eq!(outcome, ApproveOutcome::Finished);
    assert_eq!(workflow.record.status, RecordStatus::Finished);
}
