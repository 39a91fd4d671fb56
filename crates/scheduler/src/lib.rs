//! `scheduler` crate — the due-scan and expiry-scan periodic loops.
//!
//! Two independent workers run for the life of the process:
//!
//! - **Due-scan** (default every 30 s): workflows whose `scheduled_at` has
//!   passed while still on process are launched through the lifecycle
//!   manager, dispatched to a bounded worker pool.  An in-flight set
//!   prevents double dispatch while an execution is still running.
//! - **Expiry-scan** (default every hour): workflows older than the
//!   retention window whose record reached a sweepable terminal state are
//!   deleted.
//!
//! Failures in either loop are logged and retried on the next tick;
//! neither loop aborts the process.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use engine::{Caller, WorkflowService};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the scheduler loops.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval between due-scan ticks.
    pub due_tick: Duration,
    /// Interval between expiry-scan ticks.
    pub expiry_tick: Duration,
    /// How long terminal workflows are retained before the expiry sweep
    /// removes them.
    pub retention: chrono::Duration,
    /// Upper bound on concurrently executing workflows.
    pub max_concurrent_executions: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            due_tick: Duration::from_secs(30),
            expiry_tick: Duration::from_secs(60 * 60),
            retention: chrono::Duration::days(30),
            max_concurrent_executions: 4,
        }
    }
}

// ---------------------------------------------------------------------------
// In-flight tracking
// ---------------------------------------------------------------------------

/// Mutex-protected set of workflow ids currently being executed.
///
/// The due-scan claims an id before dispatching and releases it when the
/// execution task finishes, so a slow execution is never dispatched twice
/// even though the record only leaves `on_process` inside the task.
#[derive(Default)]
pub struct InFlight {
    ids: Mutex<HashSet<Uuid>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim an id.  Returns `false` when it is already in flight.
    pub fn claim(&self, id: Uuid) -> bool {
        self.ids.lock().unwrap().insert(id)
    }

    /// Release a previously claimed id.
    pub fn release(&self, id: Uuid) {
        self.ids.lock().unwrap().remove(&id);
    }

    pub fn len(&self) -> usize {
        self.ids.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.lock().unwrap().is_empty()
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Owns the two periodic loops.
pub struct Scheduler {
    service: Arc<WorkflowService>,
    config: SchedulerConfig,
    in_flight: Arc<InFlight>,
    execution_slots: Arc<Semaphore>,
}

impl Scheduler {
    pub fn new(service: Arc<WorkflowService>, config: SchedulerConfig) -> Self {
        let execution_slots = Arc::new(Semaphore::new(config.max_concurrent_executions));
        Self {
            service,
            config,
            in_flight: Arc::new(InFlight::new()),
            execution_slots,
        }
    }

    /// Spawn both loops.  The handles run until aborted.
    pub fn spawn(self: Arc<Self>) -> (JoinHandle<()>, JoinHandle<()>) {
        let due = {
            let scheduler = Arc::clone(&self);
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(scheduler.config.due_tick);
                loop {
                    tick.tick().await;
                    if let Err(err) = scheduler.due_scan().await {
                        warn!("due-scan failed, retrying next tick: {err}");
                    }
                }
            })
        };

        let expiry = {
            let scheduler = Arc::clone(&self);
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(scheduler.config.expiry_tick);
                loop {
                    tick.tick().await;
                    if let Err(err) = scheduler.expiry_scan().await {
                        warn!("expiry-scan failed, retrying next tick: {err}");
                    }
                }
            })
        };

        (due, expiry)
    }

    /// One due-scan pass: launch every workflow whose schedule has come due
    /// and is not already in flight.  Returns the number dispatched.
    pub async fn due_scan(&self) -> Result<usize, engine::EngineError> {
        let due = self.service.due_workflow_ids(Utc::now()).await?;
        let mut dispatched = 0;

        for workflow_id in due {
            if !self.in_flight.claim(workflow_id) {
                continue;
            }
            dispatched += 1;

            let service = Arc::clone(&self.service);
            let in_flight = Arc::clone(&self.in_flight);
            let slots = Arc::clone(&self.execution_slots);
            tokio::spawn(async move {
                // Closed only on shutdown; treat as a skipped tick.
                let Ok(_permit) = slots.acquire().await else {
                    in_flight.release(workflow_id);
                    return;
                };
                match service.launch_scheduled(workflow_id).await {
                    Ok(workflow) => {
                        info!(
                            "scheduled workflow {workflow_id} executed, status {}",
                            workflow.record.status
                        );
                    }
                    Err(err) => {
                        warn!("scheduled workflow {workflow_id} failed to launch: {err}");
                    }
                }
                in_flight.release(workflow_id);
            });
        }

        if dispatched > 0 {
            info!("due-scan dispatched {dispatched} workflow(s)");
        }
        Ok(dispatched)
    }

    /// One expiry-scan pass: delete terminal workflows past the retention
    /// window.  Returns the number deleted.
    pub async fn expiry_scan(&self) -> Result<usize, engine::EngineError> {
        let cutoff = Utc::now() - self.config.retention;
        let expired = self.service.expired_workflow_ids(cutoff).await?;
        let mut deleted = 0;

        for workflow_id in &expired {
            match self.service.delete(*workflow_id, &Caller::system()).await {
                Ok(()) => deleted += 1,
                Err(err) => warn!("expiry sweep could not delete workflow {workflow_id}: {err}"),
            }
        }

        if deleted > 0 {
            info!("expiry-scan removed {deleted} workflow(s)");
        }
        Ok(deleted)
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_flight_prevents_double_claim_until_release() {
        let in_flight = InFlight::new();
        let id = Uuid::new_v4();

        assert!(in_flight.claim(id));
        assert!(!in_flight.claim(id), "second claim must be refused");
        assert_eq!(in_flight.len(), 1);

        in_flight.release(id);
        assert!(in_flight.is_empty());
        assert!(in_flight.claim(id), "claim works again after release");
    }

    #[test]
    fn independent_ids_do_not_interfere() {
        let in_flight = InFlight::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        assert!(in_flight.claim(a));
        assert!(in_flight.claim(b));
        in_flight.release(a);
        assert!(!in_flight.claim(b));
        assert_eq!(in_flight.len(), 1);
    }

    #[test]
    fn default_config_matches_documented_cadence() {
        let config = SchedulerConfig::default();
        assert_eq!(config.due_tick, Duration::from_secs(30));
        assert_eq!(config.expiry_tick, Duration::from_secs(3600));
        assert_eq!(config.retention, chrono::Duration::days(30));
        assert!(config.max_concurrent_executions > 0);
    }
}
