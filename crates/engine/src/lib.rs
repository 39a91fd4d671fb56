//! `engine` crate — domain models, the approval state machine, and the
//! lifecycle / template services.
//!
//! The state machine itself is pure (`transitions`); the services wrap it
//! in storage transactions with a row-level lock on the current record.

pub mod directory;
pub mod error;
pub mod lifecycle;
pub mod models;
pub mod templates;
pub mod transitions;

pub use directory::DbDirectory;
pub use error::EngineError;
pub use lifecycle::{CreateWorkflow, WorkflowService};
pub use models::{
    Caller, RecordStatus, StepState, StepType, Workflow, WorkflowRecord, WorkflowStep,
    WorkflowTemplate,
};
pub use templates::{CreateTemplate, TemplateService, TemplateStepInput};

#[cfg(test)]
mod lifecycle_tests;
