//! `api` crate — HTTP REST surface of the workflow engine.
//!
//! Routes (JSON over HTTP, `{ code, message, data? }` envelope):
//!   POST   /v2/workflows
//!   GET    /v2/workflows/{id}
//!   GET    /v2/workflows/{id}/history
//!   POST   /v2/workflows/{id}/steps/{step_id}/approve
//!   POST   /v2/workflows/{id}/steps/{step_id}/reject
//!   POST   /v2/workflows/{id}/cancel | /schedule | /unschedule | /resubmit
//!   DELETE /v2/workflows/{id}
//!   POST/GET        /v2/workflow_templates
//!   GET/PATCH/DELETE /v2/workflow_templates/{name}
//!
//! Authentication happens in middleware upstream; the caller identity
//! arrives via the `x-user-id` / `x-user-admin` headers.

pub mod error;
pub mod extract;
pub mod handlers;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use engine::{TemplateService, WorkflowService};

use handlers::{templates, workflows};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub workflows: Arc<WorkflowService>,
    pub templates: Arc<TemplateService>,
}

/// Build the v2 router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v2/workflows", post(workflows::create))
        .route(
            "/v2/workflows/:id",
            get(workflows::get).delete(workflows::delete),
        )
        .route("/v2/workflows/:id/history", get(workflows::history))
        .route(
            "/v2/workflows/:id/steps/:step_id/approve",
            post(workflows::approve),
        )
        .route(
            "/v2/workflows/:id/steps/:step_id/reject",
            post(workflows::reject),
        )
        .route("/v2/workflows/:id/cancel", post(workflows::cancel))
        .route("/v2/workflows/:id/schedule", post(workflows::schedule))
        .route("/v2/workflows/:id/unschedule", post(workflows::unschedule))
        .route("/v2/workflows/:id/resubmit", post(workflows::resubmit))
        .route(
            "/v2/workflow_templates",
            post(templates::create).get(templates::list),
        )
        .route(
            "/v2/workflow_templates/:name",
            get(templates::get)
                .patch(templates::update)
                .delete(templates::delete),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(bind: &str, state: AppState) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("API listening on {bind}");
    axum::serve(listener, router(state)).await
}
