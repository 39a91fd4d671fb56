//! Caller identity extraction.
//!
//! Authentication is an external collaborator; trusted middleware upstream
//! injects the resolved user into `x-user-id` (UUID) and `x-user-admin`
//! (`true`/`1`).

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;

use engine::Caller;

/// Extracts the authenticated caller from the request headers.
pub struct Identity(pub Caller);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .ok_or((StatusCode::UNAUTHORIZED, "missing or invalid x-user-id header"))?;

        let admin = parts
            .headers
            .get("x-user-admin")
            .and_then(|v| v.to_str().ok())
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        Ok(Identity(Caller { id, admin }))
    }
}
