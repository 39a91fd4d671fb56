//! Response envelope and the `EngineError → HTTP` mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use engine::EngineError;

/// The uniform response body: `{ code, message, data? }`.  Code 0 means
/// success; error responses carry the HTTP status as the code.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(data: T) -> Json<Envelope<T>> {
        Json(Envelope { code: 0, message: "ok".into(), data: Some(data) })
    }
}

impl Envelope<()> {
    pub fn empty() -> Json<Envelope<()>> {
        Json(Envelope { code: 0, message: "ok".into(), data: None })
    }
}

/// Wrapper so engine errors convert straight into HTTP responses with `?`.
pub struct ApiError(pub EngineError);

pub type ApiResult<T> = Result<T, ApiError>;

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self(err)
    }
}

pub(crate) fn status_for(err: &EngineError) -> StatusCode {
    match err {
        EngineError::BadRequest(_) => StatusCode::BAD_REQUEST,
        EngineError::Unauthorized(_) => StatusCode::FORBIDDEN,
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::Conflict(_) => StatusCode::CONFLICT,
        EngineError::DataConflict(_) | EngineError::Storage(_) | EngineError::Runner(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!("request failed: {}", self.0);
        }
        let body = Envelope::<()> {
            code: status.as_u16() as i32,
            message: self.0.to_string(),
            data: None,
        };
        (status, Json(body)).into_response()
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_expected_status_codes() {
        assert_eq!(
            status_for(&EngineError::BadRequest("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&EngineError::Unauthorized("x")),
            StatusCode::FORBIDDEN
        );
        assert_eq!(status_for(&EngineError::NotFound("x")), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for(&EngineError::Conflict("x".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&EngineError::DataConflict("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn success_envelope_has_code_zero_and_elides_missing_data() {
        let Json(body) = Envelope::ok(42);
        assert_eq!(body.code, 0);
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({ "code": 0, "message": "ok", "data": 42 })
        );

        let Json(empty) = Envelope::empty();
        assert_eq!(
            serde_json::to_value(&empty).unwrap(),
            serde_json::json!({ "code": 0, "message": "ok" })
        );
    }
}
