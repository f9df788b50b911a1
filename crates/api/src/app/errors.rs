use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

use formadesk_auth::AuthzError;
use formadesk_core::DomainError;
use formadesk_infra::WorkflowError;
use formadesk_infra::store::StoreError;

/// Error returned by handlers; rendered as `{"error": code, "message": text}`.
#[derive(Debug)]
pub enum ApiError {
    Workflow(WorkflowError),
    /// A path or body identifier that does not parse.
    InvalidId(&'static str),
    NotFound(&'static str),
    /// A request body that is not valid JSON for the endpoint.
    MalformedBody(String),
}

impl From<WorkflowError> for ApiError {
    fn from(value: WorkflowError) -> Self {
        ApiError::Workflow(value)
    }
}

impl From<DomainError> for ApiError {
    fn from(value: DomainError) -> Self {
        ApiError::Workflow(value.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Workflow(e) => workflow_error_to_response(e),
            ApiError::InvalidId(what) => json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {what} id")),
            ApiError::NotFound(what) => json_error(StatusCode::NOT_FOUND, "not_found", format!("{what} not found")),
            ApiError::MalformedBody(message) => json_error(StatusCode::BAD_REQUEST, "validation_error", message),
        }
    }
}

pub fn workflow_error_to_response(err: WorkflowError) -> Response {
    match err {
        WorkflowError::Domain(e) => domain_error_to_response(e),
        WorkflowError::Authz(e) => authz_error_to_response(e),
        WorkflowError::Store(e) => store_error_to_response(e),
    }
}

fn domain_error_to_response(err: DomainError) -> Response {
    let message = err.to_string();
    match err {
        DomainError::Validation(_) => json_error(StatusCode::BAD_REQUEST, "validation_error", message),
        DomainError::InvalidId(_) => json_error(StatusCode::BAD_REQUEST, "invalid_id", message),
        DomainError::IllegalTransition { .. } => json_error(StatusCode::CONFLICT, "illegal_transition", message),
        DomainError::InvariantViolation(_) => json_error(StatusCode::CONFLICT, "invariant_violation", message),
        DomainError::Conflict(_) => json_error(StatusCode::CONFLICT, "conflict", message),
        DomainError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        DomainError::Unauthorized => json_error(StatusCode::FORBIDDEN, "forbidden", message),
    }
}

fn authz_error_to_response(err: AuthzError) -> Response {
    if err.is_unauthenticated() {
        return json_error(StatusCode::UNAUTHORIZED, "unauthenticated", err.to_string());
    }
    json_error(StatusCode::FORBIDDEN, "forbidden", err.to_string())
}

fn store_error_to_response(err: StoreError) -> Response {
    error!(error = %err, "store failure");
    if err.is_unavailable() {
        return json_error(StatusCode::SERVICE_UNAVAILABLE, "unavailable", "service temporarily unavailable");
    }
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal error")
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
