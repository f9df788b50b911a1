use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use formadesk_auth::Caller;
use formadesk_infra::Workflow;

use crate::app::{dto, errors::ApiError};

/// GET /audit/:entity_type/:entity_id - staff only, oldest first.
pub async fn audit_trail(
    Extension(workflow): Extension<Arc<Workflow>>,
    Extension(caller): Extension<Caller>,
    Path((entity_type, entity_id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let events = workflow.audit_trail(&caller, &entity_type, &entity_id).await?;
    Ok((StatusCode::OK, Json(dto::items(&events, dto::audit_to_json))).into_response())
}
