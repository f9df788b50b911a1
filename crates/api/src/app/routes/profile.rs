use std::sync::Arc;

use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use formadesk_auth::Caller;
use formadesk_infra::Workflow;

use crate::app::{dto, errors::ApiError, extract::JsonBody};

/// GET /profile
pub async fn my_profile(
    Extension(workflow): Extension<Arc<Workflow>>,
    Extension(caller): Extension<Caller>,
) -> Result<Response, ApiError> {
    let profile = workflow.my_profile(&caller).await?;
    Ok((StatusCode::OK, Json(dto::profile_to_json(&profile))).into_response())
}

/// POST /profile - self-registration as a PENDING client.
pub async fn register_self(
    Extension(workflow): Extension<Arc<Workflow>>,
    Extension(caller): Extension<Caller>,
    JsonBody(body): JsonBody<dto::RegisterSelfRequest>,
) -> Result<Response, ApiError> {
    let profile = workflow.register_self(&caller, &body.email, &body.full_name).await?;
    Ok((StatusCode::CREATED, Json(dto::profile_to_json(&profile))).into_response())
}
