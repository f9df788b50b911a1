//! Admin routes: client profiles and payment links.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use serde_json::json;

use formadesk_auth::Caller;
use formadesk_core::{ProductId, UserId};
use formadesk_infra::Workflow;

use super::parse_id;
use crate::app::{dto, errors::ApiError, extract::JsonBody};

pub fn router() -> Router {
    Router::new()
        .route("/clients", get(list_clients).post(register_client))
        .route("/clients/:id/status", put(change_client_status))
        .route("/payment-links", get(list_payment_links).post(create_payment_link))
        .route("/payment-links/bulk-expire", post(bulk_expire_payment_links))
}

/// GET /admin/clients - staff may list profiles.
pub async fn list_clients(
    Extension(workflow): Extension<Arc<Workflow>>,
    Extension(caller): Extension<Caller>,
) -> Result<Response, ApiError> {
    let profiles = workflow.list_profiles(&caller).await?;
    Ok((StatusCode::OK, Json(dto::items(&profiles, dto::profile_to_json))).into_response())
}

/// POST /admin/clients - register a user with an explicit role.
pub async fn register_client(
    Extension(workflow): Extension<Arc<Workflow>>,
    Extension(caller): Extension<Caller>,
    JsonBody(body): JsonBody<dto::RegisterClientRequest>,
) -> Result<Response, ApiError> {
    let user_id: UserId = parse_id(&body.user_id, "user")?;
    let role = body.role.as_deref().unwrap_or("CLIENT");
    let profile = workflow
        .register_profile(&caller, user_id, &body.email, &body.full_name, role)
        .await?;
    Ok((StatusCode::CREATED, Json(dto::profile_to_json(&profile))).into_response())
}

/// PUT /admin/clients/:id/status - manual override with a reason.
pub async fn change_client_status(
    Extension(workflow): Extension<Arc<Workflow>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<dto::ChangeStatusRequest>,
) -> Result<Response, ApiError> {
    let user_id: UserId = parse_id(&id, "user")?;
    let profile = workflow
        .change_client_status(&caller, user_id, &body.status, &body.reason)
        .await?;
    Ok((StatusCode::OK, Json(dto::profile_to_json(&profile))).into_response())
}

pub async fn list_payment_links(
    Extension(workflow): Extension<Arc<Workflow>>,
    Extension(caller): Extension<Caller>,
) -> Result<Response, ApiError> {
    let links = workflow.list_payment_links(&caller).await?;
    Ok((StatusCode::OK, Json(dto::items(&links, dto::payment_link_to_json))).into_response())
}

pub async fn create_payment_link(
    Extension(workflow): Extension<Arc<Workflow>>,
    Extension(caller): Extension<Caller>,
    JsonBody(body): JsonBody<dto::CreatePaymentLinkRequest>,
) -> Result<Response, ApiError> {
    let product_id: ProductId = parse_id(&body.product_id, "product")?;
    let link = workflow
        .create_payment_link(&caller, product_id, &body.email, body.expires_in_hours)
        .await?;
    Ok((StatusCode::CREATED, Json(dto::payment_link_to_json(&link))).into_response())
}

/// POST /admin/payment-links/bulk-expire - only ACTIVE links change.
pub async fn bulk_expire_payment_links(
    Extension(workflow): Extension<Arc<Workflow>>,
    Extension(caller): Extension<Caller>,
    JsonBody(body): JsonBody<dto::BulkExpireRequest>,
) -> Result<Response, ApiError> {
    let outcome = workflow.bulk_expire_links(&caller, &body.link_ids).await?;
    Ok((
        StatusCode::OK,
        Json(json!({
            "success": true,
            "expired_count": outcome.expired_count(),
            "expired": outcome.expired,
            "unknown": outcome.unknown,
        })),
    )
        .into_response())
}
