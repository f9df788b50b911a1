use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;

use formadesk_auth::Caller;
use formadesk_core::{OrderId, ProductId};
use formadesk_infra::Workflow;

use super::parse_id;
use crate::app::{dto, errors::ApiError, extract::JsonBody};

pub fn orders_router() -> Router {
    Router::new()
        .route("/", get(list_orders).post(place_order))
        .route("/:id", get(get_order))
        .route("/:id/cancel", post(cancel_order))
        .route("/:id/refund", post(refund_order))
        .route("/:id/payment", post(record_payment))
}

pub async fn list_products(
    Extension(workflow): Extension<Arc<Workflow>>,
    Extension(caller): Extension<Caller>,
) -> Result<Response, ApiError> {
    let products = workflow.list_products(&caller).await?;
    Ok((StatusCode::OK, Json(dto::items(&products, dto::product_to_json))).into_response())
}

pub async fn list_orders(
    Extension(workflow): Extension<Arc<Workflow>>,
    Extension(caller): Extension<Caller>,
) -> Result<Response, ApiError> {
    let orders = workflow.list_orders(&caller).await?;
    Ok((StatusCode::OK, Json(dto::items(&orders, dto::order_to_json))).into_response())
}

pub async fn place_order(
    Extension(workflow): Extension<Arc<Workflow>>,
    Extension(caller): Extension<Caller>,
    JsonBody(body): JsonBody<dto::PlaceOrderRequest>,
) -> Result<Response, ApiError> {
    let product_id: ProductId = parse_id(&body.product_id, "product")?;
    let order = workflow.place_order(&caller, product_id).await?;
    Ok((StatusCode::CREATED, Json(dto::order_to_json(&order))).into_response())
}

pub async fn get_order(
    Extension(workflow): Extension<Arc<Workflow>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let order_id: OrderId = parse_id(&id, "order")?;
    let order = workflow.get_order(&caller, order_id).await?;
    Ok((StatusCode::OK, Json(dto::order_to_json(&order))).into_response())
}

pub async fn cancel_order(
    Extension(workflow): Extension<Arc<Workflow>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let order_id: OrderId = parse_id(&id, "order")?;
    let order = workflow.cancel_order(&caller, order_id).await?;
    Ok((StatusCode::OK, Json(dto::order_to_json(&order))).into_response())
}

/// POST /orders/:id/refund - admin only.
pub async fn refund_order(
    Extension(workflow): Extension<Arc<Workflow>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<dto::RefundOrderRequest>,
) -> Result<Response, ApiError> {
    let order_id: OrderId = parse_id(&id, "order")?;
    let order = workflow.refund_order(&caller, order_id, &body.reason).await?;
    Ok((StatusCode::OK, Json(dto::order_to_json(&order))).into_response())
}

/// POST /orders/:id/payment - admin only; PAID activates, FAILED suspends the owner.
pub async fn record_payment(
    Extension(workflow): Extension<Arc<Workflow>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<dto::RecordPaymentRequest>,
) -> Result<Response, ApiError> {
    let order_id: OrderId = parse_id(&id, "order")?;
    let recorded = workflow
        .record_payment(&caller, order_id, &body.outcome, body.provider_reference)
        .await?;
    Ok((
        StatusCode::OK,
        Json(json!({
            "order": dto::order_to_json(&recorded.order),
            "profile": recorded.profile.as_ref().map(dto::profile_to_json),
        })),
    )
        .into_response())
}

/// POST /payment-links/:id/checkout
pub async fn checkout_payment_link(
    Extension(workflow): Extension<Arc<Workflow>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let outcome = workflow.checkout_payment_link(&caller, &id).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "order": dto::order_to_json(&outcome.order),
            "payment_link": dto::payment_link_to_json(&outcome.link),
        })),
    )
        .into_response())
}
