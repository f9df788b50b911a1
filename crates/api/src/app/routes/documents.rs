use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use serde_json::json;

use formadesk_auth::Caller;
use formadesk_core::DocumentId;
use formadesk_infra::Workflow;
use formadesk_infra::workflow::ReviewOutcome;

use super::parse_id;
use crate::app::{dto, errors::ApiError, extract::JsonBody};

pub fn router() -> Router {
    Router::new()
        .route("/:id/approve", post(approve_document))
        .route("/:id/reject", post(reject_document))
}

/// POST /documents/:id/approve - staff only.
pub async fn approve_document(
    Extension(workflow): Extension<Arc<Workflow>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let document_id: DocumentId = parse_id(&id, "document")?;
    let outcome = workflow.approve_document(&caller, document_id).await?;
    Ok(review_response(&outcome))
}

/// POST /documents/:id/reject - staff only; a non-blank reason is required.
pub async fn reject_document(
    Extension(workflow): Extension<Arc<Workflow>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<dto::RejectDocumentRequest>,
) -> Result<Response, ApiError> {
    let document_id: DocumentId = parse_id(&id, "document")?;
    let outcome = workflow.reject_document(&caller, document_id, &body.reason).await?;
    Ok(review_response(&outcome))
}

fn review_response(outcome: &ReviewOutcome) -> Response {
    (
        StatusCode::OK,
        Json(json!({
            "document": dto::document_to_json(&outcome.document),
            "dossier": dto::dossier_to_json(&outcome.dossier),
            "dossier_completed": outcome.dossier_completed,
            "owner_notified": outcome.owner_notified,
        })),
    )
        .into_response()
}
