use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};

use formadesk_auth::Caller;
use formadesk_core::{DossierId, ProductId};
use formadesk_infra::Workflow;

use super::parse_id;
use crate::app::{dto, errors::ApiError, extract::JsonBody};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_dossiers).post(open_dossier))
        .route("/:id", get(get_dossier))
        .route("/:id/steps", post(submit_step))
        .route("/:id/documents", get(list_documents).post(submit_document))
}

/// GET /dossiers - own dossiers for clients, all for staff.
pub async fn list_dossiers(
    Extension(workflow): Extension<Arc<Workflow>>,
    Extension(caller): Extension<Caller>,
) -> Result<Response, ApiError> {
    let dossiers = workflow.list_dossiers(&caller).await?;
    Ok((StatusCode::OK, Json(dto::items(&dossiers, dto::dossier_to_json))).into_response())
}

pub async fn open_dossier(
    Extension(workflow): Extension<Arc<Workflow>>,
    Extension(caller): Extension<Caller>,
    JsonBody(body): JsonBody<dto::OpenDossierRequest>,
) -> Result<Response, ApiError> {
    let product_id: ProductId = parse_id(&body.product_id, "product")?;
    let dossier = workflow.open_dossier(&caller, product_id).await?;
    Ok((StatusCode::CREATED, Json(dto::dossier_to_json(&dossier))).into_response())
}

pub async fn get_dossier(
    Extension(workflow): Extension<Arc<Workflow>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let dossier_id: DossierId = parse_id(&id, "dossier")?;
    let dossier = workflow.get_dossier(&caller, dossier_id).await?;
    Ok((StatusCode::OK, Json(dto::dossier_to_json(&dossier))).into_response())
}

pub async fn submit_step(
    Extension(workflow): Extension<Arc<Workflow>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<dto::SubmitStepRequest>,
) -> Result<Response, ApiError> {
    let dossier_id: DossierId = parse_id(&id, "dossier")?;
    let dossier = workflow.submit_step(&caller, dossier_id, &body.step).await?;
    Ok((StatusCode::OK, Json(dto::dossier_to_json(&dossier))).into_response())
}

pub async fn list_documents(
    Extension(workflow): Extension<Arc<Workflow>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let dossier_id: DossierId = parse_id(&id, "dossier")?;
    let documents = workflow.list_documents(&caller, dossier_id).await?;
    Ok((StatusCode::OK, Json(dto::items(&documents, dto::document_to_json))).into_response())
}

pub async fn submit_document(
    Extension(workflow): Extension<Arc<Workflow>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<dto::SubmitDocumentRequest>,
) -> Result<Response, ApiError> {
    let dossier_id: DossierId = parse_id(&id, "dossier")?;
    let document = workflow
        .submit_document(&caller, dossier_id, &body.kind, &body.file_name)
        .await?;
    Ok((StatusCode::CREATED, Json(dto::document_to_json(&document))).into_response())
}
