use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde_json::json;
use tracing::{error, warn};

use formadesk_auth::Caller;
use formadesk_infra::Workflow;

use crate::app::errors::{ApiError, json_error};

/// Directory the legal texts are read from.
#[derive(Debug, Clone)]
pub struct LegalDir(pub PathBuf);

pub async fn health(Extension(workflow): Extension<Arc<Workflow>>) -> Response {
    let timestamp = Utc::now();
    match workflow.health().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "database": "up", "timestamp": timestamp })),
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "health check: store ping failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "degraded", "database": "down", "timestamp": timestamp })),
            )
                .into_response()
        }
    }
}

pub async fn whoami(Extension(caller): Extension<Caller>) -> impl IntoResponse {
    Json(json!({
        "user_id": caller.user_id(),
        "role": caller.role().to_string(),
    }))
}

/// GET /legal/:name - static legal text, read on every request.
pub async fn legal(
    Extension(LegalDir(dir)): Extension<LegalDir>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    if !is_document_name(&name) {
        return Err(ApiError::NotFound("legal document"));
    }

    let path = dir.join(format!("{name}.txt"));
    match tokio::fs::read_to_string(&path).await {
        Ok(content) => Ok((StatusCode::OK, Json(json!({ "name": name, "content": content }))).into_response()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ApiError::NotFound("legal document")),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read legal document");
            Ok(json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal error"))
        }
    }
}

/// Lowercase letters, digits, `-` and `_` only; keeps lookups inside the directory.
fn is_document_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 64
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traversal_names_are_refused() {
        assert!(is_document_name("terms"));
        assert!(is_document_name("privacy-2024"));
        assert!(!is_document_name("../Cargo"));
        assert!(!is_document_name("terms.txt"));
        assert!(!is_document_name(""));
    }
}
