use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use tracing::debug;

use formadesk_auth::TokenValidator;
use formadesk_infra::Workflow;

use crate::app::errors::json_error;

#[derive(Clone)]
pub struct AuthState {
    pub tokens: Arc<dyn TokenValidator>,
    pub workflow: Arc<Workflow>,
}

/// Verify the bearer token and attach the resolved [`formadesk_auth::Caller`].
///
/// The role always comes from the caller's profile, never from the token.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let Some(token) = extract_bearer(req.headers()) else {
        return unauthenticated("missing bearer token");
    };

    let claims = match state.tokens.validate(token, Utc::now()) {
        Ok(claims) => claims,
        Err(e) => {
            debug!(error = %e, "rejected session token");
            return unauthenticated(e.to_string());
        }
    };

    let caller = state.workflow.resolve_caller(claims.sub).await;
    req.extensions_mut().insert(caller);

    next.run(req).await
}

fn unauthenticated(message: impl Into<String>) -> Response {
    json_error(StatusCode::UNAUTHORIZED, "unauthenticated", message)
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?;
    let header = header.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}
