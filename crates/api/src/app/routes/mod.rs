use std::str::FromStr;

use axum::{
    Router,
    routing::{get, post},
};

use crate::app::errors::ApiError;

pub mod admin;
pub mod audit;
pub mod billing;
pub mod documents;
pub mod dossiers;
pub mod profile;
pub mod system;

/// Router for every authenticated endpoint (mounted under `/api`).
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/profile", get(profile::my_profile).post(profile::register_self))
        .route("/products", get(billing::list_products))
        .nest("/dossiers", dossiers::router())
        .nest("/documents", documents::router())
        .nest("/orders", billing::orders_router())
        .route("/payment-links/:id/checkout", post(billing::checkout_payment_link))
        .route("/audit/:entity_type/:entity_id", get(audit::audit_trail))
        .nest("/admin", admin::router())
}

/// Routes reachable without a token.
pub fn public_router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/legal/:name", get(system::legal))
}

pub(crate) fn parse_id<T: FromStr>(raw: &str, what: &'static str) -> Result<T, ApiError> {
    raw.trim().parse().map_err(|_| ApiError::InvalidId(what))
}

