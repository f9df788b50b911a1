//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses
//! - `extract.rs`: JSON body extractor with the same error shape

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::{Extension, Router};
use sqlx::postgres::PgPoolOptions;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

use formadesk_auth::Hs256TokenValidator;
use formadesk_infra::mail::{LogMailer, Mailer, SmtpMailer};
use formadesk_infra::store::ensure_schema;
use formadesk_infra::workflow::default_catalog;
use formadesk_infra::{Stores, Workflow};

use crate::config::ApiConfig;
use crate::middleware;
use crate::seed;

pub mod dto;
pub mod errors;
pub mod extract;
pub mod routes;

const MAX_DB_CONNECTIONS: u32 = 10;

/// Build the full HTTP router from configuration (public entrypoint used by `main.rs`).
///
/// Connects to Postgres when configured, seeds the catalog and any seed
/// profiles, then wires the router.
pub async fn build_app(config: &ApiConfig) -> anyhow::Result<Router> {
    let stores = match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(MAX_DB_CONNECTIONS)
                .connect(url)
                .await
                .context("connecting to DATABASE_URL")?;
            ensure_schema(&pool).await.context("preparing database schema")?;
            info!("using postgres stores");
            Stores::postgres(pool)
        }
        None => Stores::in_memory(),
    };

    let mailer: Arc<dyn Mailer> = match &config.smtp {
        Some(smtp) => {
            info!(host = %smtp.host, "using smtp mailer");
            Arc::new(SmtpMailer::new(smtp).context("configuring SMTP")?)
        }
        None => Arc::new(LogMailer),
    };

    let workflow = Workflow::new(stores).with_mailer(mailer);
    let products = workflow.seed_catalog(default_catalog()).await?;
    info!(products, "catalog seeded");

    if let Some(path) = &config.seed_profiles {
        let seeds = seed::load_seed_profiles(path).await?;
        let count = seed::apply_seed_profiles(&workflow, &seeds).await?;
        info!(count, "seed profiles applied");
    }

    Ok(build_app_with(workflow, &config.jwt_secret, config.legal_dir.clone()))
}

/// Wire the router around an already-built [`Workflow`].
pub fn build_app_with(workflow: Workflow, jwt_secret: &str, legal_dir: PathBuf) -> Router {
    let workflow = Arc::new(workflow);
    let auth_state = middleware::AuthState {
        tokens: Arc::new(Hs256TokenValidator::new(jwt_secret.as_bytes())),
        workflow: workflow.clone(),
    };

    // Protected routes: require a valid session token.
    let protected = routes::router().layer(axum::middleware::from_fn_with_state(
        auth_state,
        middleware::auth_middleware,
    ));

    let api = routes::public_router()
        .merge(protected)
        .layer(Extension(workflow))
        .layer(Extension(routes::system::LegalDir(legal_dir)));

    Router::new()
        .nest("/api", api)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}
