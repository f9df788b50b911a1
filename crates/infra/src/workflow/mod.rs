//! Request-scoped workflow services.
//!
//! Every operation takes the resolved [`Caller`] explicitly, runs the gate
//! checks, and only then dispatches commands. Nothing here schedules work in
//! the background; follow-up transitions (dossier completion, profile
//! activation) run inline as part of the triggering request.

mod audit;
mod billing;
mod catalog;
mod dossiers;
mod profiles;

use std::sync::Arc;

use sqlx::PgPool;
use thiserror::Error;

use formadesk_auth::{AuthzError, Caller, Profile, RoleFallback};
use formadesk_billing::{Order, PaymentLink};
use formadesk_core::{
    DocumentId, DomainError, DossierId, OrderId, PaymentLinkId, ProductId, UserId,
};
use formadesk_dossiers::{Document, Dossier, Product};
use formadesk_events::EntityType;

use crate::command_dispatcher::CommandDispatcher;
use crate::mail::{LogMailer, Mailer};
use crate::store::{
    AuditLog, EntityStore, InMemoryAuditLog, InMemoryEntityStore, InMemoryHealth, PostgresAuditLog,
    PostgresEntityStore, PostgresHealth, StoreError, StoreHealth,
};

pub use billing::{BulkExpireOutcome, CheckoutOutcome, PaymentRecorded};
pub use catalog::default_catalog;
pub use dossiers::ReviewOutcome;

/// Service-layer error: everything a workflow operation can fail with.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Authz(#[from] AuthzError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<formadesk_core::UnknownStatus> for WorkflowError {
    fn from(value: formadesk_core::UnknownStatus) -> Self {
        WorkflowError::Domain(value.into())
    }
}

/// One store per entity kind, plus the audit trail and a health probe.
#[derive(Clone)]
pub struct Stores {
    pub profiles: Arc<dyn EntityStore<UserId, Profile>>,
    pub products: Arc<dyn EntityStore<ProductId, Product>>,
    pub dossiers: Arc<dyn EntityStore<DossierId, Dossier>>,
    pub documents: Arc<dyn EntityStore<DocumentId, Document>>,
    pub orders: Arc<dyn EntityStore<OrderId, Order>>,
    pub payment_links: Arc<dyn EntityStore<PaymentLinkId, PaymentLink>>,
    pub audit: Arc<dyn AuditLog>,
    pub health: Arc<dyn StoreHealth>,
}

impl Stores {
    /// In-memory wiring (dev/test).
    pub fn in_memory() -> Self {
        Self {
            profiles: Arc::new(InMemoryEntityStore::new()),
            products: Arc::new(InMemoryEntityStore::new()),
            dossiers: Arc::new(InMemoryEntityStore::new()),
            documents: Arc::new(InMemoryEntityStore::new()),
            orders: Arc::new(InMemoryEntityStore::new()),
            payment_links: Arc::new(InMemoryEntityStore::new()),
            audit: Arc::new(InMemoryAuditLog::new()),
            health: Arc::new(InMemoryHealth::new()),
        }
    }

    /// Postgres wiring; call [`crate::store::ensure_schema`] first.
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            profiles: Arc::new(PostgresEntityStore::new(pool.clone(), EntityType::Profile)),
            products: Arc::new(PostgresEntityStore::new(pool.clone(), EntityType::Product)),
            dossiers: Arc::new(PostgresEntityStore::new(pool.clone(), EntityType::Dossier)),
            documents: Arc::new(PostgresEntityStore::new(pool.clone(), EntityType::Document)),
            orders: Arc::new(PostgresEntityStore::new(pool.clone(), EntityType::Order)),
            payment_links: Arc::new(PostgresEntityStore::new(pool.clone(), EntityType::PaymentLink)),
            audit: Arc::new(PostgresAuditLog::new(pool.clone())),
            health: Arc::new(PostgresHealth::new(pool)),
        }
    }

    /// Replace the health probe (tests).
    pub fn with_health(mut self, health: Arc<dyn StoreHealth>) -> Self {
        self.health = health;
        self
    }
}

/// Entry point for every workflow operation.
#[derive(Clone)]
pub struct Workflow {
    stores: Stores,
    dispatcher: CommandDispatcher,
    mailer: Arc<dyn Mailer>,
    fallback: RoleFallback,
}

impl Workflow {
    pub fn new(stores: Stores) -> Self {
        let dispatcher = CommandDispatcher::new(stores.audit.clone());
        Self {
            stores,
            dispatcher,
            mailer: Arc::new(LogMailer),
            fallback: RoleFallback::default(),
        }
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = mailer;
        self
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    /// Probe the backing store.
    pub async fn health(&self) -> Result<(), StoreError> {
        self.stores.health.ping().await
    }

    /// CLIENT callers must have an ACTIVE profile; staff always pass.
    async fn ensure_active(&self, caller: &Caller) -> Result<(), WorkflowError> {
        if caller.is_staff() {
            return Ok(());
        }
        let status = self
            .stores
            .profiles
            .get(&caller.user_id())
            .await?
            .filter(|p| p.created)
            .map(|p| p.status);
        formadesk_auth::require_active(caller, status)?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use chrono::Utc;
    use formadesk_auth::{Caller, ProfileStatus, Role};
    use formadesk_core::UserId;

    use super::{Stores, Workflow};
    use crate::mail::RecordingMailer;

    pub struct Harness {
        pub workflow: Workflow,
        pub mailer: Arc<RecordingMailer>,
    }

    impl Harness {
        pub async fn new() -> Self {
            Self::with_stores(Stores::in_memory()).await
        }

        pub async fn with_stores(stores: Stores) -> Self {
            let mailer = Arc::new(RecordingMailer::new());
            let workflow = Workflow::new(stores).with_mailer(mailer.clone());
            workflow.seed_catalog(super::default_catalog()).await.unwrap();
            Self { workflow, mailer }
        }

        pub async fn user(&self, role: Role, status: ProfileStatus) -> Caller {
            let user_id = UserId::new();
            self.workflow
                .bootstrap_profile(
                    user_id,
                    &format!("{}@example.com", user_id),
                    "Test User",
                    role,
                    status,
                    Utc::now(),
                )
                .await
                .unwrap();
            self.workflow.resolve_caller(user_id).await
        }
    }
}
