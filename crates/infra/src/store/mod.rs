//! Entity and audit storage abstractions.
//!
//! The store is the single source of truth across requests. Writes are
//! last-write-wins; nothing mutable is cached between requests.

mod in_memory;
mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use formadesk_events::{AuditEvent, EntityType};

pub use in_memory::{InMemoryAuditLog, InMemoryEntityStore, InMemoryHealth};
pub use postgres::{PostgresAuditLog, PostgresEntityStore, PostgresHealth, ensure_schema};

/// Storage failure (network, serialization, query).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("query failed: {0}")]
    Query(String),
}

impl StoreError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Keyed entity storage (one table/map per entity kind).
#[async_trait]
pub trait EntityStore<K, V>: Send + Sync
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    async fn get(&self, key: &K) -> Result<Option<V>, StoreError>;
    async fn upsert(&self, key: K, value: V) -> Result<(), StoreError>;
    async fn list(&self) -> Result<Vec<V>, StoreError>;
}

#[async_trait]
impl<K, V, S> EntityStore<K, V> for Arc<S>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
    S: EntityStore<K, V> + ?Sized,
{
    async fn get(&self, key: &K) -> Result<Option<V>, StoreError> {
        (**self).get(key).await
    }

    async fn upsert(&self, key: K, value: V) -> Result<(), StoreError> {
        (**self).upsert(key, value).await
    }

    async fn list(&self) -> Result<Vec<V>, StoreError> {
        (**self).list().await
    }
}

/// Append-only audit trail.
///
/// Records are never updated or deleted.
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(&self, events: &[AuditEvent]) -> Result<(), StoreError>;

    /// Records for one entity, oldest first.
    async fn for_entity(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Result<Vec<AuditEvent>, StoreError>;
}

/// Liveness probe for the backing store.
#[async_trait]
pub trait StoreHealth: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;
}
