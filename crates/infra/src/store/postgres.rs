//! Postgres-backed entity store and audit log.
//!
//! Entities live in one JSONB table keyed by `(entity_type, entity_id)`.
//! Audit records live in an append-only table; update and delete are
//! neutralized by rules created in [`ensure_schema`].
//!
//! ## Error Mapping
//!
//! | SQLx Error | StoreError |
//! |------------|------------|
//! | PoolClosed, PoolTimedOut, Io, Tls | `Unavailable` |
//! | Database, RowNotFound, other | `Query` |
//! | ColumnDecode, Decode | `Serialization` |

use std::fmt::Display;
use std::marker::PhantomData;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use formadesk_core::UserId;
use formadesk_events::{AuditEvent, EntityType};

use super::{AuditLog, EntityStore, StoreError, StoreHealth};

/// Create the tables used by the Postgres adapters (idempotent).
pub async fn ensure_schema(pool: &PgPool) -> Result<(), StoreError> {
    let statements = [
        r#"
        CREATE TABLE IF NOT EXISTS entities (
            entity_type TEXT        NOT NULL,
            entity_id   TEXT        NOT NULL,
            body        JSONB       NOT NULL,
            updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            PRIMARY KEY (entity_type, entity_id)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS audit_events (
            seq         BIGSERIAL   PRIMARY KEY,
            id          UUID        NOT NULL UNIQUE,
            entity_type TEXT        NOT NULL,
            entity_id   TEXT        NOT NULL,
            actor_id    UUID        NULL,
            action      TEXT        NOT NULL,
            from_status TEXT        NULL,
            to_status   TEXT        NULL,
            details     JSONB       NOT NULL,
            occurred_at TIMESTAMPTZ NOT NULL
        )
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS audit_events_entity_idx
            ON audit_events (entity_type, entity_id, occurred_at)
        "#,
        r#"
        CREATE OR REPLACE RULE audit_events_no_update AS
            ON UPDATE TO audit_events DO INSTEAD NOTHING
        "#,
        r#"
        CREATE OR REPLACE RULE audit_events_no_delete AS
            ON DELETE TO audit_events DO INSTEAD NOTHING
        "#,
    ];

    for statement in statements {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
    }
    Ok(())
}

/// Postgres-backed store for one entity kind.
///
/// Keys are stored by their `Display` form, bodies as JSONB.
#[derive(Debug, Clone)]
pub struct PostgresEntityStore<K, V> {
    pool: PgPool,
    entity_type: EntityType,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> PostgresEntityStore<K, V> {
    pub fn new(pool: PgPool, entity_type: EntityType) -> Self {
        Self {
            pool,
            entity_type,
            _marker: PhantomData,
        }
    }

    fn decode(&self, row: &sqlx::postgres::PgRow) -> Result<V, StoreError>
    where
        V: DeserializeOwned,
    {
        let body: serde_json::Value = row
            .try_get("body")
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        serde_json::from_value(body).map_err(|e| {
            StoreError::Serialization(format!("{} body: {e}", self.entity_type))
        })
    }
}

#[async_trait]
impl<K, V> EntityStore<K, V> for PostgresEntityStore<K, V>
where
    K: Display + Send + Sync + 'static,
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    #[instrument(skip(self, key), fields(entity_type = %self.entity_type, entity_id = %key), err)]
    async fn get(&self, key: &K) -> Result<Option<V>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT body
            FROM entities
            WHERE entity_type = $1 AND entity_id = $2
            "#,
        )
        .bind(self.entity_type.as_str())
        .bind(key.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_entity", e))?;

        row.map(|row| self.decode(&row)).transpose()
    }

    #[instrument(skip(self, key, value), fields(entity_type = %self.entity_type, entity_id = %key), err)]
    async fn upsert(&self, key: K, value: V) -> Result<(), StoreError> {
        let body =
            serde_json::to_value(&value).map_err(|e| StoreError::Serialization(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO entities (entity_type, entity_id, body)
            VALUES ($1, $2, $3)
            ON CONFLICT (entity_type, entity_id)
            DO UPDATE SET
                body = EXCLUDED.body,
                updated_at = NOW()
            "#,
        )
        .bind(self.entity_type.as_str())
        .bind(key.to_string())
        .bind(body)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("upsert_entity", e))?;

        Ok(())
    }

    #[instrument(skip(self), fields(entity_type = %self.entity_type), err)]
    async fn list(&self) -> Result<Vec<V>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT body
            FROM entities
            WHERE entity_type = $1
            ORDER BY entity_id ASC
            "#,
        )
        .bind(self.entity_type.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_entities", e))?;

        rows.iter().map(|row| self.decode(row)).collect()
    }
}

/// Postgres-backed append-only audit log.
#[derive(Debug, Clone)]
pub struct PostgresAuditLog {
    pool: PgPool,
}

impl PostgresAuditLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLog for PostgresAuditLog {
    #[instrument(skip(self, events), fields(event_count = events.len()), err)]
    async fn append(&self, events: &[AuditEvent]) -> Result<(), StoreError> {
        if events.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_audit_append", e))?;

        for event in events {
            sqlx::query(
                r#"
                INSERT INTO audit_events (
                    id, entity_type, entity_id, actor_id, action,
                    from_status, to_status, details, occurred_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(event.id)
            .bind(event.entity_type.as_str())
            .bind(&event.entity_id)
            .bind(event.actor_id.map(|a| *a.as_uuid()))
            .bind(&event.action)
            .bind(event.from_status.as_deref())
            .bind(event.to_status.as_deref())
            .bind(&event.details)
            .bind(event.occurred_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("append_audit", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_audit_append", e))
    }

    #[instrument(skip(self), fields(entity_type = %entity_type), err)]
    async fn for_entity(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Result<Vec<AuditEvent>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT
                id, entity_type, entity_id, actor_id, action,
                from_status, to_status, details, occurred_at
            FROM audit_events
            WHERE entity_type = $1 AND entity_id = $2
            ORDER BY occurred_at ASC, seq ASC
            "#,
        )
        .bind(entity_type.as_str())
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_audit", e))?;

        rows.iter().map(audit_from_row).collect()
    }
}

fn audit_from_row(row: &sqlx::postgres::PgRow) -> Result<AuditEvent, StoreError> {
    let column = |e: sqlx::Error| StoreError::Serialization(e.to_string());

    let entity_type: String = row.try_get("entity_type").map_err(column)?;
    let entity_type = EntityType::from_str(&entity_type)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    let actor_id: Option<Uuid> = row.try_get("actor_id").map_err(column)?;

    Ok(AuditEvent {
        id: row.try_get("id").map_err(column)?,
        entity_type,
        entity_id: row.try_get("entity_id").map_err(column)?,
        actor_id: actor_id.map(UserId::from_uuid),
        action: row.try_get("action").map_err(column)?,
        from_status: row.try_get("from_status").map_err(column)?,
        to_status: row.try_get("to_status").map_err(column)?,
        details: row.try_get("details").map_err(column)?,
        occurred_at: row.try_get("occurred_at").map_err(column)?,
    })
}

/// Connectivity probe (`SELECT 1`).
#[derive(Debug, Clone)]
pub struct PostgresHealth {
    pool: PgPool,
}

impl PostgresHealth {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StoreHealth for PostgresHealth {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("ping", e))?;
        Ok(())
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable(format!("connection pool unavailable in {operation}"))
        }
        sqlx::Error::Io(e) => StoreError::Unavailable(format!("io error in {operation}: {e}")),
        sqlx::Error::Tls(e) => StoreError::Unavailable(format!("tls error in {operation}: {e}")),
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Serialization(format!("decode error in {operation}: {err}"))
        }
        sqlx::Error::Database(db_err) => {
            StoreError::Query(format!("database error in {operation}: {}", db_err.message()))
        }
        other => StoreError::Query(format!("{operation} failed: {other}")),
    }
}
