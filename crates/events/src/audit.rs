//! Immutable audit trail of status changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use formadesk_core::UserId;

use crate::Event;

/// Kind of entity an audit record refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Profile,
    Dossier,
    Document,
    Order,
    PaymentLink,
    Product,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Profile => "profile",
            EntityType::Dossier => "dossier",
            EntityType::Document => "document",
            EntityType::Order => "order",
            EntityType::PaymentLink => "payment_link",
            EntityType::Product => "product",
        }
    }
}

impl core::fmt::Display for EntityType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for EntityType {
    type Err = formadesk_core::UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "profile" | "client" => Ok(EntityType::Profile),
            "dossier" => Ok(EntityType::Dossier),
            "document" => Ok(EntityType::Document),
            "order" => Ok(EntityType::Order),
            "payment_link" => Ok(EntityType::PaymentLink),
            "product" => Ok(EntityType::Product),
            _ => Err(formadesk_core::UnknownStatus {
                kind: "entity type",
                value: s.to_string(),
                expected: &["profile", "dossier", "document", "order", "payment_link", "product"],
            }),
        }
    }
}

/// Natural key of an audit record: `(entity_type, entity_id, timestamp)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AuditKey {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub occurred_at: DateTime<Utc>,
}

/// One status change (or other workflow action) on one entity.
///
/// Records are appended once and never mutated or deleted; there is no
/// API on this type or on any audit store that would allow either.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub entity_type: EntityType,
    pub entity_id: String,
    /// `None` for actions taken on behalf of an external collaborator
    /// (e.g. the payment provider reporting a checkout outcome).
    pub actor_id: Option<UserId>,
    pub action: String,
    pub from_status: Option<String>,
    pub to_status: Option<String>,
    pub details: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    /// Build the audit record for a workflow event.
    pub fn from_event<E: Event>(
        entity_type: EntityType,
        entity_id: impl ToString,
        actor_id: Option<UserId>,
        event: &E,
        from_status: Option<String>,
        to_status: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            entity_type,
            entity_id: entity_id.to_string(),
            actor_id,
            action: event.event_type().to_string(),
            from_status,
            to_status,
            details: serde_json::to_value(event).unwrap_or(serde_json::Value::Null),
            occurred_at: event.occurred_at(),
        }
    }

    pub fn key(&self) -> AuditKey {
        AuditKey {
            entity_type: self.entity_type,
            entity_id: self.entity_id.clone(),
            occurred_at: self.occurred_at,
        }
    }

    /// Whether the record describes an actual status change.
    pub fn changes_status(&self) -> bool {
        self.from_status != self.to_status
    }
}
