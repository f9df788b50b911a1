//! Command execution pipeline (application-level orchestration).
//!
//! ```text
//! Command
//!   ↓
//! 1. Load the current entity from its store (or start from `make_aggregate`)
//!   ↓
//! 2. Handle command (pure decision logic, produces events)
//!   ↓
//! 3. Apply events, capturing the status before and after each one
//!   ↓
//! 4. Persist the new state (last-write-wins)
//!   ↓
//! 5. Append one audit record per event
//! ```
//!
//! Domain refusals happen in step 2, so a refused command never touches
//! the store or the audit log.

use std::sync::Arc;

use tracing::debug;

use formadesk_auth::Profile;
use formadesk_billing::{Order, PaymentLink};
use formadesk_core::{Aggregate, DomainError, UserId};
use formadesk_dossiers::{Document, Dossier};
use formadesk_events::{AuditEvent, EntityType, Event};

use crate::store::{AuditLog, EntityStore};
use crate::workflow::WorkflowError;

/// An aggregate whose transitions are recorded in the audit trail.
pub trait Audited: Aggregate {
    const ENTITY_TYPE: EntityType;

    /// Identifier as recorded in `AuditEvent::entity_id`.
    fn audit_id(&self) -> String;

    /// Current status label; `None` before the entity exists.
    fn status_label(&self) -> Option<String>;
}

impl Audited for Profile {
    const ENTITY_TYPE: EntityType = EntityType::Profile;

    fn audit_id(&self) -> String {
        self.id.to_string()
    }

    fn status_label(&self) -> Option<String> {
        self.created.then(|| self.status.to_string())
    }
}

impl Audited for Dossier {
    const ENTITY_TYPE: EntityType = EntityType::Dossier;

    fn audit_id(&self) -> String {
        self.id_typed().to_string()
    }

    fn status_label(&self) -> Option<String> {
        self.is_created().then(|| self.status().to_string())
    }
}

impl Audited for Document {
    const ENTITY_TYPE: EntityType = EntityType::Document;

    fn audit_id(&self) -> String {
        self.id_typed().to_string()
    }

    fn status_label(&self) -> Option<String> {
        self.is_created().then(|| self.status().to_string())
    }
}

impl Audited for Order {
    const ENTITY_TYPE: EntityType = EntityType::Order;

    fn audit_id(&self) -> String {
        self.id_typed().to_string()
    }

    fn status_label(&self) -> Option<String> {
        self.is_created().then(|| self.status().to_string())
    }
}

impl Audited for PaymentLink {
    const ENTITY_TYPE: EntityType = EntityType::PaymentLink;

    fn audit_id(&self) -> String {
        self.id_typed().to_string()
    }

    fn status_label(&self) -> Option<String> {
        self.is_created().then(|| self.status().to_string())
    }
}

/// Result of a dispatched command: the new state plus what was recorded.
#[derive(Debug, Clone)]
pub struct Dispatched<A: Aggregate> {
    pub aggregate: A,
    pub events: Vec<A::Event>,
    pub records: Vec<AuditEvent>,
}

impl<A: Aggregate> Dispatched<A> {
    /// Whether the command was an accepted no-op.
    pub fn is_noop(&self) -> bool {
        self.events.is_empty()
    }
}

/// Reusable command execution engine for audited aggregates.
#[derive(Clone)]
pub struct CommandDispatcher {
    audit: Arc<dyn AuditLog>,
}

impl CommandDispatcher {
    pub fn new(audit: Arc<dyn AuditLog>) -> Self {
        Self { audit }
    }

    pub fn audit(&self) -> &Arc<dyn AuditLog> {
        &self.audit
    }

    /// Dispatch a command through the full pipeline.
    ///
    /// `actor` is `None` when the transition is reported by an external
    /// collaborator rather than a signed-in user.
    pub async fn dispatch<A, S>(
        &self,
        store: &S,
        id: A::Id,
        actor: Option<UserId>,
        command: A::Command,
        make_aggregate: impl FnOnce(A::Id) -> A,
    ) -> Result<Dispatched<A>, WorkflowError>
    where
        A: Audited<Error = DomainError> + Clone + Send + Sync + 'static,
        A::Id: Send + Sync + 'static,
        A::Event: Event,
        S: EntityStore<A::Id, A> + ?Sized,
    {
        let mut aggregate = match store.get(&id).await? {
            Some(existing) => existing,
            None => make_aggregate(id.clone()),
        };

        let events = aggregate.handle(&command)?;
        if events.is_empty() {
            debug!(entity_type = %A::ENTITY_TYPE, entity_id = %aggregate.audit_id(), "command accepted as no-op");
            return Ok(Dispatched {
                aggregate,
                events,
                records: Vec::new(),
            });
        }

        let records = apply_recorded(&mut aggregate, &events, actor);

        store.upsert(id, aggregate.clone()).await?;
        self.audit.append(&records).await?;

        debug!(
            entity_type = %A::ENTITY_TYPE,
            entity_id = %aggregate.audit_id(),
            event_count = events.len(),
            "command committed"
        );

        Ok(Dispatched {
            aggregate,
            events,
            records,
        })
    }
}

/// Apply `events` to `aggregate`, producing one audit record per event.
pub fn apply_recorded<A>(aggregate: &mut A, events: &[A::Event], actor: Option<UserId>) -> Vec<AuditEvent>
where
    A: Audited,
    A::Event: Event,
{
    let mut records = Vec::with_capacity(events.len());
    for event in events {
        let from = aggregate.status_label();
        aggregate.apply(event);
        records.push(AuditEvent::from_event(
            A::ENTITY_TYPE,
            aggregate.audit_id(),
            actor,
            event,
            from,
            aggregate.status_label(),
        ));
    }
    records
}
