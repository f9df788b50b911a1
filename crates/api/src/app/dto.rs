use serde::Deserialize;
use serde_json::{Value, json};

use formadesk_auth::Profile;
use formadesk_billing::{Order, PaymentLink};
use formadesk_dossiers::{Document, Dossier, Product};
use formadesk_events::AuditEvent;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct RegisterSelfRequest {
    pub email: String,
    #[serde(default)]
    pub full_name: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterClientRequest {
    pub user_id: String,
    pub email: String,
    #[serde(default)]
    pub full_name: String,
    /// Defaults to CLIENT.
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeStatusRequest {
    pub status: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct OpenDossierRequest {
    pub product_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitStepRequest {
    pub step: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitDocumentRequest {
    pub kind: String,
    pub file_name: String,
}

#[derive(Debug, Deserialize)]
pub struct RejectDocumentRequest {
    // Missing and blank reasons are both refused by the domain with a 400.
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct CreatePaymentLinkRequest {
    pub product_id: String,
    pub email: String,
    #[serde(default = "default_link_ttl_hours")]
    pub expires_in_hours: i64,
}

fn default_link_ttl_hours() -> i64 {
    72
}

#[derive(Debug, Deserialize)]
pub struct BulkExpireRequest {
    #[serde(default)]
    pub link_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct PlaceOrderRequest {
    pub product_id: String,
}

#[derive(Debug, Deserialize)]
pub struct RecordPaymentRequest {
    pub outcome: String,
    pub provider_reference: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RefundOrderRequest {
    #[serde(default)]
    pub reason: String,
}

// -------------------------
// JSON mapping helpers
// -------------------------

pub fn profile_to_json(p: &Profile) -> Value {
    json!({
        "id": p.id,
        "email": p.email,
        "full_name": p.full_name,
        "role": p.role.to_string(),
        "status": p.status.to_string(),
    })
}

pub fn product_to_json(p: &Product) -> Value {
    json!({
        "id": p.id,
        "name": p.name,
        "dossier_type": p.dossier_type,
        "price": p.price,
        "currency": p.currency,
        "required_documents": p.required_documents,
    })
}

pub fn dossier_to_json(d: &Dossier) -> Value {
    json!({
        "id": d.id_typed(),
        "user_id": d.owner(),
        "product_id": d.product_id(),
        "dossier_type": d.dossier_type(),
        "status": d.status().to_string(),
        "submitted_steps": d.submitted_steps(),
        "required_documents": d.required_documents(),
        "opened_at": d.opened_at(),
    })
}

pub fn document_to_json(d: &Document) -> Value {
    json!({
        "id": d.id_typed(),
        "dossier_id": d.dossier_id(),
        "kind": d.kind(),
        "file_name": d.file_name(),
        "status": d.status().to_string(),
        "rejection_reason": d.rejection_reason(),
        "reviewed_by": d.reviewed_by(),
        "submitted_by": d.submitted_by(),
        "submitted_at": d.submitted_at(),
    })
}

pub fn order_to_json(o: &Order) -> Value {
    json!({
        "id": o.id_typed(),
        "user_id": o.user_id(),
        "product_id": o.product_id(),
        "amount": o.amount(),
        "currency": o.currency(),
        "status": o.status().to_string(),
        "provider_reference": o.provider_reference(),
        "payment_link_id": o.payment_link_id(),
        "placed_at": o.placed_at(),
    })
}

pub fn payment_link_to_json(l: &PaymentLink) -> Value {
    json!({
        "id": l.id_typed(),
        "product_id": l.product_id(),
        "email": l.email(),
        "created_by": l.created_by(),
        "expires_at": l.expires_at(),
        "status": l.status().to_string(),
        "used_by_order": l.used_by_order(),
    })
}

pub fn audit_to_json(a: &AuditEvent) -> Value {
    json!({
        "id": a.id,
        "entity_type": a.entity_type.as_str(),
        "entity_id": a.entity_id,
        "actor_id": a.actor_id,
        "action": a.action,
        "from_status": a.from_status,
        "to_status": a.to_status,
        "details": a.details,
        "occurred_at": a.occurred_at,
    })
}

pub fn items<T>(values: &[T], to_json: fn(&T) -> Value) -> Value {
    json!({ "items": values.iter().map(to_json).collect::<Vec<_>>() })
}
