use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use formadesk_auth::Owned;
use formadesk_core::{
    Aggregate, AggregateRoot, DocumentId, DomainError, DossierId, UserId, closed_status,
};
use formadesk_events::Event;

use crate::product::normalize_kind;

/// Validation status of an uploaded document.
///
/// Only PENDING → APPROVED and PENDING → REJECTED exist; both outcomes are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    Pending,
    Approved,
    Rejected,
}

closed_status!(DocumentStatus, "document status" {
    Pending => "PENDING",
    Approved => "APPROVED",
    Rejected => "REJECTED",
});

/// Aggregate root: Document (one file uploaded to one dossier).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    id: DocumentId,
    dossier_id: Option<DossierId>,
    /// Owner of the parent dossier, copied at submission.
    owner_id: Option<UserId>,
    kind: String,
    file_name: String,
    status: DocumentStatus,
    rejection_reason: Option<String>,
    reviewed_by: Option<UserId>,
    submitted_by: Option<UserId>,
    submitted_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Document {
    pub fn empty(id: DocumentId) -> Self {
        Self {
            id,
            dossier_id: None,
            owner_id: None,
            kind: String::new(),
            file_name: String::new(),
            status: DocumentStatus::Pending,
            rejection_reason: None,
            reviewed_by: None,
            submitted_by: None,
            submitted_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> DocumentId {
        self.id
    }

    pub fn dossier_id(&self) -> Option<DossierId> {
        self.dossier_id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn status(&self) -> DocumentStatus {
        self.status
    }

    /// Set iff the document is REJECTED.
    pub fn rejection_reason(&self) -> Option<&str> {
        self.rejection_reason.as_deref()
    }

    pub fn reviewed_by(&self) -> Option<UserId> {
        self.reviewed_by
    }

    pub fn submitted_by(&self) -> Option<UserId> {
        self.submitted_by
    }

    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.submitted_at
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn is_approved(&self) -> bool {
        self.status == DocumentStatus::Approved
    }
}

impl AggregateRoot for Document {
    type Id = DocumentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Owned for Document {
    fn owner_id(&self) -> Option<UserId> {
        self.owner_id
    }
}

/// Command: SubmitDocument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitDocument {
    pub document_id: DocumentId,
    pub dossier_id: DossierId,
    pub owner_id: UserId,
    pub kind: String,
    pub file_name: String,
    pub actor_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApproveDocument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveDocument {
    pub document_id: DocumentId,
    pub reviewer_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RejectDocument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectDocument {
    pub document_id: DocumentId,
    pub reviewer_id: UserId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentCommand {
    Submit(SubmitDocument),
    Approve(ApproveDocument),
    Reject(RejectDocument),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSubmitted {
    pub document_id: DocumentId,
    pub dossier_id: DossierId,
    pub owner_id: UserId,
    pub kind: String,
    pub file_name: String,
    pub submitted_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentApproved {
    pub document_id: DocumentId,
    pub dossier_id: DossierId,
    pub reviewer_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRejected {
    pub document_id: DocumentId,
    pub dossier_id: DossierId,
    pub reviewer_id: UserId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentEvent {
    Submitted(DocumentSubmitted),
    Approved(DocumentApproved),
    Rejected(DocumentRejected),
}

impl DocumentEvent {
    pub fn to_status(&self) -> DocumentStatus {
        match self {
            DocumentEvent::Submitted(_) => DocumentStatus::Pending,
            DocumentEvent::Approved(_) => DocumentStatus::Approved,
            DocumentEvent::Rejected(_) => DocumentStatus::Rejected,
        }
    }
}

impl Event for DocumentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DocumentEvent::Submitted(_) => "document.submitted",
            DocumentEvent::Approved(_) => "document.approved",
            DocumentEvent::Rejected(_) => "document.rejected",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            DocumentEvent::Submitted(e) => e.occurred_at,
            DocumentEvent::Approved(e) => e.occurred_at,
            DocumentEvent::Rejected(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Document {
    type Command = DocumentCommand;
    type Event = DocumentEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            DocumentEvent::Submitted(e) => {
                self.id = e.document_id;
                self.dossier_id = Some(e.dossier_id);
                self.owner_id = Some(e.owner_id);
                self.kind = e.kind.clone();
                self.file_name = e.file_name.clone();
                self.status = DocumentStatus::Pending;
                self.submitted_by = Some(e.submitted_by);
                self.submitted_at = Some(e.occurred_at);
                self.created = true;
            }
            DocumentEvent::Approved(e) => {
                self.status = DocumentStatus::Approved;
                self.reviewed_by = Some(e.reviewer_id);
            }
            DocumentEvent::Rejected(e) => {
                self.status = DocumentStatus::Rejected;
                self.reviewed_by = Some(e.reviewer_id);
                self.rejection_reason = Some(e.reason.clone());
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            DocumentCommand::Submit(cmd) => self.handle_submit(cmd),
            DocumentCommand::Approve(cmd) => self.handle_approve(cmd),
            DocumentCommand::Reject(cmd) => self.handle_reject(cmd),
        }
    }
}

impl Document {
    fn ensure_document_id(&self, document_id: DocumentId) -> Result<(), DomainError> {
        if self.id != document_id {
            return Err(DomainError::invariant("document_id mismatch"));
        }
        Ok(())
    }

    fn ensure_pending(&self, action: &'static str) -> Result<DossierId, DomainError> {
        let dossier_id = match (self.created, self.dossier_id) {
            (true, Some(id)) => id,
            _ => return Err(DomainError::not_found()),
        };
        if self.status != DocumentStatus::Pending {
            return Err(DomainError::illegal_transition("document", self.status, action));
        }
        Ok(dossier_id)
    }

    fn handle_submit(&self, cmd: &SubmitDocument) -> Result<Vec<DocumentEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("document already exists"));
        }
        self.ensure_document_id(cmd.document_id)?;

        let kind = normalize_kind(&cmd.kind);
        if kind.is_empty() {
            return Err(DomainError::validation("document kind cannot be empty"));
        }
        let file_name = cmd.file_name.trim();
        if file_name.is_empty() {
            return Err(DomainError::validation("file_name cannot be empty"));
        }

        Ok(vec![DocumentEvent::Submitted(DocumentSubmitted {
            document_id: cmd.document_id,
            dossier_id: cmd.dossier_id,
            owner_id: cmd.owner_id,
            kind,
            file_name: file_name.to_string(),
            submitted_by: cmd.actor_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_approve(&self, cmd: &ApproveDocument) -> Result<Vec<DocumentEvent>, DomainError> {
        let dossier_id = self.ensure_pending("approve")?;
        self.ensure_document_id(cmd.document_id)?;

        Ok(vec![DocumentEvent::Approved(DocumentApproved {
            document_id: cmd.document_id,
            dossier_id,
            reviewer_id: cmd.reviewer_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reject(&self, cmd: &RejectDocument) -> Result<Vec<DocumentEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        // A missing reason is a bad request regardless of the document's state.
        let reason = cmd.reason.trim();
        if reason.is_empty() {
            return Err(DomainError::validation("rejection reason is required"));
        }
        let dossier_id = self.ensure_pending("reject")?;
        self.ensure_document_id(cmd.document_id)?;

        Ok(vec![DocumentEvent::Rejected(DocumentRejected {
            document_id: cmd.document_id,
            dossier_id,
            reviewer_id: cmd.reviewer_id,
            reason: reason.to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
