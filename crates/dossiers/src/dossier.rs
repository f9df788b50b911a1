use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use formadesk_auth::Owned;
use formadesk_core::{Aggregate, AggregateRoot, DomainError, DossierId, ProductId, UserId, closed_status};
use formadesk_events::Event;

use crate::product::{Product, normalize_kind};

/// Dossier status lifecycle: QUALIFICATION → IN_PROGRESS → COMPLETED.
///
/// COMPLETED is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DossierStatus {
    Qualification,
    InProgress,
    Completed,
}

closed_status!(DossierStatus, "dossier status" {
    Qualification => "QUALIFICATION",
    InProgress => "IN_PROGRESS",
    Completed => "COMPLETED",
});

/// Aggregate root: Dossier (a client's case for one product).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dossier {
    id: DossierId,
    owner_id: Option<UserId>,
    product_id: Option<ProductId>,
    dossier_type: String,
    status: DossierStatus,
    submitted_steps: Vec<String>,
    /// Snapshot of the product's required document kinds at opening time.
    required_documents: Vec<String>,
    opened_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Dossier {
    /// Create an empty, not-yet-opened instance.
    pub fn empty(id: DossierId) -> Self {
        Self {
            id,
            owner_id: None,
            product_id: None,
            dossier_type: String::new(),
            status: DossierStatus::Qualification,
            submitted_steps: Vec::new(),
            required_documents: Vec::new(),
            opened_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> DossierId {
        self.id
    }

    pub fn owner(&self) -> Option<UserId> {
        self.owner_id
    }

    pub fn product_id(&self) -> Option<ProductId> {
        self.product_id
    }

    pub fn dossier_type(&self) -> &str {
        &self.dossier_type
    }

    pub fn status(&self) -> DossierStatus {
        self.status
    }

    pub fn submitted_steps(&self) -> &[String] {
        &self.submitted_steps
    }

    pub fn required_documents(&self) -> &[String] {
        &self.required_documents
    }

    pub fn opened_at(&self) -> Option<DateTime<Utc>> {
        self.opened_at
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    /// Required kinds that are not in `approved_kinds`, in catalog order.
    pub fn missing_documents(&self, approved_kinds: &BTreeSet<String>) -> Vec<String> {
        self.required_documents
            .iter()
            .filter(|k| !approved_kinds.contains(*k))
            .cloned()
            .collect()
    }

    pub fn is_ready_for_completion(&self, approved_kinds: &BTreeSet<String>) -> bool {
        self.status == DossierStatus::InProgress && self.missing_documents(approved_kinds).is_empty()
    }
}

impl AggregateRoot for Dossier {
    type Id = DossierId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Owned for Dossier {
    fn owner_id(&self) -> Option<UserId> {
        self.owner_id
    }
}

/// Command: OpenDossier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenDossier {
    pub dossier_id: DossierId,
    pub owner_id: UserId,
    pub product: Product,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SubmitStep (a qualification answer or a document upload).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitStep {
    pub dossier_id: DossierId,
    pub step: String,
    pub actor_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CompleteDossier.
///
/// `approved_kinds` is the set of document kinds with at least one APPROVED
/// document on this dossier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteDossier {
    pub dossier_id: DossierId,
    pub approved_kinds: BTreeSet<String>,
    pub actor_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DossierCommand {
    Open(OpenDossier),
    SubmitStep(SubmitStep),
    Complete(CompleteDossier),
}

/// Event: DossierOpened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DossierOpened {
    pub dossier_id: DossierId,
    pub owner_id: UserId,
    pub product_id: ProductId,
    pub dossier_type: String,
    pub required_documents: Vec<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StepSubmitted. `from`/`to` differ only for the first submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSubmitted {
    pub dossier_id: DossierId,
    pub step: String,
    pub actor_id: UserId,
    pub from: DossierStatus,
    pub to: DossierStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DossierCompleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DossierCompleted {
    pub dossier_id: DossierId,
    pub actor_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DossierEvent {
    Opened(DossierOpened),
    StepSubmitted(StepSubmitted),
    Completed(DossierCompleted),
}

impl Event for DossierEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DossierEvent::Opened(_) => "dossier.opened",
            DossierEvent::StepSubmitted(_) => "dossier.step_submitted",
            DossierEvent::Completed(_) => "dossier.completed",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            DossierEvent::Opened(e) => e.occurred_at,
            DossierEvent::StepSubmitted(e) => e.occurred_at,
            DossierEvent::Completed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Dossier {
    type Command = DossierCommand;
    type Event = DossierEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            DossierEvent::Opened(e) => {
                self.id = e.dossier_id;
                self.owner_id = Some(e.owner_id);
                self.product_id = Some(e.product_id);
                self.dossier_type = e.dossier_type.clone();
                self.required_documents = e.required_documents.clone();
                self.status = DossierStatus::Qualification;
                self.submitted_steps.clear();
                self.opened_at = Some(e.occurred_at);
                self.created = true;
            }
            DossierEvent::StepSubmitted(e) => {
                self.submitted_steps.push(e.step.clone());
                self.status = e.to;
            }
            DossierEvent::Completed(_) => {
                self.status = DossierStatus::Completed;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            DossierCommand::Open(cmd) => self.handle_open(cmd),
            DossierCommand::SubmitStep(cmd) => self.handle_submit_step(cmd),
            DossierCommand::Complete(cmd) => self.handle_complete(cmd),
        }
    }
}

impl Dossier {
    fn ensure_dossier_id(&self, dossier_id: DossierId) -> Result<(), DomainError> {
        if self.id != dossier_id {
            return Err(DomainError::invariant("dossier_id mismatch"));
        }
        Ok(())
    }

    fn ensure_open(&self, action: &'static str) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.status == DossierStatus::Completed {
            return Err(DomainError::illegal_transition("dossier", self.status, action));
        }
        Ok(())
    }

    fn handle_open(&self, cmd: &OpenDossier) -> Result<Vec<DossierEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("dossier already exists"));
        }
        self.ensure_dossier_id(cmd.dossier_id)?;

        Ok(vec![DossierEvent::Opened(DossierOpened {
            dossier_id: cmd.dossier_id,
            owner_id: cmd.owner_id,
            product_id: cmd.product.id,
            dossier_type: cmd.product.dossier_type.clone(),
            required_documents: cmd.product.required_documents.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_submit_step(&self, cmd: &SubmitStep) -> Result<Vec<DossierEvent>, DomainError> {
        let step = normalize_kind(&cmd.step);
        if step.is_empty() {
            return Err(DomainError::validation("step cannot be empty"));
        }
        self.ensure_open("submit a step on")?;
        self.ensure_dossier_id(cmd.dossier_id)?;

        // Re-submitting a step (e.g. a replacement for a rejected document)
        // is accepted without a new record.
        if self.submitted_steps.iter().any(|s| *s == step) {
            return Ok(vec![]);
        }

        Ok(vec![DossierEvent::StepSubmitted(StepSubmitted {
            dossier_id: cmd.dossier_id,
            step,
            actor_id: cmd.actor_id,
            from: self.status,
            to: DossierStatus::InProgress,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_complete(&self, cmd: &CompleteDossier) -> Result<Vec<DossierEvent>, DomainError> {
        self.ensure_open("complete")?;
        self.ensure_dossier_id(cmd.dossier_id)?;

        if self.status != DossierStatus::InProgress {
            return Err(DomainError::illegal_transition("dossier", self.status, "complete"));
        }

        let missing = self.missing_documents(&cmd.approved_kinds);
        if !missing.is_empty() {
            return Err(DomainError::invariant(format!(
                "missing approved documents: {}",
                missing.join(", ")
            )));
        }

        Ok(vec![DossierEvent::Completed(DossierCompleted {
            dossier_id: cmd.dossier_id,
            actor_id: cmd.actor_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn test_product() -> Product {
        Product::new(
            ProductId::new(),
            "LLC Formation",
            "llc_formation",
            49_900,
            "USD",
            vec!["passport".to_string(), "proof_of_address".to_string()],
        )
        .unwrap()
    }

    fn opened(owner: UserId) -> Dossier {
        let id = DossierId::new();
        let mut dossier = Dossier::empty(id);
        dossier
            .execute(&DossierCommand::Open(OpenDossier {
                dossier_id: id,
                owner_id: owner,
                product: test_product(),
                occurred_at: test_time(),
            }))
            .unwrap();
        dossier
    }

    fn submit(dossier: &mut Dossier, step: &str) -> Result<Vec<DossierEvent>, DomainError> {
        let cmd = DossierCommand::SubmitStep(SubmitStep {
            dossier_id: dossier.id_typed(),
            step: step.to_string(),
            actor_id: dossier.owner().unwrap(),
            occurred_at: test_time(),
        });
        dossier.execute(&cmd)
    }

    fn complete(dossier: &mut Dossier, kinds: &[&str]) -> Result<Vec<DossierEvent>, DomainError> {
        let cmd = DossierCommand::Complete(CompleteDossier {
            dossier_id: dossier.id_typed(),
            approved_kinds: kinds.iter().map(|k| k.to_string()).collect(),
            actor_id: UserId::new(),
            occurred_at: test_time(),
        });
        dossier.execute(&cmd)
    }

    #[test]
    fn open_snapshots_product_requirements() {
        let owner = UserId::new();
        let dossier = opened(owner);
        assert_eq!(dossier.status(), DossierStatus::Qualification);
        assert_eq!(dossier.owner_id(), Some(owner));
        assert_eq!(dossier.required_documents(), ["passport", "proof_of_address"]);
        assert_eq!(dossier.dossier_type(), "llc_formation");
    }

    #[test]
    fn open_twice_conflicts() {
        let dossier = opened(UserId::new());
        let err = dossier
            .handle(&DossierCommand::Open(OpenDossier {
                dossier_id: dossier.id_typed(),
                owner_id: UserId::new(),
                product: test_product(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn first_submission_moves_to_in_progress() {
        let mut dossier = opened(UserId::new());
        let events = submit(&mut dossier, "company_name").unwrap();

        let DossierEvent::StepSubmitted(e) = &events[0] else {
            panic!("expected StepSubmitted event");
        };
        assert_eq!(e.from, DossierStatus::Qualification);
        assert_eq!(e.to, DossierStatus::InProgress);
        assert_eq!(dossier.status(), DossierStatus::InProgress);

        let events = submit(&mut dossier, "passport").unwrap();
        let DossierEvent::StepSubmitted(e) = &events[0] else {
            panic!("expected StepSubmitted event");
        };
        assert_eq!(e.from, DossierStatus::InProgress);
    }

    #[test]
    fn resubmitting_a_step_is_a_no_op() {
        let mut dossier = opened(UserId::new());
        submit(&mut dossier, "passport").unwrap();
        let version = dossier.version();
        assert!(submit(&mut dossier, " Passport ").unwrap().is_empty());
        assert_eq!(dossier.version(), version);
        assert_eq!(dossier.submitted_steps(), ["passport"]);
    }

    #[test]
    fn empty_step_is_a_validation_error() {
        let mut dossier = opened(UserId::new());
        assert!(submit(&mut dossier, "  ").unwrap_err().is_validation());
    }

    #[test]
    fn cannot_complete_from_qualification() {
        let mut dossier = opened(UserId::new());
        let err = complete(&mut dossier, &["passport", "proof_of_address"]).unwrap_err();
        assert!(matches!(err, DomainError::IllegalTransition { .. }));
    }

    #[test]
    fn completion_requires_every_required_kind() {
        let mut dossier = opened(UserId::new());
        submit(&mut dossier, "passport").unwrap();

        let err = complete(&mut dossier, &["passport"]).unwrap_err();
        match err {
            DomainError::InvariantViolation(msg) if msg.contains("proof_of_address") => {}
            other => panic!("expected missing-documents invariant, got {other:?}"),
        }

        complete(&mut dossier, &["passport", "proof_of_address"]).unwrap();
        assert_eq!(dossier.status(), DossierStatus::Completed);
    }

    #[test]
    fn completed_dossier_is_terminal() {
        let mut dossier = opened(UserId::new());
        submit(&mut dossier, "passport").unwrap();
        complete(&mut dossier, &["passport", "proof_of_address"]).unwrap();

        let err = submit(&mut dossier, "late_step").unwrap_err();
        assert_eq!(
            err,
            DomainError::illegal_transition("dossier", DossierStatus::Completed, "submit a step on")
        );
        assert!(complete(&mut dossier, &["passport", "proof_of_address"]).is_err());
    }

    #[test]
    fn commands_on_unopened_dossier_are_not_found() {
        let dossier = Dossier::empty(DossierId::new());
        let err = dossier
            .handle(&DossierCommand::SubmitStep(SubmitStep {
                dossier_id: dossier.id_typed(),
                step: "passport".to_string(),
                actor_id: UserId::new(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }

    proptest! {
        /// The owner recorded at opening never changes, whatever steps follow.
        #[test]
        fn owner_is_fixed_for_life(steps in prop::collection::vec("[a-z]{1,8}", 0..12)) {
            let owner = UserId::new();
            let mut dossier = opened(owner);
            for step in &steps {
                let _ = submit(&mut dossier, step);
            }
            let _ = complete(&mut dossier, &["passport", "proof_of_address"]);
            prop_assert_eq!(dossier.owner_id(), Some(owner));
        }
    }
}
