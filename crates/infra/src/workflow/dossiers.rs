use std::collections::BTreeSet;

use chrono::Utc;
use tracing::{info, warn};

use formadesk_auth::{Caller, Owned, RoleRequirement, require_ownership, require_role};
use formadesk_core::{Aggregate, DocumentId, DomainError, DossierId, ProductId};
use formadesk_dossiers::{
    ApproveDocument, CompleteDossier, Document, DocumentCommand, Dossier, DossierCommand,
    OpenDossier, RejectDocument, SubmitDocument, SubmitStep,
};

use crate::notifications;

use super::{Workflow, WorkflowError};

/// Result of approving or rejecting a document.
#[derive(Debug, Clone)]
pub struct ReviewOutcome {
    pub document: Document,
    pub dossier: Dossier,
    /// The approval completed the dossier.
    pub dossier_completed: bool,
    /// The owner was emailed successfully.
    pub owner_notified: bool,
}

impl Workflow {
    /// CLIENT: own dossiers. Staff: all dossiers.
    pub async fn list_dossiers(&self, caller: &Caller) -> Result<Vec<Dossier>, WorkflowError> {
        self.ensure_active(caller).await?;
        let dossiers = self.stores.dossiers.list().await?;
        if caller.is_staff() {
            return Ok(dossiers);
        }
        Ok(dossiers
            .into_iter()
            .filter(|d| d.owner() == Some(caller.user_id()))
            .collect())
    }

    /// Open a dossier for `product_id`, owned by the caller.
    pub async fn open_dossier(
        &self,
        caller: &Caller,
        product_id: ProductId,
    ) -> Result<Dossier, WorkflowError> {
        self.ensure_active(caller).await?;
        let product = self.load_product(product_id).await?;

        let dossier_id = DossierId::new();
        let cmd = DossierCommand::Open(OpenDossier {
            dossier_id,
            owner_id: caller.user_id(),
            product,
            occurred_at: Utc::now(),
        });
        let out = self
            .dispatcher
            .dispatch(
                self.stores.dossiers.as_ref(),
                dossier_id,
                Some(caller.user_id()),
                cmd,
                Dossier::empty,
            )
            .await?;

        info!(dossier_id = %dossier_id, owner_id = %caller.user_id(), "dossier opened");
        Ok(out.aggregate)
    }

    /// Fetch a dossier the caller may see (owner or staff).
    pub async fn get_dossier(
        &self,
        caller: &Caller,
        dossier_id: DossierId,
    ) -> Result<Dossier, WorkflowError> {
        self.ensure_active(caller).await?;
        let dossier = self.load_dossier(dossier_id).await?;
        require_ownership(caller, &dossier)?;
        Ok(dossier)
    }

    pub async fn submit_step(
        &self,
        caller: &Caller,
        dossier_id: DossierId,
        step: &str,
    ) -> Result<Dossier, WorkflowError> {
        self.get_dossier(caller, dossier_id).await?;

        let cmd = DossierCommand::SubmitStep(SubmitStep {
            dossier_id,
            step: step.to_string(),
            actor_id: caller.user_id(),
            occurred_at: Utc::now(),
        });
        let out = self
            .dispatcher
            .dispatch(
                self.stores.dossiers.as_ref(),
                dossier_id,
                Some(caller.user_id()),
                cmd,
                Dossier::empty,
            )
            .await?;
        Ok(out.aggregate)
    }

    pub async fn list_documents(
        &self,
        caller: &Caller,
        dossier_id: DossierId,
    ) -> Result<Vec<Document>, WorkflowError> {
        self.get_dossier(caller, dossier_id).await?;
        self.documents_of(dossier_id).await
    }

    /// Upload a document to a dossier; also records the upload as a step.
    pub async fn submit_document(
        &self,
        caller: &Caller,
        dossier_id: DossierId,
        kind: &str,
        file_name: &str,
    ) -> Result<Document, WorkflowError> {
        let dossier = self.get_dossier(caller, dossier_id).await?;
        let owner_id = dossier.owner().ok_or(DomainError::NotFound)?;
        let now = Utc::now();

        let step = DossierCommand::SubmitStep(SubmitStep {
            dossier_id,
            step: kind.to_string(),
            actor_id: caller.user_id(),
            occurred_at: now,
        });
        // Refuse up front (e.g. COMPLETED dossier) so no orphan document is stored.
        dossier.handle(&step)?;

        let document_id = DocumentId::new();
        let submit = DocumentCommand::Submit(SubmitDocument {
            document_id,
            dossier_id,
            owner_id,
            kind: kind.to_string(),
            file_name: file_name.to_string(),
            actor_id: caller.user_id(),
            occurred_at: now,
        });
        let document = self
            .dispatcher
            .dispatch(
                self.stores.documents.as_ref(),
                document_id,
                Some(caller.user_id()),
                submit,
                Document::empty,
            )
            .await?
            .aggregate;

        self.dispatcher
            .dispatch(
                self.stores.dossiers.as_ref(),
                dossier_id,
                Some(caller.user_id()),
                step,
                Dossier::empty,
            )
            .await?;

        info!(document_id = %document_id, dossier_id = %dossier_id, kind = %document.kind(), "document submitted");
        Ok(document)
    }

    /// Staff approval; completes the dossier when every required kind is approved.
    pub async fn approve_document(
        &self,
        caller: &Caller,
        document_id: DocumentId,
    ) -> Result<ReviewOutcome, WorkflowError> {
        require_role(caller, RoleRequirement::Staff)?;

        let cmd = DocumentCommand::Approve(ApproveDocument {
            document_id,
            reviewer_id: caller.user_id(),
            occurred_at: Utc::now(),
        });
        let document = self
            .dispatcher
            .dispatch(
                self.stores.documents.as_ref(),
                document_id,
                Some(caller.user_id()),
                cmd,
                Document::empty,
            )
            .await?
            .aggregate;

        let dossier_id = document.dossier_id().ok_or(DomainError::NotFound)?;
        let (dossier, dossier_completed) = self.complete_if_ready(caller, dossier_id).await?;
        let owner_notified = self.notify_owner(&document).await;

        info!(document_id = %document_id, reviewer_id = %caller.user_id(), dossier_completed, "document approved");
        Ok(ReviewOutcome {
            document,
            dossier,
            dossier_completed,
            owner_notified,
        })
    }

    /// Staff rejection with a mandatory reason.
    pub async fn reject_document(
        &self,
        caller: &Caller,
        document_id: DocumentId,
        reason: &str,
    ) -> Result<ReviewOutcome, WorkflowError> {
        require_role(caller, RoleRequirement::Staff)?;

        let cmd = DocumentCommand::Reject(RejectDocument {
            document_id,
            reviewer_id: caller.user_id(),
            reason: reason.to_string(),
            occurred_at: Utc::now(),
        });
        let document = self
            .dispatcher
            .dispatch(
                self.stores.documents.as_ref(),
                document_id,
                Some(caller.user_id()),
                cmd,
                Document::empty,
            )
            .await?
            .aggregate;

        let dossier_id = document.dossier_id().ok_or(DomainError::NotFound)?;
        let dossier = self.load_dossier(dossier_id).await?;
        let owner_notified = self.notify_owner(&document).await;

        info!(document_id = %document_id, reviewer_id = %caller.user_id(), "document rejected");
        Ok(ReviewOutcome {
            document,
            dossier,
            dossier_completed: false,
            owner_notified,
        })
    }

    async fn complete_if_ready(
        &self,
        caller: &Caller,
        dossier_id: DossierId,
    ) -> Result<(Dossier, bool), WorkflowError> {
        let dossier = self.load_dossier(dossier_id).await?;
        let approved_kinds: BTreeSet<String> = self
            .documents_of(dossier_id)
            .await?
            .into_iter()
            .filter(|d| d.is_approved())
            .map(|d| d.kind().to_string())
            .collect();

        if !dossier.is_ready_for_completion(&approved_kinds) {
            return Ok((dossier, false));
        }

        let cmd = DossierCommand::Complete(CompleteDossier {
            dossier_id,
            approved_kinds,
            actor_id: caller.user_id(),
            occurred_at: Utc::now(),
        });
        let out = self
            .dispatcher
            .dispatch(
                self.stores.dossiers.as_ref(),
                dossier_id,
                Some(caller.user_id()),
                cmd,
                Dossier::empty,
            )
            .await?;

        info!(dossier_id = %dossier_id, "dossier completed");
        Ok((out.aggregate, true))
    }

    /// Email the owner about a review; failures are logged, never returned.
    async fn notify_owner(&self, document: &Document) -> bool {
        let Some(owner_id) = document.owner_id() else {
            return false;
        };
        let owner = match self.load_profile(owner_id).await {
            Ok(owner) => owner,
            Err(e) => {
                warn!(owner_id = %owner_id, error = %e, "cannot notify dossier owner");
                return false;
            }
        };
        let Some(email) = notifications::document_reviewed(&owner, document) else {
            return false;
        };

        match self.mailer.send(email).await {
            Ok(()) => true,
            Err(e) => {
                warn!(owner_id = %owner_id, document_id = %document.id_typed(), error = %e, "review notification failed");
                false
            }
        }
    }

    async fn load_dossier(&self, dossier_id: DossierId) -> Result<Dossier, WorkflowError> {
        self.stores
            .dossiers
            .get(&dossier_id)
            .await?
            .filter(|d| d.is_created())
            .ok_or_else(|| DomainError::not_found().into())
    }

    async fn documents_of(&self, dossier_id: DossierId) -> Result<Vec<Document>, WorkflowError> {
        Ok(self
            .stores
            .documents
            .list()
            .await?
            .into_iter()
            .filter(|d| d.dossier_id() == Some(dossier_id))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use formadesk_auth::{AuthzError, ProfileStatus, Role};
    use formadesk_dossiers::{DocumentStatus, DossierStatus};

    use super::*;
    use crate::mail::RecordingMailer;
    use crate::workflow::testing::Harness;

    async fn llc_product(h: &Harness) -> ProductId {
        let caller = h.user(Role::Agent, ProfileStatus::Active).await;
        h.workflow
            .list_products(&caller)
            .await
            .unwrap()
            .into_iter()
            .find(|p| p.dossier_type == "llc_formation")
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn client_sees_only_own_dossiers() {
        let h = Harness::new().await;
        let product = llc_product(&h).await;
        let alice = h.user(Role::Client, ProfileStatus::Active).await;
        let bob = h.user(Role::Client, ProfileStatus::Active).await;
        let agent = h.user(Role::Agent, ProfileStatus::Active).await;

        let dossier = h.workflow.open_dossier(&alice, product).await.unwrap();
        h.workflow.open_dossier(&bob, product).await.unwrap();

        assert_eq!(h.workflow.list_dossiers(&alice).await.unwrap().len(), 1);
        assert_eq!(h.workflow.list_dossiers(&agent).await.unwrap().len(), 2);

        let err = h.workflow.get_dossier(&bob, dossier.id_typed()).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Authz(AuthzError::NotOwner)));
        assert_eq!(dossier.owner_id(), Some(alice.user_id()));
        h.workflow.get_dossier(&agent, dossier.id_typed()).await.unwrap();
    }

    #[tokio::test]
    async fn pending_client_cannot_use_dashboard() {
        let h = Harness::new().await;
        let product = llc_product(&h).await;
        let pending = h.user(Role::Client, ProfileStatus::Pending).await;

        let err = h.workflow.open_dossier(&pending, product).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Authz(AuthzError::Inactive { .. })));
    }

    #[tokio::test]
    async fn full_review_cycle_completes_dossier_and_notifies() {
        let h = Harness::new().await;
        let product = llc_product(&h).await;
        let client = h.user(Role::Client, ProfileStatus::Active).await;
        let agent = h.user(Role::Agent, ProfileStatus::Active).await;

        let dossier = h.workflow.open_dossier(&client, product).await.unwrap();
        let id = dossier.id_typed();

        let passport = h.workflow.submit_document(&client, id, "passport", "passport.pdf").await.unwrap();
        let address = h.workflow.submit_document(&client, id, "proof_of_address", "bill.pdf").await.unwrap();
        let agreement = h
            .workflow
            .submit_document(&client, id, "operating_agreement", "oa.pdf")
            .await
            .unwrap();
        assert_eq!(h.workflow.get_dossier(&client, id).await.unwrap().status(), DossierStatus::InProgress);

        // A rejected kind is uploaded again as a new document.
        let rejected = h
            .workflow
            .reject_document(&agent, address.id_typed(), "address is cut off")
            .await
            .unwrap();
        assert_eq!(rejected.document.status(), DocumentStatus::Rejected);
        let address = h.workflow.submit_document(&client, id, "proof_of_address", "bill-2.pdf").await.unwrap();

        let first = h.workflow.approve_document(&agent, passport.id_typed()).await.unwrap();
        assert!(!first.dossier_completed);
        h.workflow.approve_document(&agent, agreement.id_typed()).await.unwrap();
        let last = h.workflow.approve_document(&agent, address.id_typed()).await.unwrap();

        assert!(last.dossier_completed);
        assert_eq!(last.dossier.status(), DossierStatus::Completed);
        assert_eq!(h.mailer.sent().len(), 4);

        let err = h
            .workflow
            .submit_document(&client, id, "passport", "late.pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Domain(DomainError::IllegalTransition { .. })));
        assert_eq!(h.workflow.list_documents(&client, id).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn empty_reason_leaves_document_pending() {
        let h = Harness::new().await;
        let product = llc_product(&h).await;
        let client = h.user(Role::Client, ProfileStatus::Active).await;
        let agent = h.user(Role::Agent, ProfileStatus::Active).await;

        let dossier = h.workflow.open_dossier(&client, product).await.unwrap();
        let doc = h
            .workflow
            .submit_document(&client, dossier.id_typed(), "passport", "p.pdf")
            .await
            .unwrap();

        let err = h.workflow.reject_document(&agent, doc.id_typed(), "   ").await.unwrap_err();
        assert!(matches!(err, WorkflowError::Domain(DomainError::Validation(_))));

        let docs = h.workflow.list_documents(&client, dossier.id_typed()).await.unwrap();
        assert_eq!(docs[0].status(), DocumentStatus::Pending);
        assert!(h.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn clients_cannot_review() {
        let h = Harness::new().await;
        let client = h.user(Role::Client, ProfileStatus::Active).await;
        let err = h.workflow.approve_document(&client, DocumentId::new()).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Authz(AuthzError::Forbidden { .. })));
    }

    #[tokio::test]
    async fn mail_failure_does_not_fail_review() {
        let mut h = Harness::new().await;
        h.workflow = h.workflow.clone().with_mailer(std::sync::Arc::new(RecordingMailer::failing()));
        let product = llc_product(&h).await;
        let client = h.user(Role::Client, ProfileStatus::Active).await;
        let agent = h.user(Role::Agent, ProfileStatus::Active).await;

        let dossier = h.workflow.open_dossier(&client, product).await.unwrap();
        let doc = h
            .workflow
            .submit_document(&client, dossier.id_typed(), "passport", "p.pdf")
            .await
            .unwrap();

        let outcome = h.workflow.approve_document(&agent, doc.id_typed()).await.unwrap();
        assert!(!outcome.owner_notified);
        assert_eq!(outcome.document.status(), DocumentStatus::Approved);
    }
}
