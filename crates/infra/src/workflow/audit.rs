use formadesk_auth::{Caller, RoleRequirement, require_role};
use formadesk_events::{AuditEvent, EntityType};

use super::{Workflow, WorkflowError};

impl Workflow {
    /// Staff: the status-transition history of one entity, oldest first.
    pub async fn audit_trail(
        &self,
        caller: &Caller,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<AuditEvent>, WorkflowError> {
        require_role(caller, RoleRequirement::Staff)?;
        let entity_type: EntityType = entity_type.parse()?;
        Ok(self
            .stores
            .audit
            .for_entity(entity_type, entity_id.trim())
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use formadesk_auth::{AuthzError, ProfileStatus, Role};
    use formadesk_core::DomainError;

    use super::*;
    use crate::workflow::testing::Harness;

    #[tokio::test]
    async fn clients_cannot_read_the_trail() {
        let h = Harness::new().await;
        let client = h.user(Role::Client, ProfileStatus::Active).await;

        let err = h
            .workflow
            .audit_trail(&client, "profile", &client.user_id().to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Authz(AuthzError::Forbidden { .. })));
    }

    #[tokio::test]
    async fn unknown_entity_type_is_a_validation_error() {
        let h = Harness::new().await;
        let agent = h.user(Role::Agent, ProfileStatus::Active).await;

        let err = h.workflow.audit_trail(&agent, "invoice", "x").await.unwrap_err();
        assert!(matches!(err, WorkflowError::Domain(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn bootstrap_records_registration() {
        let h = Harness::new().await;
        let agent = h.user(Role::Agent, ProfileStatus::Active).await;

        let trail = h
            .workflow
            .audit_trail(&agent, "PROFILE", &agent.user_id().to_string())
            .await
            .unwrap();
        assert_eq!(trail.first().unwrap().action, "profile.registered");
        assert_eq!(trail.first().unwrap().actor_id, None);
    }
}
