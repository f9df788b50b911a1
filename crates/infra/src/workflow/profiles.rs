use chrono::{DateTime, Utc};
use tracing::info;

use formadesk_auth::{
    Caller, ChangeStatus, Profile, ProfileCommand, ProfileStatus, RegisterProfile, Role,
    RoleRequirement, RoleResolution, require_role,
};
use formadesk_core::{DomainError, UserId};

use super::{Workflow, WorkflowError};

impl Workflow {
    /// Resolve the caller's role from their profile.
    ///
    /// A missing profile or a failed lookup resolves to the least-privileged
    /// fallback; this never fails and never grants more than CLIENT.
    pub async fn resolve_caller(&self, user_id: UserId) -> Caller {
        let lookup = self
            .stores
            .profiles
            .get(&user_id)
            .await
            .map(|profile| profile.filter(|p| p.created).map(|p| p.role));
        RoleResolution::from_lookup(lookup, self.fallback).into_caller(user_id)
    }

    /// The caller's own profile.
    pub async fn my_profile(&self, caller: &Caller) -> Result<Profile, WorkflowError> {
        self.load_profile(caller.user_id()).await
    }

    /// Self-registration: the caller becomes a PENDING CLIENT.
    pub async fn register_self(
        &self,
        caller: &Caller,
        email: &str,
        full_name: &str,
    ) -> Result<Profile, WorkflowError> {
        let user_id = caller.user_id();
        let cmd = ProfileCommand::Register(RegisterProfile {
            user_id,
            email: email.to_string(),
            full_name: full_name.to_string(),
            role: Role::Client,
            occurred_at: Utc::now(),
        });
        let out = self
            .dispatcher
            .dispatch(self.stores.profiles.as_ref(), user_id, Some(user_id), cmd, Profile::empty)
            .await?;
        Ok(out.aggregate)
    }

    /// Admin registration of any user with any role.
    pub async fn register_profile(
        &self,
        caller: &Caller,
        user_id: UserId,
        email: &str,
        full_name: &str,
        role: &str,
    ) -> Result<Profile, WorkflowError> {
        require_role(caller, RoleRequirement::AdminOnly)?;
        let role: Role = role.parse()?;

        let cmd = ProfileCommand::Register(RegisterProfile {
            user_id,
            email: email.to_string(),
            full_name: full_name.to_string(),
            role,
            occurred_at: Utc::now(),
        });
        let out = self
            .dispatcher
            .dispatch(
                self.stores.profiles.as_ref(),
                user_id,
                Some(caller.user_id()),
                cmd,
                Profile::empty,
            )
            .await?;
        Ok(out.aggregate)
    }

    pub async fn list_profiles(&self, caller: &Caller) -> Result<Vec<Profile>, WorkflowError> {
        require_role(caller, RoleRequirement::Staff)?;
        let profiles = self.stores.profiles.list().await?;
        Ok(profiles.into_iter().filter(|p| p.created).collect())
    }

    /// Admin override of a profile's status.
    ///
    /// The status string is parsed before anything is loaded, so an unknown
    /// value is refused without touching the profile.
    pub async fn change_client_status(
        &self,
        caller: &Caller,
        user_id: UserId,
        status: &str,
        reason: &str,
    ) -> Result<Profile, WorkflowError> {
        require_role(caller, RoleRequirement::AdminOnly)?;
        let status: ProfileStatus = status.parse()?;

        let cmd = ProfileCommand::ChangeStatus(ChangeStatus {
            user_id,
            status,
            reason: reason.to_string(),
            actor_id: caller.user_id(),
            occurred_at: Utc::now(),
        });
        let out = self
            .dispatcher
            .dispatch(
                self.stores.profiles.as_ref(),
                user_id,
                Some(caller.user_id()),
                cmd,
                Profile::empty,
            )
            .await?;

        info!(user_id = %user_id, status = %status, actor_id = %caller.user_id(), "profile status changed by admin");
        Ok(out.aggregate)
    }

    /// Register a profile outside any request (startup seeding, tests).
    ///
    /// An existing profile is left as is.
    pub async fn bootstrap_profile(
        &self,
        user_id: UserId,
        email: &str,
        full_name: &str,
        role: Role,
        status: ProfileStatus,
        now: DateTime<Utc>,
    ) -> Result<Profile, WorkflowError> {
        if let Some(existing) = self.stores.profiles.get(&user_id).await? {
            if existing.created {
                return Ok(existing);
            }
        }

        let register = ProfileCommand::Register(RegisterProfile {
            user_id,
            email: email.to_string(),
            full_name: full_name.to_string(),
            role,
            occurred_at: now,
        });
        let mut out = self
            .dispatcher
            .dispatch(self.stores.profiles.as_ref(), user_id, None, register, Profile::empty)
            .await?;

        if status != out.aggregate.status {
            let change = ProfileCommand::ChangeStatus(ChangeStatus {
                user_id,
                status,
                reason: "bootstrap".to_string(),
                actor_id: user_id,
                occurred_at: now,
            });
            out = self
                .dispatcher
                .dispatch(self.stores.profiles.as_ref(), user_id, None, change, Profile::empty)
                .await?;
        }

        Ok(out.aggregate)
    }

    pub(super) async fn load_profile(&self, user_id: UserId) -> Result<Profile, WorkflowError> {
        self.stores
            .profiles
            .get(&user_id)
            .await?
            .filter(|p| p.created)
            .ok_or_else(|| DomainError::not_found().into())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use formadesk_auth::AuthzError;

    use super::*;
    use crate::store::{EntityStore, StoreError};
    use crate::workflow::Stores;
    use crate::workflow::testing::Harness;

    struct BrokenProfiles;

    #[async_trait]
    impl EntityStore<UserId, Profile> for BrokenProfiles {
        async fn get(&self, _key: &UserId) -> Result<Option<Profile>, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn upsert(&self, _key: UserId, _value: Profile) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn list(&self) -> Result<Vec<Profile>, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn role_is_resolved_from_profile() {
        let h = Harness::new().await;
        let admin = h.user(Role::Admin, ProfileStatus::Active).await;
        assert_eq!(admin.role(), Role::Admin);
    }

    #[tokio::test]
    async fn unknown_user_falls_back_to_client() {
        let h = Harness::new().await;
        let caller = h.workflow.resolve_caller(UserId::new()).await;
        assert_eq!(caller.role(), Role::Client);
    }

    #[tokio::test]
    async fn failed_lookup_falls_back_to_client() {
        let mut stores = Stores::in_memory();
        stores.profiles = Arc::new(BrokenProfiles);
        let workflow = Workflow::new(stores);

        let caller = workflow.resolve_caller(UserId::new()).await;
        assert_eq!(caller.role(), Role::Client);
    }

    #[tokio::test]
    async fn unknown_status_is_refused_without_mutation() {
        let h = Harness::new().await;
        let admin = h.user(Role::Admin, ProfileStatus::Active).await;
        let client = h.user(Role::Client, ProfileStatus::Pending).await;

        let err = h
            .workflow
            .change_client_status(&admin, client.user_id(), "BANNED", "abuse")
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Domain(DomainError::Validation(_))));

        let profile = h.workflow.my_profile(&client).await.unwrap();
        assert_eq!(profile.status, ProfileStatus::Pending);
    }

    #[tokio::test]
    async fn only_admins_change_status() {
        let h = Harness::new().await;
        let agent = h.user(Role::Agent, ProfileStatus::Active).await;
        let client = h.user(Role::Client, ProfileStatus::Pending).await;

        let err = h
            .workflow
            .change_client_status(&agent, client.user_id(), "ACTIVE", "paid offline")
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Authz(AuthzError::Forbidden { .. })));
    }

    #[tokio::test]
    async fn admin_override_is_audited() {
        let h = Harness::new().await;
        let admin = h.user(Role::Admin, ProfileStatus::Active).await;
        let client = h.user(Role::Client, ProfileStatus::Pending).await;

        let profile = h
            .workflow
            .change_client_status(&admin, client.user_id(), "suspended", "chargeback")
            .await
            .unwrap();
        assert_eq!(profile.status, ProfileStatus::Suspended);

        let trail = h
            .workflow
            .audit_trail(&admin, "profile", &client.user_id().to_string())
            .await
            .unwrap();
        let last = trail.last().unwrap();
        assert_eq!(last.from_status.as_deref(), Some("PENDING"));
        assert_eq!(last.to_status.as_deref(), Some("SUSPENDED"));
        assert_eq!(last.actor_id, Some(admin.user_id()));
    }

    #[tokio::test]
    async fn self_registration_creates_pending_client() {
        let h = Harness::new().await;
        let caller = h.workflow.resolve_caller(UserId::new()).await;

        let profile = h
            .workflow
            .register_self(&caller, "new@example.com", "New Client")
            .await
            .unwrap();
        assert_eq!(profile.role, Role::Client);
        assert_eq!(profile.status, ProfileStatus::Pending);

        let again = h
            .workflow
            .register_self(&caller, "new@example.com", "New Client")
            .await
            .unwrap_err();
        assert!(matches!(again, WorkflowError::Domain(DomainError::Conflict(_))));
    }
}
