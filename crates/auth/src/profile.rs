//! Client profile aggregate.
//!
//! The profile status is the account-level gate: PENDING until a first
//! payment succeeds, ACTIVE afterwards, SUSPENDED after a failed payment
//! (or an admin decision).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use formadesk_core::{Aggregate, AggregateRoot, DomainError, OrderId, UserId, closed_status};
use formadesk_events::Event;

use crate::Role;

// ─────────────────────────────────────────────────────────────────────────────
// Profile Status
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProfileStatus {
    /// Registered, no successful payment yet.
    #[default]
    Pending,
    /// Paid up; dashboard accessible.
    Active,
    /// Payment failed or suspended by an admin.
    Suspended,
}

closed_status!(ProfileStatus, "profile status" {
    Pending => "PENDING",
    Active => "ACTIVE",
    Suspended => "SUSPENDED",
});

// ─────────────────────────────────────────────────────────────────────────────
// Profile Aggregate
// ─────────────────────────────────────────────────────────────────────────────

/// # Invariants
/// - The id and role are fixed at registration.
/// - A PAID order activates a PENDING or SUSPENDED profile; an ACTIVE
///   profile stays ACTIVE.
/// - A failed payment suspends a PENDING or ACTIVE profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub status: ProfileStatus,
    pub version: u64,
    pub created: bool,
}

impl Profile {
    /// A not-yet-registered profile, ready to receive `Register`.
    pub fn empty(id: UserId) -> Self {
        Self {
            id,
            email: String::new(),
            full_name: String::new(),
            role: Role::Client,
            status: ProfileStatus::Pending,
            version: 0,
            created: false,
        }
    }

    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::NotFound);
        }
        Ok(())
    }

    fn changed(&self, to: ProfileStatus, cause: StatusChangeCause, at: DateTime<Utc>) -> ProfileEvent {
        ProfileEvent::StatusChanged(ProfileStatusChanged {
            user_id: self.id,
            from: self.status,
            to,
            cause,
            occurred_at: at,
        })
    }
}

impl AggregateRoot for Profile {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterProfile {
    pub user_id: UserId,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub occurred_at: DateTime<Utc>,
}

/// Admin override of the profile status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeStatus {
    pub user_id: UserId,
    pub status: ProfileStatus,
    pub reason: String,
    pub actor_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordPaymentSucceeded {
    pub user_id: UserId,
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordPaymentFailed {
    pub user_id: UserId,
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProfileCommand {
    Register(RegisterProfile),
    ChangeStatus(ChangeStatus),
    RecordPaymentSucceeded(RecordPaymentSucceeded),
    RecordPaymentFailed(RecordPaymentFailed),
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRegistered {
    pub user_id: UserId,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub occurred_at: DateTime<Utc>,
}

/// Why a profile status changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatusChangeCause {
    AdminOverride { actor_id: UserId, reason: String },
    PaymentSucceeded { order_id: OrderId },
    PaymentFailed { order_id: OrderId },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileStatusChanged {
    pub user_id: UserId,
    pub from: ProfileStatus,
    pub to: ProfileStatus,
    pub cause: StatusChangeCause,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProfileEvent {
    Registered(ProfileRegistered),
    StatusChanged(ProfileStatusChanged),
}

impl Event for ProfileEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProfileEvent::Registered(_) => "profile.registered",
            ProfileEvent::StatusChanged(e) => match e.cause {
                StatusChangeCause::AdminOverride { .. } => "profile.status_changed",
                StatusChangeCause::PaymentSucceeded { .. } => "profile.activated_by_payment",
                StatusChangeCause::PaymentFailed { .. } => "profile.suspended_by_payment",
            },
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProfileEvent::Registered(e) => e.occurred_at,
            ProfileEvent::StatusChanged(e) => e.occurred_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate Implementation
// ─────────────────────────────────────────────────────────────────────────────

impl Aggregate for Profile {
    type Command = ProfileCommand;
    type Event = ProfileEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProfileEvent::Registered(e) => {
                self.id = e.user_id;
                self.email = e.email.clone();
                self.full_name = e.full_name.clone();
                self.role = e.role;
                self.status = ProfileStatus::Pending;
                self.created = true;
            }
            ProfileEvent::StatusChanged(e) => {
                self.status = e.to;
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProfileCommand::Register(cmd) => self.handle_register(cmd),
            ProfileCommand::ChangeStatus(cmd) => self.handle_change_status(cmd),
            ProfileCommand::RecordPaymentSucceeded(cmd) => self.handle_payment_succeeded(cmd),
            ProfileCommand::RecordPaymentFailed(cmd) => self.handle_payment_failed(cmd),
        }
    }
}

impl Profile {
    fn handle_register(&self, cmd: &RegisterProfile) -> Result<Vec<ProfileEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("profile already exists"));
        }

        let email = cmd.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(DomainError::validation("invalid email format"));
        }

        if cmd.full_name.trim().is_empty() {
            return Err(DomainError::validation("full name cannot be empty"));
        }

        Ok(vec![ProfileEvent::Registered(ProfileRegistered {
            user_id: cmd.user_id,
            email: email.to_lowercase(),
            full_name: cmd.full_name.trim().to_string(),
            role: cmd.role,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_status(&self, cmd: &ChangeStatus) -> Result<Vec<ProfileEvent>, DomainError> {
        self.ensure_created()?;

        let reason = cmd.reason.trim();
        if reason.is_empty() {
            return Err(DomainError::validation("reason is required"));
        }

        if self.status == cmd.status {
            return Err(DomainError::invariant(format!("profile already {}", cmd.status)));
        }

        Ok(vec![self.changed(
            cmd.status,
            StatusChangeCause::AdminOverride {
                actor_id: cmd.actor_id,
                reason: reason.to_string(),
            },
            cmd.occurred_at,
        )])
    }

    fn handle_payment_succeeded(
        &self,
        cmd: &RecordPaymentSucceeded,
    ) -> Result<Vec<ProfileEvent>, DomainError> {
        self.ensure_created()?;

        match self.status {
            ProfileStatus::Active => Ok(vec![]),
            ProfileStatus::Pending | ProfileStatus::Suspended => Ok(vec![self.changed(
                ProfileStatus::Active,
                StatusChangeCause::PaymentSucceeded {
                    order_id: cmd.order_id,
                },
                cmd.occurred_at,
            )]),
        }
    }

    fn handle_payment_failed(&self, cmd: &RecordPaymentFailed) -> Result<Vec<ProfileEvent>, DomainError> {
        self.ensure_created()?;

        match self.status {
            ProfileStatus::Suspended => Ok(vec![]),
            ProfileStatus::Pending | ProfileStatus::Active => Ok(vec![self.changed(
                ProfileStatus::Suspended,
                StatusChangeCause::PaymentFailed {
                    order_id: cmd.order_id,
                },
                cmd.occurred_at,
            )]),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn registered(status: ProfileStatus) -> Profile {
        let user_id = UserId::new();
        let mut profile = Profile::empty(user_id);
        profile
            .execute(&ProfileCommand::Register(RegisterProfile {
                user_id,
                email: "Client@Example.com".to_string(),
                full_name: "Jane Client".to_string(),
                role: Role::Client,
                occurred_at: now(),
            }))
            .unwrap();
        profile.status = status;
        profile
    }

    fn paid(profile: &Profile) -> ProfileCommand {
        ProfileCommand::RecordPaymentSucceeded(RecordPaymentSucceeded {
            user_id: profile.id,
            order_id: OrderId::new(),
            occurred_at: now(),
        })
    }

    fn failed(profile: &Profile) -> ProfileCommand {
        ProfileCommand::RecordPaymentFailed(RecordPaymentFailed {
            user_id: profile.id,
            order_id: OrderId::new(),
            occurred_at: now(),
        })
    }

    #[test]
    fn register_normalizes_email_and_starts_pending() {
        let profile = registered(ProfileStatus::Pending);
        assert_eq!(profile.email, "client@example.com");
        assert_eq!(profile.status, ProfileStatus::Pending);
        assert_eq!(profile.version(), 1);
    }

    #[test]
    fn register_twice_conflicts() {
        let profile = registered(ProfileStatus::Pending);
        let err = profile
            .handle(&ProfileCommand::Register(RegisterProfile {
                user_id: profile.id,
                email: "again@example.com".to_string(),
                full_name: "Again".to_string(),
                role: Role::Client,
                occurred_at: now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn payment_activates_pending_and_suspended_profiles() {
        for start in [ProfileStatus::Pending, ProfileStatus::Suspended] {
            let mut profile = registered(start);
            let events = profile.execute(&paid(&profile)).unwrap();
            assert_eq!(events.len(), 1);
            assert_eq!(events[0].event_type(), "profile.activated_by_payment");
            assert_eq!(profile.status, ProfileStatus::Active);
        }
    }

    #[test]
    fn payment_on_active_profile_is_a_no_op() {
        let profile = registered(ProfileStatus::Active);
        assert!(profile.handle(&paid(&profile)).unwrap().is_empty());
    }

    #[test]
    fn failed_payment_suspends_pending_and_active_profiles() {
        for start in [ProfileStatus::Pending, ProfileStatus::Active] {
            let mut profile = registered(start);
            profile.execute(&failed(&profile)).unwrap();
            assert_eq!(profile.status, ProfileStatus::Suspended);
        }

        let suspended = registered(ProfileStatus::Suspended);
        assert!(suspended.handle(&failed(&suspended)).unwrap().is_empty());
    }

    #[test]
    fn admin_change_requires_reason() {
        let profile = registered(ProfileStatus::Pending);
        let err = profile
            .handle(&ProfileCommand::ChangeStatus(ChangeStatus {
                user_id: profile.id,
                status: ProfileStatus::Active,
                reason: "   ".to_string(),
                actor_id: UserId::new(),
                occurred_at: now(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::validation("reason is required"));
    }

    #[test]
    fn admin_change_records_cause_and_previous_status() {
        let mut profile = registered(ProfileStatus::Active);
        let actor = UserId::new();
        let events = profile
            .execute(&ProfileCommand::ChangeStatus(ChangeStatus {
                user_id: profile.id,
                status: ProfileStatus::Suspended,
                reason: "chargeback".to_string(),
                actor_id: actor,
                occurred_at: now(),
            }))
            .unwrap();

        let ProfileEvent::StatusChanged(e) = &events[0] else {
            panic!("expected StatusChanged event");
        };
        assert_eq!(e.from, ProfileStatus::Active);
        assert_eq!(e.to, ProfileStatus::Suspended);
        assert_eq!(
            e.cause,
            StatusChangeCause::AdminOverride {
                actor_id: actor,
                reason: "chargeback".to_string()
            }
        );
        assert_eq!(profile.status, ProfileStatus::Suspended);
    }

    #[test]
    fn admin_change_to_same_status_is_refused() {
        let profile = registered(ProfileStatus::Active);
        let err = profile
            .handle(&ProfileCommand::ChangeStatus(ChangeStatus {
                user_id: profile.id,
                status: ProfileStatus::Active,
                reason: "noop".to_string(),
                actor_id: UserId::new(),
                occurred_at: now(),
            }))
            .unwrap_err();
        assert!(err.to_string().contains("already ACTIVE"));
    }

    #[test]
    fn commands_on_unregistered_profile_are_not_found() {
        let profile = Profile::empty(UserId::new());
        assert_eq!(profile.handle(&paid(&profile)).unwrap_err(), DomainError::NotFound);
    }

    proptest! {
        /// Only the three known statuses parse; everything else is refused.
        #[test]
        fn unknown_status_strings_are_rejected(raw in "[A-Za-z_]{0,12}") {
            let known = ["PENDING", "ACTIVE", "SUSPENDED"]
                .iter()
                .any(|s| s.eq_ignore_ascii_case(raw.trim()));
            prop_assert_eq!(raw.parse::<ProfileStatus>().is_ok(), known);
        }
    }
}
