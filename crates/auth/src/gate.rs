//! Authorization gate.
//!
//! - No IO
//! - No panics
//! - Pure policy checks over an explicitly passed [`Caller`]

use thiserror::Error;

use formadesk_core::UserId;

use crate::{Caller, ProfileStatus, Role};

/// Role requirement of an operation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RoleRequirement {
    /// ADMIN only.
    AdminOnly,
    /// AGENT or ADMIN.
    Staff,
}

impl RoleRequirement {
    pub fn admits(self, role: Role) -> bool {
        match self {
            RoleRequirement::AdminOnly => role.is_admin(),
            RoleRequirement::Staff => role.is_staff(),
        }
    }
}

impl core::fmt::Display for RoleRequirement {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            RoleRequirement::AdminOnly => f.write_str("ADMIN"),
            RoleRequirement::Staff => f.write_str("AGENT or ADMIN"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("authentication required")]
    Unauthenticated,

    #[error("forbidden: requires {required}, caller is {actual}")]
    Forbidden { required: RoleRequirement, actual: Role },

    #[error("forbidden: resource belongs to another user")]
    NotOwner,

    #[error("forbidden: profile is {status}")]
    Inactive { status: ProfileStatus },
}

impl AuthzError {
    /// 401 vs 403 distinction for the transport layer.
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, AuthzError::Unauthenticated)
    }
}

/// A resource with exactly one owning user.
pub trait Owned {
    /// `None` only for resources that do not exist yet; such resources are
    /// never reachable by a CLIENT.
    fn owner_id(&self) -> Option<UserId>;
}

/// Any signed-in caller.
pub fn require_authenticated(caller: Option<&Caller>) -> Result<&Caller, AuthzError> {
    caller.ok_or(AuthzError::Unauthenticated)
}

pub fn require_role(caller: &Caller, requirement: RoleRequirement) -> Result<(), AuthzError> {
    if requirement.admits(caller.role()) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden {
            required: requirement,
            actual: caller.role(),
        })
    }
}

/// CLIENT callers may only reach resources they own; staff reach everything.
pub fn require_ownership<R: Owned + ?Sized>(caller: &Caller, resource: &R) -> Result<(), AuthzError> {
    if caller.is_staff() || resource.owner_id() == Some(caller.user_id()) {
        Ok(())
    } else {
        Err(AuthzError::NotOwner)
    }
}

/// CLIENT dashboard access requires an ACTIVE profile. A missing profile is
/// treated as PENDING.
pub fn require_active(caller: &Caller, status: Option<ProfileStatus>) -> Result<(), AuthzError> {
    if caller.is_staff() {
        return Ok(());
    }
    match status.unwrap_or(ProfileStatus::Pending) {
        ProfileStatus::Active => Ok(()),
        status => Err(AuthzError::Inactive { status }),
    }
}
