//! Resolved caller identity.

use formadesk_core::UserId;

use crate::Role;

/// The authenticated caller of one request.
///
/// Built once per request by the API layer and handed to every operation as
/// an argument; nothing reads it from ambient state.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Caller {
    user_id: UserId,
    role: Role,
}

impl Caller {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }
}

/// What to do when a caller's role cannot be looked up.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum RoleFallback {
    /// Treat the caller as a CLIENT: the gate then only lets them reach
    /// resources they own.
    #[default]
    LeastPrivileged,
}

impl RoleFallback {
    pub fn role(self) -> Role {
        match self {
            RoleFallback::LeastPrivileged => Role::Client,
        }
    }
}

/// Outcome of resolving a caller's role from their profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleResolution {
    Resolved(Role),
    FellBack { role: Role, reason: String },
}

impl RoleResolution {
    /// Resolve a role from a profile lookup, applying `fallback` when the
    /// profile is missing or the lookup failed.
    pub fn from_lookup<E: core::fmt::Display>(
        lookup: Result<Option<Role>, E>,
        fallback: RoleFallback,
    ) -> Self {
        match lookup {
            Ok(Some(role)) => RoleResolution::Resolved(role),
            Ok(None) => RoleResolution::FellBack {
                role: fallback.role(),
                reason: "profile not found".to_string(),
            },
            Err(e) => RoleResolution::FellBack {
                role: fallback.role(),
                reason: format!("profile lookup failed: {e}"),
            },
        }
    }

    pub fn role(&self) -> Role {
        match self {
            RoleResolution::Resolved(role) => *role,
            RoleResolution::FellBack { role, .. } => *role,
        }
    }

    pub fn into_caller(self, user_id: UserId) -> Caller {
        if let RoleResolution::FellBack { role, reason } = &self {
            tracing::warn!(user_id = %user_id, role = %role, reason = %reason, "role resolution fell back");
        }
        Caller::new(user_id, self.role())
    }
}
