use serde::{Deserialize, Serialize};

use formadesk_core::closed_status;

/// Role of a profile.
///
/// Closed set: the portal knows exactly three audiences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// A customer; may only see resources they own.
    Client,
    /// Back-office staff reviewing dossiers and documents.
    Agent,
    /// Full administrator.
    Admin,
}

closed_status!(Role, "role" {
    Client => "CLIENT",
    Agent => "AGENT",
    Admin => "ADMIN",
});

impl Role {
    /// AGENT or ADMIN.
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Agent | Role::Admin)
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}
