//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Deterministic business failures only (validation, lifecycle rules,
/// ownership). Store and provider failures live in the infra layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A request value failed validation (e.g. empty rejection reason).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The entity's current status does not allow the requested action.
    #[error("cannot {action} {entity} in status {from}")]
    IllegalTransition {
        entity: &'static str,
        from: String,
        action: &'static str,
    },

    /// A domain invariant was violated (duplicate step, unmet completion rule, ...).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// The entity does not exist (or has not been created yet).
    #[error("not found")]
    NotFound,

    /// The entity already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The actor is not allowed to perform the action at the domain boundary.
    #[error("unauthorized")]
    Unauthorized,
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    pub fn illegal_transition(
        entity: &'static str,
        from: impl core::fmt::Display,
        action: &'static str,
    ) -> Self {
        Self::IllegalTransition {
            entity,
            from: from.to_string(),
            action,
        }
    }

    /// Whether the error was caused by the request rather than by entity state.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::InvalidId(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn illegal_transition_message_names_entity_status_and_action() {
        let err = DomainError::illegal_transition("document", "APPROVED", "reject");
        assert_eq!(err.to_string(), "cannot reject document in status APPROVED");
        assert!(!err.is_validation());
    }

    #[test]
    fn invalid_id_counts_as_validation() {
        assert!(DomainError::invalid_id("DossierId: bad").is_validation());
        assert!(DomainError::validation("reason is required").is_validation());
        assert!(!DomainError::NotFound.is_validation());
    }
}
