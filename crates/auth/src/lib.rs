//! `formadesk-auth` — authorization gate, session tokens and client profiles.
//!
//! This crate is intentionally decoupled from HTTP and storage: callers are
//! resolved by the API layer and passed explicitly into every check.

pub mod caller;
pub mod claims;
pub mod gate;
pub mod profile;
pub mod roles;
pub mod token;

pub use caller::{Caller, RoleFallback, RoleResolution};
pub use claims::{SessionClaims, TokenValidationError, validate_claims};
pub use gate::{
    AuthzError, Owned, RoleRequirement, require_active, require_authenticated, require_ownership,
    require_role,
};
pub use profile::{
    ChangeStatus, Profile, ProfileCommand, ProfileEvent, ProfileRegistered, ProfileStatus,
    ProfileStatusChanged, RecordPaymentFailed, RecordPaymentSucceeded, RegisterProfile,
    StatusChangeCause,
};
pub use roles::Role;
pub use token::{Hs256TokenValidator, TokenValidator};
