//! `formadesk-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the domain error model, the aggregate contract and the
//! closed-status helper shared by every workflow entity.

pub mod aggregate;
pub mod error;
pub mod id;
pub mod status;

pub use aggregate::{Aggregate, AggregateRoot};
pub use error::{DomainError, DomainResult};
pub use id::{DocumentId, DossierId, OrderId, PaymentLinkId, ProductId, UserId};
pub use status::UnknownStatus;
