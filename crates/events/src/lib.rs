//! Workflow events and the append-only audit record built from them.

pub mod audit;
pub mod event;

pub use audit::{AuditEvent, AuditKey, EntityType};
pub use event::Event;
