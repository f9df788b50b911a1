//! Infrastructure layer: stores, command dispatch, mail, and the workflow
//! services the HTTP surface calls into.

pub mod command_dispatcher;
pub mod mail;
pub mod notifications;
pub mod store;
pub mod workflow;


pub use workflow::{Stores, Workflow, WorkflowError};
