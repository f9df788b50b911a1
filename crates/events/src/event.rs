use chrono::{DateTime, Utc};
use serde::Serialize;

/// A workflow fact emitted by an aggregate.
///
/// Events are:
/// - **immutable** (treat them as facts)
/// - **serializable** (their JSON form is the audit `details`)
/// - designed to be **append-only**
pub trait Event: Clone + core::fmt::Debug + Serialize + Send + Sync + 'static {
    /// Stable action name (e.g. "document.rejected").
    fn event_type(&self) -> &'static str;

    /// When the transition happened (business time).
    fn occurred_at(&self) -> DateTime<Utc>;
}
