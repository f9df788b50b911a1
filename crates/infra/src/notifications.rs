//! Email templates for workflow notifications.

use formadesk_auth::Profile;
use formadesk_dossiers::{Document, DocumentStatus};

use crate::mail::Email;

/// Message sent to a dossier owner after a reviewer decided on a document.
///
/// Returns `None` for a document that has not been reviewed.
pub fn document_reviewed(owner: &Profile, document: &Document) -> Option<Email> {
    let greeting = if owner.full_name.is_empty() {
        "Hello,".to_string()
    } else {
        format!("Hello {},", owner.full_name)
    };

    let (subject, outcome) = match document.status() {
        DocumentStatus::Approved => (
            format!("Your {} document was approved", document.kind()),
            format!(
                "We reviewed \"{}\" and approved it. No further action is needed for this document.",
                document.file_name()
            ),
        ),
        DocumentStatus::Rejected => (
            format!("Your {} document needs attention", document.kind()),
            format!(
                "We reviewed \"{}\" and could not accept it.\n\nReason: {}\n\nPlease upload a corrected {} document from your dashboard.",
                document.file_name(),
                document.rejection_reason().unwrap_or("not specified"),
                document.kind()
            ),
        ),
        DocumentStatus::Pending => return None,
    };

    Some(Email {
        to: owner.email.clone(),
        subject,
        body: format!("{greeting}\n\n{outcome}\n"),
    })
}
