//! Dossier and document workflow (pure domain logic, no IO).

pub mod document;
pub mod dossier;
pub mod product;

pub use document::{
    ApproveDocument, Document, DocumentApproved, DocumentCommand, DocumentEvent, DocumentRejected,
    DocumentStatus, DocumentSubmitted, RejectDocument, SubmitDocument,
};
pub use dossier::{
    CompleteDossier, Dossier, DossierCommand, DossierCompleted, DossierEvent, DossierOpened,
    DossierStatus, OpenDossier, StepSubmitted, SubmitStep,
};
pub use product::Product;
