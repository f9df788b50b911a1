use serde::{Deserialize, Serialize};

use formadesk_core::{DomainError, DomainResult, ProductId};

/// A purchasable service offering (e.g. LLC formation).
///
/// `required_documents` lists the document kinds that must all be approved
/// before a dossier for this product can be completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub dossier_type: String,
    /// Price in minor currency units (e.g. cents).
    pub price: u64,
    pub currency: String,
    pub required_documents: Vec<String>,
}

impl Product {
    pub fn new(
        id: ProductId,
        name: impl Into<String>,
        dossier_type: impl Into<String>,
        price: u64,
        currency: impl Into<String>,
        required_documents: Vec<String>,
    ) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("product name cannot be empty"));
        }

        let currency = currency.into().trim().to_uppercase();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(DomainError::validation("currency must be a 3-letter ISO code"));
        }

        let mut kinds: Vec<String> = required_documents
            .into_iter()
            .map(|k| normalize_kind(&k))
            .filter(|k| !k.is_empty())
            .collect();
        kinds.sort();
        kinds.dedup();

        Ok(Self {
            id,
            name: name.trim().to_string(),
            dossier_type: dossier_type.into(),
            price,
            currency,
            required_documents: kinds,
        })
    }

    pub fn requires(&self, kind: &str) -> bool {
        let kind = normalize_kind(kind);
        self.required_documents.iter().any(|k| *k == kind)
    }
}

/// Document kinds are compared case-insensitively with surrounding blanks removed.
pub fn normalize_kind(kind: &str) -> String {
    kind.trim().to_lowercase()
}
