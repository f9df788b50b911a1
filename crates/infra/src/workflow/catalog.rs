use tracing::info;
use uuid::Uuid;

use formadesk_auth::Caller;
use formadesk_core::{DomainError, DomainResult, ProductId};
use formadesk_dossiers::Product;

use super::{Workflow, WorkflowError};

/// Built-in catalog used when no catalog file is configured.
///
/// Ids are fixed so restarts against a persistent store upsert the same rows.
pub fn default_catalog() -> DomainResult<Vec<Product>> {
    Ok(vec![
        Product::new(
            ProductId::from_uuid(Uuid::from_u128(0x0190_0000_0000_7000_8000_0000_0000_0001)),
            "LLC Formation",
            "llc_formation",
            49_900,
            "USD",
            vec![
                "passport".to_string(),
                "proof_of_address".to_string(),
                "operating_agreement".to_string(),
            ],
        )?,
        Product::new(
            ProductId::from_uuid(Uuid::from_u128(0x0190_0000_0000_7000_8000_0000_0000_0002)),
            "EIN Application",
            "ein_application",
            14_900,
            "USD",
            vec!["passport".to_string(), "articles_of_organization".to_string()],
        )?,
        Product::new(
            ProductId::from_uuid(Uuid::from_u128(0x0190_0000_0000_7000_8000_0000_0000_0003)),
            "Registered Agent (1 year)",
            "registered_agent",
            9_900,
            "USD",
            vec![],
        )?,
    ])
}

impl Workflow {
    /// Upsert catalog entries (startup).
    pub async fn seed_catalog(&self, products: DomainResult<Vec<Product>>) -> Result<usize, WorkflowError> {
        let products = products?;
        let count = products.len();
        for product in products {
            self.stores.products.upsert(product.id, product).await?;
        }
        info!(count, "product catalog seeded");
        Ok(count)
    }

    pub async fn list_products(&self, _caller: &Caller) -> Result<Vec<Product>, WorkflowError> {
        Ok(self.stores.products.list().await?)
    }

    pub(super) async fn load_product(&self, product_id: ProductId) -> Result<Product, WorkflowError> {
        self.stores
            .products
            .get(&product_id)
            .await?
            .ok_or_else(|| DomainError::not_found().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_has_stable_ids() {
        let first = default_catalog().unwrap();
        let second = default_catalog().unwrap();
        assert_eq!(first, second);
        assert!(first.iter().any(|p| p.requires("passport")));
    }
}
