use log::*;

use crate::{
    api::errors::OrderFlowError,
    db_types::{NewProduct, Product, ProductId},
    traits::StorefrontDatabase,
};

/// The minimal seller catalog surface: enough to list products with real prices and stock for checkout to price
/// against. Search and filtering live elsewhere.
pub struct CatalogApi<B> {
    db: B,
}

impl<B> CatalogApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> CatalogApi<B>
where B: StorefrontDatabase
{
    pub async fn add_product(&self, product: NewProduct) -> Result<Product, OrderFlowError> {
        if product.name.trim().is_empty() {
            return Err(OrderFlowError::Validation("product needs a name".to_string()));
        }
        if product.offer_price.value() <= 0 || product.list_price.value() <= 0 {
            return Err(OrderFlowError::Validation("product prices must be positive".to_string()));
        }
        if product.stock < 0 {
            return Err(OrderFlowError::Validation("product stock cannot be negative".to_string()));
        }
        let product = self.db.insert_product(product).await?;
        info!("🏷️️ Product {} listed by {} at {}", product.id, product.seller_id, product.offer_price);
        Ok(product)
    }

    pub async fn product(&self, id: &ProductId) -> Result<Option<Product>, OrderFlowError> {
        Ok(self.db.fetch_product(id).await?)
    }

    pub async fn catalog(&self) -> Result<Vec<Product>, OrderFlowError> {
        Ok(self.db.fetch_catalog().await?)
    }
}
