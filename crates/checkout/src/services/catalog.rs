//! Catalog service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{Money, ProductId, StoreId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::CheckoutError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductStatus {
    Active,
    Draft,
    Archived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StoreStatus {
    Active,
    Suspended,
}

/// What checkout needs to know about a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub product_id: ProductId,
    pub store_id: StoreId,
    pub title: String,
    pub sku: String,
    pub price: Money,
    pub status: ProductStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub store_id: StoreId,
    pub name: String,
    pub status: StoreStatus,
}

/// Read access to products and stores.
#[async_trait]
pub trait CatalogService: Send + Sync {
    async fn product(&self, product_id: &ProductId)
    -> Result<Option<ProductSnapshot>, CheckoutError>;

    async fn store(&self, store_id: &StoreId) -> Result<Option<StoreSnapshot>, CheckoutError>;
}

#[derive(Debug, Default)]
struct InMemoryCatalogState {
    products: HashMap<ProductId, ProductSnapshot>,
    stores: HashMap<StoreId, StoreSnapshot>,
}

/// In-memory catalog for testing and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    state: Arc<RwLock<InMemoryCatalogState>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert_store(&self, store: StoreSnapshot) {
        self.state
            .write()
            .await
            .stores
            .insert(store.store_id.clone(), store);
    }

    pub async fn upsert_product(&self, product: ProductSnapshot) {
        self.state
            .write()
            .await
            .products
            .insert(product.product_id.clone(), product);
    }

    /// Returns false if the product is unknown.
    pub async fn set_product_status(&self, product_id: &ProductId, status: ProductStatus) -> bool {
        match self.state.write().await.products.get_mut(product_id) {
            Some(product) => {
                product.status = status;
                true
            }
            None => false,
        }
    }

    pub async fn set_store_status(&self, store_id: &StoreId, status: StoreStatus) -> bool {
        match self.state.write().await.stores.get_mut(store_id) {
            Some(store) => {
                store.status = status;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl CatalogService for InMemoryCatalog {
    async fn product(
        &self,
        product_id: &ProductId,
    ) -> Result<Option<ProductSnapshot>, CheckoutError> {
        Ok(self.state.read().await.products.get(product_id).cloned())
    }

    async fn store(&self, store_id: &StoreId) -> Result<Option<StoreSnapshot>, CheckoutError> {
        Ok(self.state.read().await.stores.get(store_id).cloned())
    }
}
