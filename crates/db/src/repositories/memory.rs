use std::collections::BTreeMap;

use chrono::Utc;
use tokio::sync::RwLock;

use threadline_core::domain::document::{rank_documents, CatalogDocument, DocumentMatch};
use threadline_core::domain::order::{NewOrder, Order, OrderId};
use threadline_core::domain::product::{InventoryFilter, Product, ProductId};
use threadline_core::errors::DomainError;

use super::{CatalogRepository, OrderRepository, PlaceOrderError, RepositoryError};

#[derive(Default)]
struct CatalogState {
    products: BTreeMap<i64, Product>,
    documents: BTreeMap<i64, CatalogDocument>,
    orders: Vec<Order>,
}

/// Catalog, documents and orders held in one lock so order placement is
/// atomic just like the SQL transaction.
#[derive(Default)]
pub struct InMemoryCatalogRepository {
    state: RwLock<CatalogState>,
}

impl InMemoryCatalogRepository {
    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let products = products.into_iter().map(|product| (product.id.0, product)).collect();
        Self { state: RwLock::new(CatalogState { products, ..CatalogState::default() }) }
    }

    pub async fn orders(&self) -> Vec<Order> {
        self.state.read().await.orders.clone()
    }
}

#[async_trait::async_trait]
impl CatalogRepository for InMemoryCatalogRepository {
    async fn find_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.products.get(&id.0).cloned())
    }

    async fn list_inventory(
        &self,
        filter: &InventoryFilter,
        limit: u32,
    ) -> Result<Vec<Product>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .products
            .values()
            .filter(|product| filter.matches(product))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn match_documents(
        &self,
        query: &[f32],
        threshold: f32,
        count: u32,
    ) -> Result<Vec<DocumentMatch>, RepositoryError> {
        let state = self.state.read().await;
        Ok(rank_documents(state.documents.values(), query, threshold, count as usize))
    }

    async fn save_product(&self, product: Product) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        state.products.insert(product.id.0, product);
        Ok(())
    }

    async fn list_products(&self) -> Result<Vec<Product>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.products.values().cloned().collect())
    }

    async fn save_document(&self, document: CatalogDocument) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        state.documents.insert(document.id, document);
        Ok(())
    }

    async fn clear_documents(&self) -> Result<u64, RepositoryError> {
        let mut state = self.state.write().await;
        let removed = state.documents.len() as u64;
        state.documents.clear();
        Ok(removed)
    }

    async fn count_documents(&self) -> Result<u64, RepositoryError> {
        Ok(self.state.read().await.documents.len() as u64)
    }
}

#[async_trait::async_trait]
impl OrderRepository for InMemoryCatalogRepository {
    async fn place_order(&self, order: NewOrder) -> Result<Order, PlaceOrderError> {
        let mut state = self.state.write().await;
        let product = state
            .products
            .get_mut(&order.product_id.0)
            .ok_or(DomainError::ProductNotFound(order.product_id))?;

        if product.available_quantity < order.quantity {
            return Err(DomainError::InsufficientStock {
                product_id: order.product_id,
                requested: order.quantity,
                available: product.available_quantity,
            }
            .into());
        }
        product.available_quantity -= order.quantity;

        let placed = Order::from_new(OrderId::generate(), order, Utc::now());
        state.orders.push(placed.clone());
        Ok(placed)
    }

    async fn find_order(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.orders.iter().find(|order| &order.id == id).cloned())
    }
}
