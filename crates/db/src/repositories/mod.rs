use async_trait::async_trait;
use thiserror::Error;

use threadline_core::domain::document::{CatalogDocument, DocumentMatch};
use threadline_core::domain::order::{NewOrder, Order, OrderId};
use threadline_core::domain::product::{InventoryFilter, Product, ProductId};
use threadline_core::errors::DomainError;

pub mod catalog;
pub mod memory;

pub use catalog::SqlCatalogRepository;
pub use memory::InMemoryCatalogRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Why an order was not written. Business rejections are kept apart from
/// storage failures so callers can phrase them for the customer.
#[derive(Debug, Error)]
pub enum PlaceOrderError {
    #[error(transparent)]
    Rejected(#[from] DomainError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<sqlx::Error> for PlaceOrderError {
    fn from(error: sqlx::Error) -> Self {
        Self::Repository(RepositoryError::Database(error))
    }
}

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn find_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError>;

    /// Available products matching `filter`, lowest id first, at most `limit`.
    async fn list_inventory(
        &self,
        filter: &InventoryFilter,
        limit: u32,
    ) -> Result<Vec<Product>, RepositoryError>;

    /// Documents whose cosine similarity to `query` exceeds `threshold`, best first.
    async fn match_documents(
        &self,
        query: &[f32],
        threshold: f32,
        count: u32,
    ) -> Result<Vec<DocumentMatch>, RepositoryError>;

    async fn save_product(&self, product: Product) -> Result<(), RepositoryError>;

    async fn list_products(&self) -> Result<Vec<Product>, RepositoryError>;

    async fn save_document(&self, document: CatalogDocument) -> Result<(), RepositoryError>;

    async fn clear_documents(&self) -> Result<u64, RepositoryError>;

    async fn count_documents(&self) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Records the order and takes its quantity out of stock as one unit of
    /// work. Fails with `InsufficientStock` when the stock is no longer there.
    async fn place_order(&self, order: NewOrder) -> Result<Order, PlaceOrderError>;

    async fn find_order(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError>;
}
