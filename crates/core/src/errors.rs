use thiserror::Error;

use crate::domain::product::ProductId;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("the minimum order is {minimum} units (requested {requested})")]
    BelowMinimumQuantity { requested: i64, minimum: u32 },
    #[error("product {0} was not found")]
    ProductNotFound(ProductId),
    #[error("insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock { product_id: ProductId, requested: u32, available: u32 },
    #[error("product {product_id} has no unit price configured for {quantity} units")]
    NoTierPrice { product_id: ProductId, quantity: u32 },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    /// Stable machine-readable code for logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Domain(DomainError::BelowMinimumQuantity { .. }) => "below_minimum_quantity",
            Self::Domain(DomainError::ProductNotFound(_)) => "product_not_found",
            Self::Domain(DomainError::InsufficientStock { .. }) => "insufficient_stock",
            Self::Domain(DomainError::NoTierPrice { .. }) => "no_tier_price",
            Self::Persistence(_) => "persistence",
            Self::Integration(_) => "integration",
            Self::Configuration(_) => "configuration",
        }
    }

    pub fn is_domain(&self) -> bool {
        matches!(self, Self::Domain(_))
    }
}
