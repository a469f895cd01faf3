//! Threadline core: domain model, tier pricing, errors and configuration.
//!
//! Everything in this crate is deterministic. Prices, stock rules and order
//! totals are decided here, never by the language model.

pub mod config;
pub mod domain;
pub mod errors;
pub mod pricing;

pub use domain::chat::{ChatRole, ChatTurn, FunctionCall, TurnPart};
pub use domain::document::{CatalogDocument, DocumentMatch};
pub use domain::order::{NewOrder, Order, OrderId};
pub use domain::product::{InventoryFilter, Product, ProductId, TierPrices};
pub use errors::{ApplicationError, DomainError};
pub use pricing::{order_total, unit_price_for_quantity, MINIMUM_ORDER_QUANTITY};
