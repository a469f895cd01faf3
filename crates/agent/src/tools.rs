use std::fmt::Write as _;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

use threadline_core::config::AgentConfig;
use threadline_core::domain::order::NewOrder;
use threadline_core::domain::product::{InventoryFilter, ProductId};
use threadline_core::errors::DomainError;
use threadline_core::pricing::{order_total, unit_price_for_quantity, MINIMUM_ORDER_QUANTITY};
use threadline_db::repositories::{CatalogRepository, OrderRepository, PlaceOrderError};

use crate::embedding::{Embedder, EmbeddingTask};
use crate::llm::FunctionDeclaration;

pub const NO_INFORMATION_FOUND: &str = "No relevant information was found for that query.";
pub const NO_PRODUCTS_MATCHED: &str = "No products matched those criteria.";

/// The closed set of tools the model may call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ToolKind {
    SearchProductInformation,
    GetProductInventory,
    PlaceB2bOrder,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unknown tool `{0}`")]
pub struct UnknownToolError(pub String);

impl ToolKind {
    pub const ALL: [ToolKind; 3] =
        [Self::GetProductInventory, Self::PlaceB2bOrder, Self::SearchProductInformation];

    pub fn name(self) -> &'static str {
        match self {
            Self::SearchProductInformation => "search_product_information",
            Self::GetProductInventory => "get_product_inventory",
            Self::PlaceB2bOrder => "place_b2b_order",
        }
    }

    pub fn declaration(self) -> FunctionDeclaration {
        let (description, parameters) = match self {
            Self::SearchProductInformation => (
                "Searches the product knowledge base for general or contextual questions about \
                 the garments: materials, care, shipping, wholesale terms.",
                json!({
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "What the customer wants to know."
                        }
                    },
                    "required": ["query"]
                }),
            ),
            Self::GetProductInventory => (
                "Looks up available stock for specific garments, e.g. 'do you have size L pants?'. \
                 Every filter is optional.",
                json!({
                    "type": "object",
                    "properties": {
                        "garment_type": {
                            "type": "string",
                            "description": "Garment type, partial match (e.g. shirt)."
                        },
                        "size": {
                            "type": "string",
                            "description": "Exact size label (e.g. L, M, 32)."
                        },
                        "color": { "type": "string", "description": "Color, partial match." }
                    }
                }),
            ),
            Self::PlaceB2bOrder => (
                "Places a wholesale order for a product id and quantity. The minimum order is 50 \
                 units; unit price depends on the quantity tier (50, 100, 200 units).",
                json!({
                    "type": "object",
                    "properties": {
                        "product_id": {
                            "type": "integer",
                            "description": "Product ID from the inventory results."
                        },
                        "quantity": {
                            "type": "integer",
                            "description": "Number of units to order."
                        }
                    },
                    "required": ["product_id", "quantity"]
                }),
            ),
        };

        FunctionDeclaration {
            name: self.name().to_string(),
            description: description.to_string(),
            parameters,
        }
    }

    pub fn declarations() -> Vec<FunctionDeclaration> {
        Self::ALL.iter().map(|kind| kind.declaration()).collect()
    }
}

impl FromStr for ToolKind {
    type Err = UnknownToolError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == name)
            .ok_or_else(|| UnknownToolError(name.to_string()))
    }
}

/// Per-turn facts a tool may need beyond its arguments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolContext {
    pub customer_id: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ToolSettings {
    pub match_threshold: f32,
    pub match_count: u32,
    pub inventory_limit: u32,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self { match_threshold: 0.3, match_count: 5, inventory_limit: 10 }
    }
}

impl From<&AgentConfig> for ToolSettings {
    fn from(config: &AgentConfig) -> Self {
        Self {
            match_threshold: config.search_match_threshold,
            match_count: config.search_match_count,
            inventory_limit: config.inventory_limit,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderStatus {
    Success,
    Error,
}

/// Result of `place_b2b_order`, handed to the model as
/// `{"status": "success"|"error", "message": ...}`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderOutcome {
    pub status: OrderStatus,
    pub message: String,
}

impl OrderOutcome {
    fn success(message: String) -> Self {
        Self { status: OrderStatus::Success, message }
    }

    fn error(message: impl Into<String>) -> Self {
        Self { status: OrderStatus::Error, message: message.into() }
    }

    pub fn to_json(&self) -> String {
        let status = match self.status {
            OrderStatus::Success => "success",
            OrderStatus::Error => "error",
        };
        json!({ "status": status, "message": self.message }).to_string()
    }
}

/// Executes tool calls against the catalog. Every failure is turned into text
/// for the model; nothing here returns an error.
pub struct Toolbox {
    catalog: Arc<dyn CatalogRepository>,
    orders: Arc<dyn OrderRepository>,
    embedder: Arc<dyn Embedder>,
    settings: ToolSettings,
}

impl Toolbox {
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        orders: Arc<dyn OrderRepository>,
        embedder: Arc<dyn Embedder>,
        settings: ToolSettings,
    ) -> Self {
        Self { catalog, orders, embedder, settings }
    }

    pub async fn execute(&self, kind: ToolKind, args: &Value, context: &ToolContext) -> String {
        match kind {
            ToolKind::SearchProductInformation => match required_string(args, "query") {
                Ok(query) => self.search_product_information(&query).await,
                Err(reason) => format!("Error searching product information: {reason}"),
            },
            ToolKind::GetProductInventory => {
                let filter = InventoryFilter::new(
                    optional_string(args, "garment_type"),
                    optional_string(args, "size"),
                    optional_string(args, "color"),
                );
                self.get_product_inventory(&filter).await
            }
            ToolKind::PlaceB2bOrder => {
                let parsed = integer_arg(args, "product_id")
                    .and_then(|product_id| Ok((product_id, integer_arg(args, "quantity")?)));
                let outcome = match parsed {
                    Ok((product_id, quantity)) => {
                        self.place_b2b_order(&context.customer_id, product_id, quantity).await
                    }
                    Err(reason) => OrderOutcome::error(format!("Invalid order request: {reason}.")),
                };
                outcome.to_json()
            }
        }
    }

    pub async fn search_product_information(&self, query: &str) -> String {
        let embedding = match self.embedder.embed(query, EmbeddingTask::Query).await {
            Ok(embedding) => embedding,
            Err(error) => {
                warn!(
                    event_name = "agent.tool.search_failed",
                    error = %error,
                    "query embedding failed"
                );
                return format!("Error searching product information: {error}");
            }
        };

        let matches = match self
            .catalog
            .match_documents(&embedding, self.settings.match_threshold, self.settings.match_count)
            .await
        {
            Ok(matches) => matches,
            Err(error) => {
                warn!(
                    event_name = "agent.tool.search_failed",
                    error = %error,
                    "document match failed"
                );
                return format!("Error searching product information: {error}");
            }
        };

        if matches.is_empty() {
            return NO_INFORMATION_FOUND.to_string();
        }

        let mut output = String::from("Found the following relevant information:\n");
        for document in &matches {
            let _ = writeln!(output, "- {}", document.content);
        }
        output
    }

    pub async fn get_product_inventory(&self, filter: &InventoryFilter) -> String {
        let products = match self
            .catalog
            .list_inventory(filter, self.settings.inventory_limit)
            .await
        {
            Ok(products) => products,
            Err(error) => {
                warn!(
                    event_name = "agent.tool.inventory_failed",
                    error = %error,
                    "inventory lookup failed"
                );
                return format!("Error fetching inventory: {error}");
            }
        };

        if products.is_empty() {
            return NO_PRODUCTS_MATCHED.to_string();
        }

        let mut output = String::from("Inventory results:\n");
        for product in &products {
            let _ = writeln!(
                output,
                "- ID: {}, Garment: {}, Size: {}, Color: {}, Stock: {}",
                product.id,
                product.garment_type,
                product.size,
                product.color,
                product.available_quantity
            );
        }
        output
    }

    /// Checks run in order: minimum quantity, product existence, stock, tier
    /// price. Any rejection leaves stock and orders untouched.
    pub async fn place_b2b_order(
        &self,
        customer_id: &str,
        product_id: i64,
        quantity: i64,
    ) -> OrderOutcome {
        let product_id = ProductId(product_id);
        if quantity < i64::from(MINIMUM_ORDER_QUANTITY) {
            return OrderOutcome::error(rejection_message(&DomainError::BelowMinimumQuantity {
                requested: quantity,
                minimum: MINIMUM_ORDER_QUANTITY,
            }));
        }

        let product = match self.catalog.find_product(product_id).await {
            Ok(Some(product)) => product,
            Ok(None) => {
                return OrderOutcome::error(rejection_message(&DomainError::ProductNotFound(
                    product_id,
                )))
            }
            Err(error) => return storage_failure(product_id, &error),
        };

        let requested = match u32::try_from(quantity) {
            Ok(requested) if requested <= product.available_quantity => requested,
            _ => {
                return OrderOutcome::error(rejection_message(&DomainError::InsufficientStock {
                    product_id,
                    requested: u32::try_from(quantity).unwrap_or(u32::MAX),
                    available: product.available_quantity,
                }))
            }
        };

        let unit_price = match unit_price_for_quantity(&product, quantity) {
            Ok(price) => price,
            Err(rejection) => return OrderOutcome::error(rejection_message(&rejection)),
        };
        let total_price = order_total(unit_price, requested);

        let new_order = NewOrder {
            customer_id: customer_id.to_string(),
            product_id,
            quantity: requested,
            unit_price,
            total_price,
        };

        match self.orders.place_order(new_order).await {
            Ok(order) => {
                info!(
                    event_name = "agent.tool.order_placed",
                    order_id = %order.id.0,
                    product_id = product_id.0,
                    quantity = requested,
                    total_price = %total_price,
                    "b2b order placed"
                );
                OrderOutcome::success(format!(
                    "Order confirmed! Order {} was recorded for {} units of product ID {} \
                     at {} per unit, total {}.",
                    order.id.0, requested, product_id, unit_price, total_price
                ))
            }
            Err(PlaceOrderError::Rejected(rejection)) => {
                OrderOutcome::error(rejection_message(&rejection))
            }
            Err(PlaceOrderError::Repository(error)) => storage_failure(product_id, &error),
        }
    }
}

fn storage_failure(product_id: ProductId, error: &dyn std::fmt::Display) -> OrderOutcome {
    warn!(
        event_name = "agent.tool.order_failed",
        product_id = product_id.0,
        error = %error,
        "order placement hit a storage failure"
    );
    OrderOutcome::error(format!("The order could not be recorded: {error}"))
}

fn rejection_message(rejection: &DomainError) -> String {
    match rejection {
        DomainError::BelowMinimumQuantity { requested, minimum } => {
            format!("The minimum order is {minimum} units (requested {requested}).")
        }
        DomainError::ProductNotFound(product_id) => format!("Product {product_id} was not found."),
        DomainError::InsufficientStock { available, .. } => {
            format!("Insufficient stock. Available: {available}.")
        }
        DomainError::NoTierPrice { product_id, quantity } => {
            format!("Product {product_id} has no unit price configured for {quantity} units.")
        }
    }
}

fn required_string(args: &Value, key: &str) -> Result<String, String> {
    optional_string(args, key).ok_or_else(|| format!("missing required argument `{key}`"))
}

/// Strings are trimmed; numbers are accepted as text so a size of `32` works.
fn optional_string(args: &Value, key: &str) -> Option<String> {
    match args.get(key)? {
        Value::String(value) => Some(value.trim().to_string()).filter(|value| !value.is_empty()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Accepts `50`, `50.0` and `"50"`.
fn integer_arg(args: &Value, key: &str) -> Result<i64, String> {
    let value = args.get(key).ok_or_else(|| format!("missing required argument `{key}`"))?;
    let parsed = match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|float| float.fract() == 0.0 && float.abs() < 9.0e15)
                .map(|float| float as i64)
        }),
        Value::String(text) => {
            let text = text.trim();
            text.parse::<i64>().ok().or_else(|| {
                text.parse::<f64>()
                    .ok()
                    .filter(|float| float.fract() == 0.0 && float.abs() < 9.0e15)
                    .map(|float| float as i64)
            })
        }
        _ => None,
    };
    parsed.ok_or_else(|| format!("argument `{key}` must be a whole number, got {value}"))
}
