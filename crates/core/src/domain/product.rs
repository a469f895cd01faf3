use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProductId(pub i64);

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unit prices keyed by the 50/100/200 unit order thresholds.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierPrices {
    pub per_unit_50: Option<Decimal>,
    pub per_unit_100: Option<Decimal>,
    pub per_unit_200: Option<Decimal>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub garment_type: String,
    pub size: String,
    pub color: String,
    pub available_quantity: u32,
    pub available: bool,
    pub tier_prices: TierPrices,
}

/// Optional criteria for an inventory lookup. Type and color match partially
/// and case-insensitively; size must match exactly.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InventoryFilter {
    pub garment_type: Option<String>,
    pub size: Option<String>,
    pub color: Option<String>,
}

impl InventoryFilter {
    pub fn new(
        garment_type: Option<String>,
        size: Option<String>,
        color: Option<String>,
    ) -> Self {
        Self {
            garment_type: non_blank(garment_type),
            size: non_blank(size),
            color: non_blank(color),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.garment_type.is_none() && self.size.is_none() && self.color.is_none()
    }

    pub fn matches(&self, product: &Product) -> bool {
        if !product.available {
            return false;
        }
        if let Some(garment_type) = &self.garment_type {
            if !contains_ignore_case(&product.garment_type, garment_type) {
                return false;
            }
        }
        if let Some(size) = &self.size {
            if &product.size != size {
                return false;
            }
        }
        if let Some(color) = &self.color {
            if !contains_ignore_case(&product.color, color) {
                return false;
            }
        }
        true
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
