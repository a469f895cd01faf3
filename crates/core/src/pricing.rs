use rust_decimal::Decimal;

use crate::domain::product::Product;
use crate::errors::DomainError;

pub const MINIMUM_ORDER_QUANTITY: u32 = 50;
pub const TIER_100_THRESHOLD: u32 = 100;
pub const TIER_200_THRESHOLD: u32 = 200;

/// Resolves the unit price for an order of `quantity` units.
///
/// The highest tier whose threshold is reached and whose price is set wins.
/// A missing (or zero) price falls through to the next lower tier.
pub fn unit_price_for_quantity(product: &Product, quantity: i64) -> Result<Decimal, DomainError> {
    if quantity < i64::from(MINIMUM_ORDER_QUANTITY) {
        return Err(DomainError::BelowMinimumQuantity {
            requested: quantity,
            minimum: MINIMUM_ORDER_QUANTITY,
        });
    }
    let quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
    let tiers = &product.tier_prices;

    let candidates = [
        (TIER_200_THRESHOLD, tiers.per_unit_200),
        (TIER_100_THRESHOLD, tiers.per_unit_100),
        (MINIMUM_ORDER_QUANTITY, tiers.per_unit_50),
    ];

    candidates
        .into_iter()
        .filter(|(threshold, _)| quantity >= *threshold)
        .find_map(|(_, price)| price.filter(|price| !price.is_zero()))
        .ok_or(DomainError::NoTierPrice { product_id: product.id, quantity })
}

pub fn order_total(unit_price: Decimal, quantity: u32) -> Decimal {
    unit_price * Decimal::from(quantity)
}
