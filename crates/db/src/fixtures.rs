use rust_decimal::Decimal;

use threadline_core::domain::product::{Product, ProductId, TierPrices};

use crate::repositories::{CatalogRepository, RepositoryError};

struct DemoProduct {
    id: i64,
    garment_type: &'static str,
    size: &'static str,
    color: &'static str,
    stock: u32,
    available: bool,
    prices_cents: [Option<i64>; 3],
}

const DEMO_PRODUCTS: &[DemoProduct] = &[
    DemoProduct {
        id: 1,
        garment_type: "Oxford Shirt",
        size: "L",
        color: "White",
        stock: 420,
        available: true,
        prices_cents: [Some(1450), Some(1320), Some(1180)],
    },
    DemoProduct {
        id: 2,
        garment_type: "Oxford Shirt",
        size: "M",
        color: "Light Blue",
        stock: 310,
        available: true,
        prices_cents: [Some(1450), Some(1320), Some(1180)],
    },
    DemoProduct {
        id: 3,
        garment_type: "Polo Shirt",
        size: "L",
        color: "Navy",
        stock: 180,
        available: true,
        prices_cents: [Some(1100), Some(990), None],
    },
    DemoProduct {
        id: 4,
        garment_type: "T-Shirt",
        size: "S",
        color: "Black",
        stock: 900,
        available: true,
        prices_cents: [Some(520), Some(470), Some(410)],
    },
    DemoProduct {
        id: 5,
        garment_type: "Chino Pants",
        size: "32",
        color: "Khaki",
        stock: 140,
        available: true,
        prices_cents: [Some(2150), None, None],
    },
    DemoProduct {
        id: 6,
        garment_type: "Hoodie",
        size: "XL",
        color: "Heather Grey",
        stock: 75,
        available: true,
        prices_cents: [Some(2480), Some(2290), Some(2050)],
    },
    DemoProduct {
        id: 7,
        garment_type: "Denim Jacket",
        size: "M",
        color: "Indigo",
        stock: 0,
        available: false,
        prices_cents: [Some(3900), Some(3650), Some(3400)],
    },
];

/// Demo garment catalog used by `seed` and by tests that need realistic data.
pub struct DemoCatalog;

impl DemoCatalog {
    pub fn products() -> Vec<Product> {
        DEMO_PRODUCTS
            .iter()
            .map(|demo| {
                let [tier_50, tier_100, tier_200] =
                    demo.prices_cents.map(|cents| cents.map(|cents| Decimal::new(cents, 2)));
                Product {
                    id: ProductId(demo.id),
                    garment_type: demo.garment_type.to_string(),
                    size: demo.size.to_string(),
                    color: demo.color.to_string(),
                    available_quantity: demo.stock,
                    available: demo.available,
                    tier_prices: TierPrices {
                        per_unit_50: tier_50,
                        per_unit_100: tier_100,
                        per_unit_200: tier_200,
                    },
                }
            })
            .collect()
    }

    /// Upserts every demo product; existing rows with the same id are reset.
    pub async fn load(repo: &dyn CatalogRepository) -> Result<SeedResult, RepositoryError> {
        let products = Self::products();
        let products_seeded = products.len();
        for product in products {
            repo.save_product(product).await?;
        }
        Ok(SeedResult { products_seeded })
    }

    pub async fn verify(
        repo: &dyn CatalogRepository,
    ) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();
        for demo in DEMO_PRODUCTS {
            let present = repo.find_product(ProductId(demo.id)).await?.is_some();
            checks.push((demo.id, present));
        }
        let all_present = checks.iter().all(|(_, present)| *present);
        Ok(VerificationResult { all_present, checks })
    }
}

#[derive(Debug)]
pub struct SeedResult {
    pub products_seeded: usize,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(i64, bool)>,
}
