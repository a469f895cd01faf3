use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};

use threadline_core::domain::document::{rank_documents, CatalogDocument, DocumentMatch};
use threadline_core::domain::order::{NewOrder, Order, OrderId};
use threadline_core::domain::product::{InventoryFilter, Product, ProductId, TierPrices};
use threadline_core::errors::DomainError;

use super::{CatalogRepository, OrderRepository, PlaceOrderError, RepositoryError};
use crate::DbPool;

const PRODUCT_COLUMNS: &str = "id, garment_type, size, color, available_quantity, available,
     price_per_unit_50, price_per_unit_100, price_per_unit_200";

pub struct SqlCatalogRepository {
    pool: DbPool,
}

impl SqlCatalogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn decode_error(error: sqlx::Error) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}

fn parse_price(column: &str, raw: Option<String>) -> Result<Option<Decimal>, RepositoryError> {
    raw.map(|value| {
        Decimal::from_str(value.trim())
            .map_err(|e| RepositoryError::Decode(format!("{column}: {e}")))
    })
    .transpose()
}

fn row_to_product(row: &SqliteRow) -> Result<Product, RepositoryError> {
    let id: i64 = row.try_get("id").map_err(decode_error)?;
    let garment_type: String = row.try_get("garment_type").map_err(decode_error)?;
    let size: String = row.try_get("size").map_err(decode_error)?;
    let color: String = row.try_get("color").map_err(decode_error)?;
    let quantity: i64 = row.try_get("available_quantity").map_err(decode_error)?;
    let available: bool = row.try_get("available").map_err(decode_error)?;
    let price_50: Option<String> = row.try_get("price_per_unit_50").map_err(decode_error)?;
    let price_100: Option<String> = row.try_get("price_per_unit_100").map_err(decode_error)?;
    let price_200: Option<String> = row.try_get("price_per_unit_200").map_err(decode_error)?;

    let available_quantity = u32::try_from(quantity).map_err(|_| {
        RepositoryError::Decode(format!("available_quantity out of range: {quantity}"))
    })?;

    Ok(Product {
        id: ProductId(id),
        garment_type,
        size,
        color,
        available_quantity,
        available,
        tier_prices: TierPrices {
            per_unit_50: parse_price("price_per_unit_50", price_50)?,
            per_unit_100: parse_price("price_per_unit_100", price_100)?,
            per_unit_200: parse_price("price_per_unit_200", price_200)?,
        },
    })
}

fn row_to_order(row: &SqliteRow) -> Result<Order, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_error)?;
    let customer_id: String = row.try_get("customer_id").map_err(decode_error)?;
    let product_id: i64 = row.try_get("product_id").map_err(decode_error)?;
    let quantity: i64 = row.try_get("quantity").map_err(decode_error)?;
    let unit_price: String = row.try_get("unit_price").map_err(decode_error)?;
    let total_price: String = row.try_get("total_price").map_err(decode_error)?;
    let created_at: String = row.try_get("created_at").map_err(decode_error)?;

    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("created_at: {e}")))?;

    Ok(Order {
        id: OrderId(id),
        customer_id,
        product_id: ProductId(product_id),
        quantity: u32::try_from(quantity)
            .map_err(|_| RepositoryError::Decode(format!("quantity out of range: {quantity}")))?,
        unit_price: parse_price("unit_price", Some(unit_price))?.unwrap_or_default(),
        total_price: parse_price("total_price", Some(total_price))?.unwrap_or_default(),
        created_at,
    })
}

fn row_to_document(row: &SqliteRow) -> Result<CatalogDocument, RepositoryError> {
    let id: i64 = row.try_get("id").map_err(decode_error)?;
    let content: String = row.try_get("content").map_err(decode_error)?;
    let embedding: String = row.try_get("embedding").map_err(decode_error)?;
    let embedding = serde_json::from_str::<Vec<f32>>(&embedding)
        .map_err(|e| RepositoryError::Decode(format!("embedding of document {id}: {e}")))?;

    Ok(CatalogDocument { id, content, embedding })
}

/// SQLite `LIKE` only folds ASCII, so type and color are also stored
/// lowercased and filters compare against those columns.
fn fold_case(value: &str) -> String {
    value.to_lowercase()
}

/// Wraps user text in `%...%` so it matches anywhere, with LIKE wildcards in
/// the text itself matched literally.
pub(crate) fn like_pattern(value: &str) -> String {
    let mut pattern = String::with_capacity(value.len() + 2);
    pattern.push('%');
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

#[async_trait::async_trait]
impl CatalogRepository for SqlCatalogRepository {
    async fn find_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM product WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_product).transpose()
    }

    async fn list_inventory(
        &self,
        filter: &InventoryFilter,
        limit: u32,
    ) -> Result<Vec<Product>, RepositoryError> {
        let mut builder: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!("SELECT {PRODUCT_COLUMNS} FROM product WHERE available = 1"));

        if let Some(garment_type) = &filter.garment_type {
            builder
                .push(" AND garment_type_folded LIKE ")
                .push_bind(like_pattern(&fold_case(garment_type)))
                .push(" ESCAPE '\\'");
        }
        if let Some(size) = &filter.size {
            builder.push(" AND size = ").push_bind(size.clone());
        }
        if let Some(color) = &filter.color {
            builder
                .push(" AND color_folded LIKE ")
                .push_bind(like_pattern(&fold_case(color)))
                .push(" ESCAPE '\\'");
        }
        builder.push(" ORDER BY id LIMIT ").push_bind(i64::from(limit));

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_product).collect()
    }

    async fn match_documents(
        &self,
        query: &[f32],
        threshold: f32,
        count: u32,
    ) -> Result<Vec<DocumentMatch>, RepositoryError> {
        let rows = sqlx::query("SELECT id, content, embedding FROM catalog_document")
            .fetch_all(&self.pool)
            .await?;
        let documents = rows.iter().map(row_to_document).collect::<Result<Vec<_>, _>>()?;

        Ok(rank_documents(&documents, query, threshold, count as usize))
    }

    async fn save_product(&self, product: Product) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO product (id, garment_type, size, color, garment_type_folded, color_folded,
                                  available_quantity, available,
                                  price_per_unit_50, price_per_unit_100, price_per_unit_200)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 garment_type = excluded.garment_type,
                 size = excluded.size,
                 color = excluded.color,
                 garment_type_folded = excluded.garment_type_folded,
                 color_folded = excluded.color_folded,
                 available_quantity = excluded.available_quantity,
                 available = excluded.available,
                 price_per_unit_50 = excluded.price_per_unit_50,
                 price_per_unit_100 = excluded.price_per_unit_100,
                 price_per_unit_200 = excluded.price_per_unit_200",
        )
        .bind(product.id.0)
        .bind(&product.garment_type)
        .bind(&product.size)
        .bind(&product.color)
        .bind(fold_case(&product.garment_type))
        .bind(fold_case(&product.color))
        .bind(i64::from(product.available_quantity))
        .bind(product.available)
        .bind(product.tier_prices.per_unit_50.map(|price| price.to_string()))
        .bind(product.tier_prices.per_unit_100.map(|price| price.to_string()))
        .bind(product.tier_prices.per_unit_200.map(|price| price.to_string()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_products(&self) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM product ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_product).collect()
    }

    async fn save_document(&self, document: CatalogDocument) -> Result<(), RepositoryError> {
        let embedding = serde_json::to_string(&document.embedding)
            .map_err(|e| RepositoryError::Decode(format!("embedding: {e}")))?;

        sqlx::query(
            "INSERT INTO catalog_document (id, content, embedding, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 content = excluded.content,
                 embedding = excluded.embedding,
                 updated_at = excluded.updated_at",
        )
        .bind(document.id)
        .bind(&document.content)
        .bind(embedding)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn clear_documents(&self) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM catalog_document").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn count_documents(&self) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM catalog_document")
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}

#[async_trait::async_trait]
impl OrderRepository for SqlCatalogRepository {
    async fn place_order(&self, order: NewOrder) -> Result<Order, PlaceOrderError> {
        let quantity = i64::from(order.quantity);
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE product
             SET available_quantity = available_quantity - ?
             WHERE id = ? AND available_quantity >= ?",
        )
        .bind(quantity)
        .bind(order.product_id.0)
        .bind(quantity)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            let stock: Option<i64> =
                sqlx::query_scalar("SELECT available_quantity FROM product WHERE id = ?")
                    .bind(order.product_id.0)
                    .fetch_optional(&mut *tx)
                    .await?;
            tx.rollback().await?;

            let rejection = match stock {
                None => DomainError::ProductNotFound(order.product_id),
                Some(available) => DomainError::InsufficientStock {
                    product_id: order.product_id,
                    requested: order.quantity,
                    available: u32::try_from(available).unwrap_or_default(),
                },
            };
            return Err(rejection.into());
        }

        let placed = Order::from_new(OrderId::generate(), order, Utc::now());
        sqlx::query(
            "INSERT INTO b2b_order (id, customer_id, product_id, quantity, unit_price,
                                    total_price, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&placed.id.0)
        .bind(&placed.customer_id)
        .bind(placed.product_id.0)
        .bind(quantity)
        .bind(placed.unit_price.to_string())
        .bind(placed.total_price.to_string())
        .bind(placed.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(placed)
    }

    async fn find_order(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, customer_id, product_id, quantity, unit_price, total_price, created_at
             FROM b2b_order WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_order).transpose()
    }
}
