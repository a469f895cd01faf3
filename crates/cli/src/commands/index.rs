use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use threadline_agent::{Embedder, EmbeddingTask, GeminiEmbedder};
use threadline_core::{CatalogDocument, Product};
use threadline_db::{CatalogRepository, SqlCatalogRepository};

use crate::commands::{build_runtime, load_config, open_database, CommandResult};

/// Paragraphs from `--source` are stored above this id so they never
/// collide with the per-product documents.
pub const SOURCE_DOCUMENT_ID_BASE: i64 = 1_000_000;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IndexSummary {
    pub removed: u64,
    pub product_documents: usize,
    pub source_documents: usize,
}

pub fn run(replace: bool, source: Option<&Path>) -> CommandResult {
    let config = match load_config("index") {
        Ok(config) => config,
        Err(result) => return result,
    };

    let paragraphs = match source.map(read_paragraphs).transpose() {
        Ok(paragraphs) => paragraphs.unwrap_or_default(),
        Err(error) => {
            return CommandResult::failure("index", "index_source", format!("{error:#}"), 6)
        }
    };
    let embedder = match GeminiEmbedder::from_config(&config.llm) {
        Ok(embedder) => embedder,
        Err(error) => return CommandResult::failure("index", "model_client", error.to_string(), 3),
    };
    let runtime = match build_runtime("index") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;
        let repository = SqlCatalogRepository::new(pool.clone());
        let outcome = index_catalog(&repository, &embedder, replace, &paragraphs)
            .await
            .map_err(|error| ("index_execution", format!("{error:#}"), 6u8));
        pool.close().await;
        outcome
    });

    match result {
        Ok(summary) => CommandResult::success(
            "index",
            format!(
                "indexed {} product documents and {} source documents ({} removed first)",
                summary.product_documents, summary.source_documents, summary.removed
            ),
        ),
        Err(failure) => CommandResult::from_failure("index", failure),
    }
}

/// Embeds one document per catalog product plus any extra paragraphs.
/// Product documents hold catalog facts only; live stock comes from the
/// inventory tool.
/// Documents are upserted by id, so re-running refreshes them in place.
pub async fn index_catalog(
    catalog: &dyn CatalogRepository,
    embedder: &dyn Embedder,
    replace: bool,
    paragraphs: &[String],
) -> Result<IndexSummary> {
    let removed = if replace {
        catalog.clear_documents().await.context("clearing existing documents")?
    } else {
        0
    };

    let products = catalog.list_products().await.context("listing catalog products")?;
    for product in &products {
        let content = product_document(product);
        let embedding = embedder
            .embed(&content, EmbeddingTask::Document)
            .await
            .with_context(|| format!("embedding product {}", product.id))?;
        catalog
            .save_document(CatalogDocument { id: product.id.0, content, embedding })
            .await
            .with_context(|| format!("saving document for product {}", product.id))?;
    }

    for (offset, paragraph) in (0_i64..).zip(paragraphs) {
        let id = SOURCE_DOCUMENT_ID_BASE + offset;
        let embedding = embedder
            .embed(paragraph, EmbeddingTask::Document)
            .await
            .with_context(|| format!("embedding source paragraph {}", offset + 1))?;
        catalog
            .save_document(CatalogDocument { id, content: paragraph.clone(), embedding })
            .await
            .with_context(|| format!("saving source paragraph {}", offset + 1))?;
    }

    Ok(IndexSummary {
        removed,
        product_documents: products.len(),
        source_documents: paragraphs.len(),
    })
}

pub fn product_document(product: &Product) -> String {
    let mut content = format!(
        "{} in size {}, color {}. Product ID {}.",
        product.garment_type, product.size, product.color, product.id
    );

    // Stock changes with every order, so documents only carry availability.
    if product.available {
        content.push_str(" Available for wholesale ordering.");
    } else {
        content.push_str(" Currently not available for ordering.");
    }

    let tiers = [
        (50, &product.tier_prices.per_unit_50),
        (100, &product.tier_prices.per_unit_100),
        (200, &product.tier_prices.per_unit_200),
    ];
    let prices = tiers
        .iter()
        .filter_map(|(threshold, price)| {
            price
                .filter(|price| !price.is_zero())
                .map(|price| format!("{price} per unit from {threshold} units"))
        })
        .collect::<Vec<_>>();
    if !prices.is_empty() {
        let _ = write!(content, " Wholesale price: {}.", prices.join(", "));
    }

    content
}

fn read_paragraphs(path: &Path) -> Result<Vec<String>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading index source `{}`", path.display()))?;
    Ok(raw
        .split("\n\n")
        .map(|paragraph| paragraph.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|paragraph| !paragraph.is_empty())
        .collect())
}
