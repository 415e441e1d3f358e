use std::io::Read;

use anyhow::{Context, Result, bail};

use crate::db::Database;
use crate::models::{NewIngredientPrice, NewPriceCacheRow, validate_price};
use crate::stores::{canonical_store_key, normalize_zip};

/// What a CSV price row refers to.
#[derive(Debug, Clone, PartialEq)]
pub enum PriceTarget {
    Item(String),
    Ingredient(String),
}

/// A single row parsed from a price CSV.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceRow {
    pub target: PriceTarget,
    pub store: String,
    pub store_name: Option<String>,
    pub zip_code: Option<String>,
    pub price: f64,
    pub product_name: Option<String>,
    pub unit_price: Option<String>,
    pub cached_at: Option<String>,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct PriceImportSummary {
    pub rows_parsed: usize,
    pub item_prices: usize,
    pub ingredient_prices: usize,
}

/// Parse a price CSV from any reader.
///
/// Header (case-insensitive): `store`, `price`, and one of `item_id` or
/// `ingredient`; optionally `store_name`, `zip_code`, `product_name`,
/// `unit_price`, `cached_at`. Rows with an empty price are skipped.
pub fn parse_price_csv<R: Read>(reader: R) -> Result<Vec<PriceRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers().context("Failed to read CSV headers")?.clone();
    let col =
        |name: &str| -> Option<usize> { headers.iter().position(|h| h.eq_ignore_ascii_case(name)) };

    let idx_store = col("store").context("Missing required column: store")?;
    let idx_price = col("price").context("Missing required column: price")?;
    let idx_item = col("item_id");
    let idx_ingredient = col("ingredient");
    if idx_item.is_none() && idx_ingredient.is_none() {
        bail!("Missing required column: item_id or ingredient");
    }
    let idx_store_name = col("store_name");
    let idx_zip = col("zip_code");
    let idx_product = col("product_name");
    let idx_unit_price = col("unit_price");
    let idx_cached_at = col("cached_at");

    let mut rows = Vec::new();

    for (line_num, result) in rdr.records().enumerate() {
        let line = line_num + 2;
        let record = result.with_context(|| format!("Failed to parse CSV row {line}"))?;

        let field = |idx: Option<usize>| -> Option<String> {
            idx.and_then(|i| record.get(i))
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(String::from)
        };

        let Some(raw_price) = field(Some(idx_price)) else {
            continue;
        };
        let price: f64 = raw_price
            .trim_start_matches('$')
            .parse()
            .with_context(|| format!("Invalid price '{raw_price}' on line {line}"))?;
        validate_price(price).with_context(|| format!("Line {line}"))?;

        let target = match (field(idx_item), field(idx_ingredient)) {
            (Some(id), None) => PriceTarget::Item(id),
            (None, Some(name)) => PriceTarget::Ingredient(name),
            (Some(_), Some(_)) => bail!("Line {line}: give item_id or ingredient, not both"),
            (None, None) => bail!("Line {line}: item_id or ingredient is required"),
        };

        let store_name = field(idx_store_name);
        let raw_store = field(Some(idx_store));
        let store = canonical_store_key(raw_store.as_deref(), store_name.as_deref())
            .with_context(|| format!("Line {line}: store is required"))?;

        rows.push(PriceRow {
            target,
            store,
            store_name,
            zip_code: field(idx_zip).as_deref().and_then(normalize_zip),
            price,
            product_name: field(idx_product),
            unit_price: field(idx_unit_price),
            cached_at: field(idx_cached_at),
        });
    }

    Ok(rows)
}

/// Write parsed rows to the database. A dry run only counts.
pub fn import_prices(db: &Database, rows: &[PriceRow], dry_run: bool) -> Result<PriceImportSummary> {
    let mut summary = PriceImportSummary {
        rows_parsed: rows.len(),
        ..PriceImportSummary::default()
    };

    for row in rows {
        match row.target {
            PriceTarget::Item(_) => summary.item_prices += 1,
            PriceTarget::Ingredient(_) => summary.ingredient_prices += 1,
        }
    }

    if !dry_run {
        db.in_transaction(|db| {
            for row in rows {
                match &row.target {
                    PriceTarget::Item(id) => {
                        db.insert_price(&NewPriceCacheRow {
                            shopping_list_item_id: id.clone(),
                            store: Some(row.store.clone()),
                            store_name: row.store_name.clone(),
                            zip_code: row.zip_code.clone(),
                            price: Some(row.price),
                            product_name: row.product_name.clone(),
                            unit_price: row.unit_price.clone(),
                            cached_at: row.cached_at.clone(),
                        })
                        .with_context(|| format!("Failed to save price for item {id}"))?;
                    }
                    PriceTarget::Ingredient(name) => {
                        db.insert_ingredient_price(&NewIngredientPrice {
                            ingredient_name: name.clone(),
                            store: row.store.clone(),
                            zip_code: row.zip_code.clone(),
                            price: row.price,
                            product_name: row.product_name.clone(),
                            unit_price: row.unit_price.clone(),
                            cached_at: row.cached_at.clone(),
                        })?;
                    }
                }
            }
            Ok(())
        })?;
    }

    tracing::info!(
        rows = summary.rows_parsed,
        items = summary.item_prices,
        ingredients = summary.ingredient_prices,
        dry_run,
        "imported prices"
    );
    Ok(summary)
}
