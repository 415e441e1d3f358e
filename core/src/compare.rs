use std::collections::HashMap;

use crate::models::{ComparisonItem, ComparisonLine, PriceCacheRow, ShoppingItem, StoreComparison};
use crate::stores::{canonical_store_key, store_display_name};

/// Round a currency amount to cents.
#[must_use]
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[must_use]
pub fn normalize_items(items: Vec<ComparisonItem>) -> Vec<ShoppingItem> {
    items.into_iter().map(ShoppingItem::from).collect()
}

/// Latest cached row per `(item id, store key)`.
#[derive(Debug, Default)]
pub struct LatestPrices<'a> {
    /// Store keys in order of first observation.
    pub stores: Vec<String>,
    rows: HashMap<(String, String), &'a PriceCacheRow>,
}

impl<'a> LatestPrices<'a> {
    #[must_use]
    pub fn get(&self, item_id: &str, store: &str) -> Option<&'a PriceCacheRow> {
        self.rows
            .get(&(item_id.to_string(), store.to_string()))
            .copied()
    }
}

/// Index rows by canonical store. Rows must be sorted newest-first; the
/// first row seen for a pair wins. Rows with no usable store are skipped.
#[must_use]
pub fn latest_rows_by_store(rows: &[PriceCacheRow]) -> LatestPrices<'_> {
    let mut latest = LatestPrices::default();
    for row in rows {
        let Some(store) = canonical_store_key(row.store.as_deref(), row.store_name.as_deref())
        else {
            continue;
        };
        if !latest.stores.contains(&store) {
            latest.stores.push(store.clone());
        }
        latest
            .rows
            .entry((row.shopping_list_item_id.clone(), store))
            .or_insert(row);
    }
    latest
}

fn usable_price(row: &PriceCacheRow) -> Option<f64> {
    row.price.filter(|p| p.is_finite())
}

fn build_store(store: &str, items: &[ShoppingItem], latest: &LatestPrices<'_>) -> StoreComparison {
    let mut lines = Vec::new();
    let mut missing = Vec::new();
    let mut total = 0.0;

    for item in items {
        let Some((row, price)) = latest
            .get(&item.id, store)
            .and_then(|row| usable_price(row).map(|price| (row, price)))
        else {
            missing.push(item.clone());
            continue;
        };

        let line_total = price * item.quantity;
        total += line_total;
        let product_name = row
            .product_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| item.name.clone());

        lines.push(ComparisonLine {
            item_id: item.id.clone(),
            name: item.name.clone(),
            product_name,
            price,
            unit_price: row.unit_price.clone().filter(|u| !u.trim().is_empty()),
            quantity: item.quantity,
            line_total,
            category: item.category.clone(),
        });
    }

    StoreComparison {
        store: store.to_string(),
        store_name: store_display_name(store),
        items: lines,
        total: round_cents(total),
        savings: 0.0,
        missing_items: missing,
    }
}

/// One comparison per store that prices at least one item.
///
/// Savings are measured against the most expensive surviving store, which
/// therefore reports zero. Stores keep the order in which their first price
/// row appeared; nothing is sorted here.
#[must_use]
pub fn build_store_comparisons(
    items: &[ShoppingItem],
    rows: &[PriceCacheRow],
) -> Vec<StoreComparison> {
    let latest = latest_rows_by_store(rows);

    let mut results: Vec<StoreComparison> = latest
        .stores
        .iter()
        .map(|store| build_store(store, items, &latest))
        .filter(|comparison| !comparison.items.is_empty())
        .collect();

    let max_total = results.iter().map(|c| c.total).fold(0.0_f64, f64::max);
    for comparison in &mut results {
        comparison.savings = round_cents(max_total - comparison.total).max(0.0);
    }

    tracing::debug!(
        items = items.len(),
        rows = rows.len(),
        stores = results.len(),
        "built store comparisons"
    );
    results
}

/// Lowest-total store; ties go to the earliest.
#[must_use]
pub fn cheapest_store(comparisons: &[StoreComparison]) -> Option<&StoreComparison> {
    comparisons.iter().fold(None, |best, c| match best {
        Some(b) if b.total <= c.total => Some(b),
        _ => Some(c),
    })
}
