use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Serialize;

use crate::compare::{build_store_comparisons, normalize_items};
use crate::db::Database;
use crate::merge::{ViewMode, find_merged, group_by_recipe, merge_ungrouped};
use crate::models::{
    ComparisonItem, MergedItem, RecipeGroup, RecipePricing, ShoppingItem, StoreComparison,
};
use crate::price_import::{self, PriceImportSummary};
use crate::pricing::{self, DEFAULT_ZIP_CODE};
use crate::redistribute::{Redistribution, apply_redistribution};
use crate::stores::{normalize_zip, parse_store_filter};

/// A shopping list rendered for one view mode.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "view", content = "rows", rename_all = "lowercase")]
pub enum ListView {
    Grouped(Vec<RecipeGroup>),
    Ungrouped(Vec<MergedItem>),
}

pub struct ShoppingService {
    db: Database,
    default_zip: String,
}

impl ShoppingService {
    pub fn new(db_path: &str) -> Result<Self> {
        let db = Database::open(Path::new(db_path))?;
        Ok(Self::with_database(db))
    }

    pub fn new_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self::with_database(db))
    }

    #[must_use]
    pub fn with_database(db: Database) -> Self {
        Self {
            db,
            default_zip: DEFAULT_ZIP_CODE.to_string(),
        }
    }

    /// ZIP used when a recipe is priced without one.
    #[must_use]
    pub fn with_default_zip(mut self, zip: &str) -> Self {
        if let Some(zip) = normalize_zip(zip) {
            self.default_zip = zip;
        }
        self
    }

    #[must_use]
    pub fn db(&self) -> &Database {
        &self.db
    }

    #[must_use]
    pub fn default_zip(&self) -> &str {
        &self.default_zip
    }

    // --- List views ---

    pub fn list_view(&self, user_id: &str, mode: ViewMode) -> Result<ListView> {
        let items = self.db.list_items(user_id)?;
        Ok(match mode {
            ViewMode::Grouped => ListView::Grouped(group_by_recipe(&items)),
            ViewMode::Ungrouped => ListView::Ungrouped(merge_ungrouped(&items)),
        })
    }

    /// Set the total of a merged row, spreading the change over the rows it
    /// was built from. The merged row is rebuilt from the current list first.
    pub fn set_merged_quantity(
        &self,
        user_id: &str,
        name: &str,
        new_total: f64,
    ) -> Result<Redistribution> {
        if !new_total.is_finite() {
            bail!("Quantity must be a finite number");
        }
        let items = self.db.list_items(user_id)?;
        let merged = find_merged(&items, name)
            .with_context(|| format!("No item named '{}' on the list", name.trim()))?;
        apply_redistribution(&self.db, &merged, new_total)
    }

    // --- Price comparison ---

    pub fn compare_prices(
        &self,
        items: Vec<ComparisonItem>,
        zip_code: Option<&str>,
    ) -> Result<Vec<StoreComparison>> {
        self.compare_shopping_items(&normalize_items(items), zip_code)
    }

    /// Compare prices for the unchecked rows of a user's list.
    pub fn compare_list_prices(
        &self,
        user_id: &str,
        zip_code: Option<&str>,
    ) -> Result<Vec<StoreComparison>> {
        let items: Vec<ShoppingItem> = self
            .db
            .list_items(user_id)?
            .iter()
            .filter(|item| !item.checked)
            .map(ShoppingItem::from)
            .collect();
        self.compare_shopping_items(&items, zip_code)
    }

    fn compare_shopping_items(
        &self,
        items: &[ShoppingItem],
        zip_code: Option<&str>,
    ) -> Result<Vec<StoreComparison>> {
        let zip = zip_code.and_then(normalize_zip);
        let ids: Vec<String> = items.iter().map(|i| i.id.clone()).collect();
        let rows = self
            .db
            .price_rows_for_items(&ids, zip.as_deref())
            .context("Failed to load cached prices")?;
        Ok(build_store_comparisons(items, &rows))
    }

    // --- Recipe pricing ---

    /// Rank the stores in `stores` (comma-separated, all when empty) by the
    /// cost of a recipe. `Ok(None)` when the recipe is missing or deleted.
    pub fn price_recipe(
        &self,
        recipe_id: i64,
        zip_code: Option<&str>,
        servings: Option<&str>,
        stores: Option<&str>,
    ) -> Result<Option<RecipePricing>> {
        let Some(recipe) = self.db.get_recipe(recipe_id)? else {
            return Ok(None);
        };
        let ingredient_count = self.db.get_recipe_ingredients(recipe_id)?.len();
        let zip = zip_code
            .and_then(normalize_zip)
            .unwrap_or_else(|| self.default_zip.clone());
        let servings = pricing::parse_servings(servings);
        let stores = parse_store_filter(stores);

        pricing::price_recipe(&self.db, &recipe, ingredient_count, &stores, &zip, servings)
            .map(Some)
    }

    // --- Import ---

    pub fn import_price_csv(&self, csv_data: &str, dry_run: bool) -> Result<PriceImportSummary> {
        let rows = price_import::parse_price_csv(csv_data.as_bytes())?;
        price_import::import_prices(&self.db, &rows, dry_run)
    }
}
