use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

/// Quantity floor for every persisted shopping-list row.
pub const MIN_QUANTITY: f64 = 1.0;

/// Where a shopping-list row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemSource {
    Recipe,
    Manual,
}

impl ItemSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Recipe => "recipe",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for ItemSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "recipe" => Ok(Self::Recipe),
            "manual" => Ok(Self::Manual),
            other => bail!("Invalid item source '{other}'. Must be 'recipe' or 'manual'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShoppingListItem {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub quantity: f64,
    pub unit: Option<String>,
    pub checked: bool,
    pub source: ItemSource,
    pub recipe_id: Option<i64>,
    pub recipe_title: Option<String>,
    pub price: Option<f64>,
    pub store_name: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewShoppingListItem {
    pub user_id: String,
    pub name: String,
    pub quantity: f64,
    pub unit: Option<String>,
    pub source: ItemSource,
    pub recipe_id: Option<i64>,
    pub recipe_title: Option<String>,
    pub price: Option<f64>,
    pub store_name: Option<String>,
    pub category: Option<String>,
}

impl NewShoppingListItem {
    /// A manually added row with no recipe link.
    #[must_use]
    pub fn manual(user_id: &str, name: &str, quantity: f64) -> Self {
        Self {
            user_id: user_id.to_string(),
            name: name.to_string(),
            quantity,
            unit: None,
            source: ItemSource::Manual,
            recipe_id: None,
            recipe_title: None,
            price: None,
            store_name: None,
            category: None,
        }
    }
}

/// One persisted row absorbed into a [`MergedItem`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Constituent {
    pub id: String,
    pub quantity: f64,
    pub source: ItemSource,
}

/// Display-only aggregate of every row sharing a case-insensitive name.
///
/// Always derived from the current list and never written back; edits go
/// through [`crate::redistribute`] onto the constituents.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedItem {
    pub key: String,
    pub name: String,
    pub quantity: f64,
    pub unit: Option<String>,
    pub checked: bool,
    pub price: Option<f64>,
    pub store_name: Option<String>,
    pub category: Option<String>,
    pub constituents: Vec<Constituent>,
}

impl MergedItem {
    #[must_use]
    pub fn constituent_total(&self) -> f64 {
        self.constituents.iter().map(|c| c.quantity).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecipeGroup {
    pub recipe_id: Option<i64>,
    pub title: String,
    pub items: Vec<ShoppingListItem>,
}

// --- Price cache ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceCacheRow {
    pub id: i64,
    pub shopping_list_item_id: String,
    pub store: Option<String>,
    pub store_name: Option<String>,
    pub zip_code: Option<String>,
    pub price: Option<f64>,
    pub product_name: Option<String>,
    pub unit_price: Option<String>,
    pub cached_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPriceCacheRow {
    pub shopping_list_item_id: String,
    pub store: Option<String>,
    pub store_name: Option<String>,
    pub zip_code: Option<String>,
    pub price: Option<f64>,
    pub product_name: Option<String>,
    pub unit_price: Option<String>,
    pub cached_at: Option<String>,
}

// --- Store comparison ---

/// Shopping item as submitted for a price comparison.
#[derive(Debug, Clone, Deserialize)]
pub struct ComparisonItem {
    pub id: String,
    pub name: String,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub category: Option<String>,
}

/// [`ComparisonItem`] with defaults applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShoppingItem {
    pub id: String,
    pub name: String,
    pub quantity: f64,
    pub unit: String,
    pub category: String,
}

impl From<ComparisonItem> for ShoppingItem {
    fn from(item: ComparisonItem) -> Self {
        let quantity = item
            .quantity
            .filter(|q| q.is_finite())
            .map_or(MIN_QUANTITY, |q| q.max(MIN_QUANTITY));
        Self {
            id: item.id,
            name: item.name,
            quantity,
            unit: non_empty(item.unit).unwrap_or_else(|| "unit".to_string()),
            category: non_empty(item.category).unwrap_or_else(|| "other".to_string()),
        }
    }
}

impl From<&ShoppingListItem> for ShoppingItem {
    fn from(item: &ShoppingListItem) -> Self {
        ComparisonItem {
            id: item.id.clone(),
            name: item.name.clone(),
            quantity: Some(item.quantity),
            unit: item.unit.clone(),
            category: item.category.clone(),
        }
        .into()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonLine {
    pub item_id: String,
    pub name: String,
    pub product_name: String,
    pub price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<String>,
    pub quantity: f64,
    pub line_total: f64,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreComparison {
    pub store: String,
    pub store_name: String,
    pub items: Vec<ComparisonLine>,
    pub total: f64,
    pub savings: f64,
    pub missing_items: Vec<ShoppingItem>,
}

// --- Recipes ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: i64,
    pub title: String,
    pub servings: f64,
    pub deleted_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeIngredient {
    pub id: i64,
    pub recipe_id: i64,
    pub name: String,
    pub quantity: f64,
    pub unit: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecipeDetail {
    #[serde(flatten)]
    pub recipe: Recipe,
    pub ingredients: Vec<RecipeIngredient>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngredientPrice {
    pub id: i64,
    pub ingredient_name: String,
    pub store: String,
    pub zip_code: Option<String>,
    pub price: f64,
    pub product_name: Option<String>,
    pub unit_price: Option<String>,
    pub cached_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewIngredientPrice {
    pub ingredient_name: String,
    pub store: String,
    pub zip_code: Option<String>,
    pub price: f64,
    pub product_name: Option<String>,
    pub unit_price: Option<String>,
    pub cached_at: Option<String>,
}

/// Cost of one recipe at one store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeStoreCost {
    pub store: String,
    pub store_name: String,
    pub total: f64,
    pub matched_items: usize,
    pub total_items: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipePricing {
    pub recipe_id: i64,
    pub recipe_name: String,
    pub zip_code: String,
    pub servings: u32,
    pub cheapest: Option<RecipeStoreCost>,
    pub stores: Vec<RecipeStoreCost>,
    pub total_ingredients: usize,
    pub priced_ingredients: usize,
    pub is_complete: bool,
}

// --- Validation ---

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

pub fn validate_item_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        bail!("Item name must not be empty");
    }
    Ok(trimmed.to_string())
}

pub fn validate_quantity(quantity: f64) -> Result<()> {
    if !quantity.is_finite() || quantity <= 0.0 {
        bail!("Quantity must be a positive number, got {quantity}");
    }
    Ok(())
}

pub fn validate_price(price: f64) -> Result<()> {
    if !price.is_finite() || price < 0.0 {
        bail!("Price must be a non-negative number, got {price}");
    }
    Ok(())
}

pub fn validate_servings(servings: f64) -> Result<()> {
    if !servings.is_finite() || servings <= 0.0 {
        bail!("Servings must be greater than 0");
    }
    Ok(())
}
