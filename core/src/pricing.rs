use anyhow::{Context, Result};

use crate::compare::round_cents;
use crate::models::{Recipe, RecipePricing, RecipeStoreCost};

pub const DEFAULT_SERVINGS: u32 = 2;
pub const DEFAULT_ZIP_CODE: &str = "47906";

/// Aggregates ingredient prices for one recipe at one store.
pub trait RecipeCostCalculator {
    fn store_cost(
        &self,
        recipe: &Recipe,
        store: &str,
        zip_code: &str,
        servings: u32,
    ) -> Result<RecipeStoreCost>;
}

/// Servings from a raw query value. Anything but a positive integer falls
/// back to [`DEFAULT_SERVINGS`].
#[must_use]
pub fn parse_servings(raw: Option<&str>) -> u32 {
    raw.and_then(|s| s.trim().parse::<u32>().ok())
        .filter(|s| *s > 0)
        .unwrap_or(DEFAULT_SERVINGS)
}

/// Scale a per-recipe amount to the requested number of servings.
#[must_use]
pub fn scale_for_servings(amount: f64, recipe_servings: f64, servings: u32) -> f64 {
    if recipe_servings > 0.0 {
        amount * f64::from(servings) / recipe_servings
    } else {
        amount * f64::from(servings)
    }
}

/// Drop stores without a positive finite total and sort the rest cheapest
/// first. Equal totals keep their input order.
#[must_use]
pub fn rank_store_costs(costs: Vec<RecipeStoreCost>) -> Vec<RecipeStoreCost> {
    let mut ranked: Vec<RecipeStoreCost> = costs
        .into_iter()
        .filter(|c| c.total.is_finite() && c.total > 0.0)
        .collect();
    ranked.sort_by(|a, b| a.total.total_cmp(&b.total));
    ranked
}

/// Price a recipe at every store in `stores`.
///
/// One calculator call per store; any failure aborts the whole pricing so a
/// partial ranking is never returned.
pub fn price_recipe(
    calculator: &dyn RecipeCostCalculator,
    recipe: &Recipe,
    ingredient_count: usize,
    stores: &[&str],
    zip_code: &str,
    servings: u32,
) -> Result<RecipePricing> {
    let mut costs = Vec::with_capacity(stores.len());
    for store in stores {
        let cost = calculator
            .store_cost(recipe, store, zip_code, servings)
            .with_context(|| format!("Failed to price recipe {} at {store}", recipe.id))?;
        costs.push(cost);
    }

    // Rounding happens after ranking so a sub-cent total still counts as priced
    let mut ranked = rank_store_costs(costs);
    for cost in &mut ranked {
        cost.total = round_cents(cost.total);
    }
    let cheapest = ranked.first().cloned();
    let priced_ingredients = cheapest.as_ref().map_or(0, |c| c.matched_items);
    let is_complete = cheapest.is_some() && priced_ingredients >= ingredient_count;

    tracing::debug!(
        recipe_id = recipe.id,
        stores = stores.len(),
        ranked = ranked.len(),
        "priced recipe"
    );

    Ok(RecipePricing {
        recipe_id: recipe.id,
        recipe_name: recipe.title.clone(),
        zip_code: zip_code.to_string(),
        servings,
        cheapest,
        stores: ranked,
        total_ingredients: ingredient_count,
        priced_ingredients,
        is_complete,
    })
}
