use std::path::Path;

use anyhow::{Context, Result, bail};

use basket_core::models::{NewIngredientPrice, NewPriceCacheRow, validate_price};
use basket_core::service::ShoppingService;
use basket_core::stores::{canonicalize, is_supported, normalize_zip, store_display_name};

use super::helpers::money;
use super::list::resolve_item_id;

/// Record a price for a list item (`--item`) or a recipe ingredient
/// (`--ingredient`).
#[allow(clippy::too_many_arguments)]
pub(crate) fn cmd_price_add(
    service: &ShoppingService,
    user_id: &str,
    store: &str,
    price: f64,
    item: Option<&str>,
    ingredient: Option<&str>,
    zip: Option<&str>,
    product: Option<String>,
    unit_price: Option<String>,
    json: bool,
) -> Result<()> {
    validate_price(price)?;
    let store_key = canonicalize(store).context("Store must not be empty")?;
    if !is_supported(&store_key) {
        tracing::warn!(store = %store_key, "not a supported store; saving under its own key");
    }
    let zip_code = zip.and_then(normalize_zip);
    let db = service.db();

    let value = match (item, ingredient) {
        (Some(raw_id), None) => {
            let id = resolve_item_id(service, user_id, raw_id)?;
            let row = db.insert_price(&NewPriceCacheRow {
                shopping_list_item_id: id,
                store: Some(store_key.clone()),
                store_name: Some(store_display_name(&store_key)),
                zip_code,
                price: Some(price),
                product_name: product,
                unit_price,
                cached_at: None,
            })?;
            serde_json::to_value(&row)?
        }
        (None, Some(name)) => {
            let row = db.insert_ingredient_price(&NewIngredientPrice {
                ingredient_name: name.to_string(),
                store: store_key.clone(),
                zip_code,
                price,
                product_name: product,
                unit_price,
                cached_at: None,
            })?;
            serde_json::to_value(&row)?
        }
        _ => bail!("Pass exactly one of --item or --ingredient"),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        let target = item.or(ingredient).unwrap_or_default();
        println!(
            "Recorded {} for {target} at {}",
            money(price),
            store_display_name(&store_key)
        );
    }
    Ok(())
}

pub(crate) fn cmd_price_import(
    service: &ShoppingService,
    path: &Path,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to open file: {}", path.display()))?;

    let summary = service.import_price_csv(&data, dry_run)?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "dry_run": dry_run,
                "rows_parsed": summary.rows_parsed,
                "item_prices": summary.item_prices,
                "ingredient_prices": summary.ingredient_prices,
            })
        );
        return Ok(());
    }

    if summary.rows_parsed == 0 {
        eprintln!("No price rows found in CSV file.");
        return Ok(());
    }

    if dry_run {
        println!("Dry run: no changes made.\n");
    } else {
        println!("Import complete.\n");
    }
    println!("  Rows parsed:       {}", summary.rows_parsed);
    println!("  Item prices:       {}", summary.item_prices);
    println!("  Ingredient prices: {}", summary.ingredient_prices);
    Ok(())
}
