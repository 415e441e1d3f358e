use anyhow::{Context, Result, bail};
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use basket_core::db::Database;
use basket_core::models::{Recipe, validate_item_name, validate_servings};
use basket_core::service::ShoppingService;

use super::helpers::{fmt_quantity, json_error, parse_quantity, print_pricing, truncate};

/// Look a recipe up by numeric id, falling back to its title.
fn resolve_recipe(db: &Database, raw: &str) -> Result<Recipe> {
    if let Ok(id) = raw.trim().parse::<i64>() {
        if let Some(recipe) = db.get_recipe(id)? {
            return Ok(recipe);
        }
    }
    db.get_recipe_by_title(raw)
}

pub(crate) fn cmd_recipe_create(
    service: &ShoppingService,
    title: &str,
    servings: f64,
    json: bool,
) -> Result<()> {
    let title = validate_item_name(title).context("Recipe title must not be empty")?;
    validate_servings(servings)?;
    let recipe = service.db().create_recipe(&title, servings)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&recipe)?);
    } else {
        let id = recipe.id;
        println!("Created recipe: {title} (id: {id}, servings: {servings})");
        println!("Add ingredients with: basket recipe add-ingredient \"{title}\" <name> <quantity>");
    }
    Ok(())
}

pub(crate) fn cmd_recipe_add_ingredient(
    service: &ShoppingService,
    recipe: &str,
    name: &str,
    quantity: &str,
    category: Option<&str>,
    json: bool,
) -> Result<()> {
    let db = service.db();
    let recipe = resolve_recipe(db, recipe)?;
    let name = validate_item_name(name)?;
    let (quantity, unit) = parse_quantity(quantity)?;

    let ingredient =
        db.add_recipe_ingredient(recipe.id, &name, quantity, unit.as_deref(), category)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&ingredient)?);
    } else {
        let qty = fmt_quantity(ingredient.quantity, ingredient.unit.as_deref());
        println!("Added {qty} {name} to {}", recipe.title);
    }
    Ok(())
}

pub(crate) fn cmd_recipe_show(service: &ShoppingService, recipe: &str, json: bool) -> Result<()> {
    let db = service.db();
    let recipe = resolve_recipe(db, recipe)?;
    let detail = db
        .get_recipe_detail(recipe.id)?
        .with_context(|| format!("Recipe {} not found", recipe.id))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&detail)?);
        return Ok(());
    }

    let title = &detail.recipe.title;
    let servings = fmt_quantity(detail.recipe.servings, None);
    println!("=== {title} ===");
    println!("  Servings: {servings}\n");

    println!("  INGREDIENTS:");
    if detail.ingredients.is_empty() {
        println!("    (none)");
    }
    for ing in &detail.ingredients {
        let qty = fmt_quantity(ing.quantity, ing.unit.as_deref());
        let name = &ing.name;
        match &ing.category {
            Some(category) => println!("    {name}: {qty} [{category}]"),
            None => println!("    {name}: {qty}"),
        }
    }
    Ok(())
}

pub(crate) fn cmd_recipe_list(service: &ShoppingService, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct RecipeRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Title")]
        title: String,
        #[tabled(rename = "Servings")]
        servings: String,
        #[tabled(rename = "Ingredients")]
        ingredients: usize,
    }

    let db = service.db();
    let recipes = db.list_recipes()?;
    if recipes.is_empty() {
        if json {
            println!("[]");
        } else {
            eprintln!("No recipes found");
        }
        process::exit(2);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&recipes)?);
        return Ok(());
    }

    let mut rows = Vec::with_capacity(recipes.len());
    for r in &recipes {
        rows.push(RecipeRow {
            id: r.id,
            title: truncate(&r.title, 30),
            servings: fmt_quantity(r.servings, None),
            ingredients: db.get_recipe_ingredients(r.id)?.len(),
        });
    }

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_recipe_delete(service: &ShoppingService, recipe: &str, json: bool) -> Result<()> {
    let db = service.db();
    let recipe = resolve_recipe(db, recipe)?;
    if db.soft_delete_recipe(recipe.id)? {
        if json {
            println!("{}", serde_json::json!({ "deleted": recipe.id }));
        } else {
            println!("Deleted recipe {} (id: {})", recipe.title, recipe.id);
        }
    } else {
        if json {
            println!("{}", json_error(&format!("Recipe {} not found", recipe.id)));
        } else {
            eprintln!("Recipe {} not found", recipe.id);
        }
        process::exit(2);
    }
    Ok(())
}

/// Add every ingredient of a recipe to the user's list.
pub(crate) fn cmd_recipe_shop(
    service: &ShoppingService,
    user_id: &str,
    recipe: &str,
    json: bool,
) -> Result<()> {
    let db = service.db();
    let recipe = resolve_recipe(db, recipe)?;
    let added = db.add_recipe_to_list(user_id, recipe.id)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&added)?);
    } else {
        println!("Added {} item(s) from {} to your list", added.len(), recipe.title);
    }
    Ok(())
}

pub(crate) fn cmd_recipe_cost(
    service: &ShoppingService,
    recipe: &str,
    zip: Option<&str>,
    servings: Option<&str>,
    stores: Option<&str>,
    json: bool,
) -> Result<()> {
    let recipe = resolve_recipe(service.db(), recipe)?;
    let Some(pricing) = service.price_recipe(recipe.id, zip, servings, stores)? else {
        if json {
            println!("{}", json_error("Recipe not found"));
        } else {
            eprintln!("Recipe {} not found", recipe.id);
        }
        process::exit(2);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&pricing)?);
    } else {
        print_pricing(&pricing);
    }
    Ok(())
}

struct ImportedIngredient {
    name: String,
    quantity: f64,
    unit: Option<String>,
}

pub(crate) fn cmd_recipe_import(
    service: &ShoppingService,
    file: &std::path::Path,
    title_override: Option<String>,
    servings_override: Option<f64>,
    json: bool,
) -> Result<()> {
    let input = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read file: {}", file.display()))?;

    let (recipe_data, _report) = cooklang::parse(&input)
        .into_result()
        .map_err(|e| anyhow::anyhow!("Failed to parse Cooklang file: {e}"))?;

    let title = title_override
        .or_else(|| recipe_data.metadata.title().map(String::from))
        .or_else(|| file.file_stem().and_then(|s| s.to_str()).map(String::from))
        .context("Could not determine recipe title. Use --title to specify one")?;

    let servings = servings_override
        .or_else(|| {
            recipe_data
                .metadata
                .servings()
                .and_then(|s| s.as_number().map(f64::from))
        })
        .unwrap_or(1.0);
    validate_servings(servings)?;

    let converter = cooklang::Converter::default();
    let grouped = recipe_data.group_ingredients(&converter);
    let ingredients: Vec<ImportedIngredient> = grouped.iter().map(imported_ingredient).collect();

    if ingredients.is_empty() {
        bail!("No ingredients found in recipe");
    }

    let db = service.db();
    let recipe = db.create_recipe(&title, servings)?;
    for ing in &ingredients {
        db.add_recipe_ingredient(recipe.id, &ing.name, ing.quantity, ing.unit.as_deref(), None)?;
    }
    tracing::info!(recipe_id = recipe.id, ingredients = ingredients.len(), "imported recipe");

    let detail = db
        .get_recipe_detail(recipe.id)?
        .with_context(|| format!("Recipe {} not found", recipe.id))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&detail)?);
    } else {
        let count = detail.ingredients.len();
        let servings = fmt_quantity(detail.recipe.servings, None);
        println!("Imported recipe: {title} ({count} ingredients, {servings} servings)");
    }
    Ok(())
}

fn imported_ingredient(gi: &cooklang::ingredient_list::GroupedIngredient<'_>) -> ImportedIngredient {
    // First grouped quantity only; text amounts that do not parse count as 1
    let (quantity, unit) = gi
        .quantity
        .iter()
        .next()
        .map_or((1.0, None), |qty: &cooklang::Quantity| {
            let value = match qty.value() {
                cooklang::Value::Number(n) => n.value(),
                cooklang::Value::Range { start, .. } => start.value(),
                cooklang::Value::Text(t) => t.trim().parse::<f64>().unwrap_or(1.0),
            };
            (value, qty.unit().map(String::from))
        });

    ImportedIngredient {
        name: gi.ingredient.display_name().to_string(),
        quantity: if quantity.is_finite() && quantity > 0.0 {
            quantity
        } else {
            1.0
        },
        unit,
    }
}
