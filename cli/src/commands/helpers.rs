use anyhow::{Context, Result, bail};
use serde::Serialize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use basket_core::models::{MergedItem, RecipeGroup, RecipePricing, ShoppingListItem, StoreComparison};

/// Parse a quantity with an optional unit, returning `(amount, unit)`.
/// Accepts: "2", "2lb", "1.5 cups", "500 g".
pub(crate) fn parse_quantity(s: &str) -> Result<(f64, Option<String>)> {
    let s = s.trim();

    if let Ok(value) = s.parse::<f64>() {
        return Ok((positive(value, s)?, None));
    }

    // "N<unit>" with no space
    if let Some((qty, unit)) = split_number_unit(s) {
        return Ok((positive(qty, s)?, Some(unit.to_lowercase())));
    }

    // "<number> <unit>"
    let parts: Vec<&str> = s.splitn(2, char::is_whitespace).collect();
    if parts.len() == 2 {
        let qty: f64 = parts[0]
            .parse()
            .with_context(|| format!("Invalid quantity: '{s}'"))?;
        let unit = parts[1].trim();
        if !unit.is_empty() {
            return Ok((positive(qty, s)?, Some(unit.to_lowercase())));
        }
    }

    bail!("Invalid quantity format: '{s}'. Use '2', '2lb' or '1.5 cups'")
}

fn positive(value: f64, raw: &str) -> Result<f64> {
    if !value.is_finite() || value <= 0.0 {
        bail!("Quantity must be greater than 0, got '{raw}'");
    }
    Ok(value)
}

/// Split "500ml" or "2.5tbsp" into (500.0, "ml") or (2.5, "tbsp").
fn split_number_unit(s: &str) -> Option<(f64, &str)> {
    let idx = s.find(|c: char| c.is_alphabetic())?;
    if idx == 0 {
        return None;
    }
    let (num_part, unit_part) = s.split_at(idx);
    let qty: f64 = num_part.parse().ok()?;
    if unit_part.is_empty() {
        return None;
    }
    Some((qty, unit_part))
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn no_neg_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

pub(crate) fn money(v: f64) -> String {
    format!("${:.2}", no_neg_zero(v))
}

/// Quantities print without a trailing ".0" when whole.
pub(crate) fn fmt_quantity(quantity: f64, unit: Option<&str>) -> String {
    let amount = if quantity.fract() == 0.0 {
        format!("{quantity:.0}")
    } else {
        format!("{quantity:.2}")
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    };
    match unit {
        Some(u) if !u.is_empty() => format!("{amount} {u}"),
        _ => amount,
    }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}

fn check_mark(checked: bool) -> &'static str {
    if checked { "x" } else { "" }
}

pub(crate) fn print_item_table(items: &[ShoppingListItem]) {
    #[derive(Tabled)]
    struct ItemRow {
        #[tabled(rename = "✓")]
        checked: &'static str,
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Qty")]
        quantity: String,
        #[tabled(rename = "Source")]
        source: String,
        #[tabled(rename = "Price")]
        price: String,
    }

    let rows: Vec<ItemRow> = items
        .iter()
        .map(|i| ItemRow {
            checked: check_mark(i.checked),
            id: i.id.chars().take(8).collect(),
            name: truncate(&i.name, 30),
            quantity: fmt_quantity(i.quantity, i.unit.as_deref()),
            source: i.source.to_string(),
            price: i.price.map_or("-".into(), money),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..4)).with(Alignment::right()))
        .with(Modify::new(Columns::new(5..)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn print_groups(groups: &[RecipeGroup]) {
    for (idx, group) in groups.iter().enumerate() {
        if idx > 0 {
            println!();
        }
        println!("=== {} ===", group.title);
        print_item_table(&group.items);
    }
}

pub(crate) fn print_merged_table(rows: &[MergedItem]) {
    #[derive(Tabled)]
    struct MergedRow {
        #[tabled(rename = "✓")]
        checked: &'static str,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Qty")]
        quantity: String,
        #[tabled(rename = "Rows")]
        rows: usize,
        #[tabled(rename = "Price")]
        price: String,
        #[tabled(rename = "Store")]
        store: String,
    }

    let table_rows: Vec<MergedRow> = rows
        .iter()
        .map(|m| MergedRow {
            checked: check_mark(m.checked),
            name: truncate(&m.name, 30),
            quantity: fmt_quantity(m.quantity, m.unit.as_deref()),
            rows: m.constituents.len(),
            price: m.price.map_or("-".into(), money),
            store: m.store_name.clone().unwrap_or_default(),
        })
        .collect();

    let table = Table::new(&table_rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..5)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn print_comparisons(results: &[StoreComparison]) {
    #[derive(Tabled)]
    struct StoreRow {
        #[tabled(rename = "Store")]
        store: String,
        #[tabled(rename = "Total")]
        total: String,
        #[tabled(rename = "Savings")]
        savings: String,
        #[tabled(rename = "Priced")]
        priced: usize,
        #[tabled(rename = "Missing")]
        missing: String,
    }

    let rows: Vec<StoreRow> = results
        .iter()
        .map(|c| StoreRow {
            store: c.store_name.clone(),
            total: money(c.total),
            savings: money(c.savings),
            priced: c.items.len(),
            missing: truncate(
                &c.missing_items
                    .iter()
                    .map(|i| i.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
                40,
            ),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..4)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn print_pricing(pricing: &RecipePricing) {
    #[derive(Tabled)]
    struct CostRow {
        #[tabled(rename = "Store")]
        store: String,
        #[tabled(rename = "Total")]
        total: String,
        #[tabled(rename = "Matched")]
        matched: String,
    }

    let name = &pricing.recipe_name;
    let servings = pricing.servings;
    let zip = &pricing.zip_code;
    println!("=== {name} ===");
    println!("  Servings: {servings}  |  ZIP: {zip}\n");

    if pricing.stores.is_empty() {
        println!("  No store prices found.");
        return;
    }

    let rows: Vec<CostRow> = pricing
        .stores
        .iter()
        .map(|c| CostRow {
            store: c.store_name.clone(),
            total: money(c.total),
            matched: format!("{}/{}", c.matched_items, c.total_items),
        })
        .collect();
    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    if !pricing.is_complete {
        let priced = pricing.priced_ingredients;
        let total = pricing.total_ingredients;
        println!("\n  Only {priced} of {total} ingredients priced at the cheapest store.");
    }
}
