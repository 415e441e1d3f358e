use anyhow::{Result, bail};
use std::process;

use basket_core::merge::ViewMode;
use basket_core::models::{NewShoppingListItem, validate_item_name, validate_price};
use basket_core::service::{ListView, ShoppingService};
use basket_core::stores::{canonicalize, store_display_name};

use super::helpers::{
    fmt_quantity, json_error, parse_quantity, print_groups, print_merged_table,
};

/// Resolve a full id or an unambiguous prefix (as shown in tables).
pub(super) fn resolve_item_id(service: &ShoppingService, user_id: &str, raw: &str) -> Result<String> {
    let raw = raw.trim();
    let items = service.db().list_items(user_id)?;
    if items.iter().any(|i| i.id == raw) {
        return Ok(raw.to_string());
    }
    let matches: Vec<&str> = items
        .iter()
        .map(|i| i.id.as_str())
        .filter(|id| !raw.is_empty() && id.starts_with(raw))
        .collect();
    match matches.as_slice() {
        [id] => Ok((*id).to_string()),
        [] => bail!("No item with id '{raw}' on the list"),
        _ => bail!("Item id '{raw}' is ambiguous ({} matches)", matches.len()),
    }
}

pub(crate) fn cmd_list(
    service: &ShoppingService,
    user_id: &str,
    ungrouped: bool,
    json: bool,
) -> Result<()> {
    let mode = if ungrouped {
        ViewMode::Ungrouped
    } else {
        ViewMode::Grouped
    };
    let view = service.list_view(user_id, mode)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    match view {
        ListView::Grouped(groups) if groups.is_empty() => eprintln!("Shopping list is empty"),
        ListView::Ungrouped(rows) if rows.is_empty() => eprintln!("Shopping list is empty"),
        ListView::Grouped(groups) => print_groups(&groups),
        ListView::Ungrouped(rows) => print_merged_table(&rows),
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn cmd_add(
    service: &ShoppingService,
    user_id: &str,
    name: &str,
    quantity: Option<&str>,
    unit: Option<String>,
    category: Option<String>,
    price: Option<f64>,
    store: Option<String>,
    json: bool,
) -> Result<()> {
    let name = validate_item_name(name)?;
    let (quantity, parsed_unit) = match quantity {
        Some(q) => parse_quantity(q)?,
        None => (1.0, None),
    };
    if let Some(p) = price {
        validate_price(p)?;
    }

    let item = service.db().insert_item(&NewShoppingListItem {
        unit: unit.or(parsed_unit),
        category,
        price,
        store_name: store.map(|s| canonicalize(&s).map_or(s, |key| store_display_name(&key))),
        ..NewShoppingListItem::manual(user_id, &name, quantity)
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&item)?);
    } else {
        let qty = fmt_quantity(item.quantity, item.unit.as_deref());
        println!("Added {qty} {} (id: {})", item.name, item.id);
    }
    Ok(())
}

pub(crate) fn cmd_remove(service: &ShoppingService, user_id: &str, id: &str, json: bool) -> Result<()> {
    let id = resolve_item_id(service, user_id, id)?;
    if service.db().delete_item(&id)? {
        if json {
            println!("{}", serde_json::json!({ "deleted": id }));
        } else {
            println!("Removed item {id}");
        }
    } else {
        if json {
            println!("{}", json_error(&format!("Item {id} not found")));
        } else {
            eprintln!("Item {id} not found");
        }
        process::exit(2);
    }
    Ok(())
}

pub(crate) fn cmd_set_checked(
    service: &ShoppingService,
    user_id: &str,
    id: &str,
    checked: bool,
    json: bool,
) -> Result<()> {
    let id = resolve_item_id(service, user_id, id)?;
    let item = service.db().set_item_checked(&id, checked)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&item)?);
    } else if checked {
        println!("Checked off {}", item.name);
    } else {
        println!("Unchecked {}", item.name);
    }
    Ok(())
}

pub(crate) fn cmd_rename(
    service: &ShoppingService,
    user_id: &str,
    id: &str,
    name: &str,
    json: bool,
) -> Result<()> {
    let id = resolve_item_id(service, user_id, id)?;
    let name = validate_item_name(name)?;
    let item = service.db().rename_item(&id, &name)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&item)?);
    } else {
        println!("Renamed item {id} to {}", item.name);
    }
    Ok(())
}

pub(crate) fn cmd_set_quantity(
    service: &ShoppingService,
    user_id: &str,
    id: &str,
    quantity: f64,
    json: bool,
) -> Result<()> {
    let id = resolve_item_id(service, user_id, id)?;
    let item = service.db().update_item_quantity(&id, quantity)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&item)?);
    } else {
        let qty = fmt_quantity(item.quantity, item.unit.as_deref());
        println!("{}: {qty}", item.name);
    }
    Ok(())
}

/// Edit the total of a merged row and push the change onto its rows.
pub(crate) fn cmd_set_total(
    service: &ShoppingService,
    user_id: &str,
    name: &str,
    total: f64,
    json: bool,
) -> Result<()> {
    let plan = service.set_merged_quantity(user_id, name, total)?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "name": name.trim(),
                "previous_total": plan.previous_total,
                "requested_total": plan.requested_total,
                "applied_total": plan.applied_total,
                "unabsorbed": plan.shortfall(),
                "updates": plan.updates,
            })
        );
        return Ok(());
    }

    let previous = fmt_quantity(plan.previous_total, None);
    let applied = fmt_quantity(plan.applied_total, None);
    println!("{}: {previous} -> {applied}", name.trim());
    for update in &plan.updates {
        let qty = fmt_quantity(update.quantity, None);
        println!("  {} = {qty}", update.id);
    }
    if !plan.is_complete() {
        let requested = fmt_quantity(plan.requested_total, None);
        eprintln!("Note: could not go below {applied} (requested {requested}); every row keeps at least 1");
    }
    Ok(())
}

pub(crate) fn cmd_clear(service: &ShoppingService, user_id: &str, json: bool) -> Result<()> {
    let removed = service.db().clear_items(user_id)?;
    if json {
        println!("{}", serde_json::json!({ "removed": removed }));
    } else {
        println!("Cleared {removed} item(s)");
    }
    Ok(())
}
