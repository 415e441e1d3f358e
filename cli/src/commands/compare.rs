use anyhow::Result;

use basket_core::compare::cheapest_store;
use basket_core::service::ShoppingService;

use super::helpers::{money, print_comparisons};

/// Compare cached prices for the unchecked items on the list.
pub(crate) fn cmd_compare(
    service: &ShoppingService,
    user_id: &str,
    zip: Option<&str>,
    json: bool,
) -> Result<()> {
    let results = service.compare_list_prices(user_id, zip)?;

    if json {
        println!("{}", serde_json::json!({ "results": results }));
        return Ok(());
    }

    if results.is_empty() {
        eprintln!("No cached prices for the items on your list");
        return Ok(());
    }

    print_comparisons(&results);
    if let Some(best) = cheapest_store(&results) {
        let name = &best.store_name;
        let total = money(best.total);
        let missing = best.missing_items.len();
        if missing == 0 {
            println!("\nCheapest: {name} at {total}");
        } else {
            println!("\nCheapest: {name} at {total} ({missing} item(s) not priced there)");
        }
    }
    Ok(())
}
