use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use anyhow::bail;
use serde::{Deserialize, Serialize};

use crate::models::{Constituent, MergedItem, RecipeGroup, ShoppingListItem};

/// Title of the group holding items that did not come from a recipe.
pub const MISC_GROUP_TITLE: &str = "Miscellaneous";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    Grouped,
    Ungrouped,
}

impl FromStr for ViewMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "grouped" => Ok(Self::Grouped),
            "ungrouped" => Ok(Self::Ungrouped),
            other => bail!("Invalid view '{other}'. Must be 'grouped' or 'ungrouped'"),
        }
    }
}

/// Drop rows whose id was already seen. First occurrence wins.
#[must_use]
pub fn dedup_by_id(items: &[ShoppingListItem]) -> Vec<ShoppingListItem> {
    let mut seen = HashSet::new();
    items
        .iter()
        .filter(|item| seen.insert(item.id.as_str()))
        .cloned()
        .collect()
}

#[must_use]
pub fn merge_key(name: &str) -> String {
    name.to_lowercase()
}

/// Collapse rows sharing a case-insensitive name into one merged row each.
///
/// Rows are deduplicated by id first. Quantities add up, the merged row is
/// checked only when every constituent is, and price/store follow the last
/// constituent that carries one. Output keeps first-occurrence order.
#[must_use]
pub fn merge_ungrouped(items: &[ShoppingListItem]) -> Vec<MergedItem> {
    let mut merged: Vec<MergedItem> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for item in dedup_by_id(items) {
        let key = merge_key(&item.name);
        let constituent = Constituent {
            id: item.id.clone(),
            quantity: item.quantity,
            source: item.source,
        };

        if let Some(&pos) = index.get(&key) {
            let row = &mut merged[pos];
            row.quantity += item.quantity;
            row.checked = row.checked && item.checked;
            row.constituents.push(constituent);
            if item.price.is_some() {
                row.price = item.price;
            }
            if item.store_name.is_some() {
                row.store_name = item.store_name;
            }
            if row.unit.is_none() {
                row.unit = item.unit;
            }
            if row.category.is_none() {
                row.category = item.category;
            }
        } else {
            index.insert(key.clone(), merged.len());
            merged.push(MergedItem {
                key,
                name: item.name,
                quantity: item.quantity,
                unit: item.unit,
                checked: item.checked,
                price: item.price,
                store_name: item.store_name,
                category: item.category,
                constituents: vec![constituent],
            });
        }
    }

    merged
}

/// Find the merged row for `name` in the current list.
#[must_use]
pub fn find_merged(items: &[ShoppingListItem], name: &str) -> Option<MergedItem> {
    let key = merge_key(name.trim());
    merge_ungrouped(items).into_iter().find(|m| m.key == key)
}

/// Group rows by originating recipe. Manual rows land in a trailing
/// [`MISC_GROUP_TITLE`] group.
#[must_use]
pub fn group_by_recipe(items: &[ShoppingListItem]) -> Vec<RecipeGroup> {
    let mut groups: Vec<RecipeGroup> = Vec::new();
    let mut misc: Vec<ShoppingListItem> = Vec::new();

    for item in dedup_by_id(items) {
        let Some(recipe_id) = item.recipe_id else {
            misc.push(item);
            continue;
        };
        if let Some(group) = groups.iter_mut().find(|g| g.recipe_id == Some(recipe_id)) {
            group.items.push(item);
        } else {
            let title = item
                .recipe_title
                .clone()
                .unwrap_or_else(|| format!("Recipe {recipe_id}"));
            groups.push(RecipeGroup {
                recipe_id: Some(recipe_id),
                title,
                items: vec![item],
            });
        }
    }

    if !misc.is_empty() {
        groups.push(RecipeGroup {
            recipe_id: None,
            title: MISC_GROUP_TITLE.to_string(),
            items: misc,
        });
    }
    groups
}
