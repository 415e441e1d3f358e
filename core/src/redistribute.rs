//! Edits to a merged row's total, pushed down onto its constituents.
//!
//! Manual rows absorb changes before recipe rows, and no row ever drops
//! below [`MIN_QUANTITY`].

use anyhow::{Context, Result};
use serde::Serialize;

use crate::models::{Constituent, ItemSource, MIN_QUANTITY, MergedItem};

const EPSILON: f64 = 1e-9;

/// Injected write path for a single row's quantity.
pub trait QuantityUpdater {
    fn update_quantity(&self, id: &str, quantity: f64) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuantityUpdate {
    pub id: String,
    pub quantity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Redistribution {
    pub previous_total: f64,
    pub requested_total: f64,
    pub applied_total: f64,
    pub updates: Vec<QuantityUpdate>,
}

impl Redistribution {
    /// How much of a decrease the floor refused to absorb. Zero when the
    /// request was applied in full.
    #[must_use]
    pub fn shortfall(&self) -> f64 {
        let diff = self.applied_total - self.requested_total;
        if diff.abs() < EPSILON { 0.0 } else { diff }
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        (self.applied_total - self.requested_total).abs() < EPSILON
    }
}

fn partition(constituents: &[Constituent]) -> (Vec<&Constituent>, Vec<&Constituent>) {
    constituents
        .iter()
        .partition(|c| c.source == ItemSource::Manual)
}

/// Work out the per-row updates for a new merged total. Pure.
///
/// `new_total` below the floor is clamped to it. Only rows whose quantity
/// actually changes get an update.
#[must_use]
pub fn plan_redistribution(item: &MergedItem, new_total: f64) -> Redistribution {
    let requested_total = new_total.max(MIN_QUANTITY);
    let previous_total = item.constituent_total();
    let delta = requested_total - previous_total;
    let (manual, recipe) = partition(&item.constituents);

    let mut updates = Vec::new();
    if delta > EPSILON {
        let targets = if manual.is_empty() { &recipe } else { &manual };
        if !targets.is_empty() {
            let share = delta / targets.len() as f64;
            updates.extend(targets.iter().map(|c| QuantityUpdate {
                id: c.id.clone(),
                quantity: c.quantity + share,
            }));
        }
    } else if delta < -EPSILON {
        let mut remaining = -delta;
        for c in manual.iter().chain(recipe.iter()) {
            if remaining <= EPSILON {
                break;
            }
            let room = (c.quantity - MIN_QUANTITY).max(0.0);
            let take = remaining.min(room);
            if take > EPSILON {
                updates.push(QuantityUpdate {
                    id: c.id.clone(),
                    quantity: c.quantity - take,
                });
                remaining -= take;
            }
        }
    }

    let applied_total = item
        .constituents
        .iter()
        .map(|c| {
            updates
                .iter()
                .find(|u| u.id == c.id)
                .map_or(c.quantity, |u| u.quantity)
        })
        .sum();

    Redistribution {
        previous_total,
        requested_total,
        applied_total,
        updates,
    }
}

/// Plan and emit updates in order. The first failing update aborts the rest.
pub fn apply_redistribution(
    updater: &dyn QuantityUpdater,
    item: &MergedItem,
    new_total: f64,
) -> Result<Redistribution> {
    let plan = plan_redistribution(item, new_total);
    for update in &plan.updates {
        updater
            .update_quantity(&update.id, update.quantity)
            .with_context(|| format!("Failed to update quantity of item {}", update.id))?;
    }
    if !plan.is_complete() {
        tracing::warn!(
            item = %item.name,
            requested = plan.requested_total,
            applied = plan.applied_total,
            "decrease limited by the per-item minimum quantity"
        );
    }
    Ok(plan)
}
