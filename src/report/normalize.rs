//! Drop normalization
//!
//! Validates drop types, merges duplicate (drop type, item) pairs and
//! resolves game item ids to internal ids.

use tracing::warn;

use super::drop_type::{map_drop_type, valid_drop_types, DropType};
use super::request::{ArkDrop, Drop};
use crate::services::ItemLookup;
use crate::types::{DroplineError, Result};

/// A validated drop that still carries the game's item id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedDrop {
    pub drop_type: DropType,
    pub ark_item_id: String,
    pub quantity: i64,
}

/// Validate and merge raw drops. Pure; fails on the first bad entry so
/// nothing from a bad submission survives. First-seen order is kept.
pub fn merge_drops(drops: &[ArkDrop]) -> Result<Vec<MergedDrop>> {
    let mut merged: Vec<MergedDrop> = Vec::with_capacity(drops.len());

    for drop in drops {
        let drop_type = map_drop_type(&drop.drop_type).ok_or_else(|| {
            DroplineError::Validation(format!(
                "unknown drop type '{}', expected one of: {}",
                drop.drop_type,
                valid_drop_types()
            ))
        })?;
        if drop.quantity < 0 {
            return Err(DroplineError::Validation(format!(
                "negative quantity {} for item '{}'",
                drop.quantity, drop.item_id
            )));
        }

        match merged
            .iter_mut()
            .find(|m| m.drop_type == drop_type && m.ark_item_id == drop.item_id)
        {
            Some(existing) => {
                existing.quantity = add_quantity(existing.quantity, drop.quantity, &drop.item_id)?
            }
            None => merged.push(MergedDrop {
                drop_type,
                ark_item_id: drop.item_id.clone(),
                quantity: drop.quantity,
            }),
        }
    }

    Ok(merged)
}

fn add_quantity(total: i64, quantity: i64, item_id: &str) -> Result<i64> {
    total.checked_add(quantity).ok_or_else(|| {
        DroplineError::Validation(format!("quantity overflow for item '{}'", item_id))
    })
}

/// Merge, map and resolve the drops of one report
///
/// Items unknown to the catalog are skipped with a warning; any other
/// lookup failure fails the whole submission.
pub async fn normalize_drops(items: &dyn ItemLookup, drops: &[ArkDrop]) -> Result<Vec<Drop>> {
    let merged = merge_drops(drops)?;

    let mut normalized: Vec<Drop> = Vec::with_capacity(merged.len());
    for drop in merged {
        let Some(item) = items.get_item_by_ark_id(&drop.ark_item_id).await? else {
            warn!(
                "failed to get item by ark id '{}', will ignore it",
                drop.ark_item_id
            );
            continue;
        };

        // Two game ids may alias one catalog item
        match normalized
            .iter_mut()
            .find(|d| d.drop_type == drop.drop_type && d.item_id == item.item_id)
        {
            Some(existing) => {
                existing.quantity =
                    add_quantity(existing.quantity, drop.quantity, &drop.ark_item_id)?
            }
            None => normalized.push(Drop {
                drop_type: drop.drop_type,
                item_id: item.item_id,
                quantity: drop.quantity,
            }),
        }
    }

    Ok(normalized)
}
