//! Ledger-wide rules: rebuilding quantities from the movement log and
//! checking the ledger against it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use mekgoro_core::ItemKey;

use crate::entry::StockEntry;
use crate::movement::MovementRecord;

/// An item whose ledger quantity disagrees with its movement history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discrepancy {
    pub item_key: ItemKey,
    /// `None` when movements exist for an item that has no ledger entry.
    pub ledger_quantity: Option<i64>,
    pub movement_total: i64,
}

/// Sum of deltas per item, replayed from the log.
pub fn replay_quantities<'a>(
    movements: impl IntoIterator<Item = &'a MovementRecord>,
) -> BTreeMap<ItemKey, i64> {
    let mut totals = BTreeMap::new();
    for m in movements {
        *totals.entry(m.item_key.clone()).or_insert(0) += m.delta;
    }
    totals
}

/// Compare ledger entries with the replayed log.
///
/// Results are ordered by item key. An empty result means the ledger is
/// consistent with its history.
pub fn find_discrepancies(entries: &[StockEntry], movements: &[MovementRecord]) -> Vec<Discrepancy> {
    let mut totals = replay_quantities(movements);
    let mut out = Vec::new();

    for entry in entries {
        let total = totals.remove(&entry.item_key).unwrap_or(0);
        if total != entry.quantity {
            out.push(Discrepancy {
                item_key: entry.item_key.clone(),
                ledger_quantity: Some(entry.quantity),
                movement_total: total,
            });
        }
    }

    // Whatever is left has history but no entry.
    out.extend(totals.into_iter().map(|(item_key, movement_total)| Discrepancy {
        item_key,
        ledger_quantity: None,
        movement_total,
    }));

    out.sort_by(|a, b| a.item_key.cmp(&b.item_key));
    out
}
