use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mekgoro_core::{ItemKey, LedgerResult};

use crate::movement::MovementRequest;

/// Current on-hand state of one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockEntry {
    pub item_key: ItemKey,
    pub quantity: i64,
    /// Latest known purchase cost, in minor currency units.
    pub unit_cost: Option<u64>,
    pub last_updated: DateTime<Utc>,
}

impl StockEntry {
    /// A freshly opened entry at zero quantity.
    pub fn opened(item_key: ItemKey, at: DateTime<Utc>) -> Self {
        Self {
            item_key,
            quantity: 0,
            unit_cost: None,
            last_updated: at,
        }
    }

    /// Apply a movement in place, enforcing the stock guard.
    ///
    /// On error `self` is left untouched.
    pub fn apply(&mut self, movement: &MovementRequest) -> LedgerResult<i64> {
        let next = movement.resulting_quantity(self.quantity)?;
        self.quantity = next;
        self.last_updated = movement.occurred_at();
        if let Some(cost) = movement.unit_cost() {
            self.unit_cost = Some(cost);
        }
        Ok(next)
    }
}
