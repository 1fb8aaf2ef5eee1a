//! Movement history query parameters.

use serde::{Deserialize, Serialize};

use mekgoro_core::ItemKey;

/// Time ordering of returned movements.
///
/// Ties on `occurred_at` are always returned in insertion order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementOrder {
    Ascending,
    #[default]
    Descending,
}

impl core::str::FromStr for MovementOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(MovementOrder::Ascending),
            "desc" | "descending" => Ok(MovementOrder::Descending),
            other => Err(format!("order must be 'asc' or 'desc', got '{other}'")),
        }
    }
}

/// Filter + bound for `list_movements`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementQuery {
    /// Maximum number of records; `None` returns the full history.
    pub limit: Option<u32>,
    pub order: MovementOrder,
    pub item_key: Option<ItemKey>,
}

impl MovementQuery {
    pub fn latest(limit: u32) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn with_order(mut self, order: MovementOrder) -> Self {
        self.order = order;
        self
    }

    pub fn for_item(mut self, item_key: ItemKey) -> Self {
        self.item_key = Some(item_key);
        self
    }
}
