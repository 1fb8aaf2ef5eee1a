use serde::{Deserialize, Serialize};

use mekgoro_inventory::StockEntry;

#[derive(Debug, Deserialize)]
pub struct ReceiveRequest {
    pub item_key: String,
    pub quantity: i64,
    #[serde(default)]
    pub reference: String,
    #[serde(default)]
    pub counterparty: String,
    /// Purchase cost per unit in cents.
    pub unit_cost: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct DispatchRequest {
    pub item_key: String,
    pub quantity: i64,
    #[serde(default)]
    pub reference: String,
    #[serde(default)]
    pub counterparty: String,
}

#[derive(Debug, Deserialize)]
pub struct AdjustRequest {
    pub item_key: String,
    pub delta: i64,
    #[serde(default)]
    pub reference: String,
    #[serde(default)]
    pub counterparty: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct StockListParams {
    pub filter: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MovementListParams {
    pub limit: Option<u32>,
    pub order: Option<String>,
    pub item_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ImportParams {
    pub source: Option<String>,
}

/// Result of a committed movement.
#[derive(Debug, Serialize)]
pub struct MovementApplied {
    pub item_key: String,
    pub quantity: i64,
}

/// `GET /stock/:item_key`: quantity is 0 and `entry` is null for unknown items.
#[derive(Debug, Serialize)]
pub struct StockLevel {
    pub item_key: String,
    pub quantity: i64,
    pub entry: Option<StockEntry>,
}
