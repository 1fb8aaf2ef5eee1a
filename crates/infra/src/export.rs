//! CSV exports of the ledger and the movement log.

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use mekgoro_inventory::{MovementRecord, StockEntry};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("csv write failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("csv buffer flush failed: {0}")]
    Buffer(String),
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>, ExportError> {
    writer.into_inner().map_err(|e| ExportError::Buffer(e.to_string()))
}

/// Download name for a stock export taken on `at`'s date.
pub fn stock_file_name(at: DateTime<Utc>) -> String {
    format!("Mekgoro_Stock_{}.csv", at.format("%Y%m%d"))
}

/// `item,quantity,unit_cost,last_updated`, one row per entry in the given order.
pub fn stock_csv(entries: &[StockEntry]) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["item", "quantity", "unit_cost", "last_updated"])?;
    for entry in entries {
        writer.write_record([
            entry.item_key.to_string(),
            entry.quantity.to_string(),
            entry.unit_cost.map(|c| c.to_string()).unwrap_or_default(),
            timestamp(entry.last_updated),
        ])?;
    }
    finish(writer)
}

/// `id,kind,item,delta,reference,counterparty,actor,occurred_at`.
pub fn movements_csv(movements: &[MovementRecord]) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "id",
        "kind",
        "item",
        "delta",
        "reference",
        "counterparty",
        "actor",
        "occurred_at",
    ])?;
    for m in movements {
        writer.write_record([
            m.id.to_string(),
            m.kind.as_str().to_string(),
            m.item_key.to_string(),
            m.delta.to_string(),
            m.reference.clone(),
            m.counterparty.clone(),
            m.actor.to_string(),
            timestamp(m.occurred_at),
        ])?;
    }
    finish(writer)
}
