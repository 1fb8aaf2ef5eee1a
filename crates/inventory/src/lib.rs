//! Inventory domain module: stock ledger and movement log rules.
//!
//! This crate contains business rules for stock movements, implemented purely
//! as deterministic domain logic (no IO, no HTTP, no storage).

pub mod entry;
pub mod ledger;
pub mod movement;

pub use entry::StockEntry;
pub use ledger::{find_discrepancies, replay_quantities, Discrepancy};
pub use movement::{MovementKind, MovementMeta, MovementRecord, MovementRequest};
