//! Ledger + movement-log storage boundary.
//!
//! A `LedgerStore` owns both the stock ledger and the movement log and is the
//! only place where they are mutated. Every mutating call is one atomic unit:
//! the entry upsert and the log append commit together or not at all.

pub mod in_memory;
pub mod query;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use mekgoro_core::{ActorId, ItemKey, LedgerError};
use mekgoro_inventory::{MovementRecord, MovementRequest, StockEntry};

pub use in_memory::InMemoryLedgerStore;
pub use query::{MovementOrder, MovementQuery};
pub use sqlite::SqliteLedgerStore;

/// Version of the persisted schema (number of applied migrations).
pub const SCHEMA_VERSION: u32 = 2;

/// Reference recorded on movements created by bulk import.
pub const IMPORT_REFERENCE: &str = "bulk-import";

/// Storage operation error.
///
/// These are **infrastructure errors**; the service maps them into
/// `LedgerError` with the request context attached.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("insufficient stock: available {available}")]
    InsufficientStock { available: i64 },

    #[error("invalid request: {0}")]
    Invalid(String),

    /// Another writer got there first (busy/locked database, stale read).
    #[error("write conflict: {0}")]
    Conflict(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Map into the ledger error model for a movement against `item_key`.
    pub fn into_ledger_error(self, item_key: &ItemKey, delta: i64) -> LedgerError {
        match self {
            StoreError::InsufficientStock { available } => {
                LedgerError::insufficient_stock(item_key.as_str(), available, delta.saturating_neg())
            }
            StoreError::Invalid(msg) => LedgerError::InvalidInput(msg),
            StoreError::Conflict(msg) | StoreError::Backend(msg) => LedgerError::PersistenceFailure(msg),
        }
    }
}

/// Mapping for reads and seeds, which carry no movement context.
///
/// Movements go through `StoreError::into_ledger_error` instead.
impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Invalid(msg) => LedgerError::InvalidInput(msg),
            other => LedgerError::PersistenceFailure(other.to_string()),
        }
    }
}

/// Result of a committed movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedMovement {
    pub record: MovementRecord,
    /// Quantity of the item after the movement.
    pub quantity: i64,
}

/// One row of a bulk seed: create the entry if absent, never overwrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedEntry {
    pub item_key: ItemKey,
    /// Non-negative opening quantity.
    pub quantity: i64,
    /// Name of the upstream source, recorded as the movement counterparty.
    pub source: String,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedOutcome {
    Created,
    AlreadyPresent,
}

/// Consistent copy of the full ledger and log (entries by key, movements ascending).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerState {
    pub entries: Vec<StockEntry>,
    pub movements: Vec<MovementRecord>,
}

/// Atomic stock ledger + append-only movement log.
///
/// Implementations must:
/// - commit the entry mutation and the movement append in one transaction
/// - reject a movement that would drive a quantity negative, without mutating anything
/// - assign strictly increasing movement ids in commit order
/// - serve reads from committed state only
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Apply a validated movement (creating the entry at zero if absent) and log it.
    async fn apply_movement(&self, request: &MovementRequest) -> Result<AppliedMovement, StoreError>;

    /// Create an entry with an opening quantity unless one already exists.
    ///
    /// A positive opening quantity is logged as an `ADJUSTMENT` in the same transaction.
    async fn seed_entry(&self, seed: &SeedEntry) -> Result<SeedOutcome, StoreError>;

    async fn get_entry(&self, item_key: &ItemKey) -> Result<Option<StockEntry>, StoreError>;

    /// All entries ascending by key, optionally filtered (case-insensitive substring).
    async fn list_stock(&self, filter: Option<&str>) -> Result<Vec<StockEntry>, StoreError>;

    async fn list_movements(&self, query: &MovementQuery) -> Result<Vec<MovementRecord>, StoreError>;

    /// Read ledger and log from one consistent snapshot.
    async fn load_state(&self) -> Result<LedgerState, StoreError>;
}

#[async_trait]
impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    async fn apply_movement(&self, request: &MovementRequest) -> Result<AppliedMovement, StoreError> {
        (**self).apply_movement(request).await
    }

    async fn seed_entry(&self, seed: &SeedEntry) -> Result<SeedOutcome, StoreError> {
        (**self).seed_entry(seed).await
    }

    async fn get_entry(&self, item_key: &ItemKey) -> Result<Option<StockEntry>, StoreError> {
        (**self).get_entry(item_key).await
    }

    async fn list_stock(&self, filter: Option<&str>) -> Result<Vec<StockEntry>, StoreError> {
        (**self).list_stock(filter).await
    }

    async fn list_movements(&self, query: &MovementQuery) -> Result<Vec<MovementRecord>, StoreError> {
        (**self).list_movements(query).await
    }

    async fn load_state(&self) -> Result<LedgerState, StoreError> {
        (**self).load_state().await
    }
}

/// One-shot failure injected between the ledger upsert and the log append.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct FaultSwitch(std::sync::atomic::AtomicBool);

#[cfg(test)]
impl FaultSwitch {
    pub(crate) fn arm(&self) {
        self.0.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub(crate) fn trip(&self) -> Result<(), StoreError> {
        if self.0.swap(false, std::sync::atomic::Ordering::SeqCst) {
            return Err(StoreError::Backend("injected fault before movement append".to_string()));
        }
        Ok(())
    }
}

/// Open the store named by a database URL.
///
/// `memory` selects the in-memory store; anything else is treated as a SQLite URL.
pub async fn open(database_url: &str) -> Result<Arc<dyn LedgerStore>, StoreError> {
    if database_url.trim().eq_ignore_ascii_case("memory") {
        tracing::warn!("using in-memory ledger store; data is lost on restart");
        return Ok(Arc::new(InMemoryLedgerStore::new()));
    }
    let store = SqliteLedgerStore::connect(database_url).await?;
    Ok(Arc::new(store))
}
