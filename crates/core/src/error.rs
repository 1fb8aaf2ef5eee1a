//! Ledger error model.

use thiserror::Error;

/// Result type used across the ledger layers.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Ledger-level error.
///
/// `InvalidInput` and `InsufficientStock` are expected, user-facing outcomes.
/// `PersistenceFailure` is transient and safe to retry. `ImportFormat` only
/// comes out of bulk import.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// A request failed validation (empty item key, zero or wrongly signed delta).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A negative movement would take the item below zero.
    #[error("insufficient stock for '{item_key}': available {available}, requested {requested}")]
    InsufficientStock {
        item_key: String,
        available: i64,
        requested: i64,
    },

    /// The storage transaction could not commit.
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    /// A bulk-import source is missing required columns.
    #[error("import format error: {0}")]
    ImportFormat(String),
}

impl LedgerError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::PersistenceFailure(msg.into())
    }

    pub fn import_format(msg: impl Into<String>) -> Self {
        Self::ImportFormat(msg.into())
    }

    pub fn insufficient_stock(item_key: impl Into<String>, available: i64, requested: i64) -> Self {
        Self::InsufficientStock {
            item_key: item_key.into(),
            available,
            requested,
        }
    }

    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::PersistenceFailure(_))
    }
}
