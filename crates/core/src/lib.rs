//! Shared building blocks for the stock ledger.
//!
//! This crate contains **pure** primitives (no infrastructure concerns).

pub mod error;
pub mod id;

pub use error::{LedgerError, LedgerResult};
pub use id::{ActorId, ItemKey, MovementId};
