//! Infrastructure layer: storage, ledger service, import/export, backups, config.

pub mod backup;
pub mod config;
pub mod export;
pub mod import;
pub mod service;
pub mod store;

#[cfg(test)]
mod integration_tests;

pub use service::{LedgerService, RetryPolicy};
pub use store::{LedgerStore, StoreError};
