//! Ledger service: the single entry point request handlers talk to.
//!
//! Built once at startup around a `LedgerStore` and shared (`Arc`) with every
//! handler. The acting user travels inside each `MovementRequest`; nothing is
//! read from ambient state.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::instrument;

use mekgoro_core::{ActorId, ItemKey, LedgerError, LedgerResult};
use mekgoro_inventory::{find_discrepancies, Discrepancy, MovementRecord, MovementRequest, StockEntry};

use crate::import::{self, ImportReport};
use crate::store::{LedgerState, LedgerStore, MovementQuery, SeedEntry, SeedOutcome, StoreError};

/// Bounded retry for transient persistence failures.
///
/// Only `StoreError::Conflict` is retried; anything else fails on the first attempt.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Linear backoff step between attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Duration::from_millis(25),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    fn is_retryable(err: &StoreError) -> bool {
        matches!(err, StoreError::Conflict(_))
    }

    async fn run<T, F, Fut>(&self, operation: &'static str, mut attempt: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut tries = 0u32;
        loop {
            match attempt().await {
                Err(err) if Self::is_retryable(&err) && tries < self.max_retries => {
                    tries += 1;
                    tracing::warn!(operation, attempt = tries, error = %err, "retrying ledger transaction");
                    tokio::time::sleep(self.backoff * tries).await;
                }
                other => return other,
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct LedgerService<S> {
    store: S,
    retry: RetryPolicy,
}

impl<S> LedgerService<S>
where
    S: LedgerStore,
{
    pub fn new(store: S) -> Self {
        Self::with_retry(store, RetryPolicy::default())
    }

    pub fn with_retry(store: S, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Apply one movement to the ledger and log it atomically.
    ///
    /// Returns the item's new quantity.
    #[instrument(
        skip(self, request),
        fields(
            item_key = %request.item_key(),
            kind = %request.kind(),
            delta = request.delta(),
            actor = %request.meta().actor
        )
    )]
    pub async fn apply_movement(&self, request: MovementRequest) -> LedgerResult<i64> {
        let result = self
            .retry
            .run("apply_movement", || self.store.apply_movement(&request))
            .await;

        match result {
            Ok(applied) => {
                tracing::info!(
                    movement_id = %applied.record.id,
                    quantity = applied.quantity,
                    "movement applied"
                );
                Ok(applied.quantity)
            }
            Err(err) => {
                let err = err.into_ledger_error(request.item_key(), request.delta());
                tracing::warn!(error = %err, "movement rejected");
                Err(err)
            }
        }
    }

    /// On-hand quantity; unknown items are 0.
    pub async fn get_quantity(&self, item_key: &str) -> LedgerResult<i64> {
        let Ok(key) = ItemKey::parse(item_key) else {
            return Ok(0);
        };
        Ok(self.get_entry(&key).await?.map(|e| e.quantity).unwrap_or(0))
    }

    pub async fn get_entry(&self, item_key: &ItemKey) -> LedgerResult<Option<StockEntry>> {
        self.retry
            .run("get_entry", || self.store.get_entry(item_key))
            .await
            .map_err(LedgerError::from)
    }

    pub async fn list_stock(&self, filter: Option<&str>) -> LedgerResult<Vec<StockEntry>> {
        self.retry
            .run("list_stock", || self.store.list_stock(filter))
            .await
            .map_err(LedgerError::from)
    }

    pub async fn list_movements(&self, query: &MovementQuery) -> LedgerResult<Vec<MovementRecord>> {
        self.retry
            .run("list_movements", || self.store.list_movements(query))
            .await
            .map_err(LedgerError::from)
    }

    /// Full ledger + log from one consistent read.
    pub async fn load_state(&self) -> LedgerResult<LedgerState> {
        self.retry
            .run("load_state", || self.store.load_state())
            .await
            .map_err(LedgerError::from)
    }

    /// Replay the log and report every item whose quantity disagrees with it.
    pub async fn verify(&self) -> LedgerResult<Vec<Discrepancy>> {
        let state = self.load_state().await?;
        let found = find_discrepancies(&state.entries, &state.movements);
        if !found.is_empty() {
            tracing::error!(count = found.len(), "ledger diverges from movement log");
        }
        Ok(found)
    }

    /// Seed opening stock from a CSV export; existing entries are left alone.
    ///
    /// Fails only when the source lacks the required columns; bad rows are
    /// skipped and listed in the report.
    #[instrument(skip(self, csv), fields(bytes = csv.len()))]
    pub async fn bulk_import(
        &self,
        csv: &[u8],
        source: &str,
        actor: ActorId,
        occurred_at: DateTime<Utc>,
    ) -> LedgerResult<ImportReport> {
        let parsed = import::parse_stock_csv(csv)?;
        let mut report = ImportReport::new(source, parsed.rejected);

        for row in parsed.rows {
            let seed = SeedEntry {
                item_key: row.item_key,
                quantity: row.quantity,
                source: source.to_string(),
                actor: actor.clone(),
                occurred_at,
            };
            let outcome = self
                .retry
                .run("seed_entry", || self.store.seed_entry(&seed))
                .await
                .map_err(LedgerError::from)?;
            match outcome {
                SeedOutcome::Created => report.created += 1,
                SeedOutcome::AlreadyPresent => report.skipped_existing += 1,
            }
        }

        tracing::info!(
            created = report.created,
            skipped_existing = report.skipped_existing,
            rejected = report.rejected.len(),
            "bulk import finished"
        );
        Ok(report)
    }
}
