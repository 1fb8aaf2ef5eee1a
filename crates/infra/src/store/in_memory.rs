use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use mekgoro_core::{ItemKey, LedgerError, MovementId};
use mekgoro_inventory::{MovementMeta, MovementRecord, MovementRequest, StockEntry};

use super::query::{MovementOrder, MovementQuery};
use super::{AppliedMovement, LedgerState, LedgerStore, SeedEntry, SeedOutcome, StoreError, IMPORT_REFERENCE};

#[derive(Debug, Default)]
struct State {
    entries: BTreeMap<ItemKey, StockEntry>,
    movements: Vec<MovementRecord>,
    last_id: u64,
}

impl State {
    fn next_id(&mut self) -> MovementId {
        self.last_id += 1;
        MovementId::new(self.last_id)
    }
}

/// In-memory ledger store.
///
/// Intended for tests/dev. Ledger and log live behind one lock, so a
/// movement is staged and committed under a single write guard.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    state: RwLock<State>,
    #[cfg(test)]
    pub(crate) fault: super::FaultSwitch,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> StoreError {
        StoreError::Backend("lock poisoned".to_string())
    }
}

fn map_domain_error(err: LedgerError) -> StoreError {
    match err {
        LedgerError::InsufficientStock { available, .. } => StoreError::InsufficientStock { available },
        LedgerError::InvalidInput(msg) => StoreError::Invalid(msg),
        other => StoreError::Backend(other.to_string()),
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn apply_movement(&self, request: &MovementRequest) -> Result<AppliedMovement, StoreError> {
        let mut state = self.state.write().map_err(|_| Self::poisoned())?;

        // Stage on a copy; nothing is visible until both parts are in place.
        let key = request.item_key().clone();
        let mut staged = state
            .entries
            .get(&key)
            .cloned()
            .unwrap_or_else(|| StockEntry::opened(key.clone(), request.occurred_at()));
        let quantity = staged.apply(request).map_err(map_domain_error)?;

        #[cfg(test)]
        self.fault.trip()?;

        let id = state.next_id();
        let record = request.clone().into_record(id);
        state.entries.insert(key, staged);
        state.movements.push(record.clone());

        Ok(AppliedMovement { record, quantity })
    }

    async fn seed_entry(&self, seed: &SeedEntry) -> Result<SeedOutcome, StoreError> {
        if seed.quantity < 0 {
            return Err(StoreError::Invalid("opening quantity cannot be negative".to_string()));
        }

        let mut state = self.state.write().map_err(|_| Self::poisoned())?;
        if state.entries.contains_key(&seed.item_key) {
            return Ok(SeedOutcome::AlreadyPresent);
        }

        let mut entry = StockEntry::opened(seed.item_key.clone(), seed.occurred_at);
        let opening = if seed.quantity > 0 {
            let meta = MovementMeta::new(
                IMPORT_REFERENCE,
                seed.source.clone(),
                seed.actor.clone(),
                seed.occurred_at,
            );
            let request = MovementRequest::adjust(seed.item_key.as_str(), seed.quantity, meta)
                .map_err(map_domain_error)?;
            entry.apply(&request).map_err(map_domain_error)?;
            Some(request)
        } else {
            None
        };

        #[cfg(test)]
        self.fault.trip()?;

        state.entries.insert(seed.item_key.clone(), entry);
        if let Some(request) = opening {
            let id = state.next_id();
            state.movements.push(request.into_record(id));
        }

        Ok(SeedOutcome::Created)
    }

    async fn get_entry(&self, item_key: &ItemKey) -> Result<Option<StockEntry>, StoreError> {
        let state = self.state.read().map_err(|_| Self::poisoned())?;
        Ok(state.entries.get(item_key).cloned())
    }

    async fn list_stock(&self, filter: Option<&str>) -> Result<Vec<StockEntry>, StoreError> {
        let state = self.state.read().map_err(|_| Self::poisoned())?;
        Ok(state
            .entries
            .values()
            .filter(|e| filter.is_none_or(|f| e.item_key.matches_filter(f)))
            .cloned()
            .collect())
    }

    async fn list_movements(&self, query: &MovementQuery) -> Result<Vec<MovementRecord>, StoreError> {
        let state = self.state.read().map_err(|_| Self::poisoned())?;

        let mut out: Vec<MovementRecord> = state
            .movements
            .iter()
            .filter(|m| query.item_key.as_ref().is_none_or(|k| &m.item_key == k))
            .cloned()
            .collect();

        // Stable sorts keep insertion order among equal timestamps.
        match query.order {
            MovementOrder::Ascending => out.sort_by(|a, b| a.occurred_at.cmp(&b.occurred_at)),
            MovementOrder::Descending => out.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at)),
        }

        if let Some(limit) = query.limit {
            out.truncate(limit as usize);
        }
        Ok(out)
    }

    async fn load_state(&self) -> Result<LedgerState, StoreError> {
        let state = self.state.read().map_err(|_| Self::poisoned())?;
        let mut movements = state.movements.clone();
        movements.sort_by(|a, b| a.occurred_at.cmp(&b.occurred_at));
        Ok(LedgerState {
            entries: state.entries.values().cloned().collect(),
            movements,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use mekgoro_core::ActorId;

    fn meta(actor: &str) -> MovementMeta {
        MovementMeta::new(
            "DN-101",
            "SupplierX",
            ActorId::from(actor),
            Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn rejected_dispatch_leaves_no_trace() {
        let store = InMemoryLedgerStore::new();
        let req = MovementRequest::dispatch("Cement 50kg", 5, meta("Tshepo")).unwrap();

        let err = store.apply_movement(&req).await.unwrap_err();
        assert_eq!(err, StoreError::InsufficientStock { available: 0 });

        // The lazily-opened entry must not survive a rejected movement.
        assert!(store.list_stock(None).await.unwrap().is_empty());
        assert!(store.list_movements(&MovementQuery::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn movement_ids_increase_in_commit_order() {
        let store = InMemoryLedgerStore::new();
        for qty in [10, 20, 30] {
            let req = MovementRequest::receive("Sand (m3)", qty, meta("Ndule")).unwrap();
            store.apply_movement(&req).await.unwrap();
        }

        let all = store
            .list_movements(&MovementQuery::default().with_order(MovementOrder::Ascending))
            .await
            .unwrap();
        let ids: Vec<u64> = all.iter().map(|m| m.id.value()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn injected_fault_discards_staged_entry() {
        let store = InMemoryLedgerStore::new();
        let req = MovementRequest::receive("Stone (m3)", 8, meta("Ndule")).unwrap();

        store.fault.arm();
        assert!(matches!(store.apply_movement(&req).await, Err(StoreError::Backend(_))));
        assert!(store.get_entry(req.item_key()).await.unwrap().is_none());

        // The switch is one-shot.
        assert_eq!(store.apply_movement(&req).await.unwrap().quantity, 8);
    }
}
