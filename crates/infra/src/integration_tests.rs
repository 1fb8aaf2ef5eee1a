//! End-to-end ledger behaviour against both stores.
//!
//! Runs: request → LedgerService → LedgerStore → ledger + movement log
//!
//! Verifies:
//! - the reference receive/dispatch walkthrough
//! - quantity always equals the sum of logged deltas
//! - mid-transaction failures leave neither half applied
//! - history ordering, import idempotence, concurrent dispatch safety

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;

use mekgoro_core::{ActorId, ItemKey, LedgerError};
use mekgoro_inventory::{MovementKind, MovementMeta, MovementRequest};

use crate::service::{LedgerService, RetryPolicy};
use crate::store::{
    InMemoryLedgerStore, LedgerStore, MovementOrder, MovementQuery, SeedEntry, SeedOutcome, SqliteLedgerStore,
    StoreError,
};

fn at(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 8, minute, 0).unwrap()
}

fn meta(reference: &str, counterparty: &str, actor: &str, minute: u32) -> MovementMeta {
    MovementMeta::new(reference, counterparty, ActorId::from(actor), at(minute))
}

async fn sqlite_service() -> LedgerService<SqliteLedgerStore> {
    LedgerService::new(SqliteLedgerStore::in_memory().await.unwrap())
}

/// Receive 100, dispatch 30, refuse an oversized dispatch, read an unknown item.
async fn walkthrough<S: LedgerStore>(svc: &LedgerService<S>) {
    let receive = MovementRequest::receive("Cement 50kg", 100, meta("DN-101", "SupplierX", "Ndule", 0)).unwrap();
    assert_eq!(svc.apply_movement(receive).await.unwrap(), 100);

    let history = svc.list_movements(&MovementQuery::default()).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].delta, 100);
    assert_eq!(history[0].kind, MovementKind::Receive);

    let dispatch = MovementRequest::dispatch("Cement 50kg", 30, meta("PO-9", "SiteA", "Tshepo", 5)).unwrap();
    assert_eq!(svc.apply_movement(dispatch).await.unwrap(), 70);

    let ascending = svc
        .list_movements(&MovementQuery::default().with_order(MovementOrder::Ascending))
        .await
        .unwrap();
    let deltas: Vec<i64> = ascending.iter().map(|m| m.delta).collect();
    assert_eq!(deltas, vec![100, -30]);
    assert_eq!(ascending[1].actor.as_str(), "Tshepo");
    assert_eq!(ascending[1].counterparty, "SiteA");

    let too_much = MovementRequest::dispatch("Cement 50kg", 1000, meta("PO-10", "SiteA", "Tshepo", 6)).unwrap();
    let err = svc.apply_movement(too_much).await.unwrap_err();
    assert_eq!(err, LedgerError::insufficient_stock("Cement 50kg", 70, 1000));
    assert_eq!(svc.get_quantity("Cement 50kg").await.unwrap(), 70);
    assert_eq!(svc.list_movements(&MovementQuery::default()).await.unwrap().len(), 2);

    assert_eq!(svc.get_quantity("Unknown Item").await.unwrap(), 0);
    assert!(svc.verify().await.unwrap().is_empty());
}

#[tokio::test]
async fn walkthrough_in_memory() {
    walkthrough(&LedgerService::new(InMemoryLedgerStore::new())).await;
}

#[tokio::test]
async fn walkthrough_sqlite() {
    walkthrough(&sqlite_service().await).await;
}

async fn ties_keep_insertion_order<S: LedgerStore>(svc: &LedgerService<S>) {
    for (reference, qty) in [("DN-1", 5), ("DN-2", 6), ("DN-3", 7)] {
        let req = MovementRequest::receive("Sand (m3)", qty, meta(reference, "SupplierX", "Ndule", 10)).unwrap();
        svc.apply_movement(req).await.unwrap();
    }
    let later = MovementRequest::dispatch("Sand (m3)", 2, meta("PO-1", "SiteB", "Tshepo", 20)).unwrap();
    svc.apply_movement(later).await.unwrap();
    let earlier = MovementRequest::receive("Sand (m3)", 1, meta("DN-0", "SupplierX", "Ndule", 1)).unwrap();
    svc.apply_movement(earlier).await.unwrap();

    let newest_first: Vec<String> = svc
        .list_movements(&MovementQuery::default())
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.reference)
        .collect();
    assert_eq!(newest_first, vec!["PO-1", "DN-1", "DN-2", "DN-3", "DN-0"]);

    let window = svc.list_movements(&MovementQuery::latest(2)).await.unwrap();
    assert_eq!(window.len(), 2);
    assert_eq!(window[1].reference, "DN-1");

    let oldest_first: Vec<String> = svc
        .list_movements(&MovementQuery::default().with_order(MovementOrder::Ascending))
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.reference)
        .collect();
    assert_eq!(oldest_first, vec!["DN-0", "DN-1", "DN-2", "DN-3", "PO-1"]);
}

#[tokio::test]
async fn ties_keep_insertion_order_in_memory() {
    ties_keep_insertion_order(&LedgerService::new(InMemoryLedgerStore::new())).await;
}

#[tokio::test]
async fn ties_keep_insertion_order_sqlite() {
    ties_keep_insertion_order(&sqlite_service().await).await;
}

async fn history_filters_by_item<S: LedgerStore>(svc: &LedgerService<S>) {
    for item in ["Brick (Qty)", "Stone (m3)", "Brick (Qty)"] {
        let req = MovementRequest::receive(item, 10, meta("DN-5", "SupplierX", "Ndule", 3)).unwrap();
        svc.apply_movement(req).await.unwrap();
    }
    let bricks = svc
        .list_movements(&MovementQuery::default().for_item(ItemKey::parse("Brick (Qty)").unwrap()))
        .await
        .unwrap();
    assert_eq!(bricks.len(), 2);

    let stock: Vec<String> = svc
        .list_stock(Some("STONE"))
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.item_key.into_inner())
        .collect();
    assert_eq!(stock, vec!["Stone (m3)"]);
}

#[tokio::test]
async fn history_filters_by_item_in_memory() {
    history_filters_by_item(&LedgerService::new(InMemoryLedgerStore::new())).await;
}

#[tokio::test]
async fn history_filters_by_item_sqlite() {
    history_filters_by_item(&sqlite_service().await).await;
}

/// Movements at the edges of `i64` are refused and leave the store usable.
async fn extreme_deltas_are_refused<S: LedgerStore>(svc: &LedgerService<S>) {
    let receive = MovementRequest::receive("Cement 50kg", 100, meta("DN-101", "SupplierX", "Ndule", 0)).unwrap();
    svc.apply_movement(receive).await.unwrap();

    let err = MovementRequest::adjust("Cement 50kg", i64::MIN, meta("ST-1", "", "Ndule", 1)).unwrap_err();
    assert!(matches!(err, LedgerError::InvalidInput(_)));

    let overflow = MovementRequest::receive("Cement 50kg", i64::MAX, meta("DN-102", "SupplierX", "Ndule", 2)).unwrap();
    assert!(matches!(svc.apply_movement(overflow).await, Err(LedgerError::InvalidInput(_))));

    let drain = MovementRequest::adjust("Cement 50kg", -i64::MAX, meta("ST-2", "", "Ndule", 3)).unwrap();
    assert_eq!(
        svc.apply_movement(drain).await.unwrap_err(),
        LedgerError::insufficient_stock("Cement 50kg", 100, i64::MAX)
    );

    assert_eq!(svc.get_quantity("Cement 50kg").await.unwrap(), 100);
    assert_eq!(svc.list_movements(&MovementQuery::default()).await.unwrap().len(), 1);
    assert!(svc.verify().await.unwrap().is_empty());
}

#[tokio::test]
async fn extreme_deltas_are_refused_in_memory() {
    extreme_deltas_are_refused(&LedgerService::new(InMemoryLedgerStore::new())).await;
}

#[tokio::test]
async fn extreme_deltas_are_refused_sqlite() {
    extreme_deltas_are_refused(&sqlite_service().await).await;
}

const STOCK_SHEET: &[u8] = b"Item Description,Qty On Hand\nCement 50kg,40\nSand (m3),12.0\nStone (m3),0\nBrick (Qty),2.5\n";

async fn import_is_idempotent<S: LedgerStore>(svc: &LedgerService<S>) {
    // An entry that already exists must not be overwritten by the sheet.
    let receipt = MovementRequest::receive("Cement 50kg", 5, meta("DN-7", "SupplierX", "Ndule", 0)).unwrap();
    svc.apply_movement(receipt).await.unwrap();

    let actor = ActorId::from("Ndule");
    let first = svc
        .bulk_import(STOCK_SHEET, "legacy.xlsx", actor.clone(), at(30))
        .await
        .unwrap();
    assert_eq!(first.created, 2);
    assert_eq!(first.skipped_existing, 1);
    assert_eq!(first.rejected.len(), 1);

    let logged = svc.list_movements(&MovementQuery::default()).await.unwrap();
    // One receipt plus one opening adjustment for Sand; Stone opens at zero with no movement.
    assert_eq!(logged.len(), 2);
    assert_eq!(logged[0].reference, crate::store::IMPORT_REFERENCE);
    assert_eq!(logged[0].counterparty, "legacy.xlsx");

    let second = svc.bulk_import(STOCK_SHEET, "legacy.xlsx", actor, at(40)).await.unwrap();
    assert_eq!(second.created, 0);
    assert_eq!(second.skipped_existing, 3);

    assert_eq!(svc.get_quantity("Cement 50kg").await.unwrap(), 5);
    assert_eq!(svc.get_quantity("Sand (m3)").await.unwrap(), 12);
    assert_eq!(svc.get_quantity("Brick (Qty)").await.unwrap(), 0);
    assert!(svc.get_entry(&ItemKey::parse("Stone (m3)").unwrap()).await.unwrap().is_some());
    assert_eq!(svc.list_movements(&MovementQuery::default()).await.unwrap().len(), 2);
    assert!(svc.verify().await.unwrap().is_empty());
}

#[tokio::test]
async fn import_is_idempotent_in_memory() {
    import_is_idempotent(&LedgerService::new(InMemoryLedgerStore::new())).await;
}

#[tokio::test]
async fn import_is_idempotent_sqlite() {
    import_is_idempotent(&sqlite_service().await).await;
}

#[tokio::test]
async fn import_without_quantity_column_applies_nothing() {
    let svc = sqlite_service().await;
    let err = svc
        .bulk_import(b"description,unit\nCement 50kg,bag\n", "legacy.xlsx", ActorId::from("Ndule"), at(0))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::ImportFormat(_)));
    assert!(svc.list_stock(None).await.unwrap().is_empty());
}

fn opening_seed(quantity: i64) -> SeedEntry {
    SeedEntry {
        item_key: ItemKey::parse("Cement 50kg").unwrap(),
        quantity,
        source: "legacy.xlsx".to_string(),
        actor: ActorId::from("Ndule"),
        occurred_at: at(0),
    }
}

#[tokio::test]
async fn fault_between_upsert_and_append_applies_nothing_in_memory() {
    let store = InMemoryLedgerStore::new();
    let req = MovementRequest::receive("Cement 50kg", 100, meta("DN-101", "SupplierX", "Ndule", 0)).unwrap();
    store.apply_movement(&req).await.unwrap();

    store.fault.arm();
    let more = MovementRequest::dispatch("Cement 50kg", 30, meta("PO-9", "SiteA", "Tshepo", 1)).unwrap();
    assert!(matches!(store.apply_movement(&more).await, Err(StoreError::Backend(_))));

    let state = store.load_state().await.unwrap();
    assert_eq!(state.entries[0].quantity, 100);
    assert_eq!(state.movements.len(), 1);

    store.fault.arm();
    let other = SeedEntry {
        item_key: ItemKey::parse("Sand (m3)").unwrap(),
        ..opening_seed(12)
    };
    assert!(store.seed_entry(&other).await.is_err());
    assert!(store.get_entry(&other.item_key).await.unwrap().is_none());
}

#[tokio::test]
async fn fault_between_upsert_and_append_applies_nothing_sqlite() {
    let store = SqliteLedgerStore::in_memory().await.unwrap();
    let req = MovementRequest::receive("Cement 50kg", 100, meta("DN-101", "SupplierX", "Ndule", 0)).unwrap();
    store.apply_movement(&req).await.unwrap();

    store.fault.arm();
    let more = MovementRequest::dispatch("Cement 50kg", 30, meta("PO-9", "SiteA", "Tshepo", 1)).unwrap();
    assert!(matches!(store.apply_movement(&more).await, Err(StoreError::Backend(_))));

    let state = store.load_state().await.unwrap();
    assert_eq!(state.entries[0].quantity, 100);
    assert_eq!(state.movements.len(), 1);

    store.fault.arm();
    let other = SeedEntry {
        item_key: ItemKey::parse("Sand (m3)").unwrap(),
        ..opening_seed(12)
    };
    assert!(store.seed_entry(&other).await.is_err());
    assert!(store.get_entry(&other.item_key).await.unwrap().is_none());
    assert_eq!(store.seed_entry(&other).await.unwrap(), SeedOutcome::Created);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_dispatches_never_oversell() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("ledger.db").display());
    let store = SqliteLedgerStore::connect(&url).await.unwrap();
    let retry = RetryPolicy {
        max_retries: 20,
        backoff: Duration::from_millis(5),
    };
    let svc = Arc::new(LedgerService::with_retry(store, retry));

    let opening = MovementRequest::receive("Cement 50kg", 50, meta("DN-101", "SupplierX", "Ndule", 0)).unwrap();
    svc.apply_movement(opening).await.unwrap();

    let mut handles = Vec::new();
    for n in 0..80u32 {
        let svc = svc.clone();
        handles.push(tokio::spawn(async move {
            let reference = format!("PO-{n}");
            let req = MovementRequest::dispatch("Cement 50kg", 1, meta(&reference, "SiteA", "Tshepo", 1)).unwrap();
            svc.apply_movement(req).await
        }));
    }

    let mut dispatched = 0i64;
    let mut refused = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => dispatched += 1,
            Err(LedgerError::InsufficientStock { .. }) => refused += 1,
            Err(other) => panic!("unexpected failure: {other}"),
        }
    }

    assert_eq!(dispatched, 50);
    assert_eq!(refused, 30);
    assert_eq!(svc.get_quantity("Cement 50kg").await.unwrap(), 0);
    assert_eq!(svc.list_movements(&MovementQuery::default()).await.unwrap().len(), 51);
    assert!(svc.verify().await.unwrap().is_empty());
}

const ITEMS: [&str; 3] = ["Cement 50kg", "Sand (m3)", "Brick (Qty)"];

fn movement_strategy() -> impl Strategy<Value = Vec<(usize, i64)>> {
    let delta = prop_oneof![-60i64..=-1, 1i64..=60];
    prop::collection::vec((0..ITEMS.len(), delta), 1..40)
}

/// Apply random adjustments; rejected ones must leave no trace.
async fn replay_matches_ledger<S: LedgerStore>(svc: LedgerService<S>, ops: Vec<(usize, i64)>) -> Result<(), TestCaseError> {
    let mut expected = [0i64; ITEMS.len()];
    let mut accepted = 0usize;

    for (i, (item, delta)) in ops.into_iter().enumerate() {
        let req = MovementRequest::adjust(ITEMS[item], delta, meta("count", "", "Ndule", (i % 60) as u32)).unwrap();
        match svc.apply_movement(req).await {
            Ok(quantity) => {
                expected[item] += delta;
                accepted += 1;
                prop_assert_eq!(quantity, expected[item]);
            }
            Err(LedgerError::InsufficientStock { available, .. }) => {
                prop_assert!(expected[item] + delta < 0);
                prop_assert_eq!(available, expected[item]);
            }
            Err(other) => return Err(TestCaseError::fail(other.to_string())),
        }
    }

    for (item, want) in ITEMS.iter().zip(expected) {
        prop_assert_eq!(svc.get_quantity(item).await.unwrap(), want);
    }
    prop_assert_eq!(svc.list_movements(&MovementQuery::default()).await.unwrap().len(), accepted);
    prop_assert!(svc.verify().await.unwrap().is_empty());
    Ok(())
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

    #[test]
    fn in_memory_quantity_is_sum_of_logged_deltas(ops in movement_strategy()) {
        runtime().block_on(replay_matches_ledger(LedgerService::new(InMemoryLedgerStore::new()), ops))?;
    }
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 16, .. ProptestConfig::default() })]

    #[test]
    fn sqlite_quantity_is_sum_of_logged_deltas(ops in movement_strategy()) {
        let rt = runtime();
        let svc = rt.block_on(sqlite_service());
        rt.block_on(replay_matches_ledger(svc, ops))?;
    }
}
