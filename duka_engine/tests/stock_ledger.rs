use duka_engine::{
    db_types::{Allocation, MovementCause, NewWarehouse, OrderId, StockAdjustment, StockTransfer},
    StockError,
};
use futures_util::future::join_all;

mod support;
use support::{ledger, prepare_test_env, stock_warehouse, tear_down};

fn alloc(warehouse: &str, sku: &str, quantity: i64) -> Allocation {
    Allocation { warehouse: warehouse.into(), sku: sku.into(), quantity }
}

#[tokio::test]
async fn reserve_and_release() {
    let db = prepare_test_env().await;
    stock_warehouse(&db, "NBO", 10, "TEA-500G", 10).await;
    let ledger = ledger(&db);

    let record = ledger.reserve(&alloc("NBO", "TEA-500G", 4)).await.unwrap();
    assert_eq!(record.quantity, 10);
    assert_eq!(record.reserved, 4);
    assert_eq!(record.available(), 6);

    let err = ledger.reserve(&alloc("NBO", "TEA-500G", 7)).await.unwrap_err();
    assert!(matches!(err, StockError::InsufficientStock { requested: 7, available: 6, .. }), "{err:?}");
    let record = ledger.stock_record(&"NBO".into(), &"TEA-500G".into()).await.unwrap().unwrap();
    assert_eq!(record.reserved, 4, "A failed reservation must leave the record unchanged");

    let record = ledger.release(&alloc("NBO", "TEA-500G", 4)).await.unwrap();
    assert_eq!(record.reserved, 0);
    assert_eq!(record.available(), 10);
    // Releasing more than is reserved never drives the counter negative
    let record = ledger.release(&alloc("NBO", "TEA-500G", 3)).await.unwrap();
    assert_eq!(record.reserved, 0);
    tear_down(db).await;
}

#[tokio::test]
async fn invalid_quantities_are_rejected() {
    let db = prepare_test_env().await;
    stock_warehouse(&db, "NBO", 10, "TEA-500G", 10).await;
    let ledger = ledger(&db);
    let err = ledger.reserve(&alloc("NBO", "TEA-500G", 0)).await.unwrap_err();
    assert!(matches!(err, StockError::InvalidQuantity(_)), "{err:?}");
    let err = ledger.reserve(&alloc("NBO", "TEA-500G", -3)).await.unwrap_err();
    assert!(matches!(err, StockError::InvalidQuantity(_)), "{err:?}");
    let err = ledger.reserve(&alloc("NBO", "COFFEE-1KG", 1)).await.unwrap_err();
    assert!(matches!(err, StockError::InsufficientStock { available: 0, .. }), "{err:?}");
    tear_down(db).await;
}

#[tokio::test]
async fn concurrent_reservations_never_oversell() {
    let db = prepare_test_env().await;
    stock_warehouse(&db, "NBO", 10, "TEA-500G", 10).await;
    let ledger = ledger(&db);
    let allocation = alloc("NBO", "TEA-500G", 1);
    let results = join_all((0..20).map(|_| ledger.reserve(&allocation))).await;
    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    let refused = results.iter().filter(|r| matches!(r, Err(StockError::InsufficientStock { .. }))).count();
    assert_eq!(succeeded, 10);
    assert_eq!(refused, 10);
    let record = ledger.stock_record(&"NBO".into(), &"TEA-500G".into()).await.unwrap().unwrap();
    assert_eq!(record.reserved, 10);
    assert_eq!(record.available(), 0);
    assert!(record.is_consistent());
    tear_down(db).await;
}

#[tokio::test]
async fn fulfil_consumes_reserved_stock() {
    let db = prepare_test_env().await;
    stock_warehouse(&db, "NBO", 10, "TEA-500G", 10).await;
    let ledger = ledger(&db);
    let order_id = OrderId::from("DK-00000042");
    ledger.reserve(&alloc("NBO", "TEA-500G", 3)).await.unwrap();
    let record = ledger.fulfill(&alloc("NBO", "TEA-500G", 3), Some(&order_id)).await.unwrap();
    assert_eq!(record.quantity, 7);
    assert_eq!(record.reserved, 0);
    // Nothing is reserved any more, so a second fulfilment must fail
    let err = ledger.fulfill(&alloc("NBO", "TEA-500G", 3), Some(&order_id)).await.unwrap_err();
    assert!(matches!(err, StockError::InvalidQuantity(_)), "{err:?}");

    let movements = ledger.movements_for_order(&order_id).await.unwrap();
    assert_eq!(movements.len(), 1);
    assert_eq!(movements[0].cause, MovementCause::Sale);
    assert_eq!(movements[0].delta, -3);
    assert_eq!(movements[0].quantity_before, 10);
    assert_eq!(movements[0].quantity_after, 7);
    tear_down(db).await;
}

#[tokio::test]
async fn adjustments_are_recorded_as_movements() {
    let db = prepare_test_env().await;
    stock_warehouse(&db, "NBO", 10, "TEA-500G", 20).await;
    let ledger = ledger(&db);

    let damaged = StockAdjustment::new("NBO", "TEA-500G", 2, MovementCause::Damaged).with_notes("Crushed in transit");
    let record = ledger.adjust(damaged).await.unwrap();
    assert_eq!(record.damaged, 2);
    assert_eq!(record.quantity, 20);
    assert_eq!(record.available(), 18);

    let record = ledger.adjust(StockAdjustment::new("NBO", "TEA-500G", -2, MovementCause::WriteOff)).await.unwrap();
    assert_eq!(record.quantity, 18);
    assert_eq!(record.damaged, 0);

    let record = ledger.adjust(StockAdjustment::new("NBO", "TEA-500G", -3, MovementCause::Adjustment)).await.unwrap();
    assert_eq!(record.quantity, 15);

    let err = ledger.adjust(StockAdjustment::new("NBO", "TEA-500G", 0, MovementCause::Adjustment)).await.unwrap_err();
    assert!(matches!(err, StockError::InvalidQuantity(_)), "{err:?}");
    let err = ledger.adjust(StockAdjustment::new("NBO", "TEA-500G", -20, MovementCause::Adjustment)).await.unwrap_err();
    assert!(matches!(err, StockError::InvalidAdjustment { delta: -20, .. }), "{err:?}");
    let err = ledger.adjust(StockAdjustment::new("NBO", "TEA-500G", 1, MovementCause::Sale)).await.unwrap_err();
    assert!(matches!(err, StockError::InvalidCause(MovementCause::Sale)), "{err:?}");

    let movements = ledger.movements(&"NBO".into(), &"TEA-500G".into()).await.unwrap();
    let causes = movements.iter().map(|m| m.cause).collect::<Vec<_>>();
    assert_eq!(causes, vec![
        MovementCause::Purchase,
        MovementCause::Damaged,
        MovementCause::WriteOff,
        MovementCause::Adjustment
    ]);
    assert_eq!(movements[1].notes.as_deref(), Some("Crushed in transit"));
    assert_eq!(movements[3].quantity_before, 18);
    assert_eq!(movements[3].quantity_after, 15);
    tear_down(db).await;
}

#[tokio::test]
async fn adjustments_never_touch_reserved_units() {
    let db = prepare_test_env().await;
    stock_warehouse(&db, "NBO", 10, "TEA-500G", 10).await;
    let ledger = ledger(&db);
    ledger.reserve(&alloc("NBO", "TEA-500G", 6)).await.unwrap();
    let err = ledger.adjust(StockAdjustment::new("NBO", "TEA-500G", -8, MovementCause::Adjustment)).await.unwrap_err();
    assert!(matches!(err, StockError::InvalidAdjustment { delta: -8, .. }), "{err:?}");
    let err = ledger.adjust(StockAdjustment::new("NBO", "TEA-500G", 5, MovementCause::Damaged)).await.unwrap_err();
    assert!(matches!(err, StockError::InvalidAdjustment { delta: 5, .. }), "{err:?}");
    let record = ledger.stock_record(&"NBO".into(), &"TEA-500G".into()).await.unwrap().unwrap();
    assert_eq!((record.quantity, record.reserved, record.damaged), (10, 6, 0));

    let record = ledger.adjust(StockAdjustment::new("NBO", "TEA-500G", -4, MovementCause::Adjustment)).await.unwrap();
    assert!(record.is_consistent(), "{record:?}");
    assert_eq!((record.quantity, record.reserved, record.available()), (6, 6, 0));
    let movements = ledger.movements(&"NBO".into(), &"TEA-500G".into()).await.unwrap();
    assert_eq!(movements.len(), 2);
    tear_down(db).await;
}

#[tokio::test]
async fn transfers_move_available_stock() {
    let db = prepare_test_env().await;
    stock_warehouse(&db, "NBO", 10, "TEA-500G", 10).await;
    stock_warehouse(&db, "MSA", 5, "TEA-500G", 0).await;
    let ledger = ledger(&db);
    ledger.reserve(&alloc("NBO", "TEA-500G", 4)).await.unwrap();
    let transfer = StockTransfer {
        from: "NBO".into(),
        to: "MSA".into(),
        sku: "TEA-500G".into(),
        quantity: 5,
        notes: Some("Coast restock".into()),
    };
    let (from, to) = ledger.transfer(transfer.clone()).await.unwrap();
    assert_eq!(from.quantity, 5);
    assert_eq!(from.reserved, 4);
    assert_eq!(to.quantity, 5);

    // Only one unit is still available in NBO
    let err = ledger.transfer(StockTransfer { quantity: 2, ..transfer }).await.unwrap_err();
    assert!(matches!(err, StockError::InsufficientStock { available: 1, .. }), "{err:?}");

    let msa = ledger.movements(&"MSA".into(), &"TEA-500G".into()).await.unwrap();
    assert_eq!(msa.len(), 1);
    assert_eq!(msa[0].cause, MovementCause::Transfer);
    assert_eq!(msa[0].delta, 5);
    tear_down(db).await;
}

#[tokio::test]
async fn inactive_warehouses_are_listed_but_not_selected() {
    let db = prepare_test_env().await;
    stock_warehouse(&db, "NBO", 10, "TEA-500G", 10).await;
    let ledger = ledger(&db);
    ledger.upsert_warehouse(NewWarehouse::new("KSM", "Kisumu", 1).inactive()).await.unwrap();
    let warehouses = ledger.warehouses().await.unwrap();
    assert_eq!(warehouses.len(), 2);
    let ksm = warehouses.iter().find(|w| w.code.as_str() == "KSM").unwrap();
    assert!(!ksm.is_active);
    let err = ledger.adjust(StockAdjustment::receipt("ELD", "TEA-500G", 3)).await.unwrap_err();
    assert!(matches!(err, StockError::WarehouseNotFound(_)), "{err:?}");
    tear_down(db).await;
}
