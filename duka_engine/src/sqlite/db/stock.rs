//! Stock record mutations.
//!
//! Each function issues its write first. `reserve`, `release` and `fulfill` are single guarded `UPDATE`s. Adjustments
//! and transfers lock the record with a no-op `UPDATE … RETURNING *`, compute the new counters, and write them back.
use log::*;
use sqlx::SqliteConnection;

use super::is_foreign_key_violation;
use crate::{
    db_types::{Allocation, MovementCause, OrderId, Sku, StockMovement, StockRecord, WarehouseCode, WarehouseStock},
    traits::StockError,
};

pub async fn fetch_stock_record(
    warehouse: &WarehouseCode,
    sku: &Sku,
    conn: &mut SqliteConnection,
) -> Result<Option<StockRecord>, StockError> {
    let record = sqlx::query_as("SELECT * FROM stock_records WHERE warehouse = $1 AND sku = $2")
        .bind(warehouse)
        .bind(sku)
        .fetch_optional(conn)
        .await?;
    Ok(record)
}

/// Stock levels for the product in every warehouse, highest priority first, ties broken by warehouse code.
pub async fn fetch_stock_levels(sku: &Sku, conn: &mut SqliteConnection) -> Result<Vec<WarehouseStock>, StockError> {
    let levels = sqlx::query_as(
        r#"
        SELECT
            s.warehouse AS warehouse,
            w.priority AS priority,
            w.is_active AS is_active,
            s.sku AS sku,
            s.quantity AS quantity,
            s.reserved AS reserved,
            s.damaged AS damaged
        FROM stock_records s JOIN warehouses w ON w.code = s.warehouse
        WHERE s.sku = $1
        ORDER BY w.priority DESC, s.warehouse ASC
        "#,
    )
    .bind(sku)
    .fetch_all(conn)
    .await?;
    Ok(levels)
}

fn check_quantity(quantity: i64) -> Result<(), StockError> {
    if quantity <= 0 {
        return Err(StockError::InvalidQuantity(format!("{quantity}. Quantities must be positive")));
    }
    Ok(())
}

fn record_not_found(allocation: &Allocation) -> StockError {
    StockError::StockRecordNotFound { warehouse: allocation.warehouse.clone(), sku: allocation.sku.clone() }
}

pub async fn reserve(allocation: &Allocation, conn: &mut SqliteConnection) -> Result<StockRecord, StockError> {
    check_quantity(allocation.quantity)?;
    let record: Option<StockRecord> = sqlx::query_as(
        r#"
        UPDATE stock_records SET reserved = reserved + $1, updated_at = CURRENT_TIMESTAMP
        WHERE warehouse = $2 AND sku = $3 AND quantity - reserved - damaged >= $1
        RETURNING *
        "#,
    )
    .bind(allocation.quantity)
    .bind(&allocation.warehouse)
    .bind(&allocation.sku)
    .fetch_optional(&mut *conn)
    .await?;
    match record {
        Some(record) => {
            trace!(
                "📦️ Reserved {} x {} in {}. {} left available",
                allocation.quantity,
                allocation.sku,
                allocation.warehouse,
                record.available()
            );
            Ok(record)
        },
        None => {
            let available =
                fetch_stock_record(&allocation.warehouse, &allocation.sku, conn).await?.map(|r| r.available());
            let available = available.unwrap_or_default();
            debug!(
                "📦️ Cannot reserve {} x {} in {}. Only {available} available",
                allocation.quantity, allocation.sku, allocation.warehouse
            );
            Err(StockError::InsufficientStock {
                sku: allocation.sku.clone(),
                requested: allocation.quantity,
                available,
            })
        },
    }
}

/// Decrements `reserved` by `min(quantity, reserved)`.
pub async fn release(allocation: &Allocation, conn: &mut SqliteConnection) -> Result<StockRecord, StockError> {
    check_quantity(allocation.quantity)?;
    let record: Option<StockRecord> = sqlx::query_as(
        r#"
        UPDATE stock_records SET reserved = reserved - MIN($1, reserved), updated_at = CURRENT_TIMESTAMP
        WHERE warehouse = $2 AND sku = $3
        RETURNING *
        "#,
    )
    .bind(allocation.quantity)
    .bind(&allocation.warehouse)
    .bind(&allocation.sku)
    .fetch_optional(conn)
    .await?;
    match record {
        Some(record) => {
            trace!("📦️ Released up to {} x {} in {}", allocation.quantity, allocation.sku, allocation.warehouse);
            Ok(record)
        },
        None => Err(record_not_found(allocation)),
    }
}

/// Removes `quantity` reserved units from stock and records the movement with the given cause.
pub async fn fulfill(
    allocation: &Allocation,
    cause: MovementCause,
    order_id: Option<&OrderId>,
    conn: &mut SqliteConnection,
) -> Result<(StockRecord, StockMovement), StockError> {
    check_quantity(allocation.quantity)?;
    let record: Option<StockRecord> = sqlx::query_as(
        r#"
        UPDATE stock_records SET
            reserved = reserved - $1,
            quantity = quantity - $1,
            updated_at = CURRENT_TIMESTAMP
        WHERE warehouse = $2 AND sku = $3 AND reserved >= $1
        RETURNING *
        "#,
    )
    .bind(allocation.quantity)
    .bind(&allocation.warehouse)
    .bind(&allocation.sku)
    .fetch_optional(&mut *conn)
    .await?;
    let record = match record {
        Some(r) => r,
        None => {
            return match fetch_stock_record(&allocation.warehouse, &allocation.sku, conn).await? {
                Some(r) => Err(StockError::InvalidQuantity(format!(
                    "cannot fulfil {} x {} from {}. Only {} are reserved",
                    allocation.quantity, allocation.sku, allocation.warehouse, r.reserved
                ))),
                None => Err(record_not_found(allocation)),
            };
        },
    };
    let before = record.quantity + allocation.quantity;
    let movement = insert_movement(&record, cause, before, order_id, None, conn).await?;
    debug!("📦️ {} x {} left {} ({cause})", allocation.quantity, allocation.sku, allocation.warehouse);
    Ok((record, movement))
}

/// Takes the write lock on a stock record and returns its current state.
async fn lock_stock_record(
    warehouse: &WarehouseCode,
    sku: &Sku,
    conn: &mut SqliteConnection,
) -> Result<Option<StockRecord>, StockError> {
    let record = sqlx::query_as(
        "UPDATE stock_records SET updated_at = CURRENT_TIMESTAMP WHERE warehouse = $1 AND sku = $2 RETURNING *",
    )
    .bind(warehouse)
    .bind(sku)
    .fetch_optional(conn)
    .await?;
    Ok(record)
}

/// As [`lock_stock_record`], but creates an empty record if there is none.
async fn lock_or_create_stock_record(
    warehouse: &WarehouseCode,
    sku: &Sku,
    conn: &mut SqliteConnection,
) -> Result<StockRecord, StockError> {
    let result = sqlx::query_as(
        r#"
        INSERT INTO stock_records (warehouse, sku) VALUES ($1, $2)
        ON CONFLICT (warehouse, sku) DO UPDATE SET updated_at = CURRENT_TIMESTAMP
        RETURNING *
        "#,
    )
    .bind(warehouse)
    .bind(sku)
    .fetch_one(conn)
    .await;
    match result {
        Ok(record) => Ok(record),
        Err(e) if is_foreign_key_violation(&e) => Err(StockError::WarehouseNotFound(warehouse.clone())),
        Err(e) => Err(e.into()),
    }
}

/// New `(quantity, reserved, damaged)` counters after an adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdjustedCounters {
    pub quantity: i64,
    pub reserved: i64,
    pub damaged: i64,
}

impl AdjustedCounters {
    /// True if the adjustment had to reduce `damaged` to keep the record consistent.
    pub fn clamped(&self, before: &StockRecord, cause: MovementCause, delta: i64) -> bool {
        let expected_damaged = match cause {
            MovementCause::Damaged | MovementCause::WriteOff => before.damaged + delta,
            _ => before.damaged,
        };
        self.damaged < expected_damaged
    }
}

/// Computes the counters that result from applying `delta` with the given cause.
///
/// Reserved units belong to orders and are never touched here. An adjustment that would leave fewer unreserved
/// units than it needs fails with [`StockError::InvalidAdjustment`].
///
/// * `purchase`, `return`, `adjustment` and `transfer` change on-hand quantity. If on-hand drops below
///   `reserved + damaged`, `damaged` is reduced.
/// * `damaged` moves unreserved units into (positive delta) or out of (negative delta) the damaged counter. On-hand
///   is unchanged.
/// * `write_off` removes damaged units from stock. `delta` must be negative.
pub fn adjusted_counters(
    record: &StockRecord,
    cause: MovementCause,
    delta: i64,
) -> Result<AdjustedCounters, StockError> {
    let invalid =
        || StockError::InvalidAdjustment { warehouse: record.warehouse.clone(), sku: record.sku.clone(), delta };
    let reserved = record.reserved;
    match cause {
        MovementCause::Purchase | MovementCause::Return | MovementCause::Adjustment | MovementCause::Transfer => {
            let quantity = record.quantity + delta;
            if quantity < reserved {
                return Err(invalid());
            }
            let damaged = record.damaged.min(quantity - reserved);
            Ok(AdjustedCounters { quantity, reserved, damaged })
        },
        MovementCause::Damaged => {
            let damaged = record.damaged + delta;
            if damaged < 0 || damaged > record.quantity - reserved {
                return Err(invalid());
            }
            Ok(AdjustedCounters { quantity: record.quantity, reserved, damaged })
        },
        MovementCause::WriteOff => {
            let damaged = record.damaged + delta;
            if delta > 0 || damaged < 0 {
                return Err(invalid());
            }
            Ok(AdjustedCounters { quantity: record.quantity + delta, reserved, damaged })
        },
        cause => Err(StockError::InvalidCause(cause)),
    }
}

async fn write_counters(
    id: i64,
    counters: AdjustedCounters,
    conn: &mut SqliteConnection,
) -> Result<StockRecord, StockError> {
    let record = sqlx::query_as(
        r#"
        UPDATE stock_records SET quantity = $1, reserved = $2, damaged = $3, updated_at = CURRENT_TIMESTAMP
        WHERE id = $4
        RETURNING *
        "#,
    )
    .bind(counters.quantity)
    .bind(counters.reserved)
    .bind(counters.damaged)
    .bind(id)
    .fetch_one(conn)
    .await?;
    Ok(record)
}

/// Applies a stock adjustment and records the movement. Stock records are created on the first positive receipt.
pub async fn adjust(
    warehouse: &WarehouseCode,
    sku: &Sku,
    delta: i64,
    cause: MovementCause,
    notes: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<(StockRecord, StockMovement), StockError> {
    let creates_record = delta > 0 &&
        matches!(
            cause,
            MovementCause::Purchase | MovementCause::Return | MovementCause::Adjustment | MovementCause::Transfer
        );
    let before = if creates_record {
        lock_or_create_stock_record(warehouse, sku, conn).await?
    } else {
        lock_stock_record(warehouse, sku, conn)
            .await?
            .ok_or_else(|| StockError::StockRecordNotFound { warehouse: warehouse.clone(), sku: sku.clone() })?
    };
    let counters = adjusted_counters(&before, cause, delta)?;
    if counters.clamped(&before, cause, delta) {
        warn!(
            "📦️ Adjusting {sku} in {warehouse} by {delta} ({cause}) left fewer units than were damaged. \
             Damaged: {} -> {}",
            before.damaged, counters.damaged
        );
    }
    let record = write_counters(before.id, counters, conn).await?;
    let movement = insert_movement(&record, cause, before.quantity, None, notes, conn).await?;
    debug!("📦️ {sku} in {warehouse} adjusted by {delta} ({cause}). On hand: {}", record.quantity);
    Ok((record, movement))
}

/// Moves available units from one warehouse to another. Both records are written in the caller's transaction.
pub async fn transfer(
    from: &WarehouseCode,
    to: &WarehouseCode,
    sku: &Sku,
    quantity: i64,
    notes: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<(StockRecord, StockRecord), StockError> {
    check_quantity(quantity)?;
    if from == to {
        return Err(StockError::InvalidQuantity(format!("cannot transfer {sku} from {from} to itself")));
    }
    let source = lock_stock_record(from, sku, conn)
        .await?
        .ok_or_else(|| StockError::StockRecordNotFound { warehouse: from.clone(), sku: sku.clone() })?;
    if source.available() < quantity {
        let available = source.available();
        return Err(StockError::InsufficientStock { sku: sku.clone(), requested: quantity, available });
    }
    let destination = lock_or_create_stock_record(to, sku, conn).await?;
    let source_counters = AdjustedCounters {
        quantity: source.quantity - quantity,
        reserved: source.reserved,
        damaged: source.damaged,
    };
    let destination_counters = AdjustedCounters {
        quantity: destination.quantity + quantity,
        reserved: destination.reserved,
        damaged: destination.damaged,
    };
    let source_after = write_counters(source.id, source_counters, conn).await?;
    let destination_after = write_counters(destination.id, destination_counters, conn).await?;
    let out_notes = notes.map(String::from).unwrap_or_else(|| format!("Transfer to {to}"));
    let in_notes = notes.map(String::from).unwrap_or_else(|| format!("Transfer from {from}"));
    insert_movement(&source_after, MovementCause::Transfer, source.quantity, None, Some(&out_notes), conn).await?;
    insert_movement(&destination_after, MovementCause::Transfer, destination.quantity, None, Some(&in_notes), conn)
        .await?;
    info!("📦️ Transferred {quantity} x {sku} from {from} to {to}");
    Ok((source_after, destination_after))
}

pub async fn set_reorder_point(
    warehouse: &WarehouseCode,
    sku: &Sku,
    reorder_point: i64,
    conn: &mut SqliteConnection,
) -> Result<StockRecord, StockError> {
    if reorder_point < 0 {
        return Err(StockError::InvalidQuantity(format!("{reorder_point} is not a valid reorder point")));
    }
    let record: Option<StockRecord> = sqlx::query_as(
        r#"
        UPDATE stock_records SET reorder_point = $1, updated_at = CURRENT_TIMESTAMP
        WHERE warehouse = $2 AND sku = $3
        RETURNING *
        "#,
    )
    .bind(reorder_point)
    .bind(warehouse)
    .bind(sku)
    .fetch_optional(conn)
    .await?;
    record.ok_or_else(|| StockError::StockRecordNotFound { warehouse: warehouse.clone(), sku: sku.clone() })
}

/// Appends an entry to the movement log. `record` is the state after the change.
pub async fn insert_movement(
    record: &StockRecord,
    cause: MovementCause,
    quantity_before: i64,
    order_id: Option<&OrderId>,
    notes: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<StockMovement, StockError> {
    let movement = sqlx::query_as(
        r#"
        INSERT INTO stock_movements (
            warehouse,
            sku,
            cause,
            quantity_before,
            quantity_after,
            delta,
            reserved_after,
            damaged_after,
            order_id,
            notes
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(&record.warehouse)
    .bind(&record.sku)
    .bind(cause)
    .bind(quantity_before)
    .bind(record.quantity)
    .bind(record.quantity - quantity_before)
    .bind(record.reserved)
    .bind(record.damaged)
    .bind(order_id)
    .bind(notes)
    .fetch_one(conn)
    .await?;
    Ok(movement)
}

pub async fn fetch_movements(
    warehouse: &WarehouseCode,
    sku: &Sku,
    conn: &mut SqliteConnection,
) -> Result<Vec<StockMovement>, StockError> {
    let movements = sqlx::query_as("SELECT * FROM stock_movements WHERE warehouse = $1 AND sku = $2 ORDER BY id")
        .bind(warehouse)
        .bind(sku)
        .fetch_all(conn)
        .await?;
    Ok(movements)
}

pub async fn fetch_movements_for_order(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Vec<StockMovement>, StockError> {
    let movements = sqlx::query_as("SELECT * FROM stock_movements WHERE order_id = $1 ORDER BY id")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(movements)
}

#[cfg(test)]
mod test {
    use chrono::Utc;

    use super::*;

    fn record(quantity: i64, reserved: i64, damaged: i64) -> StockRecord {
        StockRecord {
            id: 1,
            warehouse: "NBO-01".into(),
            sku: "TEA-500G".into(),
            quantity,
            reserved,
            damaged,
            reorder_point: 0,
            updated_at: Utc::now(),
        }
    }

    fn counters(quantity: i64, reserved: i64, damaged: i64) -> AdjustedCounters {
        AdjustedCounters { quantity, reserved, damaged }
    }

    #[test]
    fn receipts_and_corrections() {
        let r = record(10, 4, 2);
        assert_eq!(adjusted_counters(&r, MovementCause::Purchase, 5).unwrap(), counters(15, 4, 2));
        assert_eq!(adjusted_counters(&r, MovementCause::Adjustment, -4).unwrap(), counters(6, 4, 2));
        assert!(adjusted_counters(&r, MovementCause::Adjustment, -11).is_err());
    }

    #[test]
    fn shrinking_stock_clamps_damaged_but_never_reserved() {
        let r = record(10, 4, 2);
        let c = adjusted_counters(&r, MovementCause::Adjustment, -5).unwrap();
        assert_eq!(c, counters(5, 4, 1));
        assert!(c.clamped(&r, MovementCause::Adjustment, -5));
        let c = adjusted_counters(&r, MovementCause::Adjustment, -6).unwrap();
        assert_eq!(c, counters(4, 4, 0));
        let c = adjusted_counters(&r, MovementCause::Adjustment, -4).unwrap();
        assert!(!c.clamped(&r, MovementCause::Adjustment, -4));
        assert!(matches!(
            adjusted_counters(&r, MovementCause::Adjustment, -7),
            Err(StockError::InvalidAdjustment { delta: -7, .. })
        ));
    }

    #[test]
    fn damage_and_write_off() {
        let r = record(10, 4, 2);
        assert_eq!(adjusted_counters(&r, MovementCause::Damaged, 3).unwrap(), counters(10, 4, 5));
        assert_eq!(adjusted_counters(&r, MovementCause::Damaged, 4).unwrap(), counters(10, 4, 6));
        // Reserved units cannot be marked as damaged
        assert!(adjusted_counters(&r, MovementCause::Damaged, 5).is_err());
        assert_eq!(adjusted_counters(&r, MovementCause::Damaged, -2).unwrap(), counters(10, 4, 0));
        assert!(adjusted_counters(&r, MovementCause::Damaged, -3).is_err());
        assert_eq!(adjusted_counters(&r, MovementCause::WriteOff, -2).unwrap(), counters(8, 4, 0));
        assert!(adjusted_counters(&r, MovementCause::WriteOff, -3).is_err());
        assert!(adjusted_counters(&r, MovementCause::WriteOff, 1).is_err());
    }

    #[test]
    fn ledger_causes_are_not_adjustments() {
        let r = record(10, 4, 2);
        assert!(matches!(
            adjusted_counters(&r, MovementCause::Sale, -1),
            Err(StockError::InvalidCause(MovementCause::Sale))
        ));
    }
}
