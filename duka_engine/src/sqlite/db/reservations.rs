use log::*;
use sqlx::SqliteConnection;

use super::stock;
use crate::{
    db_types::{Allocation, MovementCause, OrderId, Reservation, ReservationStatus, StockRecord},
    traits::StockError,
};

/// Reserves the stock, then records the reservation. Run inside a transaction so that both happen or neither does.
pub async fn reserve_for_order(
    order_id: &OrderId,
    allocation: &Allocation,
    conn: &mut SqliteConnection,
) -> Result<(Reservation, StockRecord), StockError> {
    let record = stock::reserve(allocation, conn).await?;
    let reservation: Reservation = sqlx::query_as(
        r#"
        INSERT INTO reservations (order_id, sku, warehouse, quantity) VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(order_id)
    .bind(&allocation.sku)
    .bind(&allocation.warehouse)
    .bind(allocation.quantity)
    .fetch_one(conn)
    .await?;
    debug!(
        "📦️ Reservation #{} holds {} x {} in {} for order {order_id}",
        reservation.id, reservation.quantity, reservation.sku, reservation.warehouse
    );
    Ok((reservation, record))
}

/// Moves the reservation from `reserved` to `status`. Returns `None` if it was not `reserved`.
async fn close_reservation(
    id: i64,
    status: ReservationStatus,
    conn: &mut SqliteConnection,
) -> Result<Option<Reservation>, StockError> {
    let reservation: Option<Reservation> = sqlx::query_as(
        r#"
        UPDATE reservations SET status = $1, updated_at = CURRENT_TIMESTAMP
        WHERE id = $2 AND status = 'reserved'
        RETURNING *
        "#,
    )
    .bind(status)
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    if reservation.is_none() && fetch_reservation(id, conn).await?.is_none() {
        return Err(StockError::ReservationNotFound(id));
    }
    Ok(reservation)
}

fn allocation_for(reservation: &Reservation) -> Allocation {
    Allocation {
        warehouse: reservation.warehouse.clone(),
        sku: reservation.sku.clone(),
        quantity: reservation.quantity,
    }
}

pub async fn release_reservation(
    id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<(Reservation, StockRecord)>, StockError> {
    let Some(reservation) = close_reservation(id, ReservationStatus::Released, conn).await? else {
        trace!("📦️ Reservation #{id} is no longer held. Nothing to release");
        return Ok(None);
    };
    let record = stock::release(&allocation_for(&reservation), conn).await?;
    let notes = format!("Reservation #{id} released");
    stock::insert_movement(
        &record,
        MovementCause::ReservationReleased,
        record.quantity,
        Some(&reservation.order_id),
        Some(&notes),
        conn,
    )
    .await?;
    debug!("📦️ Reservation #{id} for order {} released", reservation.order_id);
    Ok(Some((reservation, record)))
}

pub async fn fulfill_reservation(
    id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<(Reservation, StockRecord)>, StockError> {
    let Some(reservation) = close_reservation(id, ReservationStatus::Fulfilled, conn).await? else {
        trace!("📦️ Reservation #{id} is no longer held. Nothing to fulfil");
        return Ok(None);
    };
    let allocation = allocation_for(&reservation);
    let (record, _) =
        stock::fulfill(&allocation, MovementCause::ReservationFulfilled, Some(&reservation.order_id), conn).await?;
    debug!("📦️ Reservation #{id} for order {} fulfilled", reservation.order_id);
    Ok(Some((reservation, record)))
}

pub async fn fetch_reservation(id: i64, conn: &mut SqliteConnection) -> Result<Option<Reservation>, StockError> {
    let reservation = sqlx::query_as("SELECT * FROM reservations WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(reservation)
}

pub async fn fetch_reservations_for_order(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Vec<Reservation>, StockError> {
    let reservations = sqlx::query_as("SELECT * FROM reservations WHERE order_id = $1 ORDER BY id")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(reservations)
}
