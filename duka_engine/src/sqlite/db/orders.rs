use chrono::{DateTime, Utc};
use duka_common::Money;
use log::*;
use sqlx::{QueryBuilder, SqliteConnection};

use super::{is_unique_violation, reservations};
use crate::{
    db_types::{
        NewOrder,
        Order,
        OrderId,
        OrderItem,
        OrderStatusHistory,
        OrderStatusType,
        PaymentStatusType,
        ReservationStatus,
        StatusChange,
        StatusUpdate,
    },
    engine_api::errors::OrderFlowError,
    traits::OrderQueryFilter,
};

/// Inserts the order, its items and the creation history entry. This is not atomic on its own; call it inside a
/// transaction.
pub async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, OrderFlowError> {
    let total = order.total_price();
    let result = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_id,
                customer_id,
                total_price,
                currency,
                shipping_address,
                billing_address,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING *;
        "#,
    )
    .bind(&order.order_id)
    .bind(&order.customer_id)
    .bind(total)
    .bind(&order.currency)
    .bind(&order.shipping_address)
    .bind(&order.billing_address)
    .bind(order.created_at)
    .fetch_one(&mut *conn)
    .await;
    let inserted: Order = match result {
        Ok(o) => o,
        Err(e) if is_unique_violation(&e) => return Err(OrderFlowError::OrderAlreadyExists(order.order_id)),
        Err(e) => return Err(e.into()),
    };
    if !order.items.is_empty() {
        let mut builder = QueryBuilder::new("INSERT INTO order_items (order_id, sku, quantity, unit_price) ");
        builder.push_values(order.items.iter(), |mut row, item| {
            row.push_bind(&order.order_id).push_bind(&item.sku).push_bind(item.quantity).push_bind(item.unit_price);
        });
        builder.build().execute(&mut *conn).await?;
    }
    insert_history(&inserted.order_id, None, OrderStatusType::Pending, "checkout", None, conn).await?;
    debug!("🧾️ Order {} inserted with id {} and {} items", inserted.order_id, inserted.id, order.items.len());
    Ok(inserted)
}

pub async fn fetch_order(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE order_id = $1").bind(order_id).fetch_optional(conn).await
}

pub async fn fetch_order_items(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Vec<OrderItem>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM order_items WHERE order_id = $1 ORDER BY id").bind(order_id).fetch_all(conn).await
}

pub async fn fetch_status_history(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Vec<OrderStatusHistory>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM order_status_history WHERE order_id = $1 ORDER BY id")
        .bind(order_id)
        .fetch_all(conn)
        .await
}

async fn insert_history(
    order_id: &OrderId,
    old_status: Option<OrderStatusType>,
    new_status: OrderStatusType,
    actor: &str,
    notes: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO order_status_history (order_id, old_status, new_status, actor, notes) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(order_id)
    .bind(old_status)
    .bind(new_status)
    .bind(actor)
    .bind(notes)
    .execute(conn)
    .await?;
    Ok(())
}

/// Compare-and-swap on the order status, followed by the history entry. Returns `None` if the order is not in
/// `change.from`.
pub async fn update_order_status(
    change: &StatusChange,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order: Option<Order> = sqlx::query_as(
        r#"
        UPDATE orders SET status = $1, previous_status = $2, updated_at = CURRENT_TIMESTAMP
        WHERE order_id = $3 AND status = $4
        RETURNING *
        "#,
    )
    .bind(change.to)
    .bind(change.previous_status)
    .bind(&change.order_id)
    .bind(change.from)
    .fetch_optional(&mut *conn)
    .await?;
    if order.is_some() {
        insert_history(&change.order_id, Some(change.from), change.to, &change.actor, change.notes.as_deref(), conn)
            .await?;
        trace!("🧾️ Order {} moved from {} to {}", change.order_id, change.from, change.to);
    }
    Ok(order)
}

/// Applies the status change together with its side effects. Cancelling releases every reservation still held for the
/// order, shipping fulfils them, and a refund moves a `paid` payment status to `refunded`. This is not atomic on its
/// own; call it inside a transaction so that a failed side effect undoes the status change too.
pub async fn apply_status_change(
    change: &StatusChange,
    conn: &mut SqliteConnection,
) -> Result<Option<StatusUpdate>, OrderFlowError> {
    let Some(order) = update_order_status(change, conn).await? else {
        return Ok(None);
    };
    let mut update = StatusUpdate { order, released: Vec::new(), fulfilled: Vec::new() };
    let order_id = &change.order_id;
    match change.to {
        OrderStatusType::Cancelled | OrderStatusType::Shipped => {
            let held = reservations::fetch_reservations_for_order(order_id, conn)
                .await?
                .into_iter()
                .filter(|r| r.status == ReservationStatus::Reserved);
            for reservation in held {
                if change.to == OrderStatusType::Cancelled {
                    if let Some((r, _)) = reservations::release_reservation(reservation.id, conn).await? {
                        update.released.push(r);
                    }
                } else if let Some(fulfilled) = reservations::fulfill_reservation(reservation.id, conn).await? {
                    update.fulfilled.push(fulfilled);
                }
            }
        },
        OrderStatusType::Refunded => {
            let (paid, refunded) = (PaymentStatusType::Paid, PaymentStatusType::Refunded);
            if let Some(order) = set_payment_status(order_id, paid, refunded, conn).await? {
                update.order = order;
            }
        },
        _ => {},
    }
    Ok(Some(update))
}

/// Sets the payment reference if the order does not have one yet.
pub async fn fill_payment_reference(
    order_id: &OrderId,
    reference: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as(
        r#"
        UPDATE orders SET payment_reference = $1, updated_at = CURRENT_TIMESTAMP
        WHERE order_id = $2 AND payment_reference IS NULL
        RETURNING *
        "#,
    )
    .bind(reference)
    .bind(order_id)
    .fetch_optional(conn)
    .await
}

pub async fn mark_order_paid(
    order_id: &OrderId,
    receipt: Option<&str>,
    paid_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as(
        r#"
        UPDATE orders SET
            payment_status = 'paid',
            payment_reference = COALESCE($1, payment_reference),
            paid_at = $2,
            updated_at = CURRENT_TIMESTAMP
        WHERE order_id = $3 AND payment_status NOT IN ('paid', 'refunded')
        RETURNING *
        "#,
    )
    .bind(receipt)
    .bind(paid_at)
    .bind(order_id)
    .fetch_optional(conn)
    .await
}

pub async fn set_payment_status(
    order_id: &OrderId,
    from: PaymentStatusType,
    to: PaymentStatusType,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as(
        r#"
        UPDATE orders SET payment_status = $1, updated_at = CURRENT_TIMESTAMP
        WHERE order_id = $2 AND payment_status = $3
        RETURNING *
        "#,
    )
    .bind(to)
    .bind(order_id)
    .bind(from)
    .fetch_optional(conn)
    .await
}

pub async fn total_paid(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Money, sqlx::Error> {
    let total: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount), 0) FROM payment_transactions WHERE order_id = $1 AND status = 'completed'",
    )
    .bind(order_id)
    .fetch_one(conn)
    .await?;
    Ok(Money::from(total))
}

/// Fetches orders according to the criteria in the filter, oldest first.
pub async fn search_orders(query: OrderQueryFilter, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let mut builder = QueryBuilder::new("SELECT * FROM orders ");
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(customer_id) = query.customer_id {
        where_clause.push("customer_id = ");
        where_clause.push_bind_unseparated(customer_id);
    }
    if !query.statuses.is_empty() {
        where_clause.push("status IN (");
        for (i, status) in query.statuses.into_iter().enumerate() {
            if i > 0 {
                where_clause.push_unseparated(", ");
            }
            where_clause.push_bind_unseparated(status);
        }
        where_clause.push_unseparated(")");
    }
    if !query.payment_statuses.is_empty() {
        where_clause.push("payment_status IN (");
        for (i, status) in query.payment_statuses.into_iter().enumerate() {
            if i > 0 {
                where_clause.push_unseparated(", ");
            }
            where_clause.push_bind_unseparated(status);
        }
        where_clause.push_unseparated(")");
    }
    if let Some(since) = query.since {
        where_clause.push("created_at >= ");
        where_clause.push_bind_unseparated(since);
    }
    if let Some(until) = query.until {
        where_clause.push("created_at <= ");
        where_clause.push_bind_unseparated(until);
    }
    builder.push(" ORDER BY created_at ASC, id ASC");
    trace!("🧾️ Executing query: {}", builder.sql());
    builder.build_query_as::<Order>().fetch_all(conn).await
}
