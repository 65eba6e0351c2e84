use std::time::Duration;

use log::*;
use sqlx::SqliteConnection;

use crate::db_types::{NewPaymentTransaction, OrderId, PaymentTransaction, Settlement};

pub async fn insert_transaction(
    tx: NewPaymentTransaction,
    conn: &mut SqliteConnection,
) -> Result<PaymentTransaction, sqlx::Error> {
    let result: PaymentTransaction = sqlx::query_as(
        r#"
        INSERT INTO payment_transactions (order_id, payer_reference, amount, retry_count, parent_id, status)
        VALUES ($1, $2, $3, $4, $5, 'processing')
        RETURNING *
        "#,
    )
    .bind(&tx.order_id)
    .bind(&tx.payer_reference)
    .bind(tx.amount)
    .bind(tx.retry_count)
    .bind(tx.parent_id)
    .fetch_one(conn)
    .await?;
    debug!("💳️ Payment transaction #{} for {} created for order {}", result.id, result.amount, result.order_id);
    Ok(result)
}

/// Sets the correlation id, unless one is already set.
pub async fn assign_correlation_id(
    id: i64,
    correlation_id: &str,
    merchant_request_id: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentTransaction>, sqlx::Error> {
    sqlx::query_as(
        r#"
        UPDATE payment_transactions SET
            correlation_id = $1,
            merchant_request_id = $2,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = $3 AND correlation_id IS NULL
        RETURNING *
        "#,
    )
    .bind(correlation_id)
    .bind(merchant_request_id)
    .bind(id)
    .fetch_optional(conn)
    .await
}

pub async fn fetch_transaction(
    id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentTransaction>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM payment_transactions WHERE id = $1").bind(id).fetch_optional(conn).await
}

pub async fn fetch_transaction_by_correlation_id(
    correlation_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentTransaction>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM payment_transactions WHERE correlation_id = $1")
        .bind(correlation_id)
        .fetch_optional(conn)
        .await
}

pub async fn fetch_transactions_for_order(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Vec<PaymentTransaction>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM payment_transactions WHERE order_id = $1 ORDER BY id")
        .bind(order_id)
        .fetch_all(conn)
        .await
}

/// The settlement guard. Only a transaction that is still `processing` can be settled, so of two concurrent
/// settlements exactly one returns the updated row and the other gets `None`.
pub async fn settle_transaction(
    id: i64,
    settlement: &Settlement,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentTransaction>, sqlx::Error> {
    sqlx::query_as(
        r#"
        UPDATE payment_transactions SET
            status = $1,
            result_code = $2,
            result_desc = $3,
            receipt_number = $4,
            settled_at = CURRENT_TIMESTAMP,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = $5 AND status = 'processing'
        RETURNING *
        "#,
    )
    .bind(settlement.status)
    .bind(settlement.result_code)
    .bind(&settlement.result_desc)
    .bind(&settlement.receipt_number)
    .bind(id)
    .fetch_optional(conn)
    .await
}

pub async fn fill_receipt_number(
    id: i64,
    receipt: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentTransaction>, sqlx::Error> {
    sqlx::query_as(
        r#"
        UPDATE payment_transactions SET receipt_number = $1, updated_at = CURRENT_TIMESTAMP
        WHERE id = $2 AND status = 'completed' AND receipt_number IS NULL
        RETURNING *
        "#,
    )
    .bind(receipt)
    .bind(id)
    .fetch_optional(conn)
    .await
}

pub async fn mark_transaction_reversed(
    id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentTransaction>, sqlx::Error> {
    sqlx::query_as(
        r#"
        UPDATE payment_transactions SET status = 'reversed', updated_at = CURRENT_TIMESTAMP
        WHERE id = $1 AND status = 'completed'
        RETURNING *
        "#,
    )
    .bind(id)
    .fetch_optional(conn)
    .await
}

pub async fn fetch_stale_transactions(
    older_than: Duration,
    conn: &mut SqliteConnection,
) -> Result<Vec<PaymentTransaction>, sqlx::Error> {
    let seconds = i64::try_from(older_than.as_secs()).unwrap_or(i64::MAX);
    sqlx::query_as(
        r#"
        SELECT * FROM payment_transactions
        WHERE status = 'processing' AND unixepoch(CURRENT_TIMESTAMP) - unixepoch(created_at) >= $1
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(seconds)
    .fetch_all(conn)
    .await
}

pub async fn record_sweep_attempt(id: i64, conn: &mut SqliteConnection) -> Result<Option<i64>, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        UPDATE payment_transactions SET sweep_attempts = sweep_attempts + 1, updated_at = CURRENT_TIMESTAMP
        WHERE id = $1
        RETURNING sweep_attempts
        "#,
    )
    .bind(id)
    .fetch_optional(conn)
    .await
}

pub async fn count_live_transactions(
    order_id: &OrderId,
    excluding: Option<i64>,
    conn: &mut SqliteConnection,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM payment_transactions
        WHERE order_id = $1 AND status IN ('pending', 'processing') AND id != COALESCE($2, -1)
        "#,
    )
    .bind(order_id)
    .bind(excluding)
    .fetch_one(conn)
    .await
}
