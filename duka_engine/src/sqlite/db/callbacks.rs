use log::*;
use sqlx::SqliteConnection;

use super::is_unique_violation;
use crate::db_types::{CallbackEntry, CallbackOutcome, InsertCallbackResult, NewCallbackEntry};

/// Logs the callback, or returns the existing entry if the same outcome was logged before.
pub async fn record_callback(
    entry: NewCallbackEntry,
    conn: &mut SqliteConnection,
) -> Result<InsertCallbackResult, sqlx::Error> {
    let result = sqlx::query_as(
        r#"
        INSERT INTO callback_log (correlation_id, result_code, payload_hash, raw_payload, source)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(&entry.correlation_id)
    .bind(entry.result_code)
    .bind(&entry.payload_hash)
    .bind(&entry.raw_payload)
    .bind(entry.source)
    .fetch_one(&mut *conn)
    .await;
    match result {
        Ok(inserted) => Ok(InsertCallbackResult::Inserted(inserted)),
        Err(e) if is_unique_violation(&e) => {
            let existing: CallbackEntry = sqlx::query_as(
                r#"
                SELECT * FROM callback_log
                WHERE IFNULL(correlation_id, '') = IFNULL($1, '')
                  AND IFNULL(result_code, -1) = IFNULL($2, -1)
                  AND payload_hash = $3
                "#,
            )
            .bind(&entry.correlation_id)
            .bind(entry.result_code)
            .bind(&entry.payload_hash)
            .fetch_one(conn)
            .await?;
            trace!("📨️ Callback #{} has been seen before", existing.id);
            Ok(InsertCallbackResult::Existing(existing))
        },
        Err(e) => Err(e),
    }
}

/// Concurrent deliveries of one payload share a log entry, so the outcome written last is not necessarily the one
/// that took effect. Final outcomes are never overwritten, except by `applied`, which only the delivery that settled
/// the transaction can write.
pub async fn update_callback_outcome(
    id: i64,
    outcome: CallbackOutcome,
    error: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE callback_log SET outcome = $1, error = $2, updated_at = CURRENT_TIMESTAMP
        WHERE id = $3 AND ($1 = 'applied' OR outcome NOT IN ('applied', 'already_processed', 'pending', 'malformed'))
        "#,
    )
    .bind(outcome)
    .bind(error)
    .bind(id)
    .execute(conn)
    .await?;
    let written = result.rows_affected() > 0;
    if !written {
        trace!("📨️ Callback #{id} already has a final outcome. {outcome:?} not recorded");
    }
    Ok(written)
}

pub async fn fetch_callbacks(
    correlation_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<CallbackEntry>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM callback_log WHERE correlation_id = $1 ORDER BY id")
        .bind(correlation_id)
        .fetch_all(conn)
        .await
}

pub async fn fetch_unresolved_callbacks(conn: &mut SqliteConnection) -> Result<Vec<CallbackEntry>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM callback_log WHERE outcome IN ('unmatched', 'malformed', 'error') ORDER BY id")
        .fetch_all(conn)
        .await
}
