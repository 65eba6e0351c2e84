//! # SQLite database methods
//!
//! The "low-level" SQLite interactions live here as plain functions that accept a `&mut SqliteConnection`. Callers
//! get a connection from the pool, or open a transaction and pass `&mut tx`, without any other changes.
//!
//! Functions that change stock or settle payments issue their guarded `UPDATE` as the first statement, so that when
//! they run inside a transaction the write lock is taken before anything is read.
use std::{env, str::FromStr, time::Duration};

use log::*;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Error as SqlxError,
    SqlitePool,
};

pub mod callbacks;
pub mod orders;
pub mod reservations;
pub mod stock;
pub mod transactions;
pub mod warehouses;

const SQLITE_DB_URL: &str = "sqlite://data/duka_store.db";
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

pub fn db_url() -> String {
    let result = env::var("DUKA_DATABASE_URL").unwrap_or_else(|_| {
        info!("🪛️ DUKA_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("🪛️ Using database URL: {result}");
    result
}

/// Opens a connection pool. Writers wait up to 10 seconds for the database lock rather than failing immediately.
pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(BUSY_TIMEOUT);
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;
    Ok(pool)
}

/// True if the error is a unique constraint violation
pub(crate) fn is_unique_violation(e: &SqlxError) -> bool {
    matches!(e, SqlxError::Database(db) if db.is_unique_violation())
}

/// True if the error is a foreign key violation
pub(crate) fn is_foreign_key_violation(e: &SqlxError) -> bool {
    matches!(e, SqlxError::Database(db) if db.is_foreign_key_violation())
}
