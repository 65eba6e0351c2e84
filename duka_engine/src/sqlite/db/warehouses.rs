use log::*;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewWarehouse, Warehouse, WarehouseCode},
    traits::StockError,
};

pub async fn upsert_warehouse(warehouse: NewWarehouse, conn: &mut SqliteConnection) -> Result<Warehouse, StockError> {
    let result: Warehouse = sqlx::query_as(
        r#"
        INSERT INTO warehouses (code, name, priority, is_active) VALUES ($1, $2, $3, $4)
        ON CONFLICT (code) DO UPDATE SET
            name = excluded.name,
            priority = excluded.priority,
            is_active = excluded.is_active,
            updated_at = CURRENT_TIMESTAMP
        RETURNING *
        "#,
    )
    .bind(&warehouse.code)
    .bind(&warehouse.name)
    .bind(warehouse.priority)
    .bind(warehouse.is_active)
    .fetch_one(conn)
    .await?;
    debug!("📦️ Warehouse {} saved (priority {}, active: {})", result.code, result.priority, result.is_active);
    Ok(result)
}

pub async fn fetch_warehouse(
    code: &WarehouseCode,
    conn: &mut SqliteConnection,
) -> Result<Option<Warehouse>, StockError> {
    let result = sqlx::query_as("SELECT * FROM warehouses WHERE code = $1").bind(code).fetch_optional(conn).await?;
    Ok(result)
}

/// All warehouses, highest priority first
pub async fn fetch_warehouses(conn: &mut SqliteConnection) -> Result<Vec<Warehouse>, StockError> {
    let result = sqlx::query_as("SELECT * FROM warehouses ORDER BY priority DESC, code ASC").fetch_all(conn).await?;
    Ok(result)
}
