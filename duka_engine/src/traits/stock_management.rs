use thiserror::Error;

use crate::db_types::{
    Allocation,
    MovementCause,
    NewWarehouse,
    OrderId,
    Reservation,
    Sku,
    StockAdjustment,
    StockMovement,
    StockRecord,
    StockTransfer,
    Warehouse,
    WarehouseCode,
    WarehouseStock,
};

#[derive(Debug, Clone, Error)]
pub enum StockError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Warehouse {0} does not exist")]
    WarehouseNotFound(WarehouseCode),
    #[error("Warehouse {0} is not active")]
    WarehouseInactive(WarehouseCode),
    #[error("There is no stock record for {sku} in {warehouse}")]
    StockRecordNotFound { warehouse: WarehouseCode, sku: Sku },
    #[error("Insufficient stock for {sku}. Requested {requested}, but only {available} available")]
    InsufficientStock { sku: Sku, requested: i64, available: i64 },
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),
    #[error("Adjusting {sku} in {warehouse} by {delta} would leave negative stock or touch reserved units")]
    InvalidAdjustment { warehouse: WarehouseCode, sku: Sku, delta: i64 },
    #[error("'{0}' is not a valid cause for a manual stock adjustment")]
    InvalidCause(MovementCause),
    #[error("Reservation {0} does not exist")]
    ReservationNotFound(i64),
}

impl From<sqlx::Error> for StockError {
    fn from(e: sqlx::Error) -> Self {
        StockError::DatabaseError(e.to_string())
    }
}

/// The stock ledger storage contract.
///
/// Every method that changes a [`StockRecord`] does so atomically with respect to other callers on the same
/// `(warehouse, sku)` key, and never leaves `reserved + damaged > quantity`.
#[allow(async_fn_in_trait)]
pub trait StockManagement {
    /// Creates the warehouse, or updates its name, priority and active flag if the code already exists.
    async fn upsert_warehouse(&self, warehouse: NewWarehouse) -> Result<Warehouse, StockError>;

    async fn fetch_warehouses(&self) -> Result<Vec<Warehouse>, StockError>;

    async fn fetch_stock_record(&self, warehouse: &WarehouseCode, sku: &Sku) -> Result<Option<StockRecord>, StockError>;

    /// Stock levels for `sku` in every warehouse that holds a record for it, active or not.
    async fn fetch_stock_levels(&self, sku: &Sku) -> Result<Vec<WarehouseStock>, StockError>;

    /// Increments `reserved` by the allocation quantity, failing with [`StockError::InsufficientStock`] if fewer
    /// units are available. On-hand quantity does not change, so no movement is recorded.
    async fn reserve_stock(&self, allocation: &Allocation) -> Result<StockRecord, StockError>;

    /// Decrements `reserved` by `min(quantity, reserved)`.
    async fn release_stock(&self, allocation: &Allocation) -> Result<StockRecord, StockError>;

    /// Removes reserved units from stock. Records a `sale` movement.
    async fn fulfill_stock(
        &self,
        allocation: &Allocation,
        order_id: Option<&OrderId>,
    ) -> Result<StockRecord, StockError>;

    /// Reserves stock and records the reservation against the order in one transaction.
    async fn reserve_for_order(
        &self,
        order_id: &OrderId,
        allocation: &Allocation,
    ) -> Result<(Reservation, StockRecord), StockError>;

    /// Releases a reservation. Returns `None` if the reservation was already released or fulfilled.
    async fn release_reservation(&self, reservation_id: i64) -> Result<Option<(Reservation, StockRecord)>, StockError>;

    /// Fulfils a reservation. Returns `None` if the reservation was already released or fulfilled.
    async fn fulfill_reservation(&self, reservation_id: i64) -> Result<Option<(Reservation, StockRecord)>, StockError>;

    async fn fetch_reservations_for_order(&self, order_id: &OrderId) -> Result<Vec<Reservation>, StockError>;

    /// Applies a manual adjustment. See [`MovementCause`] for how each cause affects the counters.
    async fn adjust_stock(&self, adjustment: StockAdjustment) -> Result<StockRecord, StockError>;

    /// Moves available units between warehouses. Returns the `(from, to)` records after the move.
    async fn transfer_stock(&self, transfer: StockTransfer) -> Result<(StockRecord, StockRecord), StockError>;

    async fn set_reorder_point(
        &self,
        warehouse: &WarehouseCode,
        sku: &Sku,
        reorder_point: i64,
    ) -> Result<StockRecord, StockError>;

    /// The movement log for one stock record, oldest first.
    async fn fetch_movements(&self, warehouse: &WarehouseCode, sku: &Sku) -> Result<Vec<StockMovement>, StockError>;

    async fn fetch_movements_for_order(&self, order_id: &OrderId) -> Result<Vec<StockMovement>, StockError>;
}
