//! `SqliteDatabase` is the SQLite implementation of the engine's storage traits.
use std::{fmt::Debug, time::Duration};

use chrono::{DateTime, Utc};
use duka_common::Money;
use log::*;
use sqlx::{migrate::MigrateError, SqlitePool};

use super::db::{callbacks, db_url, new_pool, orders, reservations, stock, transactions, warehouses};
use crate::{
    db_types::{
        Allocation,
        CallbackEntry,
        CallbackOutcome,
        InsertCallbackResult,
        MovementCause,
        NewCallbackEntry,
        NewOrder,
        NewPaymentTransaction,
        NewWarehouse,
        Order,
        OrderId,
        OrderItem,
        OrderStatusHistory,
        PaymentStatusType,
        PaymentTransaction,
        Reservation,
        Settlement,
        Sku,
        StatusChange,
        StatusUpdate,
        StockAdjustment,
        StockMovement,
        StockRecord,
        StockTransfer,
        Warehouse,
        WarehouseCode,
        WarehouseStock,
    },
    engine_api::errors::{OrderFlowError, PaymentError},
    traits::{
        CallbackStore,
        EngineDatabase,
        OrderManagement,
        OrderQueryFilter,
        PaymentTransactions,
        StockError,
        StockManagement,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SqliteDatabase ({})", self.url)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using the URL in `DUKA_DATABASE_URL`, or the default.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Brings the schema up to date.
    pub async fn run_migrations(&self) -> Result<(), MigrateError> {
        sqlx::migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        debug!("🧾️ Database migrations complete for {}", self.url);
        Ok(())
    }
}

impl EngineDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }
}

//--------------------------------------   StockManagement     ---------------------------------------------------------
impl StockManagement for SqliteDatabase {
    async fn upsert_warehouse(&self, warehouse: NewWarehouse) -> Result<Warehouse, StockError> {
        let mut conn = self.pool.acquire().await?;
        warehouses::upsert_warehouse(warehouse, &mut conn).await
    }

    async fn fetch_warehouses(&self) -> Result<Vec<Warehouse>, StockError> {
        let mut conn = self.pool.acquire().await?;
        warehouses::fetch_warehouses(&mut conn).await
    }

    async fn fetch_stock_record(
        &self,
        warehouse: &WarehouseCode,
        sku: &Sku,
    ) -> Result<Option<StockRecord>, StockError> {
        let mut conn = self.pool.acquire().await?;
        stock::fetch_stock_record(warehouse, sku, &mut conn).await
    }

    async fn fetch_stock_levels(&self, sku: &Sku) -> Result<Vec<WarehouseStock>, StockError> {
        let mut conn = self.pool.acquire().await?;
        stock::fetch_stock_levels(sku, &mut conn).await
    }

    async fn reserve_stock(&self, allocation: &Allocation) -> Result<StockRecord, StockError> {
        let mut tx = self.pool.begin().await?;
        let record = stock::reserve(allocation, &mut tx).await?;
        tx.commit().await?;
        Ok(record)
    }

    async fn release_stock(&self, allocation: &Allocation) -> Result<StockRecord, StockError> {
        let mut tx = self.pool.begin().await?;
        let record = stock::release(allocation, &mut tx).await?;
        tx.commit().await?;
        Ok(record)
    }

    async fn fulfill_stock(
        &self,
        allocation: &Allocation,
        order_id: Option<&OrderId>,
    ) -> Result<StockRecord, StockError> {
        let mut tx = self.pool.begin().await?;
        let (record, _) = stock::fulfill(allocation, MovementCause::Sale, order_id, &mut tx).await?;
        tx.commit().await?;
        Ok(record)
    }

    async fn reserve_for_order(
        &self,
        order_id: &OrderId,
        allocation: &Allocation,
    ) -> Result<(Reservation, StockRecord), StockError> {
        let mut tx = self.pool.begin().await?;
        let result = reservations::reserve_for_order(order_id, allocation, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn release_reservation(&self, reservation_id: i64) -> Result<Option<(Reservation, StockRecord)>, StockError> {
        let mut tx = self.pool.begin().await?;
        let result = reservations::release_reservation(reservation_id, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn fulfill_reservation(&self, reservation_id: i64) -> Result<Option<(Reservation, StockRecord)>, StockError> {
        let mut tx = self.pool.begin().await?;
        let result = reservations::fulfill_reservation(reservation_id, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn fetch_reservations_for_order(&self, order_id: &OrderId) -> Result<Vec<Reservation>, StockError> {
        let mut conn = self.pool.acquire().await?;
        reservations::fetch_reservations_for_order(order_id, &mut conn).await
    }

    async fn adjust_stock(&self, adjustment: StockAdjustment) -> Result<StockRecord, StockError> {
        if !adjustment.cause.is_manual() {
            return Err(StockError::InvalidCause(adjustment.cause));
        }
        if adjustment.delta == 0 {
            return Err(StockError::InvalidQuantity("an adjustment must change the stock level".to_string()));
        }
        let StockAdjustment { warehouse, sku, delta, cause, notes } = adjustment;
        let mut tx = self.pool.begin().await?;
        let (record, _) = stock::adjust(&warehouse, &sku, delta, cause, notes.as_deref(), &mut tx).await?;
        tx.commit().await?;
        Ok(record)
    }

    async fn transfer_stock(&self, transfer: StockTransfer) -> Result<(StockRecord, StockRecord), StockError> {
        let StockTransfer { from, to, sku, quantity, notes } = transfer;
        let mut tx = self.pool.begin().await?;
        let result = stock::transfer(&from, &to, &sku, quantity, notes.as_deref(), &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn set_reorder_point(
        &self,
        warehouse: &WarehouseCode,
        sku: &Sku,
        reorder_point: i64,
    ) -> Result<StockRecord, StockError> {
        let mut conn = self.pool.acquire().await?;
        stock::set_reorder_point(warehouse, sku, reorder_point, &mut conn).await
    }

    async fn fetch_movements(&self, warehouse: &WarehouseCode, sku: &Sku) -> Result<Vec<StockMovement>, StockError> {
        let mut conn = self.pool.acquire().await?;
        stock::fetch_movements(warehouse, sku, &mut conn).await
    }

    async fn fetch_movements_for_order(&self, order_id: &OrderId) -> Result<Vec<StockMovement>, StockError> {
        let mut conn = self.pool.acquire().await?;
        stock::fetch_movements_for_order(order_id, &mut conn).await
    }
}

//--------------------------------------   OrderManagement     ---------------------------------------------------------
impl OrderManagement for SqliteDatabase {
    async fn insert_order(&self, order: NewOrder) -> Result<Order, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::insert_order(order, &mut tx).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order(order_id, &mut conn).await?)
    }

    async fn fetch_order_items(&self, order_id: &OrderId) -> Result<Vec<OrderItem>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order_items(order_id, &mut conn).await?)
    }

    async fn fetch_status_history(&self, order_id: &OrderId) -> Result<Vec<OrderStatusHistory>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_status_history(order_id, &mut conn).await?)
    }

    async fn apply_status_change(&self, change: StatusChange) -> Result<Option<StatusUpdate>, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let update = orders::apply_status_change(&change, &mut tx).await?;
        tx.commit().await?;
        Ok(update)
    }

    async fn mark_order_paid(
        &self,
        order_id: &OrderId,
        receipt: Option<&str>,
        paid_at: DateTime<Utc>,
    ) -> Result<Option<Order>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::mark_order_paid(order_id, receipt, paid_at, &mut conn).await?)
    }

    async fn fill_payment_reference(
        &self,
        order_id: &OrderId,
        reference: &str,
    ) -> Result<Option<Order>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fill_payment_reference(order_id, reference, &mut conn).await?)
    }

    async fn set_payment_status(
        &self,
        order_id: &OrderId,
        from: PaymentStatusType,
        to: PaymentStatusType,
    ) -> Result<Option<Order>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::set_payment_status(order_id, from, to, &mut conn).await?)
    }

    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::search_orders(query, &mut conn).await?)
    }

    async fn total_paid(&self, order_id: &OrderId) -> Result<Money, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::total_paid(order_id, &mut conn).await?)
    }
}

//--------------------------------------  PaymentTransactions  ---------------------------------------------------------
impl PaymentTransactions for SqliteDatabase {
    async fn insert_transaction(&self, tx: NewPaymentTransaction) -> Result<PaymentTransaction, PaymentError> {
        let mut conn = self.pool.acquire().await?;
        Ok(transactions::insert_transaction(tx, &mut conn).await?)
    }

    async fn assign_correlation_id(
        &self,
        id: i64,
        correlation_id: &str,
        merchant_request_id: Option<&str>,
    ) -> Result<Option<PaymentTransaction>, PaymentError> {
        let mut conn = self.pool.acquire().await?;
        Ok(transactions::assign_correlation_id(id, correlation_id, merchant_request_id, &mut conn).await?)
    }

    async fn fetch_transaction(&self, id: i64) -> Result<Option<PaymentTransaction>, PaymentError> {
        let mut conn = self.pool.acquire().await?;
        Ok(transactions::fetch_transaction(id, &mut conn).await?)
    }

    async fn fetch_transaction_by_correlation_id(
        &self,
        correlation_id: &str,
    ) -> Result<Option<PaymentTransaction>, PaymentError> {
        let mut conn = self.pool.acquire().await?;
        Ok(transactions::fetch_transaction_by_correlation_id(correlation_id, &mut conn).await?)
    }

    async fn fetch_transactions_for_order(&self, order_id: &OrderId) -> Result<Vec<PaymentTransaction>, PaymentError> {
        let mut conn = self.pool.acquire().await?;
        Ok(transactions::fetch_transactions_for_order(order_id, &mut conn).await?)
    }

    async fn settle_transaction(
        &self,
        id: i64,
        settlement: Settlement,
    ) -> Result<Option<PaymentTransaction>, PaymentError> {
        let mut conn = self.pool.acquire().await?;
        let result = transactions::settle_transaction(id, &settlement, &mut conn).await?;
        match &result {
            Some(tx) => debug!("💳️ Payment transaction #{id} settled as {}", tx.status),
            None => debug!("💳️ Payment transaction #{id} was already settled. {} ignored", settlement.status),
        }
        Ok(result)
    }

    async fn fill_receipt_number(&self, id: i64, receipt: &str) -> Result<Option<PaymentTransaction>, PaymentError> {
        let mut conn = self.pool.acquire().await?;
        Ok(transactions::fill_receipt_number(id, receipt, &mut conn).await?)
    }

    async fn mark_transaction_reversed(&self, id: i64) -> Result<Option<PaymentTransaction>, PaymentError> {
        let mut conn = self.pool.acquire().await?;
        Ok(transactions::mark_transaction_reversed(id, &mut conn).await?)
    }

    async fn fetch_stale_transactions(&self, older_than: Duration) -> Result<Vec<PaymentTransaction>, PaymentError> {
        let mut conn = self.pool.acquire().await?;
        Ok(transactions::fetch_stale_transactions(older_than, &mut conn).await?)
    }

    async fn record_sweep_attempt(&self, id: i64) -> Result<i64, PaymentError> {
        let mut conn = self.pool.acquire().await?;
        transactions::record_sweep_attempt(id, &mut conn)
            .await?
            .ok_or_else(|| PaymentError::TransactionNotFound(format!("#{id}")))
    }

    async fn count_live_transactions(&self, order_id: &OrderId, excluding: Option<i64>) -> Result<i64, PaymentError> {
        let mut conn = self.pool.acquire().await?;
        Ok(transactions::count_live_transactions(order_id, excluding, &mut conn).await?)
    }
}

//--------------------------------------     CallbackStore     ---------------------------------------------------------
impl CallbackStore for SqliteDatabase {
    async fn record_callback(&self, entry: NewCallbackEntry) -> Result<InsertCallbackResult, PaymentError> {
        let mut conn = self.pool.acquire().await?;
        Ok(callbacks::record_callback(entry, &mut conn).await?)
    }

    async fn update_callback_outcome(
        &self,
        id: i64,
        outcome: CallbackOutcome,
        error: Option<&str>,
    ) -> Result<bool, PaymentError> {
        let mut conn = self.pool.acquire().await?;
        Ok(callbacks::update_callback_outcome(id, outcome, error, &mut conn).await?)
    }

    async fn fetch_callbacks(&self, correlation_id: &str) -> Result<Vec<CallbackEntry>, PaymentError> {
        let mut conn = self.pool.acquire().await?;
        Ok(callbacks::fetch_callbacks(correlation_id, &mut conn).await?)
    }

    async fn fetch_unresolved_callbacks(&self) -> Result<Vec<CallbackEntry>, PaymentError> {
        let mut conn = self.pool.acquire().await?;
        Ok(callbacks::fetch_unresolved_callbacks(&mut conn).await?)
    }
}
