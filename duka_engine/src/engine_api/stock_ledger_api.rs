use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{
        Allocation,
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
    },
    events::{EventProducers, StockAlertEvent},
    traits::{StockError, StockManagement},
};

/// `StockLedgerApi` is the only way stock levels change.
///
/// Every operation is atomic on its `(warehouse, sku)` record. After each change the record is checked against its
/// reorder point, and a [`StockAlertEvent`] is published if stock is low or gone.
#[derive(Clone)]
pub struct StockLedgerApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for StockLedgerApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StockLedgerApi")
    }
}

impl<B> StockLedgerApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> StockLedgerApi<B>
where B: StockManagement
{
    pub(crate) async fn check_stock_alert(&self, record: &StockRecord) {
        if let Some(event) = StockAlertEvent::for_record(record) {
            info!(
                "📦️ {} in {} is {:?}. {} available, reorder point is {}",
                record.sku,
                record.warehouse,
                event.kind,
                record.available(),
                record.reorder_point
            );
            self.producers.publish_stock_alert(event).await;
        }
    }

    pub async fn upsert_warehouse(&self, warehouse: NewWarehouse) -> Result<Warehouse, StockError> {
        self.db.upsert_warehouse(warehouse).await
    }

    pub async fn warehouses(&self) -> Result<Vec<Warehouse>, StockError> {
        self.db.fetch_warehouses().await
    }

    pub async fn stock_record(&self, warehouse: &WarehouseCode, sku: &Sku) -> Result<Option<StockRecord>, StockError> {
        self.db.fetch_stock_record(warehouse, sku).await
    }

    pub async fn stock_levels(&self, sku: &Sku) -> Result<Vec<WarehouseStock>, StockError> {
        self.db.fetch_stock_levels(sku).await
    }

    pub async fn reserve(&self, allocation: &Allocation) -> Result<StockRecord, StockError> {
        let record = self.db.reserve_stock(allocation).await?;
        self.check_stock_alert(&record).await;
        Ok(record)
    }

    pub async fn release(&self, allocation: &Allocation) -> Result<StockRecord, StockError> {
        self.db.release_stock(allocation).await
    }

    pub async fn fulfill(
        &self,
        allocation: &Allocation,
        order_id: Option<&OrderId>,
    ) -> Result<StockRecord, StockError> {
        let record = self.db.fulfill_stock(allocation, order_id).await?;
        self.check_stock_alert(&record).await;
        Ok(record)
    }

    pub async fn reserve_for_order(
        &self,
        order_id: &OrderId,
        allocation: &Allocation,
    ) -> Result<Reservation, StockError> {
        let (reservation, record) = self.db.reserve_for_order(order_id, allocation).await?;
        self.check_stock_alert(&record).await;
        Ok(reservation)
    }

    /// Releases the reservation. Returns `None` if there was nothing to release.
    pub async fn release_reservation(&self, reservation_id: i64) -> Result<Option<Reservation>, StockError> {
        let result = self.db.release_reservation(reservation_id).await?;
        Ok(result.map(|(reservation, _)| reservation))
    }

    /// Fulfils the reservation. Returns `None` if it had already been released or fulfilled.
    pub async fn fulfill_reservation(&self, reservation_id: i64) -> Result<Option<Reservation>, StockError> {
        match self.db.fulfill_reservation(reservation_id).await? {
            Some((reservation, record)) => {
                self.check_stock_alert(&record).await;
                Ok(Some(reservation))
            },
            None => Ok(None),
        }
    }

    pub async fn reservations_for_order(&self, order_id: &OrderId) -> Result<Vec<Reservation>, StockError> {
        self.db.fetch_reservations_for_order(order_id).await
    }

    pub async fn adjust(&self, adjustment: StockAdjustment) -> Result<StockRecord, StockError> {
        info!(
            "📦️ Adjusting {} in {} by {} ({})",
            adjustment.sku, adjustment.warehouse, adjustment.delta, adjustment.cause
        );
        let record = self.db.adjust_stock(adjustment).await?;
        self.check_stock_alert(&record).await;
        Ok(record)
    }

    pub async fn transfer(&self, transfer: StockTransfer) -> Result<(StockRecord, StockRecord), StockError> {
        let (from, to) = self.db.transfer_stock(transfer).await?;
        self.check_stock_alert(&from).await;
        Ok((from, to))
    }

    pub async fn set_reorder_point(
        &self,
        warehouse: &WarehouseCode,
        sku: &Sku,
        reorder_point: i64,
    ) -> Result<StockRecord, StockError> {
        let record = self.db.set_reorder_point(warehouse, sku, reorder_point).await?;
        self.check_stock_alert(&record).await;
        Ok(record)
    }

    pub async fn movements(&self, warehouse: &WarehouseCode, sku: &Sku) -> Result<Vec<StockMovement>, StockError> {
        self.db.fetch_movements(warehouse, sku).await
    }

    pub async fn movements_for_order(&self, order_id: &OrderId) -> Result<Vec<StockMovement>, StockError> {
        self.db.fetch_movements_for_order(order_id).await
    }
}
