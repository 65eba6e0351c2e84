use serde::{Deserialize, Serialize};

use crate::db_types::{Order, OrderStatusType, PaymentTransaction, StockRecord};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusChangedEvent {
    pub order: Order,
    pub old_status: OrderStatusType,
    pub actor: String,
}

impl OrderStatusChangedEvent {
    pub fn new(order: Order, old_status: OrderStatusType, actor: &str) -> Self {
        Self { order, old_status, actor: actor.to_string() }
    }
}

/// A payment transaction has left `processing`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSettledEvent {
    pub transaction: PaymentTransaction,
    /// The order after the settlement was applied to it
    pub order: Option<Order>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockAlertKind {
    /// Available stock is at or below the reorder point
    LowStock,
    OutOfStock,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAlertEvent {
    pub kind: StockAlertKind,
    pub record: StockRecord,
}

impl StockAlertEvent {
    /// Returns an alert if the record has no stock available, or has reached its reorder point.
    pub fn for_record(record: &StockRecord) -> Option<Self> {
        let kind = if record.available() <= 0 {
            StockAlertKind::OutOfStock
        } else if record.needs_reorder() {
            StockAlertKind::LowStock
        } else {
            return None;
        };
        Some(Self { kind, record: record.clone() })
    }
}
