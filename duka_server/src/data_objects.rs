use std::fmt::Display;

use duka_engine::db_types::{
    Order,
    OrderItem,
    OrderStatusType,
    PaymentTransaction,
    Reservation,
    Sku,
    WarehouseCode,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

/// The body M-Pesa expects in reply to every notification. Anything else makes it redeliver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackAck {
    pub result_code: i64,
    pub result_desc: String,
}

impl Default for CallbackAck {
    fn default() -> Self {
        Self { result_code: 0, result_desc: "Accepted".to_string() }
    }
}

/// Request body for `POST /api/orders/{order_id}/status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionParams {
    pub status: OrderStatusType,
    /// Who is asking for the change. Recorded in the status history.
    pub actor: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Request body for `POST /api/orders/{order_id}/payments`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetryPaymentParams {
    /// Phone number to prompt. Defaults to the number used in the previous attempt.
    #[serde(default)]
    pub payer_reference: Option<String>,
}

/// Request body for `POST /api/orders/{order_id}/reversal`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReversalParams {
    pub reason: String,
}

/// Request body for `POST /api/stock/reorder_point`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReorderPointParams {
    pub warehouse: WarehouseCode,
    pub sku: Sku,
    pub reorder_point: i64,
}

/// Everything the back office needs to see about one order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDetail {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub reservations: Vec<Reservation>,
    pub transactions: Vec<PaymentTransaction>,
}
