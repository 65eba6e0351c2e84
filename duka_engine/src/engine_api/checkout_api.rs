use std::fmt::Debug;

use log::*;
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{NewOrder, Order, PaymentTransaction},
    engine_api::{errors::OrderFlowError, order_flow_api::OrderFlowApi, payment_api::PaymentApi},
    traits::{EngineDatabase, PaymentProvider},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub order: NewOrder,
    /// The payer's phone number. If absent the order is placed and the payment is started later.
    pub payer_reference: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutResult {
    pub order: Order,
    pub transaction: Option<PaymentTransaction>,
    /// Set when the order was placed but the payment could not be started
    pub payment_error: Option<String>,
}

/// Places an order and starts its payment in one step.
///
/// Placing the order is all-or-nothing. Starting the payment is not: if the provider refuses or cannot be reached,
/// the order stays `pending` with its stock reserved, and the payment can be retried.
pub struct CheckoutApi<B, P> {
    orders: OrderFlowApi<B>,
    payments: PaymentApi<B, P>,
}

impl<B: Clone, P> Clone for CheckoutApi<B, P> {
    fn clone(&self) -> Self {
        Self { orders: self.orders.clone(), payments: self.payments.clone() }
    }
}

impl<B, P> Debug for CheckoutApi<B, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CheckoutApi")
    }
}

impl<B, P> CheckoutApi<B, P> {
    pub fn new(orders: OrderFlowApi<B>, payments: PaymentApi<B, P>) -> Self {
        Self { orders, payments }
    }
}

impl<B, P> CheckoutApi<B, P>
where
    B: EngineDatabase,
    P: PaymentProvider,
{
    pub async fn checkout(&self, request: CheckoutRequest) -> Result<CheckoutResult, OrderFlowError> {
        let CheckoutRequest { order, payer_reference } = request;
        let order = self.orders.place_order(order).await?;
        let order_id = order.order_id.clone();
        let Some(payer) = payer_reference else {
            info!("🧾️ Order {order_id} placed without a payment");
            return Ok(CheckoutResult { order, transaction: None, payment_error: None });
        };
        match self.payments.initiate(&order_id, &payer).await {
            Ok(tx) => {
                info!("🧾️ Order {order_id} placed. Payment transaction #{} is {}", tx.id, tx.status);
                Ok(CheckoutResult { order, transaction: Some(tx), payment_error: None })
            },
            Err(e) => {
                warn!("🧾️ Order {order_id} placed, but its payment could not be started. {e}");
                Ok(CheckoutResult { order, transaction: None, payment_error: Some(e.to_string()) })
            },
        }
    }
}
