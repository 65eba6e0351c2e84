use chrono::{DateTime, Utc};
use duka_common::Money;

use crate::{
    db_types::{
        NewOrder,
        Order,
        OrderId,
        OrderItem,
        OrderStatusHistory,
        OrderStatusType,
        PaymentStatusType,
        StatusChange,
        StatusUpdate,
    },
    engine_api::errors::OrderFlowError,
};

#[derive(Debug, Clone, Default)]
pub struct OrderQueryFilter {
    pub customer_id: Option<String>,
    pub statuses: Vec<OrderStatusType>,
    pub payment_statuses: Vec<PaymentStatusType>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl OrderQueryFilter {
    pub fn with_customer_id(mut self, customer_id: &str) -> Self {
        self.customer_id = Some(customer_id.to_string());
        self
    }

    pub fn with_status(mut self, status: OrderStatusType) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn with_payment_status(mut self, status: PaymentStatusType) -> Self {
        self.payment_statuses.push(status);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.customer_id.is_none() &&
            self.statuses.is_empty() &&
            self.payment_statuses.is_empty() &&
            self.since.is_none() &&
            self.until.is_none()
    }
}

#[allow(async_fn_in_trait)]
pub trait OrderManagement {
    /// Stores the order, its line items and the creation history entry in one transaction.
    ///
    /// Fails with [`OrderFlowError::OrderAlreadyExists`] if the order id is taken.
    async fn insert_order(&self, order: NewOrder) -> Result<Order, OrderFlowError>;

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, OrderFlowError>;

    async fn fetch_order_items(&self, order_id: &OrderId) -> Result<Vec<OrderItem>, OrderFlowError>;

    /// The order's status history, oldest first.
    async fn fetch_status_history(&self, order_id: &OrderId) -> Result<Vec<OrderStatusHistory>, OrderFlowError>;

    /// Applies the status change if, and only if, the order is still in `change.from`. The history entry and the
    /// change's stock side effects are written in the same transaction: cancelling releases the order's reservations,
    /// shipping fulfils them, and refunding moves a `paid` payment status to `refunded`. If any of them fails, nothing
    /// changes. Returns `None` if the order was not in `change.from`.
    async fn apply_status_change(&self, change: StatusChange) -> Result<Option<StatusUpdate>, OrderFlowError>;

    /// Sets the payment status to `paid`, with the receipt and payment time. Returns `None` if the order is already
    /// `paid` or `refunded`.
    async fn mark_order_paid(
        &self,
        order_id: &OrderId,
        receipt: Option<&str>,
        paid_at: DateTime<Utc>,
    ) -> Result<Option<Order>, OrderFlowError>;

    /// Sets the order's payment reference, unless it already has one. Returns `None` if nothing changed.
    async fn fill_payment_reference(
        &self,
        order_id: &OrderId,
        reference: &str,
    ) -> Result<Option<Order>, OrderFlowError>;

    /// Compare-and-swap on the payment status. Returns `None` if the order's payment status is not `from`.
    async fn set_payment_status(
        &self,
        order_id: &OrderId,
        from: PaymentStatusType,
        to: PaymentStatusType,
    ) -> Result<Option<Order>, OrderFlowError>;

    /// Orders matching the filter, oldest first.
    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderFlowError>;

    /// The sum of `completed` payment transactions for the order.
    async fn total_paid(&self, order_id: &OrderId) -> Result<Money, OrderFlowError>;
}
