use std::fmt::Debug;

use chrono::Utc;
use futures_util::future::join_all;
use log::*;

use crate::{
    db_types::{
        Allocation,
        NewOrder,
        Order,
        OrderId,
        OrderItem,
        OrderStatusHistory,
        OrderStatusType,
        PaymentStatusType,
        Reservation,
        ReservationStatus,
        StatusChange,
    },
    engine_api::{errors::OrderFlowError, stock_ledger_api::StockLedgerApi, warehouse_selector::WarehouseSelector},
    events::{EventProducers, OrderStatusChangedEvent},
    traits::{OrderManagement, StockManagement},
};

/// `OrderFlowApi` owns the order state machine.
///
/// Orders are placed by reserving stock for every line and then persisting the order. Status changes are
/// compare-and-swap against the current status, and carry their stock side effects with them in the same database
/// transaction: cancelling an order releases its reservations and shipping it fulfils them. A change whose side
/// effects fail is not applied, so it can be retried.
#[derive(Clone)]
pub struct OrderFlowApi<B> {
    db: B,
    ledger: StockLedgerApi<B>,
    selector: WarehouseSelector,
    producers: EventProducers,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi ({:?})", self.selector.policy())
    }
}

impl<B: Clone> OrderFlowApi<B> {
    pub fn new(db: B, selector: WarehouseSelector, producers: EventProducers) -> Self {
        let ledger = StockLedgerApi::new(db.clone(), producers.clone());
        Self { db, ledger, selector, producers }
    }
}

impl<B> OrderFlowApi<B>
where B: StockManagement + OrderManagement
{
    pub fn ledger(&self) -> &StockLedgerApi<B> {
        &self.ledger
    }

    pub async fn fetch_order(&self, order_id: &OrderId) -> Result<Order, OrderFlowError> {
        self.db.fetch_order(order_id).await?.ok_or_else(|| OrderFlowError::OrderNotFound(order_id.clone()))
    }

    pub async fn items(&self, order_id: &OrderId) -> Result<Vec<OrderItem>, OrderFlowError> {
        self.db.fetch_order_items(order_id).await
    }

    pub async fn history(&self, order_id: &OrderId) -> Result<Vec<OrderStatusHistory>, OrderFlowError> {
        self.db.fetch_status_history(order_id).await
    }

    /// Plans where every line of the order will be drawn from. Nothing is reserved.
    pub async fn plan_order(&self, order: &NewOrder) -> Result<Vec<Allocation>, OrderFlowError> {
        if order.items.is_empty() {
            return Err(OrderFlowError::EmptyOrder);
        }
        if let Some(item) = order.items.iter().find(|i| i.quantity <= 0 || i.unit_price.value() < 0) {
            return Err(OrderFlowError::InvalidLine(format!(
                "{} x {} at {}",
                item.quantity, item.sku, item.unit_price
            )));
        }
        if order.extra_charges.value() < 0 {
            return Err(OrderFlowError::InvalidLine(format!("extra charges of {}", order.extra_charges)));
        }
        let mut plan = Vec::new();
        for (sku, quantity) in order.quantities_by_sku() {
            let levels = self.db.fetch_stock_levels(&sku).await?;
            plan.extend(self.selector.select(&sku, quantity, &levels)?);
        }
        Ok(plan)
    }

    /// Reserves stock for every line and stores the order.
    ///
    /// Reservations are attempted concurrently. If any of them fails, the ones that succeeded are released before the
    /// error is returned, so a failed checkout never leaves stock held.
    pub async fn place_order(&self, order: NewOrder) -> Result<Order, OrderFlowError> {
        if self.db.fetch_order(&order.order_id).await?.is_some() {
            return Err(OrderFlowError::OrderAlreadyExists(order.order_id));
        }
        let plan = self.plan_order(&order).await?;
        let order_id = order.order_id.clone();
        let attempts = join_all(plan.iter().map(|a| self.ledger.reserve_for_order(&order_id, a))).await;
        let mut held = Vec::with_capacity(attempts.len());
        let mut failure = None;
        for attempt in attempts {
            match attempt {
                Ok(reservation) => held.push(reservation),
                Err(e) => {
                    debug!("🧾️ Reservation for order {order_id} failed. {e}");
                    failure.get_or_insert(e);
                },
            }
        }
        if let Some(e) = failure {
            info!("🧾️ Checkout of order {order_id} failed. Releasing {} reservations. {e}", held.len());
            self.compensate(&held).await;
            return Err(e.into());
        }
        match self.db.insert_order(order).await {
            Ok(order) => {
                info!(
                    "🧾️ Order {} placed for {} with {} reservations. Total: {}",
                    order.order_id,
                    order.customer_id,
                    held.len(),
                    order.total_price
                );
                Ok(order)
            },
            Err(e) => {
                warn!("🧾️ Could not store order {order_id}. Releasing its reservations. {e}");
                self.compensate(&held).await;
                Err(e)
            },
        }
    }

    async fn compensate(&self, held: &[Reservation]) {
        for reservation in held {
            if let Err(e) = self.ledger.release_reservation(reservation.id).await {
                error!(
                    "🧾️ Could not release reservation #{} ({} x {} in {}). {e}",
                    reservation.id, reservation.quantity, reservation.sku, reservation.warehouse
                );
            }
        }
    }

    /// Moves the order to `to`, enforcing the transition table.
    ///
    /// Held orders can only resume to the status they interrupted, or be cancelled if they were not yet shipped.
    pub async fn transition(
        &self,
        order_id: &OrderId,
        to: OrderStatusType,
        actor: &str,
        notes: Option<&str>,
    ) -> Result<Order, OrderFlowError> {
        let order = self.fetch_order(order_id).await?;
        let from = order.status;
        let allowed = match from {
            OrderStatusType::OnHold => {
                let interrupted = order.previous_status;
                Some(to) == interrupted ||
                    (to == OrderStatusType::Cancelled && interrupted != Some(OrderStatusType::Shipped))
            },
            _ => from.can_transition_to(to),
        };
        let illegal = || OrderFlowError::IllegalTransition { order_id: order_id.clone(), from, to };
        if !allowed {
            error!("🧾️ Illegal transition requested by {actor}: order {order_id} cannot move from {from} to {to}");
            return Err(illegal());
        }
        let previous_status = if to == OrderStatusType::OnHold { Some(from) } else { None };
        let change = StatusChange {
            order_id: order_id.clone(),
            from,
            to,
            previous_status,
            actor: actor.to_string(),
            notes: notes.map(String::from),
        };
        let update = match self.db.apply_status_change(change).await {
            Ok(Some(update)) => update,
            Ok(None) => {
                error!("🧾️ Order {order_id} changed status while {actor} was moving it from {from} to {to}");
                return Err(illegal());
            },
            Err(e) => {
                warn!("🧾️ Could not move order {order_id} from {from} to {to}. Nothing was changed. {e}");
                return Err(e);
            },
        };
        info!("🧾️ Order {order_id} moved from {from} to {to} by {actor}");
        if !update.released.is_empty() {
            debug!("🧾️ {} reservations released for order {order_id}", update.released.len());
        }
        if !update.fulfilled.is_empty() {
            debug!("🧾️ {} reservations fulfilled for order {order_id}", update.fulfilled.len());
        }
        for (_, record) in &update.fulfilled {
            self.ledger.check_stock_alert(record).await;
        }
        let order = update.order;
        self.producers.publish_status_changed(OrderStatusChangedEvent::new(order.clone(), from, actor)).await;
        Ok(order)
    }

    pub async fn cancel(&self, order_id: &OrderId, actor: &str, reason: &str) -> Result<Order, OrderFlowError> {
        self.transition(order_id, OrderStatusType::Cancelled, actor, Some(reason)).await
    }

    pub async fn hold(&self, order_id: &OrderId, actor: &str, reason: &str) -> Result<Order, OrderFlowError> {
        self.transition(order_id, OrderStatusType::OnHold, actor, Some(reason)).await
    }

    /// Returns a held order to the status it was in when it was put on hold.
    pub async fn resume(&self, order_id: &OrderId, actor: &str) -> Result<Order, OrderFlowError> {
        let order = self.fetch_order(order_id).await?;
        match (order.status, order.previous_status) {
            (OrderStatusType::OnHold, Some(previous)) => {
                self.transition(order_id, previous, actor, Some("resumed")).await
            },
            (from, _) => Err(OrderFlowError::IllegalTransition {
                order_id: order_id.clone(),
                from,
                to: order.previous_status.unwrap_or(from),
            }),
        }
    }

    /// Releases every reservation still held for the order. Reservations already released or fulfilled are skipped.
    pub async fn release_order_reservations(&self, order_id: &OrderId) -> Result<usize, OrderFlowError> {
        let mut released = 0;
        for reservation in self.ledger.reservations_for_order(order_id).await? {
            if reservation.status != ReservationStatus::Reserved {
                continue;
            }
            if self.ledger.release_reservation(reservation.id).await?.is_some() {
                released += 1;
            }
        }
        Ok(released)
    }

    /// Fulfils every reservation still held for the order. Fulfilling twice is a no-op.
    pub async fn fulfill_order_reservations(&self, order_id: &OrderId) -> Result<usize, OrderFlowError> {
        let mut fulfilled = 0;
        for reservation in self.ledger.reservations_for_order(order_id).await? {
            if reservation.status != ReservationStatus::Reserved {
                continue;
            }
            if self.ledger.fulfill_reservation(reservation.id).await?.is_some() {
                fulfilled += 1;
            }
        }
        Ok(fulfilled)
    }

    /// Records a successful payment against the order.
    ///
    /// If completed payments now cover the order total, the payment status becomes `paid` (once) and a `pending`
    /// order is confirmed. Otherwise the payment status becomes `partially_paid`. Calling it again for the same payment
    /// finishes whatever an earlier, interrupted call left undone.
    pub async fn confirm_payment(&self, order_id: &OrderId, receipt: Option<&str>) -> Result<Order, OrderFlowError> {
        let order = self.fetch_order(order_id).await?;
        let paid = self.db.total_paid(order_id).await?;
        if paid < order.total_price {
            if paid.is_positive() && order.payment_status != PaymentStatusType::PartiallyPaid {
                let from = order.payment_status;
                self.db.set_payment_status(order_id, from, PaymentStatusType::PartiallyPaid).await?;
                info!("🧾️ Order {order_id} is partially paid. {paid} of {}", order.total_price);
            }
            return self.fetch_order(order_id).await;
        }
        let order = match self.db.mark_order_paid(order_id, receipt, Utc::now()).await? {
            Some(order) => {
                info!("🧾️ Order {order_id} is paid in full ({paid})");
                order
            },
            None => {
                if let Some(receipt) = receipt {
                    if self.db.fill_payment_reference(order_id, receipt).await?.is_some() {
                        info!("🧾️ Payment reference {receipt} recorded for order {order_id}");
                    }
                }
                let order = self.fetch_order(order_id).await?;
                if order.payment_status != PaymentStatusType::Paid || order.status != OrderStatusType::Pending {
                    debug!("🧾️ Order {order_id} was already marked as paid");
                    return Ok(order);
                }
                info!("🧾️ Order {order_id} is paid but still pending. Confirming it now");
                order
            },
        };
        match order.status {
            OrderStatusType::Pending => {
                let notes = receipt.map(|r| format!("Payment receipt {r}"));
                match self.transition(order_id, OrderStatusType::Confirmed, "payment", notes.as_deref()).await {
                    Ok(order) => Ok(order),
                    Err(OrderFlowError::IllegalTransition { .. }) => {
                        warn!("🧾️ Order {order_id} changed status before it could be confirmed");
                        self.fetch_order(order_id).await
                    },
                    Err(e) => Err(e),
                }
            },
            OrderStatusType::Cancelled => {
                warn!("🧾️ Order {order_id} was paid after it was cancelled. The payment must be refunded manually");
                Ok(order)
            },
            _ => Ok(order),
        }
    }

    /// Records a failed payment. A `pending` order with nothing paid against it is cancelled and its stock released.
    pub async fn handle_payment_failure(&self, order_id: &OrderId, reason: &str) -> Result<Order, OrderFlowError> {
        let order = self.fetch_order(order_id).await?;
        let from = order.payment_status;
        if matches!(from, PaymentStatusType::Pending | PaymentStatusType::Authorized) {
            self.db.set_payment_status(order_id, from, PaymentStatusType::Failed).await?;
        }
        if order.status != OrderStatusType::Pending {
            return self.fetch_order(order_id).await;
        }
        if from == PaymentStatusType::PartiallyPaid {
            warn!("🧾️ A payment for order {order_id} failed, but part of the order is paid. Leaving it open");
            return self.fetch_order(order_id).await;
        }
        match self.cancel(order_id, "payment", reason).await {
            Ok(order) => Ok(order),
            Err(OrderFlowError::IllegalTransition { .. }) => {
                warn!("🧾️ Order {order_id} changed status before it could be cancelled");
                self.fetch_order(order_id).await
            },
            Err(e) => Err(e),
        }
    }
}
