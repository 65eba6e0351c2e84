use duka_engine::events::{
    EventHandlers,
    EventHooks,
    OrderStatusChangedEvent,
    PaymentSettledEvent,
    StockAlertEvent,
    StockAlertKind,
};
use futures::future::BoxFuture;
use log::*;

pub const NOTIFICATION_EVENT_BUFFER_SIZE: usize = 25;

/// Creates the event handlers that report engine activity to the operator.
///
/// 1. OrderStatusChangedEvent - every status change is logged, along with who made it.
/// 2. PaymentSettledEvent - completed payments are logged with their receipt. Failed ones at `warn`.
/// 3. StockAlertEvent - low and out-of-stock records are logged at `warn` so that they can be restocked.
///
/// Customer notifications (email, SMS) would hang off the same hooks.
pub fn create_notification_handlers() -> EventHandlers {
    let mut hooks = EventHooks::default();
    // --- On StatusChanged Handler ---
    hooks.on_status_changed(|ev| {
        let OrderStatusChangedEvent { order, old_status, actor } = ev;
        info!("📬️ Order {} moved from {old_status} to {} by {actor}", order.order_id, order.status);
        no_op()
    });
    // --- On PaymentSettled Handler ---
    hooks.on_payment_settled(|ev| {
        let PaymentSettledEvent { transaction: tx, order } = ev;
        let order_status = order.map(|o| format!("{} / {}", o.status, o.payment_status)).unwrap_or_default();
        if tx.status.is_failure() {
            warn!(
                "📬️ Payment #{} of {} for order {} {}. {}. Order is now {order_status}",
                tx.id,
                tx.amount,
                tx.order_id,
                tx.status,
                tx.result_desc.unwrap_or_default()
            );
        } else {
            info!(
                "📬️ Payment #{} of {} for order {} {}. Receipt: {}. Order is now {order_status}",
                tx.id,
                tx.amount,
                tx.order_id,
                tx.status,
                tx.receipt_number.unwrap_or_else(|| "None".to_string())
            );
        }
        no_op()
    });
    // --- On StockAlert Handler ---
    hooks.on_stock_alert(|ev| {
        let StockAlertEvent { kind, record } = ev;
        match kind {
            StockAlertKind::OutOfStock => warn!(
                "📬️ {} is out of stock in {}. {} on hand, {} reserved, {} damaged",
                record.sku, record.warehouse, record.quantity, record.reserved, record.damaged
            ),
            StockAlertKind::LowStock => warn!(
                "📬️ {} is running low in {}. {} available, reorder point is {}",
                record.sku,
                record.warehouse,
                record.available(),
                record.reorder_point
            ),
        }
        no_op()
    });
    EventHandlers::new(NOTIFICATION_EVENT_BUFFER_SIZE, hooks)
}

fn no_op() -> BoxFuture<'static, ()> {
    Box::pin(async {})
}
