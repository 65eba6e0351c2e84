use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{
    EventHandler,
    EventProducer,
    Handler,
    OrderStatusChangedEvent,
    PaymentSettledEvent,
    StockAlertEvent,
};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub status_changed_producer: Vec<EventProducer<OrderStatusChangedEvent>>,
    pub payment_settled_producer: Vec<EventProducer<PaymentSettledEvent>>,
    pub stock_alert_producer: Vec<EventProducer<StockAlertEvent>>,
}

impl EventProducers {
    pub async fn publish_status_changed(&self, event: OrderStatusChangedEvent) {
        for producer in &self.status_changed_producer {
            producer.publish_event(event.clone()).await;
        }
    }

    pub async fn publish_payment_settled(&self, event: PaymentSettledEvent) {
        for producer in &self.payment_settled_producer {
            producer.publish_event(event.clone()).await;
        }
    }

    pub async fn publish_stock_alert(&self, event: StockAlertEvent) {
        for producer in &self.stock_alert_producer {
            producer.publish_event(event.clone()).await;
        }
    }
}

pub struct EventHandlers {
    pub on_status_changed: Option<EventHandler<OrderStatusChangedEvent>>,
    pub on_payment_settled: Option<EventHandler<PaymentSettledEvent>>,
    pub on_stock_alert: Option<EventHandler<StockAlertEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_status_changed = hooks.on_status_changed.map(|f| EventHandler::new(buffer_size, f));
        let on_payment_settled = hooks.on_payment_settled.map(|f| EventHandler::new(buffer_size, f));
        let on_stock_alert = hooks.on_stock_alert.map(|f| EventHandler::new(buffer_size, f));
        Self { on_status_changed, on_payment_settled, on_stock_alert }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_status_changed {
            result.status_changed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_payment_settled {
            result.payment_settled_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_stock_alert {
            result.stock_alert_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_status_changed {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_payment_settled {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_stock_alert {
            tokio::spawn(handler.start_handler());
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_status_changed: Option<Handler<OrderStatusChangedEvent>>,
    pub on_payment_settled: Option<Handler<PaymentSettledEvent>>,
    pub on_stock_alert: Option<Handler<StockAlertEvent>>,
}

impl EventHooks {
    pub fn on_status_changed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderStatusChangedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_status_changed = Some(Arc::new(f));
        self
    }

    pub fn on_payment_settled<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PaymentSettledEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_payment_settled = Some(Arc::new(f));
        self
    }

    pub fn on_stock_alert<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(StockAlertEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_stock_alert = Some(Arc::new(f));
        self
    }
}
