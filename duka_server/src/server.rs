use std::{future::ready, sync::Arc, time::Duration};

use actix_web::{
    dev::{HttpServiceFactory, Server, Service},
    http::KeepAlive,
    middleware::Logger,
    web,
    App,
    HttpServer,
};
use duka_engine::{
    events::EventProducers,
    CallbackApi,
    CheckoutApi,
    EngineDatabase,
    OrderFlowApi,
    PaymentApi,
    PaymentConfig,
    PaymentProvider,
    ReconcilerApi,
    ReconcilerConfig,
    SelectionPolicy,
    SqliteDatabase,
    WarehouseSelector,
};
use futures::future::Either;
use log::*;

use crate::{
    config::ServerConfig,
    errors::ServerError,
    helpers::{get_remote_ip, is_whitelisted},
    integrations::{mpesa::MpesaGateway, notifications::create_notification_handlers},
    reconcile_worker::start_reconcile_worker,
    routes::{
        health,
        AdjustStockRoute,
        CheckoutRoute,
        MpesaCallbackRoute,
        MpesaTimeoutRoute,
        OrderByIdRoute,
        OrderHistoryRoute,
        OrderStatusRoute,
        PaymentStatusRoute,
        ReorderPointRoute,
        RetryPaymentRoute,
        ReversePaymentRoute,
        StockLevelsRoute,
        TransferStockRoute,
        UpsertWarehouseRoute,
        WarehousesRoute,
    },
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.run_migrations().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let gateway = MpesaGateway::new(config.mpesa.clone()).map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let gateway = Arc::new(gateway);
    let handlers = create_notification_handlers();
    let producers = handlers.producers();
    handlers.start_handlers().await;
    // The worker is detached. It stops when the runtime shuts down.
    let _worker = start_reconcile_worker(
        db.clone(),
        Arc::clone(&gateway),
        producers.clone(),
        config.selection_policy,
        config.reconciler,
        config.reconcile_interval,
    );
    let srv = create_server_instance(config, db, gateway, producers)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    gateway: Arc<MpesaGateway>,
    producers: EventProducers,
) -> Result<Server, ServerError> {
    let (host, port) = (config.host.clone(), config.port);
    let srv = HttpServer::new(move || {
        let apis = EngineApis::new(
            &db,
            &gateway,
            &producers,
            config.selection_policy,
            config.payments,
            config.reconciler,
        );
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("duka::access_log"))
            .configure(|cfg| apis.register(cfg));
        let api_scope = web::scope("/api").configure(configure_api::<SqliteDatabase, MpesaGateway>);
        let notifications = mpesa_scope::<SqliteDatabase>(&config);
        app.service(health).service(api_scope).service(notifications)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((host.as_str(), port))?
    .run();
    Ok(srv)
}

pub fn configure_api<B, P>(cfg: &mut web::ServiceConfig)
where
    B: EngineDatabase + 'static,
    P: PaymentProvider + 'static,
{
    cfg.service(CheckoutRoute::<B, P>::new())
        .service(OrderByIdRoute::<B, P>::new())
        .service(OrderHistoryRoute::<B>::new())
        .service(OrderStatusRoute::<B>::new())
        .service(RetryPaymentRoute::<B, P>::new())
        .service(ReversePaymentRoute::<B, P>::new())
        .service(PaymentStatusRoute::<B, P>::new())
        .service(StockLevelsRoute::<B>::new())
        .service(AdjustStockRoute::<B>::new())
        .service(TransferStockRoute::<B>::new())
        .service(ReorderPointRoute::<B>::new())
        .service(WarehousesRoute::<B>::new())
        .service(UpsertWarehouseRoute::<B>::new());
}

/// The `/mpesa` scope. Notifications from peers outside the callback whitelist are refused with a 403.
pub fn mpesa_scope<B: EngineDatabase + 'static>(config: &ServerConfig) -> impl HttpServiceFactory {
    let use_x_forwarded_for = config.use_x_forwarded_for;
    let use_forwarded = config.use_forwarded;
    let whitelist = config.callback_whitelist.clone();
    web::scope("/mpesa")
        .wrap_fn(move |req, srv| {
            let peer_ip = get_remote_ip(req.request(), use_x_forwarded_for, use_forwarded);
            if is_whitelisted(peer_ip, whitelist.as_deref()) {
                Either::Left(srv.call(req))
            } else {
                warn!("💻️ Rejected M-Pesa notification from {peer_ip:?}. The address is not whitelisted.");
                Either::Right(ready(Err(ServerError::ForbiddenPeer.into())))
            }
        })
        .service(MpesaCallbackRoute::<B>::new())
        .service(MpesaTimeoutRoute::<B>::new())
}

/// The engine APIs for one backend and provider, wired to share the same event producers.
pub struct EngineApis<B, P> {
    pub orders: OrderFlowApi<B>,
    pub payments: PaymentApi<B, P>,
    pub checkout: CheckoutApi<B, P>,
    pub callbacks: CallbackApi<B>,
    pub reconciler: ReconcilerApi<B, P>,
}

impl<B, P> EngineApis<B, P>
where
    B: EngineDatabase + 'static,
    P: PaymentProvider + 'static,
{
    pub fn new(
        db: &B,
        provider: &Arc<P>,
        producers: &EventProducers,
        policy: SelectionPolicy,
        payments: PaymentConfig,
        reconciler: ReconcilerConfig,
    ) -> Self {
        let orders = OrderFlowApi::new(db.clone(), WarehouseSelector::new(policy), producers.clone());
        let payment_api = PaymentApi::new(db.clone(), Arc::clone(provider), payments);
        let checkout = CheckoutApi::new(orders.clone(), payment_api.clone());
        let callbacks = CallbackApi::new(db.clone(), orders.clone(), producers.clone());
        let reconciler = ReconcilerApi::new(db.clone(), Arc::clone(provider), callbacks.clone(), reconciler);
        Self { orders, payments: payment_api, checkout, callbacks, reconciler }
    }

    /// Registers every API as app data, which is where the route handlers extract them from.
    pub fn register(self, cfg: &mut web::ServiceConfig) {
        let ledger = self.orders.ledger().clone();
        cfg.app_data(web::Data::new(ledger))
            .app_data(web::Data::new(self.orders))
            .app_data(web::Data::new(self.payments))
            .app_data(web::Data::new(self.checkout))
            .app_data(web::Data::new(self.callbacks))
            .app_data(web::Data::new(self.reconciler));
    }
}
