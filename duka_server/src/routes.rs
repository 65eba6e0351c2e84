//! Request handler definitions
//!
//! Define each route and it handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests. Every engine call is async, so handlers only ever `.await` them.
//!
//! The `/mpesa` handlers never return an error. M-Pesa redelivers any notification that does not receive the fixed
//! acknowledgement, so failures are logged (and the raw payload kept) instead of being reported back.
use actix_web::{get, web, HttpResponse, Responder};
use duka_engine::{
    db_types::{CallbackSource, NewWarehouse, OrderId, PaymentEvent, Sku, StockAdjustment, StockTransfer},
    CallbackApi,
    CheckoutApi,
    CheckoutRequest,
    EngineDatabase,
    OrderFlowApi,
    PaymentApi,
    PaymentProvider,
    ReconcilerApi,
    StockLedgerApi,
};
use log::*;
use serde_json::json;

use crate::{
    data_objects::{
        CallbackAck,
        OrderDetail,
        ReorderPointParams,
        RetryPaymentParams,
        ReversalParams,
        TransitionParams,
    },
    errors::ServerError,
    integrations::mpesa::{parse_stk_callback, parse_timeout_notice, NotificationParseError},
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Checkout  ----------------------------------------------------
route!(checkout => Post "/checkout" impl EngineDatabase, PaymentProvider);
/// Places an order and, if a payer phone number is given, sends the STK push for it.
///
/// Stock for every line is reserved before anything is charged. If any line cannot be covered the whole order is
/// rejected with a 409 and nothing stays reserved. If the order was placed but the STK push could not be sent, the
/// response is still a 200: the order is returned with `payment_error` set and the payment can be retried.
pub async fn checkout<B, P>(
    api: web::Data<CheckoutApi<B, P>>,
    body: web::Json<CheckoutRequest>,
) -> Result<HttpResponse, ServerError>
where
    B: EngineDatabase,
    P: PaymentProvider,
{
    let request = body.into_inner();
    debug!("💻️ POST checkout for order {} ({} lines)", request.order.order_id, request.order.items.len());
    let result = api.checkout(request).await.map_err(|e| {
        debug!("💻️ Checkout failed. {e}");
        ServerError::from(e)
    })?;
    Ok(HttpResponse::Ok().json(result))
}

//----------------------------------------------   Orders  ----------------------------------------------------
route!(order_by_id => Get "/orders/{order_id}" impl EngineDatabase, PaymentProvider);
pub async fn order_by_id<B, P>(
    path: web::Path<OrderId>,
    orders: web::Data<OrderFlowApi<B>>,
    payments: web::Data<PaymentApi<B, P>>,
) -> Result<HttpResponse, ServerError>
where
    B: EngineDatabase,
    P: PaymentProvider,
{
    let order_id = path.into_inner();
    debug!("💻️ GET order_by_id({order_id})");
    let order = orders.fetch_order(&order_id).await?;
    let items = orders.items(&order_id).await?;
    let reservations = orders.ledger().reservations_for_order(&order_id).await?;
    let transactions = payments.transactions_for_order(&order_id).await?;
    Ok(HttpResponse::Ok().json(OrderDetail { order, items, reservations, transactions }))
}

route!(order_history => Get "/orders/{order_id}/history" impl EngineDatabase);
pub async fn order_history<B: EngineDatabase>(
    path: web::Path<OrderId>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    debug!("💻️ GET order_history({order_id})");
    // Distinguish an unknown order from one with no history yet
    api.fetch_order(&order_id).await?;
    let history = api.history(&order_id).await?;
    Ok(HttpResponse::Ok().json(history))
}

route!(order_status => Post "/orders/{order_id}/status" impl EngineDatabase);
/// Moves an order through the state machine. Illegal moves are answered with a 409.
pub async fn order_status<B: EngineDatabase>(
    path: web::Path<OrderId>,
    api: web::Data<OrderFlowApi<B>>,
    body: web::Json<TransitionParams>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    let TransitionParams { status, actor, reason } = body.into_inner();
    debug!("💻️ POST order_status({order_id}) -> {status} by {actor}");
    let order = api.transition(&order_id, status, &actor, reason.as_deref()).await?;
    Ok(HttpResponse::Ok().json(order))
}

//----------------------------------------------   Payments  ----------------------------------------------------
route!(retry_payment => Post "/orders/{order_id}/payments" impl EngineDatabase, PaymentProvider);
/// Starts a new payment attempt for a pending order, linked to the previous attempt.
pub async fn retry_payment<B, P>(
    path: web::Path<OrderId>,
    api: web::Data<PaymentApi<B, P>>,
    body: web::Json<RetryPaymentParams>,
) -> Result<HttpResponse, ServerError>
where
    B: EngineDatabase,
    P: PaymentProvider,
{
    let order_id = path.into_inner();
    let params = body.into_inner();
    debug!("💻️ POST retry_payment({order_id})");
    let tx = api.retry(&order_id, params.payer_reference.as_deref()).await?;
    Ok(HttpResponse::Ok().json(tx))
}

route!(reverse_payment => Post "/orders/{order_id}/reversal" impl EngineDatabase, PaymentProvider);
pub async fn reverse_payment<B, P>(
    path: web::Path<OrderId>,
    api: web::Data<PaymentApi<B, P>>,
    body: web::Json<ReversalParams>,
) -> Result<HttpResponse, ServerError>
where
    B: EngineDatabase,
    P: PaymentProvider,
{
    let order_id = path.into_inner();
    let ReversalParams { reason } = body.into_inner();
    info!("💻️ POST reverse_payment({order_id}). Reason: {reason}");
    let tx = api.request_reversal(&order_id, &reason).await?;
    Ok(HttpResponse::Ok().json(tx))
}

route!(payment_status => Get "/payments/{correlation_id}" impl EngineDatabase, PaymentProvider);
/// Returns the transaction for a correlation id. A transaction still in `processing` is polled at the provider first,
/// within the status query timeout. If that poll fails, the last known state is returned.
pub async fn payment_status<B, P>(
    path: web::Path<String>,
    api: web::Data<ReconcilerApi<B, P>>,
) -> Result<HttpResponse, ServerError>
where
    B: EngineDatabase,
    P: PaymentProvider,
{
    let correlation_id = path.into_inner();
    debug!("💻️ GET payment_status({correlation_id})");
    let tx = api.refresh(&correlation_id).await?;
    Ok(HttpResponse::Ok().json(tx))
}

//----------------------------------------------   Stock  ----------------------------------------------------
route!(stock_levels => Get "/stock/{sku}" impl EngineDatabase);
pub async fn stock_levels<B: EngineDatabase>(
    path: web::Path<Sku>,
    api: web::Data<StockLedgerApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let sku = path.into_inner();
    debug!("💻️ GET stock_levels({sku})");
    let levels = api.stock_levels(&sku).await?;
    Ok(HttpResponse::Ok().json(levels))
}

route!(adjust_stock => Post "/stock/adjust" impl EngineDatabase);
/// Applies a manual ledger adjustment (receipt, damage, write-off, count correction, return).
pub async fn adjust_stock<B: EngineDatabase>(
    api: web::Data<StockLedgerApi<B>>,
    body: web::Json<StockAdjustment>,
) -> Result<HttpResponse, ServerError> {
    let adjustment = body.into_inner();
    debug!(
        "💻️ POST adjust_stock({} in {} by {}, {})",
        adjustment.sku, adjustment.warehouse, adjustment.delta, adjustment.cause
    );
    let record = api.adjust(adjustment).await?;
    Ok(HttpResponse::Ok().json(record))
}

route!(transfer_stock => Post "/stock/transfer" impl EngineDatabase);
pub async fn transfer_stock<B: EngineDatabase>(
    api: web::Data<StockLedgerApi<B>>,
    body: web::Json<StockTransfer>,
) -> Result<HttpResponse, ServerError> {
    let transfer = body.into_inner();
    debug!(
        "💻️ POST transfer_stock({} x {} from {} to {})",
        transfer.quantity, transfer.sku, transfer.from, transfer.to
    );
    let (from, to) = api.transfer(transfer).await?;
    Ok(HttpResponse::Ok().json(json!({ "from": from, "to": to })))
}

route!(reorder_point => Post "/stock/reorder_point" impl EngineDatabase);
pub async fn reorder_point<B: EngineDatabase>(
    api: web::Data<StockLedgerApi<B>>,
    body: web::Json<ReorderPointParams>,
) -> Result<HttpResponse, ServerError> {
    let ReorderPointParams { warehouse, sku, reorder_point } = body.into_inner();
    debug!("💻️ POST reorder_point({sku} in {warehouse} = {reorder_point})");
    let record = api.set_reorder_point(&warehouse, &sku, reorder_point).await?;
    Ok(HttpResponse::Ok().json(record))
}

//----------------------------------------------   Warehouses  ----------------------------------------------------
route!(warehouses => Get "/warehouses" impl EngineDatabase);
pub async fn warehouses<B: EngineDatabase>(api: web::Data<StockLedgerApi<B>>) -> Result<HttpResponse, ServerError> {
    trace!("💻️ GET warehouses");
    let warehouses = api.warehouses().await?;
    Ok(HttpResponse::Ok().json(warehouses))
}

route!(upsert_warehouse => Post "/warehouses" impl EngineDatabase);
pub async fn upsert_warehouse<B: EngineDatabase>(
    api: web::Data<StockLedgerApi<B>>,
    body: web::Json<NewWarehouse>,
) -> Result<HttpResponse, ServerError> {
    let warehouse = body.into_inner();
    info!("💻️ POST upsert_warehouse({})", warehouse.code);
    let warehouse = api.upsert_warehouse(warehouse).await?;
    Ok(HttpResponse::Ok().json(warehouse))
}

//----------------------------------------------   M-Pesa  ----------------------------------------------------
route!(mpesa_callback => Post "/callback" impl EngineDatabase);
/// Receives the STK push result. Always answers with the fixed acknowledgement.
pub async fn mpesa_callback<B: EngineDatabase>(api: web::Data<CallbackApi<B>>, body: web::Bytes) -> HttpResponse {
    trace!("💻️ Received M-Pesa STK callback");
    ingest_notification(api.as_ref(), &body, CallbackSource::Callback, parse_stk_callback).await;
    HttpResponse::Ok().json(CallbackAck::default())
}

route!(mpesa_timeout => Post "/timeout" impl EngineDatabase);
/// Receives M-Pesa's timeout notice. Always answers with the fixed acknowledgement.
pub async fn mpesa_timeout<B: EngineDatabase>(api: web::Data<CallbackApi<B>>, body: web::Bytes) -> HttpResponse {
    trace!("💻️ Received M-Pesa timeout notice");
    ingest_notification(api.as_ref(), &body, CallbackSource::TimeoutNotice, parse_timeout_notice).await;
    HttpResponse::Ok().json(CallbackAck::default())
}

async fn ingest_notification<B, F>(api: &CallbackApi<B>, body: &[u8], source: CallbackSource, parse: F)
where
    B: EngineDatabase,
    F: Fn(&[u8]) -> Result<PaymentEvent, NotificationParseError>,
{
    let result = match parse(body) {
        Ok(event) => api.ingest(event).await,
        Err(e) => {
            let raw = String::from_utf8_lossy(body);
            warn!("💻️ {e}. Payload: {raw}");
            api.record_malformed(&raw, source, &e.to_string()).await
        },
    };
    match result {
        Ok(outcome) => debug!("💻️ M-Pesa notification processed: {outcome:?}"),
        Err(e) => {
            error!("💻️ Error processing M-Pesa notification. {e}. Payload: {}", String::from_utf8_lossy(body));
        },
    }
}
