use std::sync::Arc;

use actix_web::{body::to_bytes, http::StatusCode, test, test::TestRequest, web, App};
use duka_common::Money;
use duka_engine::{
    db_types::{NewOrder, NewWarehouse, OrderId, StockAdjustment},
    events::EventProducers,
    CheckoutApi,
    CheckoutRequest,
    EngineDatabase,
    OrderFlowApi,
    PaymentApi,
    PaymentConfig,
    SqliteDatabase,
    StockLedgerApi,
    WarehouseSelector,
};
use log::*;
use serde_json::Value;
use sqlx::{migrate::MigrateDatabase, Sqlite};

use super::mocks::MockProvider;
use crate::{
    config::ServerConfig,
    server::{configure_api, mpesa_scope, EngineApis},
};

pub async fn prepare_test_db() -> SqliteDatabase {
    let _ = env_logger::try_init().ok();
    let url = format!("sqlite://{}/duka_server_test_{}.db", std::env::temp_dir().display(), rand::random::<u64>());
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    db.run_migrations().await.expect("Error running DB migrations");
    debug!("🚀️ Test database ready at {url}");
    db
}

pub async fn tear_down(db: SqliteDatabase) {
    let url = db.url().to_string();
    db.pool().close().await;
    if let Err(e) = Sqlite::drop_database(&url).await {
        warn!("🚀️ Failed to drop test database {url}: {e}");
    }
}

pub fn kes(whole: i64) -> Money {
    Money::from_whole_units(whole)
}

pub fn ledger(db: &SqliteDatabase) -> StockLedgerApi<SqliteDatabase> {
    StockLedgerApi::new(db.clone(), EventProducers::default())
}

pub fn order_flow(db: &SqliteDatabase) -> OrderFlowApi<SqliteDatabase> {
    OrderFlowApi::new(db.clone(), WarehouseSelector::default(), EventProducers::default())
}

/// Creates a warehouse and receives `quantity` units of `sku` into it.
pub async fn stock_warehouse(db: &SqliteDatabase, code: &str, priority: i64, sku: &str, quantity: i64) {
    let ledger = ledger(db);
    ledger.upsert_warehouse(NewWarehouse::new(code, code, priority)).await.expect("Error creating warehouse");
    if quantity > 0 {
        ledger.adjust(StockAdjustment::receipt(code, sku, quantity)).await.expect("Error receiving stock");
    }
}

/// Checks out `quantity` units of TEA-500G at KES 450 each, paid from a fixed phone number.
pub async fn place_paid_order(db: &SqliteDatabase, order_id: &str, quantity: i64, provider: MockProvider) -> Value {
    let orders = order_flow(db);
    let payments = PaymentApi::new(db.clone(), Arc::new(provider), PaymentConfig::default());
    let checkout = CheckoutApi::new(orders, payments);
    let order = NewOrder::new(OrderId::from(order_id), "cust-1").with_item("TEA-500G", quantity, kes(450));
    let request = CheckoutRequest { order, payer_reference: Some("0712345678".into()) };
    let result = checkout.checkout(request).await.expect("Checkout failed");
    serde_json::to_value(result).expect("Could not serialize checkout result")
}

/// Sends a single request through a fresh app wired to `db` and `provider`, the same way the server wires them.
pub async fn send(
    db: &SqliteDatabase,
    provider: MockProvider,
    config: &ServerConfig,
    req: TestRequest,
) -> (StatusCode, String) {
    let apis = EngineApis::new(
        db,
        &Arc::new(provider),
        &EventProducers::default(),
        config.selection_policy,
        config.payments,
        config.reconciler,
    );
    let app = App::new()
        .configure(|cfg| apis.register(cfg))
        .service(web::scope("/api").configure(configure_api::<SqliteDatabase, MockProvider>))
        .service(mpesa_scope::<SqliteDatabase>(config));
    let service = test::init_service(app).await;
    match test::try_call_service(&service, req.to_request()).await {
        Ok(res) => {
            let status = res.status();
            let body = test::read_body(res).await;
            (status, String::from_utf8_lossy(&body).into_owned())
        },
        Err(e) => {
            let res = e.error_response();
            let status = res.status();
            let body = to_bytes(res.into_body()).await.map(|b| b.to_vec()).unwrap_or_default();
            (status, String::from_utf8_lossy(&body).into_owned())
        },
    }
}

pub async fn get_request(db: &SqliteDatabase, provider: MockProvider, path: &str) -> (StatusCode, String) {
    send(db, provider, &ServerConfig::default(), TestRequest::get().uri(path)).await
}

pub async fn post_request(
    db: &SqliteDatabase,
    provider: MockProvider,
    path: &str,
    body: Value,
) -> (StatusCode, String) {
    send(db, provider, &ServerConfig::default(), TestRequest::post().uri(path).set_json(body)).await
}

pub fn json(body: &str) -> Value {
    serde_json::from_str(body).unwrap_or_else(|e| panic!("Response is not JSON ({e}): {body}"))
}
