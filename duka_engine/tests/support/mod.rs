#![allow(dead_code)]
use std::{collections::VecDeque, sync::Mutex, time::Duration};

use duka_common::Money;
use duka_engine::{
    db_types::{NewWarehouse, PaymentOutcome, StockAdjustment},
    events::EventProducers,
    traits::{PaymentInitiated, PaymentRequest, ProviderStatus},
    CallbackApi,
    EngineDatabase,
    OrderFlowApi,
    PaymentApi,
    PaymentConfig,
    PaymentProvider,
    ProviderError,
    SqliteDatabase,
    StockLedgerApi,
    WarehouseSelector,
};
use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};

pub fn random_db_path() -> String {
    let dir = std::env::temp_dir();
    format!("sqlite://{}/duka_test_{}.db", dir.display(), rand::random::<u64>())
}

pub async fn prepare_test_env() -> SqliteDatabase {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    let url = random_db_path();
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

pub fn ledger(db: &SqliteDatabase) -> StockLedgerApi<SqliteDatabase> {
    StockLedgerApi::new(db.clone(), EventProducers::default())
}

pub fn order_flow(db: &SqliteDatabase) -> OrderFlowApi<SqliteDatabase> {
    OrderFlowApi::new(db.clone(), WarehouseSelector::default(), EventProducers::default())
}

pub fn callbacks(db: &SqliteDatabase) -> CallbackApi<SqliteDatabase> {
    CallbackApi::new(db.clone(), order_flow(db), EventProducers::default())
}

pub fn payments(db: &SqliteDatabase, provider: ScriptedProvider) -> PaymentApi<SqliteDatabase, ScriptedProvider> {
    PaymentApi::new(db.clone(), std::sync::Arc::new(provider), PaymentConfig::default())
}

/// Creates a warehouse and receives `quantity` units of `sku` into it.
pub async fn stock_warehouse(db: &SqliteDatabase, code: &str, priority: i64, sku: &str, quantity: i64) {
    let ledger = ledger(db);
    ledger.upsert_warehouse(NewWarehouse::new(code, code, priority)).await.expect("Error creating warehouse");
    if quantity > 0 {
        ledger.adjust(StockAdjustment::receipt(code, sku, quantity)).await.expect("Error receiving stock");
    }
}

pub fn kes(whole: i64) -> Money {
    Money::from_whole_units(whole)
}

//--------------------------------------   ScriptedProvider    ---------------------------------------------------------
/// A payment provider that answers from a script. Once a script runs out, initiations are accepted with generated
/// correlation ids and queries report the payment as still pending.
#[derive(Default)]
pub struct ScriptedProvider {
    initiations: Mutex<VecDeque<Result<PaymentInitiated, ProviderError>>>,
    queries: Mutex<VecDeque<Result<ProviderStatus, ProviderError>>>,
    initiation_delay: Option<Duration>,
    counter: Mutex<u64>,
}

impl ScriptedProvider {
    pub fn accepting(correlation_ids: &[&str]) -> Self {
        let provider = Self::default();
        for cid in correlation_ids {
            provider.push_initiation(Ok(PaymentInitiated {
                correlation_id: cid.to_string(),
                merchant_request_id: Some(format!("mr-{cid}")),
                message: "Success. Request accepted for processing".to_string(),
            }));
        }
        provider
    }

    pub fn slow(delay: Duration) -> Self {
        Self { initiation_delay: Some(delay), ..Default::default() }
    }

    pub fn push_initiation(&self, response: Result<PaymentInitiated, ProviderError>) {
        self.initiations.lock().unwrap().push_back(response);
    }

    pub fn push_query(&self, response: Result<ProviderStatus, ProviderError>) {
        self.queries.lock().unwrap().push_back(response);
    }

    pub fn push_status(&self, outcome: PaymentOutcome, code: i64, desc: &str, receipt: Option<&str>) {
        self.push_query(Ok(ProviderStatus {
            outcome,
            result_code: Some(code),
            result_desc: Some(desc.to_string()),
            receipt_number: receipt.map(String::from),
            raw: format!(r#"{{"ResultCode":"{code}","ResultDesc":"{desc}"}}"#),
        }));
    }
}

impl PaymentProvider for ScriptedProvider {
    async fn initiate_payment(&self, request: &PaymentRequest) -> Result<PaymentInitiated, ProviderError> {
        if let Some(delay) = self.initiation_delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.initiations.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            let mut counter = self.counter.lock().unwrap();
            *counter += 1;
            Ok(PaymentInitiated {
                correlation_id: format!("ws_CO_{}_{}", request.order_id.as_str(), *counter),
                merchant_request_id: None,
                message: "Success. Request accepted for processing".to_string(),
            })
        })
    }

    async fn query_payment_status(&self, _correlation_id: &str) -> Result<ProviderStatus, ProviderError> {
        let scripted = self.queries.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(ProviderStatus {
                outcome: PaymentOutcome::Pending,
                result_code: None,
                result_desc: Some("The transaction is being processed".to_string()),
                receipt_number: None,
                raw: r#"{"errorCode":"500.001.1001"}"#.to_string(),
            })
        })
    }

    async fn reverse_payment(&self, receipt: &str, _amount: Money, _reason: &str) -> Result<String, ProviderError> {
        Ok(format!("rev-{receipt}"))
    }
}
