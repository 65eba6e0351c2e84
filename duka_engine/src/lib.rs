//! Duka Engine
//!
//! The Duka engine keeps orders, payments and inventory consistent with one another for a small online shop that
//! takes payment by M-Pesa STK push.
//!
//! The library is divided into the following sections:
//! 1. Data types ([`mod@db_types`]). These are the records stored by the backends and returned by the APIs.
//! 2. Backend contracts ([`mod@traits`]). A storage backend implements [`StockManagement`], [`OrderManagement`],
//!    [`PaymentTransactions`] and [`CallbackStore`], and advertises all four through [`EngineDatabase`]. A payment
//!    provider implements [`PaymentProvider`]. SQLite is the supported backend.
//! 3. The engine API ([`mod@engine_api`]). This is where the business rules live: the stock ledger, warehouse
//!    selection, the order state machine, checkout, payment initiation, callback ingestion and reconciliation.
//!
//! The engine also emits events when an order changes status, a payment settles, or stock runs low. Use
//! [`events::EventHooks`] to subscribe to them.
pub mod db_types;
pub mod engine_api;
pub mod events;
pub mod helpers;
pub mod traits;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use engine_api::{
    callback_api::{CallbackApi, IngestResult},
    checkout_api::{CheckoutApi, CheckoutRequest, CheckoutResult},
    errors::{OrderFlowError, PaymentError},
    order_flow_api::OrderFlowApi,
    payment_api::{PaymentApi, PaymentConfig},
    reconciler_api::{ReconcilerApi, ReconcilerConfig, SweepResult},
    stock_ledger_api::StockLedgerApi,
    warehouse_selector::{SelectionPolicy, WarehouseSelector},
};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use traits::{
    CallbackStore,
    EngineDatabase,
    OrderManagement,
    PaymentProvider,
    PaymentTransactions,
    ProviderError,
    StockError,
    StockManagement,
};
