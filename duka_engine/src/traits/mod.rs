//! # Backend contracts
//!
//! The engine never talks to a database or a payment provider directly. It goes through the traits defined here.
//!
//! * [`StockManagement`] is the only way stock records change. Every mutation is atomic on its
//!   `(warehouse, sku)` row and appends to the movement log.
//! * [`OrderManagement`] stores orders, their line items and their status history. Status changes are
//!   compare-and-swap.
//! * [`PaymentTransactions`] stores payment attempts. A transaction leaves `processing` exactly once.
//! * [`CallbackStore`] is the append-only log of every payment outcome the engine has observed.
//! * [`EngineDatabase`] bundles the four storage traits for backends that provide all of them.
//! * [`PaymentProvider`] abstracts the mobile-money provider.
mod callback_store;
mod engine_database;
mod order_management;
mod payment_provider;
mod payment_transactions;
mod stock_management;

pub use callback_store::CallbackStore;
pub use engine_database::EngineDatabase;
pub use order_management::{OrderManagement, OrderQueryFilter};
pub use payment_provider::{PaymentInitiated, PaymentProvider, PaymentRequest, ProviderError, ProviderStatus};
pub use payment_transactions::PaymentTransactions;
pub use stock_management::{StockError, StockManagement};
