//! The engine's public API.
//!
//! Each API is a thin struct over a storage backend (and, for payments, a provider). They hold no state of their own
//! and are cheap to clone, so a server can hand a copy to every worker.
pub mod callback_api;
pub mod checkout_api;
pub mod errors;
pub mod order_flow_api;
pub mod payment_api;
pub mod reconciler_api;
pub mod stock_ledger_api;
pub mod warehouse_selector;
