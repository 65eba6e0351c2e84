use crate::traits::{CallbackStore, OrderManagement, PaymentTransactions, StockManagement};

/// A storage backend that provides everything the engine needs.
pub trait EngineDatabase: Clone + StockManagement + OrderManagement + PaymentTransactions + CallbackStore {
    /// The URL of the database
    fn url(&self) -> &str;
}
