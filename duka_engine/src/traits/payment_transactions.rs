use std::time::Duration;

use crate::{
    db_types::{NewPaymentTransaction, OrderId, PaymentTransaction, Settlement},
    engine_api::errors::PaymentError,
};

#[allow(async_fn_in_trait)]
pub trait PaymentTransactions {
    /// Creates a new transaction in `processing`.
    async fn insert_transaction(&self, tx: NewPaymentTransaction) -> Result<PaymentTransaction, PaymentError>;

    /// Stores the provider's correlation id. The id is written at most once; returns `None` if the transaction already
    /// has one.
    async fn assign_correlation_id(
        &self,
        id: i64,
        correlation_id: &str,
        merchant_request_id: Option<&str>,
    ) -> Result<Option<PaymentTransaction>, PaymentError>;

    async fn fetch_transaction(&self, id: i64) -> Result<Option<PaymentTransaction>, PaymentError>;

    async fn fetch_transaction_by_correlation_id(
        &self,
        correlation_id: &str,
    ) -> Result<Option<PaymentTransaction>, PaymentError>;

    /// All attempts for the order, oldest first.
    async fn fetch_transactions_for_order(&self, order_id: &OrderId) -> Result<Vec<PaymentTransaction>, PaymentError>;

    /// Moves the transaction out of `processing`. This is a compare-and-swap: if the transaction is no longer
    /// `processing` nothing changes and `None` is returned.
    async fn settle_transaction(
        &self,
        id: i64,
        settlement: Settlement,
    ) -> Result<Option<PaymentTransaction>, PaymentError>;

    /// Stores the provider receipt on a `completed` transaction that was settled without one. Returns `None` if the
    /// transaction is not `completed` or already has a receipt.
    async fn fill_receipt_number(&self, id: i64, receipt: &str) -> Result<Option<PaymentTransaction>, PaymentError>;

    /// `completed -> reversed`. Returns `None` if the transaction was not `completed`.
    async fn mark_transaction_reversed(&self, id: i64) -> Result<Option<PaymentTransaction>, PaymentError>;

    /// Transactions that have been `processing` for longer than `older_than`, oldest first.
    async fn fetch_stale_transactions(&self, older_than: Duration) -> Result<Vec<PaymentTransaction>, PaymentError>;

    /// Increments the sweep counter and returns the new value.
    async fn record_sweep_attempt(&self, id: i64) -> Result<i64, PaymentError>;

    /// The number of `pending` or `processing` transactions for the order, ignoring `excluding` if given.
    async fn count_live_transactions(&self, order_id: &OrderId, excluding: Option<i64>) -> Result<i64, PaymentError>;
}
