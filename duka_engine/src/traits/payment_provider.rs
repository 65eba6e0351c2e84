use duka_common::Money;
use thiserror::Error;

use crate::db_types::{OrderId, PaymentOutcome};

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Network failure, timeout or 5xx. Safe to retry as a new transaction.
    #[error("Payment provider is unavailable: {0}")]
    Unavailable(String),
    /// The provider refused the request.
    #[error("Payment provider rejected the request. [{code}] {message}")]
    Rejected { code: String, message: String },
    #[error("Could not understand the provider's response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub order_id: OrderId,
    pub amount: Money,
    pub payer_reference: String,
    pub description: String,
}

/// The provider accepted the request and will report the outcome asynchronously.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentInitiated {
    pub correlation_id: String,
    pub merchant_request_id: Option<String>,
    pub message: String,
}

/// The result of a status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderStatus {
    pub outcome: PaymentOutcome,
    pub result_code: Option<i64>,
    pub result_desc: Option<String>,
    pub receipt_number: Option<String>,
    /// The provider's response body, for the callback log
    pub raw: String,
}

/// A mobile-money payment provider.
#[allow(async_fn_in_trait)]
pub trait PaymentProvider {
    /// Asks the payer to authorise a payment. Success only means the request was accepted.
    async fn initiate_payment(&self, request: &PaymentRequest) -> Result<PaymentInitiated, ProviderError>;

    /// Polls the current status of a previously initiated payment. A payment the payer has not answered yet is
    /// reported as [`PaymentOutcome::Pending`], not as an error.
    async fn query_payment_status(&self, correlation_id: &str) -> Result<ProviderStatus, ProviderError>;

    /// Requests a reversal of a completed payment. Returns the provider's reference for the reversal request.
    async fn reverse_payment(&self, receipt: &str, amount: Money, reason: &str) -> Result<String, ProviderError>;
}
