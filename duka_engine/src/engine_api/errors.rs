use thiserror::Error;

use crate::{
    db_types::{OrderId, OrderStatusType, PaymentStatusType},
    traits::{ProviderError, StockError},
};

#[derive(Debug, Clone, Error)]
pub enum OrderFlowError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Order {0} already exists")]
    OrderAlreadyExists(OrderId),
    #[error("Order {order_id} cannot move from {from} to {to}")]
    IllegalTransition { order_id: OrderId, from: OrderStatusType, to: OrderStatusType },
    #[error("Order {order_id} cannot change payment status from {from} to {to}")]
    IllegalPaymentStatus { order_id: OrderId, from: PaymentStatusType, to: PaymentStatusType },
    #[error("An order must contain at least one item")]
    EmptyOrder,
    #[error("Invalid order line: {0}")]
    InvalidLine(String),
    #[error("{0}")]
    Stock(#[from] StockError),
}

impl From<sqlx::Error> for OrderFlowError {
    fn from(e: sqlx::Error) -> Self {
        OrderFlowError::DatabaseError(e.to_string())
    }
}

impl OrderFlowError {
    pub fn is_insufficient_stock(&self) -> bool {
        matches!(self, Self::Stock(StockError::InsufficientStock { .. }))
    }
}

#[derive(Debug, Clone, Error)]
pub enum PaymentError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Payment transaction {0} does not exist")]
    TransactionNotFound(String),
    #[error("Order {order_id} cannot accept a payment: {reason}")]
    PaymentNotAllowed { order_id: OrderId, reason: String },
    #[error("Order {0} already has a payment in progress")]
    PaymentInProgress(OrderId),
    #[error("Order {order_id} has used all {attempts} payment attempts")]
    RetriesExhausted { order_id: OrderId, attempts: i64 },
    #[error("Order {0} has no completed payment to reverse")]
    NoCompletedPayment(OrderId),
    #[error("Payment provider is unavailable: {0}")]
    ProviderUnavailable(String),
    #[error("Payment provider rejected the request. [{code}] {message}")]
    ProviderRejected { code: String, message: String },
    #[error("Could not understand the provider's response: {0}")]
    InvalidProviderResponse(String),
    #[error("Payment {0} was force-failed after reconciliation was exhausted")]
    ReconciliationExhausted(String),
    #[error("{0}")]
    OrderFlow(#[from] OrderFlowError),
}

impl From<sqlx::Error> for PaymentError {
    fn from(e: sqlx::Error) -> Self {
        PaymentError::DatabaseError(e.to_string())
    }
}

impl From<StockError> for PaymentError {
    fn from(e: StockError) -> Self {
        PaymentError::OrderFlow(OrderFlowError::Stock(e))
    }
}

impl From<ProviderError> for PaymentError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::Unavailable(s) => PaymentError::ProviderUnavailable(s),
            ProviderError::Rejected { code, message } => PaymentError::ProviderRejected { code, message },
            ProviderError::InvalidResponse(s) => PaymentError::InvalidProviderResponse(s),
        }
    }
}
