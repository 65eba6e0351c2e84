use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use duka_engine::{OrderFlowError, PaymentError, StockError};
use log::error;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Could not read request path: {0}")]
    InvalidRequestPath(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("Insufficient stock. {0}")]
    InsufficientStock(String),
    #[error("The request conflicts with the current state. {0}")]
    Conflict(String),
    #[error("The payment provider is unavailable. {0}")]
    ProviderUnavailable(String),
    #[error("The payment provider rejected the request. {0}")]
    ProviderRejected(String),
    #[error("Requests from this address are not accepted.")]
    ForbiddenPeer,
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::InvalidRequestPath(_) => StatusCode::BAD_REQUEST,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::InsufficientStock(_) => StatusCode::CONFLICT,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::ProviderRejected(_) => StatusCode::BAD_GATEWAY,
            Self::ForbiddenPeer => StatusCode::FORBIDDEN,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

impl From<StockError> for ServerError {
    fn from(e: StockError) -> Self {
        match e {
            StockError::InsufficientStock { .. } => Self::InsufficientStock(e.to_string()),
            StockError::WarehouseNotFound(_) | StockError::StockRecordNotFound { .. } => {
                Self::NoRecordFound(e.to_string())
            },
            StockError::ReservationNotFound(_) => Self::NoRecordFound(e.to_string()),
            StockError::WarehouseInactive(_) => Self::Conflict(e.to_string()),
            StockError::InvalidQuantity(_) | StockError::InvalidAdjustment { .. } | StockError::InvalidCause(_) => {
                Self::InvalidRequestBody(e.to_string())
            },
            StockError::DatabaseError(s) => Self::BackendError(s),
        }
    }
}

impl From<OrderFlowError> for ServerError {
    fn from(e: OrderFlowError) -> Self {
        match e {
            OrderFlowError::Stock(e) => e.into(),
            OrderFlowError::OrderNotFound(_) => Self::NoRecordFound(e.to_string()),
            OrderFlowError::IllegalTransition { .. } => {
                error!("💻️ {e}");
                Self::Conflict(e.to_string())
            },
            OrderFlowError::IllegalPaymentStatus { .. } | OrderFlowError::OrderAlreadyExists(_) => {
                Self::Conflict(e.to_string())
            },
            OrderFlowError::EmptyOrder | OrderFlowError::InvalidLine(_) => Self::InvalidRequestBody(e.to_string()),
            OrderFlowError::DatabaseError(s) => Self::BackendError(s),
        }
    }
}

impl From<PaymentError> for ServerError {
    fn from(e: PaymentError) -> Self {
        match e {
            PaymentError::OrderFlow(e) => e.into(),
            PaymentError::OrderNotFound(_) | PaymentError::TransactionNotFound(_) => Self::NoRecordFound(e.to_string()),
            PaymentError::NoCompletedPayment(_) => Self::NoRecordFound(e.to_string()),
            PaymentError::PaymentNotAllowed { .. } |
            PaymentError::PaymentInProgress(_) |
            PaymentError::RetriesExhausted { .. } |
            PaymentError::ReconciliationExhausted(_) => Self::Conflict(e.to_string()),
            PaymentError::ProviderUnavailable(_) => Self::ProviderUnavailable(e.to_string()),
            PaymentError::ProviderRejected { .. } | PaymentError::InvalidProviderResponse(_) => {
                Self::ProviderRejected(e.to_string())
            },
            PaymentError::DatabaseError(s) => Self::BackendError(s),
        }
    }
}

#[cfg(test)]
mod test {
    use duka_engine::db_types::{OrderId, OrderStatusType, Sku};

    use super::*;

    #[test]
    fn status_codes() {
        let e: ServerError =
            OrderFlowError::Stock(StockError::InsufficientStock { sku: Sku::from("TEA"), requested: 3, available: 1 })
                .into();
        assert_eq!(e.status_code(), StatusCode::CONFLICT);
        let e: ServerError = OrderFlowError::IllegalTransition {
            order_id: OrderId::from("DK-1"),
            from: OrderStatusType::Pending,
            to: OrderStatusType::Shipped,
        }
        .into();
        assert_eq!(e.status_code(), StatusCode::CONFLICT);
        let e: ServerError = PaymentError::TransactionNotFound("ws_CO_1".into()).into();
        assert_eq!(e.status_code(), StatusCode::NOT_FOUND);
        let e: ServerError = PaymentError::ProviderUnavailable("connection reset".into()).into();
        assert_eq!(e.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        let e: ServerError = PaymentError::OrderFlow(OrderFlowError::EmptyOrder).into();
        assert_eq!(e.status_code(), StatusCode::BAD_REQUEST);
        let e: ServerError = StockError::DatabaseError("disk I/O error".into()).into();
        assert_eq!(e.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
