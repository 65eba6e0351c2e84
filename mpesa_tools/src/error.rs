use thiserror::Error;

use crate::helpers::STK_STILL_PROCESSING;

#[derive(Debug, Error)]
pub enum MpesaApiError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error("Could not reach the M-Pesa API: {0}")]
    Network(String),
    #[error("Could not deserialize JSON: {0}")]
    JsonError(String),
    #[error("Query failed. Error {status}. {message}")]
    QueryError { status: u16, message: String },
    #[error("M-Pesa rejected the request. {code}: {message}")]
    Rejected { code: String, message: String },
    #[error("Could not obtain an access token: {0}")]
    TokenError(String),
    #[error("Invalid phone number: {0}")]
    InvalidPhoneNumber(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
}

impl MpesaApiError {
    /// Errors where the request may never have reached M-Pesa, or M-Pesa itself failed. A fresh attempt may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::TokenError(_) => true,
            Self::QueryError { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// M-Pesa answers status queries for in-flight STK pushes with a dedicated error code.
    pub fn is_still_processing(&self) -> bool {
        matches!(self, Self::Rejected { code, .. } if code == STK_STILL_PROCESSING)
    }
}
