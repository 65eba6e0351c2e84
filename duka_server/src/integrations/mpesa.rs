//! Binds the M-Pesa Daraja client to the engine.
//!
//! [`MpesaGateway`] is the engine's [`PaymentProvider`] for M-Pesa STK push. The parsing functions turn the bodies
//! M-Pesa posts to `/mpesa/callback` and `/mpesa/timeout` into provider-neutral [`PaymentEvent`]s.
use duka_common::Money;
use duka_engine::{
    db_types::{CallbackSource, PaymentEvent, PaymentOutcome},
    traits::{PaymentInitiated, PaymentRequest, ProviderStatus},
    PaymentProvider,
    ProviderError,
};
use log::*;
use mpesa_tools::{
    MpesaApi,
    MpesaApiError,
    MpesaConfig,
    StkCallbackEnvelope,
    StkPushParams,
    StkResultKind,
    TimeoutNotice,
};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Could not parse M-Pesa notification. {0}")]
pub struct NotificationParseError(pub String);

#[derive(Clone)]
pub struct MpesaGateway {
    api: MpesaApi,
}

impl MpesaGateway {
    pub fn new(config: MpesaConfig) -> Result<Self, MpesaApiError> {
        Ok(Self { api: MpesaApi::new(config)? })
    }

    pub fn api(&self) -> &MpesaApi {
        &self.api
    }
}

impl PaymentProvider for MpesaGateway {
    async fn initiate_payment(&self, request: &PaymentRequest) -> Result<PaymentInitiated, ProviderError> {
        let params = StkPushParams {
            phone_number: request.payer_reference.clone(),
            amount: request.amount,
            account_reference: request.order_id.as_str().to_string(),
            description: request.description.clone(),
        };
        let response = self.api.stk_push(params).await.map_err(provider_error)?;
        Ok(PaymentInitiated {
            correlation_id: response.checkout_request_id,
            merchant_request_id: Some(response.merchant_request_id),
            message: response.customer_message,
        })
    }

    async fn query_payment_status(&self, correlation_id: &str) -> Result<ProviderStatus, ProviderError> {
        match self.api.stk_query(correlation_id).await {
            Ok(response) => {
                let raw = serde_json::to_string(&response).unwrap_or_default();
                Ok(ProviderStatus {
                    outcome: outcome_for(response.result_kind()),
                    result_code: Some(response.result_code),
                    result_desc: Some(response.result_desc),
                    receipt_number: None,
                    raw,
                })
            },
            Err(e) if e.is_still_processing() => {
                trace!("📱️ STK push {correlation_id} is still being processed");
                Ok(ProviderStatus {
                    outcome: PaymentOutcome::Pending,
                    result_code: None,
                    result_desc: Some(e.to_string()),
                    receipt_number: None,
                    raw: String::default(),
                })
            },
            Err(e) => Err(provider_error(e)),
        }
    }

    async fn reverse_payment(&self, receipt: &str, amount: Money, reason: &str) -> Result<String, ProviderError> {
        let response = self.api.reversal(receipt, amount, reason).await.map_err(provider_error)?;
        Ok(response.conversation_id)
    }
}

pub fn outcome_for(kind: StkResultKind) -> PaymentOutcome {
    match kind {
        StkResultKind::Success => PaymentOutcome::Success,
        StkResultKind::CancelledByUser => PaymentOutcome::Cancelled,
        StkResultKind::Timeout => PaymentOutcome::Timeout,
        StkResultKind::Failed => PaymentOutcome::Failed,
    }
}

pub fn provider_error(e: MpesaApiError) -> ProviderError {
    if e.is_transient() {
        return ProviderError::Unavailable(e.to_string());
    }
    match e {
        MpesaApiError::Rejected { code, message } => ProviderError::Rejected { code, message },
        MpesaApiError::QueryError { status, message } => ProviderError::Rejected { code: status.to_string(), message },
        MpesaApiError::JsonError(s) => ProviderError::InvalidResponse(s),
        MpesaApiError::InvalidPhoneNumber(s) => {
            ProviderError::Rejected { code: "invalid_phone_number".to_string(), message: s }
        },
        MpesaApiError::InvalidAmount(s) => ProviderError::Rejected { code: "invalid_amount".to_string(), message: s },
        MpesaApiError::Initialization(s) => ProviderError::Rejected { code: "not_configured".to_string(), message: s },
        other => ProviderError::Unavailable(other.to_string()),
    }
}

/// Converts an STK callback body into a payment event. The raw body is kept on the event verbatim.
pub fn parse_stk_callback(raw: &[u8]) -> Result<PaymentEvent, NotificationParseError> {
    let envelope = StkCallbackEnvelope::from_slice(raw).map_err(|e| NotificationParseError(e.to_string()))?;
    let callback = envelope.callback();
    if callback.checkout_request_id.trim().is_empty() {
        return Err(NotificationParseError("CheckoutRequestID is empty".to_string()));
    }
    let raw = String::from_utf8_lossy(raw).into_owned();
    let outcome = outcome_for(callback.result_kind());
    let mut event = PaymentEvent::new(&callback.checkout_request_id, outcome, CallbackSource::Callback, raw)
        .with_result(callback.result_code, &callback.result_desc);
    if let Some(receipt) = callback.receipt_number() {
        event = event.with_receipt(&receipt);
    }
    if let Some(amount) = callback.amount() {
        event = event.with_amount(amount);
    }
    Ok(event)
}

/// Converts a timeout notice into a `timeout` payment event.
pub fn parse_timeout_notice(raw: &[u8]) -> Result<PaymentEvent, NotificationParseError> {
    let notice: TimeoutNotice = serde_json::from_slice(raw).map_err(|e| NotificationParseError(e.to_string()))?;
    if notice.checkout_request_id.trim().is_empty() {
        return Err(NotificationParseError("CheckoutRequestID is empty".to_string()));
    }
    let raw = String::from_utf8_lossy(raw).into_owned();
    let mut event =
        PaymentEvent::new(&notice.checkout_request_id, PaymentOutcome::Timeout, CallbackSource::TimeoutNotice, raw);
    event.result_desc = Some(notice.result_desc.unwrap_or_else(|| "Request timed out at the provider".to_string()));
    Ok(event)
}
