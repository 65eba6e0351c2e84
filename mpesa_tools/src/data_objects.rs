use chrono::{DateTime, Utc};
use duka_common::Money;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::helpers::{i64_from_string_or_number, parse_mpesa_timestamp, StkResultKind};

fn default_token_lifetime() -> i64 {
    3600
}

//--------------------------------------     OAuth token     ---------------------------------------------------------
#[derive(Debug, Clone, Deserialize)]
pub struct AccessTokenResponse {
    pub access_token: String,
    /// Seconds. Daraja sends this as a string.
    #[serde(default = "default_token_lifetime", deserialize_with = "i64_from_string_or_number")]
    pub expires_in: i64,
}

//--------------------------------------     Error body      ---------------------------------------------------------
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderErrorBody {
    #[serde(rename = "requestId", default)]
    pub request_id: Option<String>,
    #[serde(rename = "errorCode")]
    pub error_code: String,
    #[serde(rename = "errorMessage", default)]
    pub error_message: String,
}

//--------------------------------------      STK push       ---------------------------------------------------------
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StkPushRequest {
    pub business_short_code: String,
    pub password: String,
    pub timestamp: String,
    pub transaction_type: String,
    pub amount: i64,
    pub party_a: String,
    pub party_b: String,
    pub phone_number: String,
    #[serde(rename = "CallBackURL")]
    pub callback_url: String,
    pub account_reference: String,
    pub transaction_desc: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StkPushResponse {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResponseCode")]
    pub response_code: String,
    #[serde(rename = "ResponseDescription", default)]
    pub response_description: String,
    #[serde(rename = "CustomerMessage", default)]
    pub customer_message: String,
}

impl StkPushResponse {
    pub fn is_accepted(&self) -> bool {
        self.response_code.trim() == "0"
    }
}

//--------------------------------------      STK query      ---------------------------------------------------------
#[derive(Debug, Clone, Serialize)]
pub struct StkQueryRequest {
    #[serde(rename = "BusinessShortCode")]
    pub business_short_code: String,
    #[serde(rename = "Password")]
    pub password: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StkQueryResponse {
    #[serde(rename = "ResponseCode", default)]
    pub response_code: String,
    #[serde(rename = "ResponseDescription", default)]
    pub response_description: String,
    #[serde(rename = "MerchantRequestID", default)]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResultCode", deserialize_with = "i64_from_string_or_number")]
    pub result_code: i64,
    #[serde(rename = "ResultDesc", default)]
    pub result_desc: String,
}

impl StkQueryResponse {
    pub fn result_kind(&self) -> StkResultKind {
        StkResultKind::from_result_code(self.result_code)
    }
}

//--------------------------------------      Reversal       ---------------------------------------------------------
#[derive(Debug, Clone, Serialize)]
pub struct ReversalRequest {
    #[serde(rename = "Initiator")]
    pub initiator: String,
    #[serde(rename = "SecurityCredential")]
    pub security_credential: String,
    #[serde(rename = "CommandID")]
    pub command_id: String,
    #[serde(rename = "TransactionID")]
    pub transaction_id: String,
    #[serde(rename = "Amount")]
    pub amount: i64,
    #[serde(rename = "ReceiverParty")]
    pub receiver_party: String,
    // Daraja's spelling
    #[serde(rename = "RecieverIdentifierType")]
    pub receiver_identifier_type: String,
    #[serde(rename = "ResultURL")]
    pub result_url: String,
    #[serde(rename = "QueueTimeOutURL")]
    pub queue_timeout_url: String,
    #[serde(rename = "Remarks")]
    pub remarks: String,
    #[serde(rename = "Occasion")]
    pub occasion: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReversalResponse {
    #[serde(rename = "OriginatorConversationID", default)]
    pub originator_conversation_id: String,
    #[serde(rename = "ConversationID", default)]
    pub conversation_id: String,
    #[serde(rename = "ResponseCode")]
    pub response_code: String,
    #[serde(rename = "ResponseDescription", default)]
    pub response_description: String,
}

impl ReversalResponse {
    pub fn is_accepted(&self) -> bool {
        self.response_code.trim() == "0"
    }
}

//--------------------------------------    STK callback     ---------------------------------------------------------
/// The payload M-Pesa posts to the STK `CallBackURL`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StkCallbackEnvelope {
    #[serde(rename = "Body")]
    pub body: StkCallbackBody,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StkCallbackBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkCallback,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID", default)]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResultCode", deserialize_with = "i64_from_string_or_number")]
    pub result_code: i64,
    #[serde(rename = "ResultDesc", default)]
    pub result_desc: String,
    /// Only present on successful payments
    #[serde(rename = "CallbackMetadata", default)]
    pub callback_metadata: Option<CallbackMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CallbackMetadata {
    #[serde(rename = "Item", default)]
    pub items: Vec<CallbackItem>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CallbackItem {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value", default)]
    pub value: Option<Value>,
}

impl StkCallbackEnvelope {
    pub fn from_slice(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw)
    }

    pub fn callback(&self) -> &StkCallback {
        &self.body.stk_callback
    }
}

impl StkCallback {
    pub fn result_kind(&self) -> StkResultKind {
        StkResultKind::from_result_code(self.result_code)
    }

    pub fn item(&self, name: &str) -> Option<&Value> {
        self.callback_metadata.as_ref()?.items.iter().find(|i| i.name == name).and_then(|i| i.value.as_ref())
    }

    pub fn receipt_number(&self) -> Option<String> {
        self.item("MpesaReceiptNumber").map(value_to_string)
    }

    /// The amount paid. M-Pesa reports whole shillings, sometimes with a trailing `.0`.
    pub fn amount(&self) -> Option<Money> {
        let value = self.item("Amount")?;
        let cents = match value {
            Value::Number(n) => n.as_i64().map(|v| v * 100).or_else(|| n.as_f64().map(|f| (f * 100.0).round() as i64)),
            Value::String(s) => Money::from_decimal_str(s).ok().map(|m| m.value()),
            _ => None,
        }?;
        Some(Money::from(cents))
    }

    pub fn phone_number(&self) -> Option<String> {
        self.item("PhoneNumber").map(value_to_string)
    }

    pub fn transaction_date(&self) -> Option<DateTime<Utc>> {
        self.item("TransactionDate").and_then(|v| parse_mpesa_timestamp(&value_to_string(v)))
    }
}

fn value_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

//--------------------------------------   Timeout notice    ---------------------------------------------------------
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimeoutNotice {
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResultDesc", default)]
    pub result_desc: Option<String>,
}
