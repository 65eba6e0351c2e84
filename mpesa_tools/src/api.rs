use std::{sync::Arc, time::Duration};

use chrono::Utc;
use duka_common::{Money, Secret};
use log::*;
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    config::MpesaConfig,
    data_objects::{
        AccessTokenResponse,
        ProviderErrorBody,
        ReversalRequest,
        ReversalResponse,
        StkPushRequest,
        StkPushResponse,
        StkQueryRequest,
        StkQueryResponse,
    },
    helpers::{mpesa_timestamp, normalize_phone_number, stk_password, truncate, STK_STILL_PROCESSING},
    token::{AccessToken, TokenCache},
    MpesaApiError,
};

/// Tokens are considered stale this long before M-Pesa says they expire.
pub const TOKEN_SAFETY_MARGIN: Duration = Duration::from_secs(60);
const ACCOUNT_REFERENCE_MAX_LEN: usize = 12;
const TRANSACTION_DESC_MAX_LEN: usize = 13;

/// Parameters for an STK push.
#[derive(Debug, Clone)]
pub struct StkPushParams {
    /// The payer's phone number, in any common Kenyan format
    pub phone_number: String,
    pub amount: Money,
    /// Shown to the payer and echoed back in statements. Usually the order number.
    pub account_reference: String,
    pub description: String,
}

/// Client for the Daraja API. Cheap to clone: clones share the HTTP connection pool and the token cache.
#[derive(Clone)]
pub struct MpesaApi {
    config: MpesaConfig,
    client: Arc<Client>,
    tokens: Arc<TokenCache>,
}

impl MpesaApi {
    pub fn new(config: MpesaConfig) -> Result<Self, MpesaApiError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| MpesaApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client), tokens: Arc::new(TokenCache::new(TOKEN_SAFETY_MARGIN)) })
    }

    pub fn config(&self) -> &MpesaConfig {
        &self.config
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    /// Returns a valid access token, fetching a new one if the cached token is missing or stale.
    pub async fn access_token(&self) -> Result<Secret<String>, MpesaApiError> {
        self.tokens.get_or_refresh(|| self.fetch_access_token()).await
    }

    async fn fetch_access_token(&self) -> Result<AccessToken, MpesaApiError> {
        let url = self.url("/oauth/v1/generate");
        debug!("📱️ Requesting a new access token from {url}");
        let response = self
            .client
            .get(url)
            .query(&[("grant_type", "client_credentials")])
            .basic_auth(&self.config.consumer_key, Some(self.config.consumer_secret.reveal()))
            .send()
            .await
            .map_err(|e| {
                warn!("📱️ Access token request failed. {e}");
                MpesaApiError::TokenError(e.to_string())
            })?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!("📱️ Access token request was refused ({status}). {message}");
            return Err(MpesaApiError::TokenError(format!("{status}: {message}")));
        }
        let body = response.json::<AccessTokenResponse>().await.map_err(|e| MpesaApiError::JsonError(e.to_string()))?;
        let expires_in = Duration::from_secs(u64::try_from(body.expires_in).unwrap_or_default());
        Ok(AccessToken { token: Secret::new(body.access_token), expires_in })
    }

    /// Sends an authenticated JSON POST and decodes the response.
    ///
    /// Non-2xx responses carrying a Daraja error body become [`MpesaApiError::Rejected`], except for 5xx responses,
    /// which become [`MpesaApiError::QueryError`] unless the error code is the "still processing" marker.
    pub async fn post_json<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T, MpesaApiError> {
        let token = self.access_token().await?;
        let url = self.url(path);
        debug!("📱️ POST {url}");
        if log_enabled!(Level::Trace) {
            trace!("📱️ Request body: {}", serde_json::to_string(body).unwrap_or_default());
        }
        let response = self.client.post(&url).bearer_auth(token.reveal()).json(body).send().await.map_err(|e| {
            warn!("📱️ POST {url} failed. {e}");
            MpesaApiError::Network(e.to_string())
        })?;
        let status = response.status();
        let text = response.text().await.map_err(|e| MpesaApiError::Network(e.to_string()))?;
        debug!("📱️ POST {url} returned {status}");
        trace!("📱️ Response body: {text}");
        if status.is_success() {
            return serde_json::from_str::<T>(&text).map_err(|e| MpesaApiError::JsonError(format!("{e}. Body: {text}")));
        }
        if status == StatusCode::UNAUTHORIZED {
            self.tokens.invalidate().await;
        }
        match serde_json::from_str::<ProviderErrorBody>(&text) {
            Ok(err) if !status.is_server_error() || err.error_code == STK_STILL_PROCESSING => {
                Err(MpesaApiError::Rejected { code: err.error_code, message: err.error_message })
            },
            _ => {
                warn!("📱️ POST {url} failed with {status}. {text}");
                Err(MpesaApiError::QueryError { status: status.as_u16(), message: text })
            },
        }
    }

    fn password_and_timestamp(&self) -> (String, String) {
        let timestamp = mpesa_timestamp(Utc::now());
        let password = stk_password(&self.config.short_code, self.config.passkey.reveal(), &timestamp);
        (password, timestamp)
    }

    /// Sends an STK push prompt to the payer's phone.
    ///
    /// A successful return only means M-Pesa accepted the request. The payment result arrives later on the callback
    /// URL, keyed by the returned `CheckoutRequestID`.
    pub async fn stk_push(&self, params: StkPushParams) -> Result<StkPushResponse, MpesaApiError> {
        if !params.amount.is_positive() {
            return Err(MpesaApiError::InvalidAmount(params.amount.to_string()));
        }
        let phone = normalize_phone_number(&params.phone_number)?;
        let (password, timestamp) = self.password_and_timestamp();
        let request = StkPushRequest {
            business_short_code: self.config.short_code.clone(),
            password,
            timestamp,
            transaction_type: "CustomerPayBillOnline".to_string(),
            amount: params.amount.whole_units_ceil(),
            party_a: phone.clone(),
            party_b: self.config.short_code.clone(),
            phone_number: phone,
            callback_url: self.config.callback_url.clone(),
            account_reference: truncate(&params.account_reference, ACCOUNT_REFERENCE_MAX_LEN),
            transaction_desc: truncate(&params.description, TRANSACTION_DESC_MAX_LEN),
        };
        info!("📱️ Initiating STK push of {} for {}", params.amount, params.account_reference);
        let response: StkPushResponse = self.post_json("/mpesa/stkpush/v1/processrequest", &request).await?;
        if !response.is_accepted() {
            warn!("📱️ STK push for {} was not accepted. {}", params.account_reference, response.response_description);
            return Err(MpesaApiError::Rejected {
                code: response.response_code,
                message: response.response_description,
            });
        }
        info!(
            "📱️ STK push for {} accepted. CheckoutRequestID: {}",
            params.account_reference, response.checkout_request_id
        );
        Ok(response)
    }

    /// Asks M-Pesa for the current state of an STK push.
    ///
    /// While the payer has not answered, this fails with an error for which
    /// [`MpesaApiError::is_still_processing`] is true.
    pub async fn stk_query(&self, checkout_request_id: &str) -> Result<StkQueryResponse, MpesaApiError> {
        let (password, timestamp) = self.password_and_timestamp();
        let request = StkQueryRequest {
            business_short_code: self.config.short_code.clone(),
            password,
            timestamp,
            checkout_request_id: checkout_request_id.to_string(),
        };
        debug!("📱️ Querying STK status for {checkout_request_id}");
        let response: StkQueryResponse = self.post_json("/mpesa/stkpushquery/v1/query", &request).await?;
        debug!("📱️ STK status for {checkout_request_id}: {} {}", response.result_code, response.result_desc);
        Ok(response)
    }

    /// Requests the reversal of a completed M-Pesa transaction, identified by its receipt number.
    pub async fn reversal(
        &self,
        receipt: &str,
        amount: Money,
        remarks: &str,
    ) -> Result<ReversalResponse, MpesaApiError> {
        if self.config.initiator_name.is_empty() || self.config.security_credential.is_unset() {
            return Err(MpesaApiError::Initialization("Reversal credentials are not configured".to_string()));
        }
        let request = ReversalRequest {
            initiator: self.config.initiator_name.clone(),
            security_credential: self.config.security_credential.reveal().clone(),
            command_id: "TransactionReversal".to_string(),
            transaction_id: receipt.to_string(),
            amount: amount.whole_units_ceil(),
            receiver_party: self.config.short_code.clone(),
            receiver_identifier_type: "4".to_string(),
            result_url: self.config.callback_url.clone(),
            queue_timeout_url: self.config.timeout_url.clone(),
            remarks: truncate(remarks, 100),
            occasion: String::default(),
        };
        info!("📱️ Requesting reversal of {receipt} ({amount})");
        let response: ReversalResponse = self.post_json("/mpesa/reversal/v1/request", &request).await?;
        if !response.is_accepted() {
            warn!("📱️ Reversal of {receipt} was not accepted. {}", response.response_description);
            return Err(MpesaApiError::Rejected {
                code: response.response_code,
                message: response.response_description,
            });
        }
        Ok(response)
    }
}
