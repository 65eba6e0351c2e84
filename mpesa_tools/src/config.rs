use std::time::Duration;

use duka_common::Secret;
use log::*;

pub const SANDBOX_BASE_URL: &str = "https://sandbox.safaricom.co.ke";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct MpesaConfig {
    /// Daraja API root, e.g. `https://api.safaricom.co.ke`
    pub base_url: String,
    pub consumer_key: String,
    pub consumer_secret: Secret<String>,
    /// The paybill or till number receiving payments
    pub short_code: String,
    pub passkey: Secret<String>,
    /// Where M-Pesa posts STK results
    pub callback_url: String,
    /// Where M-Pesa posts queue timeout notices (reversals)
    pub timeout_url: String,
    pub initiator_name: String,
    pub security_credential: Secret<String>,
    /// Upper bound on any single HTTP round trip
    pub request_timeout: Duration,
}

impl Default for MpesaConfig {
    fn default() -> Self {
        Self {
            base_url: SANDBOX_BASE_URL.to_string(),
            consumer_key: String::default(),
            consumer_secret: Secret::default(),
            short_code: "174379".to_string(),
            passkey: Secret::default(),
            callback_url: String::default(),
            timeout_url: String::default(),
            initiator_name: String::default(),
            security_credential: Secret::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl MpesaConfig {
    pub fn new_from_env_or_default() -> Self {
        let defaults = Self::default();
        let base_url = std::env::var("DUKA_MPESA_BASE_URL").unwrap_or_else(|_| {
            warn!("🪛️ DUKA_MPESA_BASE_URL not set, using the sandbox ({SANDBOX_BASE_URL})");
            defaults.base_url.clone()
        });
        let consumer_key = std::env::var("DUKA_MPESA_CONSUMER_KEY").unwrap_or_else(|_| {
            warn!("🪛️ DUKA_MPESA_CONSUMER_KEY not set. Payment initiation will fail.");
            String::default()
        });
        let consumer_secret = Secret::new(std::env::var("DUKA_MPESA_CONSUMER_SECRET").unwrap_or_else(|_| {
            warn!("🪛️ DUKA_MPESA_CONSUMER_SECRET not set. Payment initiation will fail.");
            String::default()
        }));
        let short_code = std::env::var("DUKA_MPESA_SHORT_CODE").unwrap_or_else(|_| {
            warn!("🪛️ DUKA_MPESA_SHORT_CODE not set, using the sandbox short code {}", defaults.short_code);
            defaults.short_code.clone()
        });
        let passkey = Secret::new(std::env::var("DUKA_MPESA_PASSKEY").unwrap_or_else(|_| {
            warn!("🪛️ DUKA_MPESA_PASSKEY not set. Payment initiation will fail.");
            String::default()
        }));
        let callback_url = std::env::var("DUKA_MPESA_CALLBACK_URL").unwrap_or_else(|_| {
            error!("🪛️ DUKA_MPESA_CALLBACK_URL not set. M-Pesa will not be able to report payment results.");
            String::default()
        });
        let timeout_url = std::env::var("DUKA_MPESA_TIMEOUT_URL").unwrap_or_else(|_| {
            info!("🪛️ DUKA_MPESA_TIMEOUT_URL not set, using the callback URL");
            callback_url.clone()
        });
        let initiator_name = std::env::var("DUKA_MPESA_INITIATOR").unwrap_or_else(|_| {
            info!("🪛️ DUKA_MPESA_INITIATOR not set. Reversals are unavailable.");
            String::default()
        });
        let security_credential =
            Secret::new(std::env::var("DUKA_MPESA_SECURITY_CREDENTIAL").unwrap_or_default());
        let request_timeout = std::env::var("DUKA_MPESA_REQUEST_TIMEOUT")
            .ok()
            .and_then(|s| duka_common::helpers::parse_seconds(&s))
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        Self {
            base_url,
            consumer_key,
            consumer_secret,
            short_code,
            passkey,
            callback_url,
            timeout_url,
            initiator_name,
            security_credential,
            request_timeout,
        }
    }
}
