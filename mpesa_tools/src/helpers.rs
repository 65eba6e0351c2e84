use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, TimeZone, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::MpesaApiError;

/// The error code returned by the STK query endpoint while the payer has not yet responded to the prompt.
pub const STK_STILL_PROCESSING: &str = "500.001.1001";
const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";
const EAT_OFFSET_SECS: i32 = 3 * 3600;

fn east_africa_time() -> FixedOffset {
    FixedOffset::east_opt(EAT_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// How M-Pesa classifies the `ResultCode` of an STK push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StkResultKind {
    Success,
    /// 1032: the payer dismissed the prompt
    CancelledByUser,
    /// 1037: the payer's phone could not be reached, or they never answered
    Timeout,
    Failed,
}

impl StkResultKind {
    pub fn from_result_code(code: i64) -> Self {
        match code {
            0 => Self::Success,
            1032 => Self::CancelledByUser,
            1037 => Self::Timeout,
            _ => Self::Failed,
        }
    }
}

/// Converts a Kenyan mobile number into the `2547XXXXXXXX` form Daraja expects.
///
/// Accepts `0712345678`, `712345678`, `+254712345678` and `254 712 345 678`.
pub fn normalize_phone_number(phone: &str) -> Result<String, MpesaApiError> {
    let digits: String = phone.chars().filter(|c| !matches!(c, '+' | ' ' | '-')).collect();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(MpesaApiError::InvalidPhoneNumber(phone.to_string()));
    }
    let normalized = if let Some(rest) = digits.strip_prefix('0') {
        format!("254{rest}")
    } else if digits.starts_with("254") {
        digits
    } else {
        format!("254{digits}")
    };
    if normalized.len() != 12 {
        return Err(MpesaApiError::InvalidPhoneNumber(phone.to_string()));
    }
    Ok(normalized)
}

/// The `Timestamp` field of STK requests, in East Africa Time.
pub fn mpesa_timestamp(now: DateTime<Utc>) -> String {
    now.with_timezone(&east_africa_time()).format(TIMESTAMP_FORMAT).to_string()
}

/// Parses an M-Pesa `TransactionDate` (e.g. `20191219102115`, East Africa Time).
pub fn parse_mpesa_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).ok()?;
    east_africa_time().from_local_datetime(&naive).single().map(|dt| dt.with_timezone(&Utc))
}

/// `base64(short_code + passkey + timestamp)`
pub fn stk_password(short_code: &str, passkey: &str, timestamp: &str) -> String {
    base64::encode(format!("{short_code}{passkey}{timestamp}"))
}

/// Truncates free text to the length limits Daraja enforces on references and descriptions.
pub fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// Daraja is inconsistent about numeric fields: `expires_in` and query `ResultCode` arrive as strings, callback
/// `ResultCode` as a number.
pub(crate) fn i64_from_string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    let value = Value::deserialize(d)?;
    match &value {
        Value::Number(n) => n.as_i64().ok_or_else(|| serde::de::Error::custom(format!("{n} is not an integer"))),
        Value::String(s) => s.trim().parse::<i64>().map_err(serde::de::Error::custom),
        other => Err(serde::de::Error::custom(format!("expected a number, got {other}"))),
    }
}
