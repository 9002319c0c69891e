//! Payment processor webhooks.
//!
//! The processor signs each delivery with a `Stripe-Signature` header of the
//! form `t=<unix seconds>,v1=<hex hmac>[,v1=...]`. The HMAC-SHA256 is taken
//! over `"{t}.{raw body}"` with the endpoint's signing secret.

use std::time::Duration;

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;

use super::PaymentIntent;

/// Header carrying the webhook signature.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Why a webhook signature was rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing signature header")]
    MissingHeader,
    #[error("missing or invalid timestamp")]
    InvalidTimestamp,
    #[error("no v1 signature in header")]
    MissingSignature,
    #[error("timestamp outside tolerance")]
    Expired,
    #[error("signature mismatch")]
    Mismatch,
}

/// A webhook event envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

impl WebhookEvent {
    /// The payment intent carried by `payment_intent.*` events.
    #[must_use]
    pub fn payment_intent(&self) -> Option<PaymentIntent> {
        if !self.kind.starts_with("payment_intent.") {
            return None;
        }
        serde_json::from_value(self.data.object.clone()).ok()
    }
}

/// Verify a webhook signature against the current time.
///
/// # Errors
///
/// Returns the first check that failed.
pub fn verify_signature(
    payload: &[u8],
    header: Option<&str>,
    secret: &SecretString,
    tolerance: Duration,
) -> Result<(), SignatureError> {
    let now = chrono::Utc::now().timestamp();
    verify_signature_at(payload, header, secret, tolerance, now)
}

/// Verify a webhook signature as of `now` (unix seconds).
///
/// # Errors
///
/// Returns the first check that failed.
pub fn verify_signature_at(
    payload: &[u8],
    header: Option<&str>,
    secret: &SecretString,
    tolerance: Duration,
    now: i64,
) -> Result<(), SignatureError> {
    let header = header.ok_or(SignatureError::MissingHeader)?;

    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::InvalidTimestamp)?;
    if signatures.is_empty() {
        return Err(SignatureError::MissingSignature);
    }

    let tolerance = i64::try_from(tolerance.as_secs()).unwrap_or(i64::MAX);
    if now.saturating_sub(timestamp).saturating_abs() > tolerance {
        return Err(SignatureError::Expired);
    }

    let expected = sign(payload, timestamp, secret);
    if signatures
        .iter()
        .any(|candidate| constant_time_compare(&expected, candidate))
    {
        tracing::debug!("Webhook signature verified");
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Hex HMAC-SHA256 of `"{timestamp}.{payload}"`.
#[must_use]
pub fn sign(payload: &[u8], timestamp: i64, secret: &SecretString) -> String {
    // HMAC accepts keys of any length
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.expose_secret().as_bytes()) else {
        return String::new();
    };
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }

    result == 0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use mercato_core::PaymentStatus;

    use super::*;

    const NOW: i64 = 1_760_000_000;
    const TOLERANCE: Duration = Duration::from_secs(300);

    fn secret() -> SecretString {
        SecretString::from("whsec_9XkQ2mP7rT4vB1nZ8cL5")
    }

    fn header_for(payload: &[u8], timestamp: i64) -> String {
        format!("t={timestamp},v1={}", sign(payload, timestamp, &secret()))
    }

    #[test]
    fn test_valid_signature() {
        let payload = br#"{"id":"evt_1"}"#;
        let header = header_for(payload, NOW);
        assert_eq!(
            verify_signature_at(payload, Some(&header), &secret(), TOLERANCE, NOW),
            Ok(())
        );
    }

    #[test]
    fn test_any_v1_entry_may_match() {
        let payload = b"{}";
        let header = format!(
            "t={NOW},v1=deadbeef,v0=ignored,v1={}",
            sign(payload, NOW, &secret())
        );
        assert!(verify_signature_at(payload, Some(&header), &secret(), TOLERANCE, NOW).is_ok());
    }

    #[test]
    fn test_tampered_body_rejected() {
        let header = header_for(b"{\"amount\":100}", NOW);
        assert_eq!(
            verify_signature_at(b"{\"amount\":1}", Some(&header), &secret(), TOLERANCE, NOW),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let payload = b"{}";
        let header = header_for(payload, NOW);
        let other = SecretString::from("whsec_other_7Hq2LmZ");
        assert_eq!(
            verify_signature_at(payload, Some(&header), &other, TOLERANCE, NOW),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_old_timestamp_rejected() {
        let payload = b"{}";
        let header = header_for(payload, NOW - 301);
        assert_eq!(
            verify_signature_at(payload, Some(&header), &secret(), TOLERANCE, NOW),
            Err(SignatureError::Expired)
        );
    }

    #[test]
    fn test_malformed_headers() {
        let payload = b"{}";
        assert_eq!(
            verify_signature_at(payload, None, &secret(), TOLERANCE, NOW),
            Err(SignatureError::MissingHeader)
        );
        assert_eq!(
            verify_signature_at(payload, Some("v1=abc"), &secret(), TOLERANCE, NOW),
            Err(SignatureError::InvalidTimestamp)
        );
        assert_eq!(
            verify_signature_at(payload, Some(&format!("t={NOW}")), &secret(), TOLERANCE, NOW),
            Err(SignatureError::MissingSignature)
        );
    }

    #[test]
    fn test_payment_intent_events_parse() {
        let event: WebhookEvent = serde_json::from_str(
            r#"{
                "id": "evt_1",
                "type": "payment_intent.succeeded",
                "data": {"object": {
                    "id": "pi_1",
                    "amount": 2599,
                    "currency": "usd",
                    "status": "succeeded",
                    "metadata": {"user_id": "7"}
                }}
            }"#,
        )
        .unwrap();

        let intent = event.payment_intent().unwrap();
        assert_eq!(intent.id, "pi_1");
        assert_eq!(intent.status, PaymentStatus::Succeeded);
        assert_eq!(intent.user_id().map(|id| id.as_i32()), Some(7));
    }

    #[test]
    fn test_other_events_ignored() {
        let event: WebhookEvent = serde_json::from_str(
            r#"{"id": "evt_2", "type": "charge.refunded", "data": {"object": {"id": "ch_1"}}}"#,
        )
        .unwrap();
        assert!(event.payment_intent().is_none());
    }
}
