use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use bytes::Bytes;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use tracing::{info, warn};

use crate::{errors::ServiceError, services::reconciliation::GatewayEvent, AppState};

type HmacSha256 = Hmac<Sha256>;

/// Default freshness window for signed webhook timestamps, in seconds.
const DEFAULT_TOLERANCE_SECS: u64 = 300;

/// Used to pull the event type out of payloads that did not match any
/// recognized event, purely for logging.
#[derive(Debug, Deserialize)]
struct EventProbe {
    #[serde(rename = "type")]
    event_type: String,
}

// POST /api/v1/payments/webhook
//
// The gateway delivers events at least once and retries until it sees a 2xx,
// so every recognized-or-not event that passes signature verification must be
// acknowledged. Signature failures are rejected with 401 and no state change.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    // Verify signature if configured. Config validation requires the secret
    // outside development, so unsigned delivery only happens locally.
    if let Some(secret) = state.config.payment_webhook_secret.as_deref() {
        let tolerance = state
            .config
            .payment_webhook_tolerance_secs
            .unwrap_or(DEFAULT_TOLERANCE_SECS);
        if !verify_signature(&headers, &body, secret, tolerance) {
            warn!("Payment webhook signature verification failed");
            return Err(ServiceError::Unauthorized(
                "Invalid webhook signature".to_string(),
            ));
        }
    }

    let event: GatewayEvent = serde_json::from_slice(&body)
        .map_err(|e| ServiceError::InvalidInput(format!("Invalid webhook payload: {}", e)))?;

    if let GatewayEvent::Unknown = event {
        let event_type = serde_json::from_slice::<EventProbe>(&body)
            .map(|probe| probe.event_type)
            .unwrap_or_else(|_| "<missing>".to_string());
        info!("Unhandled payment webhook type: {}", event_type);
    } else {
        state.services.reconciliation.apply_event(event).await?;
    }

    Ok((StatusCode::OK, Json(json!({ "received": true }))))
}

fn verify_signature(headers: &HeaderMap, payload: &Bytes, secret: &str, tolerance_secs: u64) -> bool {
    // Generic HMAC: x-timestamp and x-signature headers
    if let (Some(ts), Some(sig)) = (headers.get("x-timestamp"), headers.get("x-signature")) {
        if let (Ok(ts), Ok(sig)) = (ts.to_str(), sig.to_str()) {
            return timestamp_fresh(ts, tolerance_secs) && signature_matches(secret, ts, payload, sig);
        }
    }
    // Stripe-like support: Stripe-Signature with t=, v1=
    if let Some(sig) = headers.get("Stripe-Signature").and_then(|h| h.to_str().ok()) {
        let mut ts = "";
        let mut v1 = "";
        for part in sig.split(',') {
            let mut it = part.split('=');
            match (it.next(), it.next()) {
                (Some("t"), Some(val)) => ts = val,
                (Some("v1"), Some(val)) => v1 = val,
                _ => {}
            }
        }
        if !ts.is_empty() && !v1.is_empty() {
            return timestamp_fresh(ts, tolerance_secs)
                && signature_matches(secret, ts, payload, v1);
        }
    }
    false
}

/// A timestamp must parse as unix seconds and sit within the tolerance window
/// of the current time. Non-numeric timestamps fail verification.
fn timestamp_fresh(ts: &str, tolerance_secs: u64) -> bool {
    match ts.parse::<i64>() {
        Ok(ts_i) => {
            let now = chrono::Utc::now().timestamp();
            (now - ts_i).unsigned_abs() <= tolerance_secs
        }
        Err(_) => false,
    }
}

fn signature_matches(secret: &str, ts: &str, payload: &Bytes, provided: &str) -> bool {
    let signed = format!("{}.{}", ts, std::str::from_utf8(payload).unwrap_or(""));
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(signed.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());
    constant_time_eq(&expected, provided)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}
