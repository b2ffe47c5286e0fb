//! Merchant authentication for device code requests
//!
//! Reports are signed with HMAC-SHA256 over the canonical body (see
//! `fingerprint_core::logic::device_code::signing`). The signature, unix
//! `timestamp` and `nonce` are read from the signed body so none of them can
//! be swapped independently of the payload.

use axum::{
    body::Body,
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use fingerprint_core::logic::device_code::{verify_signature, SIGNATURE_FIELD};
use serde_json::Value;

use crate::models::Merchant;
use crate::store::DeviceStore;
use crate::{AppError, AppResult, AppState};

pub const MERCHANT_KEY_HEADER: &str = "x-merchant-key";

/// Largest report body accepted
const MAX_REPORT_BYTES: usize = 256 * 1024;

/// Merchant resolved by `require_signed_report`
#[derive(Debug, Clone)]
pub struct MerchantContext {
    pub merchant: Merchant,
}

/// Look up a merchant that may use the API right now
pub async fn resolve_merchant(store: &dyn DeviceStore, merchant_key: &str) -> AppResult<Merchant> {
    let merchant = store
        .find_merchant_by_key(merchant_key)
        .await?
        .ok_or_else(|| AppError::Forbidden("unknown merchant".to_string()))?;

    if merchant.is_usable(Utc::now()) {
        return Ok(merchant);
    }

    let reason = if merchant.is_active { "merchant expired" } else { "merchant disabled" };
    tracing::warn!("Rejected request for {} ({})", merchant.merchant_key, reason);
    Err(AppError::Forbidden(reason.to_string()))
}

/// Merchant key from the header, else the `merchantKey` body field
pub fn merchant_key<'a>(headers: &'a HeaderMap, body: &'a Value) -> AppResult<&'a str> {
    let from_header = headers
        .get(MERCHANT_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|k| !k.is_empty());
    let from_body = body
        .get("merchantKey")
        .and_then(Value::as_str)
        .filter(|k| !k.is_empty());

    match (from_header, from_body) {
        (Some(header), Some(body)) if header != body => {
            Err(AppError::Unauthorized("merchant key mismatch".to_string()))
        }
        (Some(key), _) | (None, Some(key)) => Ok(key),
        (None, None) => Err(AppError::Unauthorized("missing merchant key".to_string())),
    }
}

/// Middleware: authenticate a report and attach its `MerchantContext`
pub async fn require_signed_report(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let (parts, body) = req.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_REPORT_BYTES)
        .await
        .map_err(|_| AppError::ValidationError("request body too large or unreadable".to_string()))?;

    let payload: Value = serde_json::from_slice(&bytes)
        .ok()
        .filter(Value::is_object)
        .ok_or_else(|| AppError::ValidationError("request body must be a JSON object".to_string()))?;

    let key = merchant_key(&parts.headers, &payload)?;
    let merchant = resolve_merchant(state.store.as_ref(), key).await?;
    check_signature(&state, &merchant, &payload)?;

    let mut req = Request::from_parts(parts, Body::from(bytes));
    req.extensions_mut().insert(MerchantContext { merchant });

    Ok(next.run(req).await)
}

fn check_signature(state: &AppState, merchant: &Merchant, payload: &Value) -> AppResult<()> {
    let Some(signature) = payload.get(SIGNATURE_FIELD).and_then(Value::as_str) else {
        if state.config.require_signature {
            return Err(AppError::Unauthorized("missing signature".to_string()));
        }
        tracing::debug!("Accepting unsigned report for {}", merchant.merchant_key);
        return Ok(());
    };

    let timestamp = payload
        .get("timestamp")
        .and_then(Value::as_i64)
        .ok_or_else(|| AppError::Unauthorized("missing timestamp".to_string()))?;
    if !within_tolerance(Utc::now().timestamp(), timestamp, state.config.signature_tolerance_secs) {
        tracing::warn!("Stale report from {} (timestamp {})", merchant.merchant_key, timestamp);
        return Err(AppError::Unauthorized("timestamp outside tolerance".to_string()));
    }

    let valid = verify_signature(merchant.signing_key(), payload, signature)
        .map_err(|e| AppError::Unauthorized(e.to_string()))?;
    if !valid {
        tracing::warn!("Invalid report signature from {}", merchant.merchant_key);
        return Err(AppError::Unauthorized("invalid signature".to_string()));
    }

    // Only burn the nonce once the signature holds
    let nonce = payload
        .get("nonce")
        .and_then(Value::as_str)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| AppError::Unauthorized("missing nonce".to_string()))?;
    if !state.nonces.check_and_insert(&merchant.merchant_key, nonce) {
        tracing::warn!("Replayed nonce from {}", merchant.merchant_key);
        return Err(AppError::Unauthorized("nonce already used".to_string()));
    }

    Ok(())
}

/// Clock skew check that cannot overflow on client-supplied timestamps
fn within_tolerance(now: i64, timestamp: i64, tolerance_secs: i64) -> bool {
    match now.checked_sub(timestamp).map(i64::unsigned_abs) {
        Some(skew) => tolerance_secs >= 0 && skew <= tolerance_secs as u64,
        None => false,
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for MerchantContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions
            .get::<MerchantContext>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("merchant not authenticated".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::json;

    #[test]
    fn test_merchant_key_sources() {
        let mut headers = HeaderMap::new();
        let body = json!({"merchantKey": "mk_body"});
        assert_eq!(merchant_key(&headers, &body).unwrap(), "mk_body");

        headers.insert(MERCHANT_KEY_HEADER, HeaderValue::from_static("mk_body"));
        assert_eq!(merchant_key(&headers, &body).unwrap(), "mk_body");

        headers.insert(MERCHANT_KEY_HEADER, HeaderValue::from_static("mk_other"));
        assert!(matches!(merchant_key(&headers, &body), Err(AppError::Unauthorized(_))));
        assert_eq!(merchant_key(&headers, &json!({})).unwrap(), "mk_other");

        let empty = HeaderMap::new();
        assert!(matches!(
            merchant_key(&empty, &json!({"merchantKey": ""})),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_within_tolerance() {
        let now = 1_700_000_000;
        assert!(within_tolerance(now, now, 300));
        assert!(within_tolerance(now, now - 300, 300));
        assert!(within_tolerance(now, now + 300, 300));
        assert!(!within_tolerance(now, now - 301, 300));
        assert!(!within_tolerance(now, now + 301, 300));
        assert!(!within_tolerance(now, i64::MIN, 300));
        assert!(!within_tolerance(now, i64::MAX, 300));
        assert!(!within_tolerance(now, -1, 300));
        assert!(!within_tolerance(now, now, -1));
    }
}
