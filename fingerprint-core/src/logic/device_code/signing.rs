//! Request Signing
//!
//! HMAC-SHA256 over a canonical form of the request body. Shared by the
//! reporting client (sign) and the device code server (verify).
//!
//! Canonical form: every top-level body field except `signature`, sorted by
//! key, rendered `key=value` and joined with `&`. Strings render raw, all
//! other values as compact JSON.

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Body field carrying the signature (excluded from the canonical form)
pub const SIGNATURE_FIELD: &str = "signature";

/// Signing errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SigningError {
    #[error("signed payload must be a JSON object")]
    NotAnObject,

    #[error("signing key is empty")]
    EmptyKey,

    #[error("invalid signing key: {0}")]
    InvalidKey(String),
}

/// Canonical string of a request body
pub fn canonical_payload(body: &Value) -> Result<String, SigningError> {
    let fields = body.as_object().ok_or(SigningError::NotAnObject)?;

    let mut pairs: Vec<(&String, String)> = fields
        .iter()
        .filter(|(key, _)| key.as_str() != SIGNATURE_FIELD)
        .map(|(key, value)| {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key, rendered)
        })
        .collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));

    Ok(pairs
        .into_iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("&"))
}

fn mac_for(secret: &str, body: &Value) -> Result<HmacSha256, SigningError> {
    if secret.is_empty() {
        return Err(SigningError::EmptyKey);
    }
    let canonical = canonical_payload(body)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| SigningError::InvalidKey(e.to_string()))?;
    mac.update(canonical.as_bytes());
    Ok(mac)
}

/// Hex HMAC-SHA256 signature of a request body
pub fn sign_payload(secret: &str, body: &Value) -> Result<String, SigningError> {
    let mac = mac_for(secret, body)?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a hex signature against a request body
///
/// A signature that is not valid hex simply fails verification.
pub fn verify_signature(secret: &str, body: &Value, signature: &str) -> Result<bool, SigningError> {
    let mac = mac_for(secret, body)?;
    let Ok(expected) = hex::decode(signature) else {
        return Ok(false);
    };
    Ok(mac.verify_slice(&expected).is_ok())
}
