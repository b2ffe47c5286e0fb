//! Fingerprint Hashing
//!
//! Turns a `SignalSet` into a stable identifier:
//! `key:value` pairs in key order, joined by `|`, optionally salted with the
//! merchant key, digested with SHA-256 and truncated to 128 bits.
//!
//! The digest is an identifier, not a security primitive. Request
//! authenticity is handled separately by `device_code::signing`.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::logic::signals::{SignalSet, SignalValue};

/// Hex length of a fingerprint (128 bits)
pub const FINGERPRINT_HEX_LEN: usize = 32;

/// Hex length of a component digest (canvas/audio/fonts)
pub const COMPONENT_DIGEST_HEX_LEN: usize = 16;

/// Device fingerprint (32 lowercase hex chars)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Fingerprint(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid fingerprint {0:?}: expected 32 lowercase hex chars")]
pub struct InvalidFingerprint(pub String);

impl Fingerprint {
    /// Wrap an existing hex digest (e.g. from a server response)
    pub fn parse(value: &str) -> Option<Self> {
        let valid = value.len() == FINGERPRINT_HEX_LEN
            && value.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase());
        valid.then(|| Fingerprint(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened form for log lines
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = InvalidFingerprint;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Fingerprint::parse(&value).ok_or(InvalidFingerprint(value))
    }
}

impl From<Fingerprint> for String {
    fn from(fingerprint: Fingerprint) -> Self {
        fingerprint.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Canonical string of a signal set: sorted `key:value` joined by `|`
pub fn canonical_string(signals: &SignalSet, salt: Option<&str>) -> String {
    let mut parts: Vec<String> = signals
        .iter()
        .map(|(key, value)| format!("{}:{}", key, value.render()))
        .collect();

    if let Some(salt) = salt.filter(|s| !s.is_empty()) {
        parts.push(format!("merchantKey:{}", salt));
    }

    parts.join("|")
}

/// Compute the fingerprint of a signal set
pub fn hash(signals: &SignalSet, salt: Option<&str>) -> Fingerprint {
    let canonical = canonical_string(signals, salt);

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let digest = hasher.finalize();

    let fingerprint = Fingerprint(hex::encode(&digest[..FINGERPRINT_HEX_LEN / 2]));
    log::debug!(
        "Hashed {} signals -> {}...",
        signals.len(),
        fingerprint.short()
    );
    fingerprint
}

/// Minimal identifier used when full collection is impossible
///
/// Includes the timestamp, so it is NOT stable across calls.
pub fn fallback(
    user_agent: &str,
    platform: &str,
    language: &str,
    timestamp_ms: i64,
    salt: Option<&str>,
) -> Fingerprint {
    let mut signals = SignalSet::new();
    signals.insert("userAgent", user_agent);
    signals.insert("platform", platform);
    signals.insert("language", language);
    signals.insert("timestamp", timestamp_ms);
    hash(&signals, salt)
}

/// Short digest over a component's `(name, value)` map
///
/// Used to condense a rendering/audio/font capability map into one signal.
pub fn component_digest<'a, I>(entries: I) -> String
where
    I: IntoIterator<Item = (&'a str, SignalValue)>,
{
    let mut parts: Vec<String> = entries
        .into_iter()
        .map(|(k, v)| format!("{}:{}", k, v.render()))
        .collect();
    parts.sort();

    let mut hasher = Sha256::new();
    hasher.update(parts.join("|").as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..COMPONENT_DIGEST_HEX_LEN].to_string()
}
