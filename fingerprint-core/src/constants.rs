//! Central Configuration Constants
//!
//! Single source of truth for configuration defaults.
//! Every value can be overridden from the environment.

/// Default device code server URL
///
/// Fallback when `FINGERPRINT_SERVER_URL` is not set.
/// For development: http://localhost:8080
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8080";

/// Default HTTP timeout for report/verify requests (seconds)
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default similarity threshold
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.8;

/// Report endpoint path
pub const REPORT_PATH: &str = "/device-code/report";

/// Verify endpoint path
pub const VERIFY_PATH: &str = "/device-code/verify";

/// App version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// App name
pub const APP_NAME: &str = "fingerprint-agent";

// ============================================
// Helper functions to read from env with fallback
// ============================================

/// Get server URL from environment or use default
pub fn get_server_url() -> String {
    std::env::var("FINGERPRINT_SERVER_URL")
        .ok()
        .map(|url| url.trim_end_matches('/').to_string())
        .filter(|url| !url.is_empty())
        .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string())
}

/// Get merchant key from environment
pub fn get_merchant_key() -> Option<String> {
    std::env::var("FINGERPRINT_MERCHANT_KEY")
        .ok()
        .filter(|s| !s.is_empty())
}

/// Get signing secret from environment
pub fn get_secret_key() -> Option<String> {
    std::env::var("FINGERPRINT_SECRET_KEY")
        .ok()
        .filter(|s| !s.is_empty())
}

/// Get request timeout from environment or use default
pub fn get_timeout_secs() -> u64 {
    std::env::var("FINGERPRINT_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|secs| *secs > 0)
        .unwrap_or(DEFAULT_TIMEOUT_SECS)
}

/// Get similarity threshold from environment or use default
pub fn get_similarity_threshold() -> f64 {
    std::env::var("FINGERPRINT_SIMILARITY_THRESHOLD")
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|t| (0.0..=1.0).contains(t))
        .unwrap_or(DEFAULT_SIMILARITY_THRESHOLD)
}
