//! Device Code API Client
//!
//! HTTP client for the device code server: reports a stable fingerprint with
//! its signal snapshot (signed), and verifies a fingerprint against the
//! merchant's registered devices.
//!
//! No retries. Every failure is surfaced to the caller as a `ReportError`.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use uuid::Uuid;

use super::signing::{self, SigningError, SIGNATURE_FIELD};
use crate::constants;
use crate::logic::identity::Fingerprint;
use crate::logic::signals::{DeviceStatus, StableFingerprint};

/// Client configuration
#[derive(Debug, Clone)]
pub struct ReportConfig {
    pub server_url: String,
    pub timeout_seconds: u64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            server_url: constants::get_server_url(),
            timeout_seconds: constants::get_timeout_secs(),
        }
    }
}

impl ReportConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into().trim_end_matches('/').to_string(),
            timeout_seconds: constants::DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Merchant credentials used to sign reports
#[derive(Clone)]
pub struct MerchantCredentials {
    pub merchant_key: String,
    pub secret_key: Option<String>,
}

impl MerchantCredentials {
    pub fn new(merchant_key: impl Into<String>) -> Self {
        Self {
            merchant_key: merchant_key.into(),
            secret_key: None,
        }
    }

    pub fn with_secret(mut self, secret_key: impl Into<String>) -> Self {
        let secret = secret_key.into();
        self.secret_key = (!secret.is_empty()).then_some(secret);
        self
    }

    /// Credentials from `FINGERPRINT_MERCHANT_KEY` / `FINGERPRINT_SECRET_KEY`
    pub fn from_env() -> Option<Self> {
        let merchant_key = constants::get_merchant_key()?;
        Some(Self {
            merchant_key,
            secret_key: constants::get_secret_key(),
        })
    }

    /// HMAC key: the secret if configured, else the merchant key
    pub fn signing_key(&self) -> &str {
        self.secret_key.as_deref().unwrap_or(&self.merchant_key)
    }
}

impl std::fmt::Debug for MerchantCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MerchantCredentials")
            .field("merchant_key", &self.merchant_key)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Page the report originates from
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageContext {
    /// Raw (un-normalized) user agent
    pub user_agent: Option<String>,
    pub url: Option<String>,
    pub referrer: Option<String>,
}

// Request/Response types

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Server answer to a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportOutcome {
    #[serde(rename = "fingerprint_key")]
    pub fingerprint: Fingerprint,
    pub device_code: String,
    pub is_new: bool,
    pub updated_at: DateTime<Utc>,
}

/// Server answer to a verification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyOutcome {
    pub valid: bool,
    #[serde(rename = "fingerprint_key")]
    pub fingerprint: Fingerprint,
    pub device_code: String,
    pub created_at: DateTime<Utc>,
}

/// Reporting errors
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("network error: {0}")]
    Transport(String),

    #[error("server error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rejected ({code}): {message}")]
    Rejected { code: i64, message: String },

    #[error("signing failed: {0}")]
    Signing(#[from] SigningError),

    #[error("failed to build HTTP client: {0}")]
    ClientBuild(String),
}

/// Device code API client
pub struct ReportingClient {
    config: ReportConfig,
    page: PageContext,
    http_client: reqwest::Client,
}

impl ReportingClient {
    /// Create new client
    pub fn new(config: ReportConfig) -> Result<Self, ReportError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(format!("{}/{}", constants::APP_NAME, constants::APP_VERSION))
            .build()
            .map_err(|e| ReportError::ClientBuild(e.to_string()))?;

        Ok(Self {
            config,
            page: PageContext::default(),
            http_client,
        })
    }

    /// Attach the originating page to every report
    pub fn with_page_context(mut self, page: PageContext) -> Self {
        self.page = page;
        self
    }

    pub fn server_url(&self) -> &str {
        &self.config.server_url
    }

    /// Report a stable fingerprint and receive its device code
    pub async fn report(
        &self,
        credentials: &MerchantCredentials,
        fingerprint: &StableFingerprint,
        status: &DeviceStatus,
    ) -> Result<ReportOutcome, ReportError> {
        let url = format!("{}{}", self.config.server_url, constants::REPORT_PATH);
        let timestamp = Utc::now().timestamp();
        let nonce = Uuid::new_v4().simple().to_string();

        let mut body = self.report_body(credentials, fingerprint, status, timestamp, &nonce);
        let signature = signing::sign_payload(credentials.signing_key(), &body)?;
        body[SIGNATURE_FIELD] = Value::String(signature.clone());

        log::info!(
            "Reporting fingerprint {}... to {}",
            fingerprint.fingerprint.short(),
            self.config.server_url
        );

        let response = self
            .http_client
            .post(&url)
            .header("X-Merchant-Key", &credentials.merchant_key)
            .header("X-Signature", &signature)
            .header("X-Timestamp", timestamp.to_string())
            .header("X-Nonce", &nonce)
            .json(&body)
            .send()
            .await
            .map_err(|e| ReportError::Transport(e.to_string()))?;

        let outcome: ReportOutcome = read_envelope(response).await?;
        log::info!(
            "Device code {} ({})",
            outcome.device_code,
            if outcome.is_new { "new" } else { "existing" }
        );
        Ok(outcome)
    }

    /// Check whether a fingerprint is registered and active for a merchant
    pub async fn verify(
        &self,
        merchant_key: &str,
        fingerprint: &Fingerprint,
    ) -> Result<VerifyOutcome, ReportError> {
        let url = format!("{}{}", self.config.server_url, constants::VERIFY_PATH);
        let body = json!({
            "merchantKey": merchant_key,
            "fingerprint_key": fingerprint.as_str(),
        });

        let response = self
            .http_client
            .post(&url)
            .header("X-Merchant-Key", merchant_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ReportError::Transport(e.to_string()))?;

        let outcome: VerifyOutcome = read_envelope(response).await?;
        log::debug!("Fingerprint {}... verified: {}", fingerprint.short(), outcome.valid);
        Ok(outcome)
    }

    fn report_body(
        &self,
        credentials: &MerchantCredentials,
        fingerprint: &StableFingerprint,
        status: &DeviceStatus,
        timestamp: i64,
        nonce: &str,
    ) -> Value {
        let user_agent = self.page.user_agent.clone().or_else(|| {
            fingerprint
                .signals
                .get("userAgent")
                .and_then(|v| v.as_str())
                .map(str::to_string)
        });

        json!({
            "merchantKey": credentials.merchant_key,
            "fingerprint_key": fingerprint.fingerprint.as_str(),
            "components": fingerprint.signals.to_json(),
            "device_status": status,
            "timestamp": timestamp,
            "user_agent": user_agent,
            "url": self.page.url,
            "referrer": self.page.referrer,
            "nonce": nonce,
        })
    }
}

/// Map status codes and the `{code, message, data}` envelope to a result
async fn read_envelope<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ReportError> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| ReportError::Transport(e.to_string()))?;

    if !status.is_success() {
        let message = error_message(&text);
        log::warn!("Device code request failed ({}): {}", status.as_u16(), message);
        return Err(match status.as_u16() {
            401 => ReportError::Unauthorized(message),
            403 => ReportError::Forbidden(message),
            404 => ReportError::NotFound(message),
            code => ReportError::Status { status: code, body: text },
        });
    }

    parse_envelope(&text)
}

fn parse_envelope<T: DeserializeOwned>(text: &str) -> Result<T, ReportError> {
    let envelope: Envelope<T> =
        serde_json::from_str(text).map_err(|e| ReportError::Malformed(e.to_string()))?;

    if envelope.code != 200 {
        return Err(ReportError::Rejected {
            code: envelope.code,
            message: envelope.message,
        });
    }

    envelope
        .data
        .ok_or_else(|| ReportError::Malformed("missing data".to_string()))
}

fn error_message(text: &str) -> String {
    serde_json::from_str::<ErrorBody>(text)
        .map(|body| body.message)
        .unwrap_or_else(|_| text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::signals::SignalSet;

    fn stable() -> StableFingerprint {
        let mut signals = SignalSet::new();
        signals.insert("userAgent", "Mozilla/5.0 AlipayClient/X.X.X");
        signals.insert("platform", "iPhone");
        StableFingerprint {
            fingerprint: crate::logic::identity::hash(&signals, None),
            signals,
            generated_at: Utc::now(),
        }
    }

    #[test]
    fn test_signing_key_fallback() {
        let creds = MerchantCredentials::new("mk_1");
        assert_eq!(creds.signing_key(), "mk_1");
        let creds = creds.with_secret("s3cret");
        assert_eq!(creds.signing_key(), "s3cret");
        assert!(!format!("{:?}", creds).contains("s3cret"));
        assert!(MerchantCredentials::new("mk_1").with_secret("").secret_key.is_none());
    }

    #[test]
    fn test_report_body_is_signable() {
        let client = ReportingClient::new(ReportConfig::new("http://localhost:1/"))
            .unwrap()
            .with_page_context(PageContext {
                user_agent: Some("Mozilla/5.0 AlipayClient/10.3.0.8000".to_string()),
                url: Some("https://shop.example/checkout".to_string()),
                referrer: None,
            });
        assert_eq!(client.server_url(), "http://localhost:1");

        let creds = MerchantCredentials::new("mk_1").with_secret("s3cret");
        let fp = stable();
        let body = client.report_body(&creds, &fp, &DeviceStatus::default(), 1_700_000_000, "n1");

        assert_eq!(body["merchantKey"], "mk_1");
        assert_eq!(body["fingerprint_key"], fp.fingerprint.as_str());
        assert_eq!(body["user_agent"], "Mozilla/5.0 AlipayClient/10.3.0.8000");
        assert_eq!(body["components"]["platform"], "iPhone");
        assert!(body["referrer"].is_null());
        assert!(body.get(SIGNATURE_FIELD).is_none());

        let signature = signing::sign_payload(creds.signing_key(), &body).unwrap();
        assert_eq!(signing::verify_signature("s3cret", &body, &signature), Ok(true));
    }

    #[test]
    fn test_user_agent_falls_back_to_signal() {
        let client = ReportingClient::new(ReportConfig::new("http://localhost:1")).unwrap();
        let body = client.report_body(
            &MerchantCredentials::new("mk"),
            &stable(),
            &DeviceStatus::default(),
            0,
            "n",
        );
        assert_eq!(body["user_agent"], "Mozilla/5.0 AlipayClient/X.X.X");
    }

    #[test]
    fn test_parse_envelope() {
        let ok = r#"{"code":200,"message":"ok","data":{"fingerprint_key":"0123456789abcdef0123456789abcdef",
            "device_code":"DEV_1a2b3c4d_1700000000_1234","is_new":true,"updated_at":"2024-01-01T00:00:00Z"}}"#;
        let outcome: ReportOutcome = parse_envelope(ok).unwrap();
        assert!(outcome.is_new);
        assert_eq!(outcome.device_code, "DEV_1a2b3c4d_1700000000_1234");

        let rejected = r#"{"code":400,"message":"missing fingerprint_key"}"#;
        assert!(matches!(
            parse_envelope::<ReportOutcome>(rejected),
            Err(ReportError::Rejected { code: 400, .. })
        ));

        assert!(matches!(
            parse_envelope::<ReportOutcome>("<html>"),
            Err(ReportError::Malformed(_))
        ));
        assert!(matches!(
            parse_envelope::<ReportOutcome>(r#"{"code":200,"message":"ok"}"#),
            Err(ReportError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_envelope_rejects_bad_fingerprint() {
        for key in ["ab", "0123456789ABCDEF0123456789ABCDEF", ""] {
            let text = serde_json::json!({
                "code": 200,
                "message": "ok",
                "data": {
                    "fingerprint_key": key,
                    "device_code": "DEV_1a2b3c4d_1700000000_1234",
                    "is_new": false,
                    "updated_at": "2024-01-01T00:00:00Z",
                },
            })
            .to_string();
            assert!(matches!(
                parse_envelope::<ReportOutcome>(&text),
                Err(ReportError::Malformed(_))
            ));
        }
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(error_message(r#"{"code":403,"message":"merchant disabled"}"#), "merchant disabled");
        assert_eq!(error_message("Bad Gateway"), "Bad Gateway");
    }

    #[tokio::test]
    async fn test_transport_error_on_unreachable_server() {
        let config = ReportConfig {
            server_url: "http://127.0.0.1:9".to_string(),
            timeout_seconds: 2,
        };
        let client = ReportingClient::new(config).unwrap();
        let result = client.verify("mk", &stable().fingerprint).await;
        assert!(matches!(result, Err(ReportError::Transport(_))));
    }
}
