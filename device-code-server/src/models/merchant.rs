//! Merchant model

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use chrono::{DateTime, Utc};
use validator::Validate;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Merchant {
    pub id: Uuid,
    pub merchant_key: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub api_secret: Option<String>,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateMerchant {
    #[validate(length(min = 4, max = 64, message = "merchant_key must be 4-64 chars"))]
    pub merchant_key: String,

    #[validate(length(min = 1, max = 255, message = "name must be 1-255 chars"))]
    pub name: String,

    #[validate(length(min = 8, message = "api_secret must be at least 8 chars"))]
    pub api_secret: Option<String>,

    pub expires_at: Option<DateTime<Utc>>,
}

impl Merchant {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Active and not past its expiry
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.is_active && !self.is_expired(now)
    }

    /// HMAC key for report signatures: the API secret, else the merchant key
    pub fn signing_key(&self) -> &str {
        self.api_secret
            .as_deref()
            .filter(|secret| !secret.is_empty())
            .unwrap_or(&self.merchant_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn merchant() -> Merchant {
        let now = Utc::now();
        Merchant {
            id: Uuid::new_v4(),
            merchant_key: "mk_test_01".to_string(),
            name: "Test Shop".to_string(),
            api_secret: None,
            is_active: true,
            expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_usable() {
        let now = Utc::now();
        let mut m = merchant();
        assert!(m.is_usable(now));

        m.expires_at = Some(now - Duration::seconds(1));
        assert!(m.is_expired(now));
        assert!(!m.is_usable(now));

        m.expires_at = Some(now + Duration::days(30));
        m.is_active = false;
        assert!(!m.is_usable(now));
    }

    #[test]
    fn test_signing_key() {
        let mut m = merchant();
        assert_eq!(m.signing_key(), "mk_test_01");
        m.api_secret = Some(String::new());
        assert_eq!(m.signing_key(), "mk_test_01");
        m.api_secret = Some("s3cret-value".to_string());
        assert_eq!(m.signing_key(), "s3cret-value");
    }

    #[test]
    fn test_create_validation() {
        let ok = CreateMerchant {
            merchant_key: "mk_live_01".to_string(),
            name: "Shop".to_string(),
            api_secret: Some("long-enough".to_string()),
            expires_at: None,
        };
        assert!(ok.validate().is_ok());

        let short = CreateMerchant {
            merchant_key: "mk".to_string(),
            api_secret: Some("short".to_string()),
            ..ok
        };
        let errors = short.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("merchant_key"));
        assert!(errors.field_errors().contains_key("api_secret"));
    }
}
