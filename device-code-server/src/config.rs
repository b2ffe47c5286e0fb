//! Configuration module

use std::env;

pub const DEFAULT_PORT: u16 = 8080;

/// Accepted clock skew for signed report timestamps (seconds)
pub const DEFAULT_SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection URL; the in-memory store is used when absent
    pub database_url: Option<String>,

    /// Server port
    pub port: u16,

    /// Static bearer token for the admin routes (empty disables them)
    pub admin_token: String,

    /// Maximum age of a signed report timestamp
    pub signature_tolerance_secs: i64,

    /// Reject reports that carry no signature
    pub require_signature: bool,

    /// Threshold for the admin similarity review
    pub similarity_threshold: f64,

    /// Environment (development, production)
    pub environment: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            port: DEFAULT_PORT,
            admin_token: String::new(),
            signature_tolerance_secs: DEFAULT_SIGNATURE_TOLERANCE_SECS,
            require_signature: true,
            similarity_threshold: fingerprint_core::constants::DEFAULT_SIMILARITY_THRESHOLD,
            environment: "development".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),

            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),

            admin_token: env::var("ADMIN_TOKEN").unwrap_or(defaults.admin_token),

            signature_tolerance_secs: env::var("SIGNATURE_TOLERANCE_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|secs| *secs > 0)
                .unwrap_or(defaults.signature_tolerance_secs),

            require_signature: env::var("REQUIRE_SIGNATURE")
                .ok()
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.require_signature),

            similarity_threshold: env::var("SIMILARITY_THRESHOLD")
                .ok()
                .and_then(|s| s.parse::<f64>().ok())
                .filter(|t| (0.0..=1.0).contains(t))
                .unwrap_or(defaults.similarity_threshold),

            environment: env::var("ENVIRONMENT").unwrap_or(defaults.environment),
        }
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn admin_enabled(&self) -> bool {
        !self.admin_token.is_empty()
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.database_url.is_none());
        assert!(config.require_signature);
        assert!(!config.admin_enabled());
        assert!(!config.is_production());
        assert_eq!(config.signature_tolerance_secs, 300);
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag(" YES "));
        assert!(parse_flag("1"));
        assert!(!parse_flag("false"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag(""));
    }
}
