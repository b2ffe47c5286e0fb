//! Device fingerprint core
//!
//! Collects environment signals through a probe, derives a stable device
//! fingerprint, scores similarity between stored signal sets, and reports
//! fingerprints to a device code server with signed requests.

pub mod constants;
pub mod logic;

pub use logic::device_code::{MerchantCredentials, ReportConfig, ReportError, ReportingClient};
pub use logic::identity::{Fingerprint, SimilarityScorer};
pub use logic::signals::{
    BrowserProbe, EnvironmentProbe, GeneratedFingerprint, HeadlessProbe, SignalCollector,
    SignalSet, StableFingerprint,
};
