//! Device Code Module - Client to Server Communication
//!
//! This module handles:
//! - Request signing (HMAC-SHA256 over the canonical body)
//! - Fingerprint reporting (device code issuance)
//! - Fingerprint verification

pub mod client;
pub mod signing;

pub use client::{
    MerchantCredentials, PageContext, ReportConfig, ReportError, ReportOutcome, ReportingClient,
    VerifyOutcome,
};
pub use signing::{canonical_payload, sign_payload, verify_signature, SigningError, SIGNATURE_FIELD};
