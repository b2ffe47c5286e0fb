//! Device Identity Module
//!
//! Derives the device identifier from collected signals:
//! - User-agent normalization (volatile in-app tokens)
//! - Canonical serialization + truncated SHA-256 fingerprint
//! - Weighted similarity between stored signal sets

pub mod hasher;
pub mod normalize;
pub mod similarity;

pub use hasher::{component_digest, fallback, hash, Fingerprint, InvalidFingerprint};
pub use normalize::normalize_user_agent;
pub use similarity::{SimilarityResult, SimilarityScorer};
