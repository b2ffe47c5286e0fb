//! Logic Module - Fingerprint Engines
//!
//! - `signals/` - Environment probing and signal collection
//! - `identity/` - Normalization, hashing, similarity
//! - `device_code/` - Request signing and the device code API client

pub mod device_code;
pub mod identity;
pub mod signals;
