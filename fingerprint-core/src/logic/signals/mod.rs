//! Signal Collection Module
//!
//! Environment probing and signal-set construction:
//! - `probe` - capability interface over the environment
//! - `browser` / `headless` - the two probe implementations
//! - `collector` - signal vocabulary, fail-soft collection, cached generation

pub mod browser;
pub mod collector;
pub mod headless;
pub mod probe;
pub mod types;

pub use browser::{BrowserEnvironment, BrowserProbe, LiveStatus};
pub use collector::{CollectionError, GeneratedFingerprint, SignalCollector, StableFingerprint};
pub use headless::HeadlessProbe;
pub use probe::{EnvironmentProbe, ProbeError, ProbeKind, ProbeResult};
pub use types::{DeviceStatus, MemoryUsage, SignalSet, SignalValue, NOT_SUPPORTED, PROBE_ERROR};
