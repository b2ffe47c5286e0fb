//! Signal Types
//!
//! A `SignalSet` is the full mapping of named environment attributes collected
//! in one generation run. Keys iterate in lexicographic order, which is what
//! the hasher and the similarity scorer rely on.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Sentinel for a probe whose API is absent in the environment
pub const NOT_SUPPORTED: &str = "not_supported";

/// Sentinel for a probe that raised while reading
pub const PROBE_ERROR: &str = "error";

/// One observable value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<SignalValue>),
    Object(BTreeMap<String, SignalValue>),
}

impl SignalValue {
    /// Canonical text form used by the hasher (`key:value`)
    ///
    /// Scalars render bare. Integral floats drop the fractional part so a
    /// pixel ratio of `1` and `1.0` read the same. Lists and objects render as
    /// compact JSON with sorted keys.
    pub fn render(&self) -> String {
        match self {
            SignalValue::Null => "null".to_string(),
            SignalValue::Bool(b) => b.to_string(),
            SignalValue::Int(i) => i.to_string(),
            SignalValue::Float(f) => render_float(*f),
            SignalValue::Text(s) => s.clone(),
            SignalValue::List(_) | SignalValue::Object(_) => {
                serde_json::to_string(self).unwrap_or_else(|_| PROBE_ERROR.to_string())
            }
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SignalValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Build an object value from `(name, value)` pairs
    pub fn object<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<SignalValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        SignalValue::Object(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn not_supported() -> Self {
        SignalValue::Text(NOT_SUPPORTED.to_string())
    }

    pub fn error() -> Self {
        SignalValue::Text(PROBE_ERROR.to_string())
    }

    /// `"available"` / `"not_supported"` presence marker
    pub fn availability(present: bool) -> Self {
        if present {
            SignalValue::Text("available".to_string())
        } else {
            SignalValue::not_supported()
        }
    }
}

fn render_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        format!("{}", f)
    }
}

impl fmt::Display for SignalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl From<bool> for SignalValue {
    fn from(v: bool) -> Self {
        SignalValue::Bool(v)
    }
}

impl From<i64> for SignalValue {
    fn from(v: i64) -> Self {
        SignalValue::Int(v)
    }
}

impl From<u32> for SignalValue {
    fn from(v: u32) -> Self {
        SignalValue::Int(v as i64)
    }
}

impl From<f64> for SignalValue {
    fn from(v: f64) -> Self {
        SignalValue::Float(v)
    }
}

impl From<String> for SignalValue {
    fn from(v: String) -> Self {
        SignalValue::Text(v)
    }
}

impl From<&str> for SignalValue {
    fn from(v: &str) -> Self {
        SignalValue::Text(v.to_string())
    }
}

impl<T: Into<SignalValue>> From<Option<T>> for SignalValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SignalValue::Null)
    }
}

impl<T: Into<SignalValue>> From<Vec<T>> for SignalValue {
    fn from(v: Vec<T>) -> Self {
        SignalValue::List(v.into_iter().map(Into::into).collect())
    }
}

/// Collected signals of one generation run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignalSet(BTreeMap<String, SignalValue>);

impl SignalSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<SignalValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&SignalValue> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<SignalValue> {
        self.0.remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Entries in lexicographic key order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &SignalValue)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Convert to a JSON value (for report bodies and persistence)
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Parse from a stored JSON snapshot
    pub fn from_json(value: &serde_json::Value) -> Result<Self, serde_json::Error> {
        SignalSet::deserialize(value)
    }
}

impl FromIterator<(String, SignalValue)> for SignalSet {
    fn from_iter<I: IntoIterator<Item = (String, SignalValue)>>(iter: I) -> Self {
        SignalSet(iter.into_iter().collect())
    }
}

/// Live device telemetry
///
/// Reported alongside the fingerprint but never part of a `SignalSet`:
/// every field here can change between two calls on the same device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatus {
    pub is_online: bool,
    pub connection_type: String,
    pub battery_level: Option<u8>,
    pub memory_usage: Option<MemoryUsage>,
    pub cpu_cores: u32,
    pub device_pixel_ratio: f64,
    pub screen_orientation: String,
    pub is_secure_context: bool,
    pub has_touch: bool,
    pub has_pointer: bool,
    pub rtt_ms: Option<u32>,
}

impl Default for DeviceStatus {
    fn default() -> Self {
        Self {
            is_online: true,
            connection_type: "unknown".to_string(),
            battery_level: None,
            memory_usage: None,
            cpu_cores: 0,
            device_pixel_ratio: 1.0,
            screen_orientation: "unknown".to_string(),
            is_secure_context: false,
            has_touch: false,
            has_pointer: false,
            rtt_ms: None,
        }
    }
}

/// Memory usage in MiB
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryUsage {
    pub used: u64,
    pub total: u64,
    pub limit: u64,
}
