//! Environment Probe Abstraction
//!
//! One interface over the capability surface a collector can read. The probe
//! is chosen when the collector is built:
//! - `BrowserProbe`: full browser API surface (from a captured snapshot)
//! - `HeadlessProbe`: no browser APIs, stable placeholders
//!
//! Probes are read-only. Each read either yields a value or a `ProbeError`;
//! the collector decides how an error degrades.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;

use super::types::DeviceStatus;

/// Probe failures
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProbeError {
    /// API absent in this environment
    #[error("not supported")]
    Unsupported,

    /// API present but reading it failed
    #[error("probe failed: {0}")]
    Failed(String),

    /// The environment went away mid-collection (page unloaded, context detached)
    #[error("environment context lost: {0}")]
    ContextLost(String),
}

pub type ProbeResult<T> = Result<T, ProbeError>;

/// Which execution mode a probe represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    Browser,
    Headless,
}

/// Navigator attributes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NavigatorInfo {
    pub user_agent: String,
    pub language: String,
    pub languages: Vec<String>,
    pub platform: String,
    pub cookie_enabled: bool,
    pub do_not_track: Option<String>,
    pub hardware_concurrency: Option<u32>,
    pub max_touch_points: Option<u32>,
    /// `navigator.deviceMemory` (GiB bucket, hardware-fixed)
    pub device_memory: Option<f64>,
    pub vendor: String,
    pub vendor_sub: String,
    pub product: String,
    pub product_sub: String,
    pub app_name: String,
    pub app_version: String,
    pub app_code_name: String,
}

/// Screen attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScreenInfo {
    pub width: u32,
    pub height: u32,
    pub avail_width: u32,
    pub avail_height: u32,
    pub orientation: Option<String>,
    pub color_gamut: Option<String>,
    pub contrast: Option<String>,
    pub forced_colors: Option<String>,
    pub color_depth: u32,
    pub pixel_depth: u32,
}

impl Default for ScreenInfo {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            avail_width: 1920,
            avail_height: 1080,
            orientation: Some("landscape-primary".to_string()),
            color_gamut: Some("srgb".to_string()),
            contrast: Some("no-preference".to_string()),
            forced_colors: Some("none".to_string()),
            color_depth: 24,
            pixel_depth: 24,
        }
    }
}

/// Default property values of a fresh 2D drawing context
///
/// These depend on the rendering engine, not on what gets drawn, so they do
/// not pick up anti-aliasing noise between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CanvasDefaults {
    pub fill_style: String,
    pub stroke_style: String,
    pub line_width: f64,
    pub line_cap: String,
    pub line_join: String,
    pub miter_limit: f64,
    pub font: String,
    pub text_align: String,
    pub text_baseline: String,
    pub global_alpha: f64,
    pub global_composite_operation: String,
}

impl Default for CanvasDefaults {
    fn default() -> Self {
        Self {
            fill_style: "#000000".to_string(),
            stroke_style: "#000000".to_string(),
            line_width: 1.0,
            line_cap: "butt".to_string(),
            line_join: "miter".to_string(),
            miter_limit: 10.0,
            font: "10px sans-serif".to_string(),
            text_align: "start".to_string(),
            text_baseline: "alphabetic".to_string(),
            global_alpha: 1.0,
            global_composite_operation: "source-over".to_string(),
        }
    }
}

/// WebGL context parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WebGlInfo {
    pub vendor: String,
    pub renderer: String,
    pub version: String,
    pub shading_language_version: String,
    pub extensions: Vec<String>,
    /// `WEBGL_debug_renderer_info` values when the extension is exposed
    pub unmasked_vendor: Option<String>,
    pub unmasked_renderer: Option<String>,
}

/// Audio API presence and playable formats
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AudioSupport {
    pub has_audio_context: bool,
    pub has_media_devices: bool,
    pub has_get_user_media: bool,
    /// `canPlayType` answers keyed by mime type (`""`, `"maybe"`, `"probably"`)
    pub can_play: BTreeMap<String, String>,
}

/// Text measurements used for font detection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FontMetrics {
    /// Width of the probe text in `12px monospace`
    pub baseline_width: f64,
    /// Width of the probe text in `12px <font>, monospace`, keyed by font name
    pub widths: BTreeMap<String, f64>,
    pub supports_text_metrics: bool,
    pub supports_font_variants: bool,
}

/// Document encoding attributes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DocumentInfo {
    pub character_set: Option<String>,
    pub input_encoding: Option<String>,
    pub has_default_view: bool,
    pub has_document_element: bool,
}

/// Performance API attributes that are fixed for a device
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PerformanceInfo {
    pub js_heap_size_limit: Option<u64>,
    pub has_timing: bool,
}

/// Capability provider used by `SignalCollector`
pub trait EnvironmentProbe: Send + Sync {
    fn kind(&self) -> ProbeKind;

    fn navigator(&self) -> ProbeResult<NavigatorInfo>;

    fn screen(&self) -> ProbeResult<ScreenInfo>;

    fn device_pixel_ratio(&self) -> ProbeResult<f64>;

    /// IANA timezone name
    fn timezone(&self) -> ProbeResult<String>;

    fn canvas_defaults(&self) -> ProbeResult<CanvasDefaults>;

    fn webgl(&self) -> ProbeResult<WebGlInfo>;

    /// Audio capability check; may suspend while the audio stack answers
    fn audio(&self) -> impl Future<Output = ProbeResult<AudioSupport>> + Send;

    fn font_metrics(&self) -> ProbeResult<FontMetrics>;

    fn plugins(&self) -> ProbeResult<Vec<String>>;

    fn document(&self) -> ProbeResult<DocumentInfo>;

    fn performance(&self) -> ProbeResult<PerformanceInfo>;

    /// Whether a named global API is exposed (e.g. `RTCPeerConnection`, `navigator.usb`)
    fn has_api(&self, name: &str) -> ProbeResult<bool>;

    /// Live telemetry. Never hashed.
    fn device_status(&self) -> DeviceStatus;
}
