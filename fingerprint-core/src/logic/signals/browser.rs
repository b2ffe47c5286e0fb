//! Browser Probe
//!
//! Reads a `BrowserEnvironment`: the raw browser API surface captured by the
//! embedding page (navigator, screen, drawing-context defaults, WebGL
//! parameters, text measurements, the set of exposed global APIs, and the
//! live status fields). The snapshot is plain data so it can be shipped over
//! JSON from a page shim or built directly in tests.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::probe::{
    AudioSupport, CanvasDefaults, DocumentInfo, EnvironmentProbe, FontMetrics, NavigatorInfo,
    PerformanceInfo, ProbeError, ProbeKind, ProbeResult, ScreenInfo, WebGlInfo,
};
use super::types::{DeviceStatus, MemoryUsage};

/// Live values that vary between calls on the same device
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LiveStatus {
    pub online: Option<bool>,
    pub effective_type: Option<String>,
    pub rtt_ms: Option<u32>,
    pub battery_level: Option<f64>,
    pub used_js_heap_size: Option<u64>,
    pub total_js_heap_size: Option<u64>,
    pub is_secure_context: bool,
}

/// Captured browser API surface
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BrowserEnvironment {
    pub navigator: Option<NavigatorInfo>,
    pub screen: Option<ScreenInfo>,
    pub device_pixel_ratio: Option<f64>,
    pub timezone: Option<String>,
    /// `None` when `getContext('2d')` returned null
    pub canvas: Option<CanvasDefaults>,
    /// `None` when no WebGL context could be created
    pub webgl: Option<WebGlInfo>,
    pub audio: Option<AudioSupport>,
    pub fonts: Option<FontMetrics>,
    pub plugins: Vec<String>,
    pub document: Option<DocumentInfo>,
    pub performance: Option<PerformanceInfo>,
    /// Exposed global APIs, e.g. `RTCPeerConnection`, `navigator.bluetooth`
    pub apis: BTreeSet<String>,
    /// Exceptions raised while capturing, keyed by probe name
    pub errors: BTreeMap<String, String>,
    /// Set when the page went away before capture finished
    pub context_lost: bool,
    pub status: LiveStatus,
}

impl BrowserEnvironment {
    pub fn has_api(&self, name: &str) -> bool {
        self.apis.contains(name)
    }
}

/// Probe over a captured browser environment
#[derive(Debug, Clone)]
pub struct BrowserProbe {
    env: BrowserEnvironment,
}

impl BrowserProbe {
    pub fn new(env: BrowserEnvironment) -> Self {
        Self { env }
    }

    /// Parse a snapshot serialized by the page shim
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    pub fn environment(&self) -> &BrowserEnvironment {
        &self.env
    }

    /// Replace the snapshot (e.g. after the page re-captured its surface)
    pub fn update(&mut self, env: BrowserEnvironment) {
        self.env = env;
    }

    /// Gate every read on context state and recorded exceptions
    fn read<T>(&self, probe: &str, value: Option<&T>) -> ProbeResult<T>
    where
        T: Clone,
    {
        if self.env.context_lost {
            return Err(ProbeError::ContextLost(format!("{} unavailable", probe)));
        }
        if let Some(message) = self.env.errors.get(probe) {
            return Err(ProbeError::Failed(message.clone()));
        }
        value.cloned().ok_or(ProbeError::Unsupported)
    }
}

impl EnvironmentProbe for BrowserProbe {
    fn kind(&self) -> ProbeKind {
        ProbeKind::Browser
    }

    fn navigator(&self) -> ProbeResult<NavigatorInfo> {
        self.read("navigator", self.env.navigator.as_ref())
    }

    fn screen(&self) -> ProbeResult<ScreenInfo> {
        self.read("screen", self.env.screen.as_ref())
    }

    fn device_pixel_ratio(&self) -> ProbeResult<f64> {
        self.read("devicePixelRatio", self.env.device_pixel_ratio.as_ref())
    }

    fn timezone(&self) -> ProbeResult<String> {
        self.read("timezone", self.env.timezone.as_ref())
    }

    fn canvas_defaults(&self) -> ProbeResult<CanvasDefaults> {
        self.read("canvas", self.env.canvas.as_ref())
    }

    fn webgl(&self) -> ProbeResult<WebGlInfo> {
        self.read("webgl", self.env.webgl.as_ref())
    }

    async fn audio(&self) -> ProbeResult<AudioSupport> {
        let audio = self.read("audio", self.env.audio.as_ref())?;
        if !audio.has_audio_context {
            return Err(ProbeError::Unsupported);
        }
        Ok(audio)
    }

    fn font_metrics(&self) -> ProbeResult<FontMetrics> {
        self.read("fonts", self.env.fonts.as_ref())
    }

    fn plugins(&self) -> ProbeResult<Vec<String>> {
        self.read("plugins", Some(&self.env.plugins))
    }

    fn document(&self) -> ProbeResult<DocumentInfo> {
        self.read("document", self.env.document.as_ref())
    }

    fn performance(&self) -> ProbeResult<PerformanceInfo> {
        self.read("performance", self.env.performance.as_ref())
    }

    fn has_api(&self, name: &str) -> ProbeResult<bool> {
        self.read("apis", Some(&self.env.has_api(name)))
    }

    fn device_status(&self) -> DeviceStatus {
        let live = &self.env.status;
        let mut status = DeviceStatus {
            is_online: live.online.unwrap_or(true),
            is_secure_context: live.is_secure_context,
            has_touch: self.env.has_api("ontouchstart"),
            has_pointer: self.env.has_api("onpointerdown"),
            rtt_ms: live.rtt_ms,
            ..DeviceStatus::default()
        };

        if let Some(nav) = &self.env.navigator {
            status.cpu_cores = nav.hardware_concurrency.unwrap_or(0);
        }
        if let Some(ratio) = self.env.device_pixel_ratio {
            status.device_pixel_ratio = ratio;
        }
        if let Some(orientation) = self.env.screen.as_ref().and_then(|s| s.orientation.clone()) {
            status.screen_orientation = orientation;
        }
        if let Some(effective_type) = &live.effective_type {
            status.connection_type = effective_type.clone();
        }
        status.battery_level = live
            .battery_level
            .map(|level| (level.clamp(0.0, 1.0) * 100.0).round() as u8);

        if let (Some(used), Some(total)) = (live.used_js_heap_size, live.total_js_heap_size) {
            let limit = self
                .env
                .performance
                .as_ref()
                .and_then(|p| p.js_heap_size_limit)
                .unwrap_or(total);
            status.memory_usage = Some(MemoryUsage {
                used: used / 1024 / 1024,
                total: total / 1024 / 1024,
                limit: limit / 1024 / 1024,
            });
        }

        status
    }
}
