//! Signal Collector
//!
//! Reads the environment through an `EnvironmentProbe` and turns it into a
//! `SignalSet`, then a `Fingerprint`.
//!
//! Collection is fail-soft: a probe whose API is missing yields
//! `"not_supported"`, a probe that raised yields `"error"`, and collection
//! continues. Only a lost environment context aborts the run; `generate()`
//! then falls back to a low-confidence, timestamp-based identifier that is
//! never cached and cannot be reported.
//!
//! Nothing that changes between two calls on the same device (battery level,
//! live memory, network RTT, wall-clock time, UTC offset) is collected here.
//! Those values go through `device_status()` instead.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

use super::probe::{EnvironmentProbe, ProbeError, ProbeResult};
use super::types::{DeviceStatus, SignalSet, SignalValue, NOT_SUPPORTED, PROBE_ERROR};
use crate::logic::identity::{self, Fingerprint};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Delay between the two runs of `validate_stability()`
const STABILITY_CHECK_DELAY: Duration = Duration::from_millis(100);

/// Signals that must be present for `quick_stability_check()` to pass
const KEY_COMPONENTS: &[&str] = &[
    "userAgent",
    "platform",
    "screenResolution",
    "devicePixelRatio",
    "timezone",
    "language",
];

/// Fixed drawing surface size used for the canvas digest
const CANVAS_WIDTH: i64 = 200;
const CANVAS_HEIGHT: i64 = 50;

/// Font width delta that counts as "font applied"
const FONT_WIDTH_DELTA: f64 = 0.1;

/// Fonts probed for presence
const PROBE_FONTS: &[(&str, &str)] = &[
    ("hasArial", "Arial"),
    ("hasHelvetica", "Helvetica"),
    ("hasTimes", "Times New Roman"),
    ("hasGeorgia", "Georgia"),
    ("hasCourier", "Courier New"),
    ("hasVerdana", "Verdana"),
    ("hasTahoma", "Tahoma"),
    ("hasImpact", "Impact"),
];

/// Playable audio formats
const AUDIO_FORMATS: &[(&str, &str)] = &[
    ("canPlayMP3", "audio/mpeg"),
    ("canPlayWAV", "audio/wav"),
    ("canPlayOGG", "audio/ogg"),
    ("canPlayAAC", "audio/aac"),
];

/// Browser capability flags; a flag is set when any listed API is exposed
const CAPABILITIES: &[(&str, &[&str])] = &[
    ("geolocation", &["navigator.geolocation"]),
    ("serviceWorker", &["navigator.serviceWorker"]),
    ("pushManager", &["PushManager"]),
    ("webRTC", &["RTCPeerConnection"]),
    ("webGL", &["WebGLRenderingContext"]),
    ("webGL2", &["WebGL2RenderingContext"]),
    ("webAudio", &["AudioContext", "webkitAudioContext"]),
    ("webSpeech", &["speechSynthesis"]),
    ("webVR", &["navigator.getVRDisplays"]),
    ("webXR", &["navigator.xr"]),
    ("webNFC", &["NDEFReader"]),
    ("webUSB", &["navigator.usb"]),
    ("webSerial", &["navigator.serial"]),
    ("webHID", &["navigator.hid"]),
    ("webBluetooth", &["navigator.bluetooth"]),
    ("webShare", &["navigator.share"]),
    ("webClipboard", &["navigator.clipboard"]),
    ("webPayment", &["PaymentRequest"]),
    ("webCredential", &["navigator.credentials"]),
    ("webLocks", &["navigator.locks"]),
    ("webScheduling", &["scheduler"]),
    ("webFileSystem", &["showOpenFilePicker"]),
    ("webFileSystemAccess", &["showSaveFilePicker"]),
];

const SENSORS: &[(&str, &[&str])] = &[
    ("accelerometer", &["Accelerometer"]),
    ("gyroscope", &["Gyroscope"]),
    ("magnetometer", &["Magnetometer"]),
    ("linearAccelerationSensor", &["LinearAccelerationSensor"]),
    ("gravitySensor", &["GravitySensor"]),
    ("orientationSensor", &["OrientationSensor"]),
    ("ambientLightSensor", &["AmbientLightSensor"]),
    ("proximitySensor", &["ProximitySensor"]),
];

const STORAGE_APIS: &[(&str, &[&str])] = &[
    ("localStorage", &["localStorage"]),
    ("sessionStorage", &["sessionStorage"]),
    ("indexedDB", &["indexedDB"]),
    ("webSQL", &["openDatabase"]),
    ("cacheAPI", &["caches"]),
];

const NAVIGATOR_KEYS: &[&str] = &[
    "userAgent",
    "language",
    "languages",
    "platform",
    "cookieEnabled",
    "doNotTrack",
    "hardwareConcurrency",
    "maxTouchPoints",
    "vendorInfo",
    "memoryInfo",
];

const SCREEN_KEYS: &[&str] = &[
    "screenAvailWidth",
    "screenAvailHeight",
    "screenOrientation",
    "colorGamut",
    "contrast",
    "forcedColors",
    "screenResolution",
    "screenColorDepth",
    "screenPixelDepth",
];

const TIMEZONE_KEYS: &[&str] = &["timezone", "timezoneInfo", "timeStability"];

// ============================================================================
// TYPES
// ============================================================================

/// Collection aborted before a complete signal set existed
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CollectionError {
    #[error("environment context lost: {0}")]
    ContextLost(String),
}

/// A fingerprint computed from a complete signal set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StableFingerprint {
    pub fingerprint: Fingerprint,
    pub signals: SignalSet,
    pub generated_at: DateTime<Utc>,
}

/// Result of `generate()`
#[derive(Debug, Clone, PartialEq)]
pub enum GeneratedFingerprint {
    /// Full collection succeeded; cached on the collector
    Stable(StableFingerprint),

    /// Collection aborted; timestamp-based and never cached
    LowConfidence {
        fingerprint: Fingerprint,
        reason: String,
    },
}

impl GeneratedFingerprint {
    pub fn fingerprint(&self) -> &Fingerprint {
        match self {
            GeneratedFingerprint::Stable(stable) => &stable.fingerprint,
            GeneratedFingerprint::LowConfidence { fingerprint, .. } => fingerprint,
        }
    }

    pub fn is_stable(&self) -> bool {
        matches!(self, GeneratedFingerprint::Stable(_))
    }

    /// The reportable form, if any
    pub fn stable(&self) -> Option<&StableFingerprint> {
        match self {
            GeneratedFingerprint::Stable(stable) => Some(stable),
            GeneratedFingerprint::LowConfidence { .. } => None,
        }
    }
}

// ============================================================================
// COLLECTOR
// ============================================================================

/// Owns one probe and the cached result of the last successful generation
pub struct SignalCollector<P: EnvironmentProbe> {
    probe: P,
    merchant_key: Option<String>,
    cached: Option<StableFingerprint>,
}

impl<P: EnvironmentProbe> SignalCollector<P> {
    pub fn new(probe: P) -> Self {
        Self {
            probe,
            merchant_key: None,
            cached: None,
        }
    }

    /// Salt fingerprints with a merchant key
    pub fn with_merchant_key(mut self, merchant_key: impl Into<String>) -> Self {
        let key = merchant_key.into();
        self.merchant_key = (!key.is_empty()).then_some(key);
        self
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }

    /// Mutable probe access; drops the cache since the environment may change
    pub fn probe_mut(&mut self) -> &mut P {
        self.cached = None;
        &mut self.probe
    }

    pub fn merchant_key(&self) -> Option<&str> {
        self.merchant_key.as_deref()
    }

    /// Cached fingerprint, or a fresh generation
    pub async fn generate(&mut self) -> GeneratedFingerprint {
        if let Some(cached) = &self.cached {
            log::debug!("Using cached fingerprint {}...", cached.fingerprint.short());
            return GeneratedFingerprint::Stable(cached.clone());
        }

        match self.collect().await {
            Ok(signals) => {
                let fingerprint = identity::hash(&signals, self.merchant_key());
                log::info!(
                    "Fingerprint generated: {}... ({} signals)",
                    fingerprint.short(),
                    signals.len()
                );

                let stable = StableFingerprint {
                    fingerprint,
                    signals,
                    generated_at: Utc::now(),
                };
                self.cached = Some(stable.clone());
                GeneratedFingerprint::Stable(stable)
            }
            Err(e) => {
                log::warn!("Signal collection failed, using fallback fingerprint: {}", e);
                GeneratedFingerprint::LowConfidence {
                    fingerprint: self.fallback_fingerprint(),
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Drop the cached result
    pub fn invalidate(&mut self) {
        if self.cached.take().is_some() {
            log::debug!("Fingerprint cache invalidated");
        }
    }

    /// Invalidate, then generate
    pub async fn regenerate(&mut self) -> GeneratedFingerprint {
        self.invalidate();
        self.generate().await
    }

    /// Signals behind the cached fingerprint
    pub fn signals(&self) -> Option<&SignalSet> {
        self.cached.as_ref().map(|c| &c.signals)
    }

    pub fn cached(&self) -> Option<&StableFingerprint> {
        self.cached.as_ref()
    }

    /// Live telemetry (never part of the fingerprint)
    pub fn device_status(&self) -> DeviceStatus {
        self.probe.device_status()
    }

    /// Whether the key components of the cached signal set carry real values
    pub fn quick_stability_check(&self) -> bool {
        let Some(signals) = self.signals() else {
            return false;
        };

        KEY_COMPONENTS.iter().all(|key| match signals.get(key) {
            None | Some(SignalValue::Null) | Some(SignalValue::Bool(false)) => false,
            Some(SignalValue::Int(0)) => false,
            Some(SignalValue::Text(s)) => {
                !s.is_empty() && s != NOT_SUPPORTED && s != PROBE_ERROR
            }
            Some(_) => true,
        })
    }

    /// Two fresh collections, 100 ms apart, must hash identically
    ///
    /// Bypasses and does not touch the cache.
    pub async fn validate_stability(&self) -> Result<bool, CollectionError> {
        let first = identity::hash(&self.collect().await?, self.merchant_key());
        tokio::time::sleep(STABILITY_CHECK_DELAY).await;
        let second = identity::hash(&self.collect().await?, self.merchant_key());

        if first != second {
            log::warn!(
                "Fingerprint unstable: {}... != {}...",
                first.short(),
                second.short()
            );
        }
        Ok(first == second)
    }

    /// Read every probe into a fresh signal set
    pub async fn collect(&self) -> Result<SignalSet, CollectionError> {
        let mut signals = SignalSet::new();

        self.collect_navigator(&mut signals)?;
        self.collect_screen(&mut signals)?;

        signals.insert(
            "devicePixelRatio",
            soft("devicePixelRatio", self.probe.device_pixel_ratio(), SignalValue::from)?,
        );

        match settle("timezone", self.probe.timezone())? {
            Ok(tz) => {
                signals.insert("timezone", tz.as_str());
                signals.insert("timezoneInfo", SignalValue::object([("timezone", tz.as_str())]));
                signals.insert("timeStability", SignalValue::object([("timezone", tz.as_str())]));
            }
            Err(sentinel) => fill(&mut signals, TIMEZONE_KEYS, sentinel),
        }

        signals.insert("canvasFingerprint", self.canvas_fingerprint()?);
        self.collect_webgl(&mut signals)?;
        signals.insert("audioFingerprint", self.audio_fingerprint().await?);
        signals.insert("fonts", self.font_fingerprint()?);

        signals.insert(
            "plugins",
            soft("plugins", self.probe.plugins(), |plugins| {
                if plugins.is_empty() {
                    SignalValue::from("no_plugins")
                } else {
                    SignalValue::from(plugins.join(","))
                }
            })?,
        );

        let storage = soft("storage", self.probe_apis(STORAGE_APIS), |flags| {
            SignalValue::object(flags.into_iter().map(|(k, v)| (k, SignalValue::availability(v))))
        })?;
        signals.insert("storage", storage.clone());
        signals.insert("storageInfo", storage);

        signals.insert("mediaDevices", self.api_availability("navigator.mediaDevices.enumerateDevices")?);
        signals.insert("permissions", self.api_availability("navigator.permissions")?);
        signals.insert("batteryInfo", self.api_availability("navigator.getBattery")?);
        signals.insert(
            "connectionInfo",
            soft("connectionInfo", self.probe.has_api("navigator.connection"), |present| {
                if present {
                    SignalValue::object([("hasConnectionAPI", true)])
                } else {
                    SignalValue::not_supported()
                }
            })?,
        );

        signals.insert(
            "sensorInfo",
            soft("sensorInfo", self.probe_apis(SENSORS), |flags| SignalValue::object(flags))?,
        );
        signals.insert(
            "capabilitiesInfo",
            soft("capabilitiesInfo", self.probe_apis(CAPABILITIES), |flags| {
                SignalValue::object(flags)
            })?,
        );

        signals.insert(
            "performanceInfo",
            soft("performanceInfo", self.probe.performance(), |perf| {
                let timing = if perf.has_timing { "available" } else { "not_available" };
                let mut entries: Vec<(&str, SignalValue)> = vec![("timing", timing.into())];
                if let Some(limit) = perf.js_heap_size_limit {
                    entries.push(("jsHeapSizeLimit", SignalValue::Int(limit as i64)));
                }
                SignalValue::object(entries)
            })?,
        );

        signals.insert(
            "encodingInfo",
            soft("encodingInfo", self.probe.document(), |doc| {
                let marker = |present: bool| if present { "available" } else { "not_available" };
                SignalValue::object([
                    ("charset", SignalValue::from(doc.character_set)),
                    ("inputEncoding", SignalValue::from(doc.input_encoding)),
                    ("defaultView", marker(doc.has_default_view).into()),
                    ("textContent", marker(doc.has_document_element).into()),
                ])
            })?,
        );

        log::debug!("Collected {} signals ({:?} probe)", signals.len(), self.probe.kind());
        Ok(signals)
    }

    // ------------------------------------------------------------------------
    // Probe groups
    // ------------------------------------------------------------------------

    fn collect_navigator(&self, signals: &mut SignalSet) -> Result<(), CollectionError> {
        let nav = match settle("navigator", self.probe.navigator())? {
            Ok(nav) => nav,
            Err(sentinel) => {
                fill(signals, NAVIGATOR_KEYS, sentinel);
                return Ok(());
            }
        };

        signals.insert("userAgent", identity::normalize_user_agent(&nav.user_agent));
        signals.insert("language", nav.language.as_str());
        signals.insert("languages", nav.languages.join(","));
        signals.insert("platform", nav.platform.as_str());
        signals.insert("cookieEnabled", nav.cookie_enabled);
        signals.insert("doNotTrack", nav.do_not_track.clone());
        signals.insert("hardwareConcurrency", nav.hardware_concurrency.unwrap_or(0));
        signals.insert("maxTouchPoints", nav.max_touch_points.unwrap_or(0));

        signals.insert(
            "memoryInfo",
            match nav.device_memory {
                Some(memory) => SignalValue::object([("deviceMemory", memory)]),
                None => SignalValue::not_supported(),
            },
        );

        signals.insert(
            "vendorInfo",
            SignalValue::object([
                ("vendor", nav.vendor.as_str()),
                ("vendorSub", nav.vendor_sub.as_str()),
                ("product", nav.product.as_str()),
                ("productSub", nav.product_sub.as_str()),
                ("appName", nav.app_name.as_str()),
                ("appVersion", nav.app_version.as_str()),
                ("appCodeName", nav.app_code_name.as_str()),
            ]),
        );

        Ok(())
    }

    fn collect_screen(&self, signals: &mut SignalSet) -> Result<(), CollectionError> {
        let screen = match settle("screen", self.probe.screen())? {
            Ok(screen) => screen,
            Err(sentinel) => {
                fill(signals, SCREEN_KEYS, sentinel);
                return Ok(());
            }
        };

        signals.insert("screenAvailWidth", screen.avail_width);
        signals.insert("screenAvailHeight", screen.avail_height);
        signals.insert(
            "screenOrientation",
            screen.orientation.unwrap_or_else(|| "unknown".to_string()),
        );
        signals.insert("colorGamut", screen.color_gamut.unwrap_or_else(|| "unknown".to_string()));
        signals.insert("contrast", screen.contrast.unwrap_or_else(|| "unknown".to_string()));
        signals.insert("forcedColors", screen.forced_colors.unwrap_or_else(|| "none".to_string()));
        signals.insert("screenResolution", format!("{}x{}", screen.width, screen.height));
        signals.insert("screenColorDepth", screen.color_depth);
        signals.insert("screenPixelDepth", screen.pixel_depth);

        Ok(())
    }

    fn collect_webgl(&self, signals: &mut SignalSet) -> Result<(), CollectionError> {
        let webgl = match settle("webgl", self.probe.webgl())? {
            Ok(webgl) => webgl,
            Err(sentinel) => {
                fill(signals, &["webglFingerprint", "gpuInfo"], sentinel);
                return Ok(());
            }
        };

        let summary = serde_json::json!({
            "vendor": webgl.vendor,
            "renderer": webgl.renderer,
            "version": webgl.version,
            "shadingLanguageVersion": webgl.shading_language_version,
            "extensions": webgl.extensions,
        });
        signals.insert("webglFingerprint", summary.to_string());

        let mut gpu: Vec<(&str, SignalValue)> = vec![
            ("version", webgl.version.as_str().into()),
            ("shadingLanguageVersion", webgl.shading_language_version.as_str().into()),
        ];
        if let (Some(vendor), Some(renderer)) = (&webgl.unmasked_vendor, &webgl.unmasked_renderer) {
            gpu.push(("vendor", vendor.as_str().into()));
            gpu.push(("renderer", renderer.as_str().into()));
        }
        signals.insert("gpuInfo", SignalValue::object(gpu));

        Ok(())
    }

    /// Digest of the 2D context defaults at a fixed surface size
    fn canvas_fingerprint(&self) -> Result<SignalValue, CollectionError> {
        soft("canvas", self.probe.canvas_defaults(), |ctx| {
            SignalValue::from(identity::component_digest([
                ("width", SignalValue::Int(CANVAS_WIDTH)),
                ("height", SignalValue::Int(CANVAS_HEIGHT)),
                ("fillStyle", ctx.fill_style.into()),
                ("strokeStyle", ctx.stroke_style.into()),
                ("lineWidth", ctx.line_width.into()),
                ("lineCap", ctx.line_cap.into()),
                ("lineJoin", ctx.line_join.into()),
                ("miterLimit", ctx.miter_limit.into()),
                ("font", ctx.font.into()),
                ("textAlign", ctx.text_align.into()),
                ("textBaseline", ctx.text_baseline.into()),
                ("globalAlpha", ctx.global_alpha.into()),
                ("globalCompositeOperation", ctx.global_composite_operation.into()),
            ]))
        })
    }

    /// Digest of audio API presence and playable formats
    async fn audio_fingerprint(&self) -> Result<SignalValue, CollectionError> {
        let audio = self.probe.audio().await;
        soft("audio", audio, |audio| {
            let mut entries: Vec<(&str, SignalValue)> = vec![
                ("hasAudioContext", audio.has_audio_context.into()),
                ("hasWebAudio", audio.has_audio_context.into()),
                ("hasMediaDevices", audio.has_media_devices.into()),
                ("hasGetUserMedia", audio.has_get_user_media.into()),
            ];
            for &(key, mime) in AUDIO_FORMATS {
                let playable = audio
                    .can_play
                    .get(mime)
                    .map(|answer| !answer.is_empty())
                    .unwrap_or(false);
                entries.push((key, playable.into()));
            }
            SignalValue::from(identity::component_digest(entries))
        })
    }

    /// Digest of detected fonts plus text rendering capabilities
    fn font_fingerprint(&self) -> Result<SignalValue, CollectionError> {
        let metrics = match settle("fonts", self.probe.font_metrics())? {
            Ok(metrics) => metrics,
            Err(sentinel) => return Ok(sentinel),
        };
        let font_loading = match settle("fonts", self.probe.has_api("document.fonts.load"))? {
            Ok(present) => present,
            Err(_) => false,
        };

        let mut entries: Vec<(&str, SignalValue)> = PROBE_FONTS
            .iter()
            .map(|(key, font)| {
                let detected = metrics
                    .widths
                    .get(*font)
                    .map(|width| (width - metrics.baseline_width).abs() > FONT_WIDTH_DELTA)
                    .unwrap_or(false);
                (*key, SignalValue::from(detected))
            })
            .collect();
        entries.push(("supportsTextMetrics", metrics.supports_text_metrics.into()));
        entries.push(("supportsFontLoading", font_loading.into()));
        entries.push(("supportsFontVariants", metrics.supports_font_variants.into()));

        Ok(SignalValue::from(identity::component_digest(entries)))
    }

    fn api_availability(&self, api: &str) -> Result<SignalValue, CollectionError> {
        soft(api, self.probe.has_api(api), SignalValue::availability)
    }

    /// Presence flags for a table of `(flag, alternative API names)`
    fn probe_apis(&self, table: &[(&str, &[&str])]) -> ProbeResult<BTreeMap<String, bool>> {
        let mut flags = BTreeMap::new();
        for (flag, apis) in table {
            let mut present = false;
            for api in apis.iter() {
                if self.probe.has_api(api)? {
                    present = true;
                    break;
                }
            }
            flags.insert(flag.to_string(), present);
        }
        Ok(flags)
    }

    /// Timestamp-based identifier from whatever navigator data is left
    fn fallback_fingerprint(&self) -> Fingerprint {
        let (user_agent, platform, language) = match self.probe.navigator() {
            Ok(nav) => (nav.user_agent, nav.platform, nav.language),
            Err(_) => (
                "unknown".to_string(),
                "unknown".to_string(),
                "unknown".to_string(),
            ),
        };

        identity::fallback(
            &user_agent,
            &platform,
            &language,
            Utc::now().timestamp_millis(),
            self.merchant_key(),
        )
    }
}

// ============================================================================
// HELPERS
// ============================================================================

/// Split a probe result into its value or the sentinel that replaces it
///
/// Only a lost context escapes as an error.
fn settle<T>(probe: &str, result: ProbeResult<T>) -> Result<Result<T, SignalValue>, CollectionError> {
    match result {
        Ok(value) => Ok(Ok(value)),
        Err(ProbeError::Unsupported) => Ok(Err(SignalValue::not_supported())),
        Err(ProbeError::Failed(message)) => {
            log::debug!("Probe {} failed: {}", probe, message);
            Ok(Err(SignalValue::error()))
        }
        Err(ProbeError::ContextLost(message)) => Err(CollectionError::ContextLost(message)),
    }
}

/// `settle` for single-signal probes
fn soft<T>(
    probe: &str,
    result: ProbeResult<T>,
    present: impl FnOnce(T) -> SignalValue,
) -> Result<SignalValue, CollectionError> {
    Ok(match settle(probe, result)? {
        Ok(value) => present(value),
        Err(sentinel) => sentinel,
    })
}

fn fill(signals: &mut SignalSet, keys: &[&str], sentinel: SignalValue) {
    for key in keys {
        signals.insert(*key, sentinel.clone());
    }
}
