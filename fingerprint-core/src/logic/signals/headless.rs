//! Headless Probe
//!
//! Used where no browser APIs exist (services, CLI agents, test runners).
//! Every probe answers with a fixed placeholder or a host value that only
//! changes with real hardware/software change, so collection never fails.

use sysinfo::System;

use super::probe::{
    AudioSupport, CanvasDefaults, DocumentInfo, EnvironmentProbe, FontMetrics, NavigatorInfo,
    PerformanceInfo, ProbeError, ProbeKind, ProbeResult, ScreenInfo, WebGlInfo,
};
use super::types::{DeviceStatus, MemoryUsage};

/// Probe with no browser surface
#[derive(Debug, Clone)]
pub struct HeadlessProbe {
    user_agent: String,
    platform: String,
    hardware_concurrency: u32,
    device_memory_gib: Option<f64>,
    timezone: String,
}

impl HeadlessProbe {
    /// Build from host information
    pub fn new() -> Self {
        let hardware_concurrency = std::thread::available_parallelism()
            .map(|n| n.get() as u32)
            .unwrap_or(1);

        let mut sys = System::new();
        sys.refresh_memory();
        let total = sys.total_memory();
        let device_memory_gib = if total > 0 {
            Some((total as f64 / (1024.0 * 1024.0 * 1024.0)).round())
        } else {
            None
        };

        let timezone = host_timezone().unwrap_or_else(|| "UTC".to_string());

        Self {
            user_agent: format!("fingerprint-core/{}", env!("CARGO_PKG_VERSION")),
            platform: std::env::consts::OS.to_string(),
            hardware_concurrency,
            device_memory_gib,
            timezone,
        }
    }

    /// Fully fixed probe, independent of the host
    pub fn fixed(platform: &str, hardware_concurrency: u32) -> Self {
        Self {
            user_agent: format!("fingerprint-core/{}", env!("CARGO_PKG_VERSION")),
            platform: platform.to_string(),
            hardware_concurrency,
            device_memory_gib: None,
            timezone: "UTC".to_string(),
        }
    }
}

/// IANA zone of the host: `TZ`, `/etc/timezone`, then the `/etc/localtime` link
fn host_timezone() -> Option<String> {
    let from_env = std::env::var("TZ")
        .ok()
        .map(|tz| tz.trim().trim_start_matches(':').to_string())
        .filter(|tz| !tz.is_empty());
    if from_env.is_some() {
        return from_env;
    }

    let from_file = std::fs::read_to_string("/etc/timezone")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|tz| !tz.is_empty());
    if from_file.is_some() {
        return from_file;
    }

    std::fs::read_link("/etc/localtime")
        .ok()
        .and_then(|target| zone_from_localtime(&target))
}

/// `/usr/share/zoneinfo/Europe/Berlin` -> `Europe/Berlin`
fn zone_from_localtime(target: &std::path::Path) -> Option<String> {
    let target = target.to_str()?;
    let (_, zone) = target.split_once("zoneinfo/")?;
    let zone = zone.trim_start_matches("posix/").trim_start_matches("right/");
    (!zone.is_empty()).then(|| zone.to_string())
}

impl Default for HeadlessProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvironmentProbe for HeadlessProbe {
    fn kind(&self) -> ProbeKind {
        ProbeKind::Headless
    }

    fn navigator(&self) -> ProbeResult<NavigatorInfo> {
        Ok(NavigatorInfo {
            user_agent: self.user_agent.clone(),
            language: "en-US".to_string(),
            languages: vec!["en-US".to_string()],
            platform: self.platform.clone(),
            cookie_enabled: false,
            do_not_track: None,
            hardware_concurrency: Some(self.hardware_concurrency),
            max_touch_points: Some(0),
            device_memory: self.device_memory_gib,
            ..NavigatorInfo::default()
        })
    }

    fn screen(&self) -> ProbeResult<ScreenInfo> {
        Ok(ScreenInfo::default())
    }

    fn device_pixel_ratio(&self) -> ProbeResult<f64> {
        Ok(1.0)
    }

    fn timezone(&self) -> ProbeResult<String> {
        Ok(self.timezone.clone())
    }

    fn canvas_defaults(&self) -> ProbeResult<CanvasDefaults> {
        Err(ProbeError::Unsupported)
    }

    fn webgl(&self) -> ProbeResult<WebGlInfo> {
        Ok(WebGlInfo {
            vendor: "Headless Simulated".to_string(),
            renderer: "Headless WebGL Simulator".to_string(),
            version: "1.0.0".to_string(),
            shading_language_version: "1.0.0".to_string(),
            extensions: vec!["simulated_extension".to_string()],
            unmasked_vendor: None,
            unmasked_renderer: None,
        })
    }

    async fn audio(&self) -> ProbeResult<AudioSupport> {
        Err(ProbeError::Unsupported)
    }

    fn font_metrics(&self) -> ProbeResult<FontMetrics> {
        Err(ProbeError::Unsupported)
    }

    fn plugins(&self) -> ProbeResult<Vec<String>> {
        Ok(Vec::new())
    }

    fn document(&self) -> ProbeResult<DocumentInfo> {
        Err(ProbeError::Unsupported)
    }

    fn performance(&self) -> ProbeResult<PerformanceInfo> {
        Ok(PerformanceInfo {
            js_heap_size_limit: None,
            has_timing: false,
        })
    }

    fn has_api(&self, _name: &str) -> ProbeResult<bool> {
        Ok(false)
    }

    fn device_status(&self) -> DeviceStatus {
        let mut sys = System::new();
        sys.refresh_memory();

        let mib = |bytes: u64| bytes / 1024 / 1024;
        DeviceStatus {
            cpu_cores: self.hardware_concurrency,
            memory_usage: Some(MemoryUsage {
                used: mib(sys.used_memory()),
                total: mib(sys.total_memory()),
                limit: mib(sys.total_memory()),
            }),
            ..DeviceStatus::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_navigator_is_stable() {
        let probe = HeadlessProbe::new();
        let a = probe.navigator().unwrap();
        let b = probe.navigator().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.platform, std::env::consts::OS);
        assert!(a.hardware_concurrency.unwrap_or(0) >= 1);
    }

    #[test]
    fn test_headless_has_no_rendering_surface() {
        let probe = HeadlessProbe::fixed("linux", 4);
        assert_eq!(probe.canvas_defaults(), Err(ProbeError::Unsupported));
        assert_eq!(probe.font_metrics(), Err(ProbeError::Unsupported));
        assert!(!probe.has_api("RTCPeerConnection").unwrap());
    }

    #[test]
    fn test_zone_from_localtime() {
        use std::path::Path;
        assert_eq!(
            zone_from_localtime(Path::new("/usr/share/zoneinfo/Europe/Berlin")).as_deref(),
            Some("Europe/Berlin")
        );
        assert_eq!(
            zone_from_localtime(Path::new("../usr/share/zoneinfo/posix/Asia/Tokyo")).as_deref(),
            Some("Asia/Tokyo")
        );
        assert_eq!(zone_from_localtime(Path::new("/etc/alternatives/localtime")), None);
        assert_eq!(zone_from_localtime(Path::new("/usr/share/zoneinfo/")), None);
    }

    #[test]
    fn test_fixed_probe_timezone() {
        let probe = HeadlessProbe::fixed("linux", 4);
        assert_eq!(probe.timezone().unwrap(), "UTC");
        assert_eq!(probe.kind(), ProbeKind::Headless);
    }
}
