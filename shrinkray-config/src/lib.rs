//! Declarative configuration document for the orchestration engine.
//!
//! This crate only owns the typed document, its documented defaults, and the
//! bounds-coercion rules ("bad values coerce to bounds", "unknown algorithms
//! fall back to `hable`"). Loading this document from a YAML file on disk and
//! parsing CLI flags into it are the excluded outer surface;
//! callers hand this crate already-parsed values.

#[cfg(test)]
mod tests;

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// What happens to the source file once a transcode finalizes successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OriginalHandling {
    /// Delete the original outright once the replacement is in place.
    Replace,
    /// Keep the original alongside the replacement as `<name>.old`.
    Keep,
}

impl Default for OriginalHandling {
    fn default() -> Self {
        Self::Replace
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OutputContainer {
    Mkv,
    Mp4,
}

impl Default for OutputContainer {
    fn default() -> Self {
        Self::Mkv
    }
}

/// A tonemap operator applied in linear light when converting HDR to SDR.
///
/// Unrecognized values from a config file fall back to [`TonemapAlgorithm::Hable`]
/// rather than failing startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TonemapAlgorithm {
    Hable,
    Bt2390,
    Reinhard,
    Mobius,
    Clip,
    Linear,
    Gamma,
}

impl Default for TonemapAlgorithm {
    fn default() -> Self {
        Self::Hable
    }
}

impl FromStr for TonemapAlgorithm {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "bt2390" => Self::Bt2390,
            "reinhard" => Self::Reinhard,
            "mobius" => Self::Mobius,
            "clip" => Self::Clip,
            "linear" => Self::Linear,
            "gamma" => Self::Gamma,
            // "hable" and anything unrecognized both land on the documented default.
            _ => Self::Hable,
        })
    }
}

/// Daily window during which the worker pool is allowed to claim new jobs.
///
/// `start_hour == end_hour` means "always open" (a zero-width window is
/// meaningless, so we treat it as no restriction rather than "never open").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleWindow {
    pub enabled: bool,
    pub start_hour: u8,
    pub end_hour: u8,
}

impl Default for ScheduleWindow {
    fn default() -> Self {
        Self {
            enabled: false,
            start_hour: 0,
            end_hour: 24,
        }
    }
}

impl ScheduleWindow {
    /// `hour` is 0..24. Handles windows that wrap across midnight.
    pub fn contains_hour(&self, hour: u8) -> bool {
        if !self.enabled || self.start_hour == self.end_hour {
            return true;
        }
        if self.start_hour < self.end_hour {
            self.start_hour <= hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationCredentials {
    pub user_key: Option<String>,
    pub app_token: Option<String>,
}

impl NotificationCredentials {
    pub fn is_configured(&self) -> bool {
        self.user_key.as_deref().is_some_and(|s| !s.is_empty())
            && self.app_token.as_deref().is_some_and(|s| !s.is_empty())
    }
}

/// The full declarative document backing `updateConfig`.
///
/// Unknown fields encountered when loading an older or newer document are kept
/// in `extra` and re-emitted on save, the same schema-compatibility rule the
/// queue snapshot uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub workers: u8,
    pub original_handling: OriginalHandling,
    pub keep_larger_files: bool,
    pub quality_hevc: u8,
    pub quality_av1: u8,
    pub schedule: ScheduleWindow,
    pub output_format: OutputContainer,
    pub tonemap_hdr: bool,
    pub tonemap_algorithm: TonemapAlgorithm,
    pub notify_on_complete: bool,
    pub notification: NotificationCredentials,
    pub encoder_binary: PathBuf,
    pub probe_binary: PathBuf,
    /// VMAF score a SmartShrink preset's quality search must meet or exceed.
    /// Every other search tunable lives on this document, so this is where
    /// it lives too (see DESIGN.md).
    #[serde(default = "default_smart_shrink_vmaf_target")]
    pub smart_shrink_vmaf_target: f64,
    #[serde(default, flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_smart_shrink_vmaf_target() -> f64 {
    93.0
}

pub const MIN_WORKERS: u8 = 1;
pub const MAX_WORKERS: u8 = 6;
pub const MIN_QUALITY_HEVC: u8 = 15;
pub const MAX_QUALITY_HEVC: u8 = 40;
pub const MIN_QUALITY_AV1: u8 = 20;
pub const MAX_QUALITY_AV1: u8 = 50;
pub const MIN_VMAF_TARGET: f64 = 50.0;
pub const MAX_VMAF_TARGET: f64 = 100.0;
/// Bounds of the VideoToolbox bitrate-modifier search space consulted by a
/// SmartShrink preset bound to a bitrate-based backend.
pub const MIN_SEARCH_MODIFIER: f32 = 0.15;
pub const MAX_SEARCH_MODIFIER: f32 = 0.60;

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: 2,
            original_handling: OriginalHandling::default(),
            keep_larger_files: false,
            quality_hevc: 26,
            quality_av1: 35,
            schedule: ScheduleWindow::default(),
            output_format: OutputContainer::default(),
            tonemap_hdr: true,
            tonemap_algorithm: TonemapAlgorithm::default(),
            notify_on_complete: false,
            notification: NotificationCredentials::default(),
            encoder_binary: PathBuf::from("ffmpeg"),
            probe_binary: PathBuf::from("ffprobe"),
            smart_shrink_vmaf_target: 93.0,
            extra: serde_json::Map::new(),
        }
    }
}

impl Config {
    /// Clamps every bounded field to its documented range. Called after
    /// deserializing a document from disk or applying an `updateConfig` patch,
    /// so a config file with typos never produces an out-of-range engine state.
    pub fn coerce_bounds(&mut self) {
        self.workers = self.workers.clamp(MIN_WORKERS, MAX_WORKERS);
        self.quality_hevc = self.quality_hevc.clamp(MIN_QUALITY_HEVC, MAX_QUALITY_HEVC);
        self.quality_av1 = self.quality_av1.clamp(MIN_QUALITY_AV1, MAX_QUALITY_AV1);
        self.schedule.start_hour = self.schedule.start_hour.min(23);
        self.schedule.end_hour = self.schedule.end_hour.min(24);
        self.smart_shrink_vmaf_target = self.smart_shrink_vmaf_target.clamp(MIN_VMAF_TARGET, MAX_VMAF_TARGET);
    }
}

/// Partial patch applied via the `updateConfig` control-API call. Every field is
/// optional so a caller only needs to send what changed; `None` leaves the
/// current value untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigUpdate {
    pub workers: Option<u8>,
    pub original_handling: Option<OriginalHandling>,
    pub keep_larger_files: Option<bool>,
    pub quality_hevc: Option<u8>,
    pub quality_av1: Option<u8>,
    pub schedule_enabled: Option<bool>,
    pub schedule_start_hour: Option<u8>,
    pub schedule_end_hour: Option<u8>,
    pub output_format: Option<OutputContainer>,
    pub tonemap_hdr: Option<bool>,
    pub tonemap_algorithm: Option<String>,
    pub notify_on_complete: Option<bool>,
    pub notification: Option<NotificationCredentials>,
    pub smart_shrink_vmaf_target: Option<f64>,
}

impl Config {
    /// Applies a patch in place, then re-coerces bounds so the result is always valid.
    pub fn apply_update(&mut self, patch: ConfigUpdate) {
        if let Some(v) = patch.workers {
            self.workers = v;
        }
        if let Some(v) = patch.original_handling {
            self.original_handling = v;
        }
        if let Some(v) = patch.keep_larger_files {
            self.keep_larger_files = v;
        }
        if let Some(v) = patch.quality_hevc {
            self.quality_hevc = v;
        }
        if let Some(v) = patch.quality_av1 {
            self.quality_av1 = v;
        }
        if let Some(v) = patch.schedule_enabled {
            self.schedule.enabled = v;
        }
        if let Some(v) = patch.schedule_start_hour {
            self.schedule.start_hour = v;
        }
        if let Some(v) = patch.schedule_end_hour {
            self.schedule.end_hour = v;
        }
        if let Some(v) = patch.output_format {
            self.output_format = v;
        }
        if let Some(v) = patch.tonemap_hdr {
            self.tonemap_hdr = v;
        }
        if let Some(v) = patch.tonemap_algorithm {
            self.tonemap_algorithm = TonemapAlgorithm::from_str(&v).unwrap();
        }
        if let Some(v) = patch.notify_on_complete {
            self.notify_on_complete = v;
        }
        if let Some(v) = patch.notification {
            self.notification = v;
        }
        if let Some(v) = patch.smart_shrink_vmaf_target {
            self.smart_shrink_vmaf_target = v;
        }
        self.coerce_bounds();
    }
}
