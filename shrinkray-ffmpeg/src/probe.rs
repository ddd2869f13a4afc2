//! `ProbeResult` and the probe-provider contract every job starts from.
//!
//! The directory browser that walks a library and the probe *cache eviction
//! policy* a UI would want are out of scope; what remains in scope is the data
//! shape every other component is handed, and a minimal memoizing provider so the
//! engine has something real to call during tests and local operation.

#[cfg(test)]
mod tests;

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::process::run_with_deadline;

/// How a video signal's frame values map to light intensity.
///
/// `Pq` and `Hlg` are HDR transfer functions; everything else is treated as SDR
/// for the purposes of the HDR policy in the preset resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorTransfer {
    Sdr,
    Pq,
    Hlg,
    /// Any transfer characteristic `ffprobe` reports that we don't special-case.
    Other(String),
}

impl ColorTransfer {
    pub fn is_hdr(&self) -> bool {
        matches!(self, Self::Pq | Self::Hlg)
    }

    fn from_ffprobe(value: &str) -> Self {
        match value {
            "smpte2084" => Self::Pq,
            "arib-std-b67" => Self::Hlg,
            "" | "unknown" | "bt709" | "bt470bg" | "smpte170m" => Self::Sdr,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Immutable stream metadata for one media file, keyed by absolute path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub path: PathBuf,
    pub size: u64,
    pub duration: Duration,
    pub video_codec: String,
    pub width: u32,
    pub height: u32,
    pub bit_depth: u32,
    /// Overall bitrate in bits/second; 0 if ffprobe could not determine it.
    pub bit_rate: u64,
    pub color_transfer: ColorTransfer,
    pub profile: String,
}

impl ProbeResult {
    pub fn is_hdr(&self) -> bool {
        self.color_transfer.is_hdr()
    }

    pub fn bitrate_kbps(&self) -> u64 {
        self.bit_rate / 1000
    }
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to spawn probe process: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("probe process exited with {status}: {stderr}")]
    NonZeroExit { status: String, stderr: String },
    #[error("failed to parse probe output: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("probe output had no video stream")]
    NoVideoStream,
}

/// The contract the engine consumes; the directory-browser/cache UI owns the
/// concrete wiring in a full deployment, this is the seam it plugs into.
pub trait ProbeProvider: Send + Sync {
    fn probe(&self, path: &Path) -> Result<ProbeResult, ProbeError>;

    /// Drops any cached result for `path`. Called by the finalizer after a
    /// successful swap, since the file at that path has new stream metadata now.
    fn invalidate(&self, path: &Path);
}

/// JSON shapes emitted by `ffprobe -show_streams -show_format -of json`.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    #[serde(default)]
    format: FfprobeFormat,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeFormat {
    #[serde(default)]
    duration: Option<String>,
    #[serde(default)]
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    #[serde(default)]
    codec_name: String,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
    #[serde(default)]
    bits_per_raw_sample: Option<String>,
    #[serde(default)]
    color_transfer: Option<String>,
    #[serde(default)]
    profile: Option<String>,
}

/// `ProbeProvider` backed by spawning `ffprobe`, memoized by absolute path.
pub struct FfprobeProvider {
    binary: PathBuf,
    deadline: Duration,
    cache: DashMap<PathBuf, ProbeResult>,
}

impl FfprobeProvider {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            deadline: Duration::from_secs(30),
            cache: DashMap::new(),
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    fn run_probe(&self, path: &Path) -> Result<ProbeResult, ProbeError> {
        let size = path.metadata().map(|m| m.len()).unwrap_or(0);

        let args: Vec<&OsStr> = vec![
            "-v".as_ref(),
            "error".as_ref(),
            "-print_format".as_ref(),
            "json".as_ref(),
            "-show_format".as_ref(),
            "-show_streams".as_ref(),
            path.as_os_str(),
        ];

        let output = run_with_deadline(self.binary.as_os_str(), args, self.deadline)?;
        if !output.status.success() {
            return Err(ProbeError::NonZeroExit {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        let parsed: FfprobeOutput = serde_json::from_slice(&output.stdout)?;
        let video = parsed
            .streams
            .iter()
            .find(|s| s.codec_type == "video")
            .ok_or(ProbeError::NoVideoStream)?;

        let duration = parsed
            .format
            .duration
            .as_deref()
            .and_then(|s| s.parse::<f64>().ok())
            .map(Duration::from_secs_f64)
            .unwrap_or_default();

        let bit_rate = parsed
            .format
            .bit_rate
            .as_deref()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0);

        let bit_depth = video
            .bits_per_raw_sample
            .as_deref()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(8);

        let color_transfer = ColorTransfer::from_ffprobe(video.color_transfer.as_deref().unwrap_or(""));

        Ok(ProbeResult {
            path: path.to_path_buf(),
            size,
            duration,
            video_codec: video.codec_name.clone(),
            width: video.width,
            height: video.height,
            bit_depth,
            bit_rate,
            color_transfer,
            profile: video.profile.clone().unwrap_or_default(),
        })
    }
}

impl ProbeProvider for FfprobeProvider {
    fn probe(&self, path: &Path) -> Result<ProbeResult, ProbeError> {
        if let Some(cached) = self.cache.get(path) {
            debug!(?path, "probe cache hit");
            return Ok(cached.clone());
        }

        let result = self.run_probe(path)?;
        self.cache.insert(path.to_path_buf(), result.clone());
        Ok(result)
    }

    fn invalidate(&self, path: &Path) {
        if self.cache.remove(path).is_none() {
            warn!(?path, "invalidate called on a path with no cached probe");
        }
    }
}
