//! Process-wide table of detected encoder backends, populated once at startup.
//!
//! An explicit, owned registry object rather than a true global mutable
//! singleton: probe the binary once, cache the answer, but hand the result to
//! the engine root to hold and pass down rather than reach for through a
//! static.

#[cfg(test)]
mod tests;

use std::collections::HashSet;
use std::path::Path;

use crate::backend::{EncoderBackend, TargetCodec};
use crate::process::run_ffmpeg_encoders;

/// The backend priority order consulted when more than one hardware backend is
/// present on a machine (uncommon, but VAAPI/QSV coexist on some Intel+other
/// setups). Software is always last resort, never first.
const PRIORITY: [EncoderBackend; 4] = [
    EncoderBackend::VideoToolbox,
    EncoderBackend::Nvenc,
    EncoderBackend::Qsv,
    EncoderBackend::Vaapi,
];

/// CRF/CQ/QP default, or a bitrate modifier for backends with no CRF knob.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QualityDefault {
    Crf(u8),
    Modifier(f32),
}

fn default_quality(codec: TargetCodec, backend: EncoderBackend) -> QualityDefault {
    use EncoderBackend::*;
    use TargetCodec::*;
    match (codec, backend) {
        (Hevc, Software) => QualityDefault::Crf(26),
        (Av1, Software) => QualityDefault::Crf(35),
        (Hevc, Nvenc) => QualityDefault::Crf(28),
        (Av1, Nvenc) => QualityDefault::Crf(32),
        (Hevc, Qsv) => QualityDefault::Crf(27),
        (Av1, Qsv) => QualityDefault::Crf(32),
        (Hevc, Vaapi) => QualityDefault::Crf(27),
        (Av1, Vaapi) => QualityDefault::Crf(32),
        (Hevc, VideoToolbox) => QualityDefault::Modifier(0.35),
        (Av1, VideoToolbox) => QualityDefault::Modifier(0.25),
    }
}

/// The ffmpeg `-c:v` value for a given (codec, backend) pair.
pub fn encoder_name(codec: TargetCodec, backend: EncoderBackend) -> &'static str {
    use EncoderBackend::*;
    use TargetCodec::*;
    match (codec, backend) {
        (Hevc, Software) => "libx265",
        (Av1, Software) => "libsvtav1",
        (Hevc, Nvenc) => "hevc_nvenc",
        (Av1, Nvenc) => "av1_nvenc",
        (Hevc, Qsv) => "hevc_qsv",
        (Av1, Qsv) => "av1_qsv",
        (Hevc, Vaapi) => "hevc_vaapi",
        (Av1, Vaapi) => "av1_vaapi",
        (Hevc, VideoToolbox) => "hevc_videotoolbox",
        (Av1, VideoToolbox) => "av1_videotoolbox",
    }
}

/// Which `-c:v` strings in `ffmpeg -encoders` output imply a backend is usable.
fn probe_names(backend: EncoderBackend) -> [&'static str; 2] {
    match backend {
        EncoderBackend::Software => ["libx265", "libsvtav1"],
        EncoderBackend::VideoToolbox => ["hevc_videotoolbox", "av1_videotoolbox"],
        EncoderBackend::Nvenc => ["hevc_nvenc", "av1_nvenc"],
        EncoderBackend::Qsv => ["hevc_qsv", "av1_qsv"],
        EncoderBackend::Vaapi => ["hevc_vaapi", "av1_vaapi"],
    }
}

/// Parses the subset of `ffmpeg -hide_banner -encoders` output this registry
/// cares about: which hardware backends are actually compiled in and usable.
pub fn detect_from_encoders_listing(listing: &str) -> HashSet<EncoderBackend> {
    let mut found = HashSet::new();
    found.insert(EncoderBackend::Software);
    for backend in [
        EncoderBackend::VideoToolbox,
        EncoderBackend::Nvenc,
        EncoderBackend::Qsv,
        EncoderBackend::Vaapi,
    ] {
        if probe_names(backend).iter().any(|name| listing.contains(name)) {
            found.insert(backend);
        }
    }
    found
}

/// Process-wide view of which backends this machine's encoder binary supports.
#[derive(Debug, Clone)]
pub struct EncoderRegistry {
    available: HashSet<EncoderBackend>,
}

impl EncoderRegistry {
    /// Builds a registry with only the software backend available. Used by
    /// tests and as a safe fallback when detection itself fails.
    pub fn software_only() -> Self {
        Self {
            available: HashSet::from([EncoderBackend::Software]),
        }
    }

    pub fn from_available(available: HashSet<EncoderBackend>) -> Self {
        let mut available = available;
        available.insert(EncoderBackend::Software);
        Self { available }
    }

    /// Runs `binary -hide_banner -encoders` once and parses the result.
    pub fn detect(binary: &Path) -> std::io::Result<Self> {
        let listing = run_ffmpeg_encoders(binary)?;
        Ok(Self::from_available(detect_from_encoders_listing(&listing)))
    }

    pub fn is_available(&self, backend: EncoderBackend) -> bool {
        self.available.contains(&backend)
    }

    /// The single preferred backend for `codec`; exactly one is chosen per
    /// codec at detection time.
    pub fn preferred_backend(&self, codec: TargetCodec) -> EncoderBackend {
        let _ = codec; // same priority order regardless of target codec today
        PRIORITY
            .into_iter()
            .find(|b| self.available.contains(b))
            .unwrap_or(EncoderBackend::Software)
    }

    pub fn default_quality(&self, codec: TargetCodec, backend: EncoderBackend) -> QualityDefault {
        default_quality(codec, backend)
    }
}
