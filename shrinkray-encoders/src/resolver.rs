//! Maps a preset, a probed source, and a set of overrides to the two argument
//! vectors the transcoder hands to the encoder subprocess.


use shrinkray_config::{OutputContainer, TonemapAlgorithm};
use shrinkray_ffmpeg::ProbeResult;

use crate::backend::EncoderBackend;
use crate::preset::Preset;
use crate::registry::{encoder_name, QualityDefault};
use crate::util::into_vec;

pub const MIN_BITRATE_KBPS: u32 = 500;
pub const MAX_BITRATE_KBPS: u32 = 15_000;
const REFERENCE_BITRATE_KBPS: u32 = 10_000;

/// Per-codec CRF override, consulted ahead of the preset's registry default.
#[derive(Debug, Clone, Copy, Default)]
pub struct QualityOverrides {
    pub hevc_crf: Option<u8>,
    pub av1_crf: Option<u8>,
    /// Overrides the bitrate-backend modifier regardless of codec.
    pub modifier: Option<f32>,
}

#[derive(Debug, Clone, Copy)]
pub struct HdrPolicy {
    pub tonemap: bool,
    pub algorithm: TonemapAlgorithm,
}

/// The final, caller-ready argument vectors plus the facts the job's Origin
/// record wants to keep (final quality, whether SW decode was forced).
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedArgs {
    pub pre_input: Vec<String>,
    pub post_input: Vec<String>,
    pub used_software_decode: bool,
    pub final_quality: FinalQuality,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FinalQuality {
    Crf(u8),
    BitrateKbps(u32),
}

/// Resolves whether hardware decode is unsafe for `probe` on `backend`, per
/// the documented software-decode matrix.
pub fn requires_software_decode(probe: &ProbeResult, backend: EncoderBackend) -> bool {
    if backend == EncoderBackend::Software {
        return false;
    }

    let codec = probe.video_codec.to_ascii_lowercase();
    let profile = probe.profile.to_ascii_lowercase();

    match codec.as_str() {
        "h264" if profile.contains("high 10") || profile.contains("high10") => {
            backend != EncoderBackend::Nvenc
        }
        "vc1" | "wmv3" => true,
        "mpeg4" if profile.contains("advanced simple") => backend == EncoderBackend::Qsv,
        _ => false,
    }
}

fn tonemap_filter(algorithm: TonemapAlgorithm) -> String {
    format!(
        "zscale=t=linear:npl=100,format=gbrpf32le,zscale=p=bt709,tonemap={}:desat=0,zscale=t=bt709:m=bt709:r=tv,format=yuv420p",
        algorithm
    )
}

fn hdr_metadata_args() -> Vec<String> {
    into_vec![
        "-color_primaries",
        "bt2020",
        "-color_trc",
        "smpte2084",
        "-colorspace",
        "bt2020nc",
    ]
}

fn scale_filter(probe: &ProbeResult, max_height: u32) -> Option<String> {
    if max_height > 0 && probe.height > max_height {
        Some(format!("scale=-2:{max_height}"))
    } else {
        None
    }
}

/// The ffmpeg quality flag for a CRF/CQ/QP-style backend. VideoToolbox has no
/// entry here since it is bitrate-based; callers that need a trial encode at a
/// specific backend should check [`EncoderBackend::is_bitrate_based`] first.
pub fn quality_flag(backend: EncoderBackend) -> &'static str {
    match backend {
        EncoderBackend::Software => "-crf",
        EncoderBackend::Nvenc => "-cq",
        EncoderBackend::Qsv => "-global_quality",
        EncoderBackend::Vaapi => "-qp",
        EncoderBackend::VideoToolbox => "-crf",
    }
}

/// Scales `source_kbps` by `modifier` and clamps the result into the
/// supported bitrate range; a source with unknown bitrate falls back to a
/// reference value so a zero input doesn't zero out every target.
pub fn clamp_bitrate_kbps(source_kbps: u64, modifier: f32) -> u32 {
    let source_kbps = if source_kbps == 0 {
        REFERENCE_BITRATE_KBPS as u64
    } else {
        source_kbps
    };
    let target = (source_kbps as f64 * modifier as f64).round() as u32;
    target.clamp(MIN_BITRATE_KBPS, MAX_BITRATE_KBPS)
}

/// Pure function: identical inputs always yield identical argument vectors.
pub fn resolve(
    preset: &Preset,
    probe: &ProbeResult,
    overrides: &QualityOverrides,
    hdr: &HdrPolicy,
    container: OutputContainer,
    force_software_decode: bool,
) -> ResolvedArgs {
    let backend = preset.backend;
    let sw_decode = force_software_decode || requires_software_decode(probe, backend);
    let effective_backend = if sw_decode { EncoderBackend::Software } else { backend };
    let is_hdr = probe.is_hdr();
    let apply_tonemap = is_hdr && hdr.tonemap;
    let preserve_hdr = is_hdr && !hdr.tonemap;

    let mut pre_input = Vec::new();
    let mut post_input = Vec::new();

    // Hardware accel hints for decode. Stripped when software decode is forced
    // or the tonemap pipeline runs (tonemapping is always software), but the
    // device init for *encode* is kept separately below.
    if backend.is_hardware() && !sw_decode && !apply_tonemap {
        match backend {
            EncoderBackend::Nvenc => {
                pre_input.extend(into_vec!["-hwaccel", "cuda", "-hwaccel_output_format", "cuda"]);
            }
            EncoderBackend::Qsv => {
                pre_input.extend(into_vec!["-hwaccel", "qsv", "-hwaccel_output_format", "qsv"]);
            }
            EncoderBackend::Vaapi => {
                pre_input.extend(into_vec![
                    "-vaapi_device",
                    "/dev/dri/renderD128",
                    "-hwaccel",
                    "vaapi",
                    "-hwaccel_output_format",
                    "vaapi"
                ]);
            }
            EncoderBackend::VideoToolbox => {
                pre_input.extend(into_vec!["-hwaccel", "videotoolbox"]);
            }
            EncoderBackend::Software => {}
        }
    } else if backend == EncoderBackend::Vaapi {
        // VAAPI always needs its device initialized even when decode itself
        // runs in software, since the chosen encoder still needs the device.
        pre_input.extend(into_vec!["-vaapi_device", "/dev/dri/renderD128"]);
    }

    // Build the filter chain.
    let mut filters: Vec<String> = Vec::new();
    if apply_tonemap {
        filters.push(tonemap_filter(hdr.algorithm));
    } else if preserve_hdr {
        filters.push("format=p010le".to_string());
    }
    if let Some(scale) = scale_filter(probe, preset.max_height) {
        filters.push(scale);
    }
    if backend.is_hardware() && (sw_decode || apply_tonemap) {
        match backend {
            EncoderBackend::Nvenc => filters.push("hwupload_cuda".to_string()),
            EncoderBackend::Qsv => filters.push("hwupload=derive_device=qsv".to_string()),
            EncoderBackend::Vaapi => filters.push("hwupload".to_string()),
            EncoderBackend::VideoToolbox | EncoderBackend::Software => {}
        }
    }
    if !filters.is_empty() {
        post_input.push("-vf".to_string());
        post_input.push(filters.join(","));
    }

    // Codec selection.
    post_input.push("-c:v".to_string());
    post_input.push(encoder_name(preset.codec, effective_backend).to_string());

    if preserve_hdr && matches!(preset.codec, crate::backend::TargetCodec::Hevc) {
        post_input.extend(into_vec!["-profile:v", "main10"]);
    }
    if preserve_hdr {
        post_input.extend(hdr_metadata_args());
    }

    // Quality.
    let quality_default = if sw_decode {
        QualityDefault::Crf(match preset.codec {
            crate::backend::TargetCodec::Hevc => 26,
            crate::backend::TargetCodec::Av1 => 35,
        })
    } else {
        preset.default_quality
    };

    let final_quality = match quality_default {
        QualityDefault::Crf(default_crf) => {
            let crf = match preset.codec {
                crate::backend::TargetCodec::Hevc => overrides.hevc_crf.unwrap_or(default_crf),
                crate::backend::TargetCodec::Av1 => overrides.av1_crf.unwrap_or(default_crf),
            };
            post_input.push(quality_flag(effective_backend).to_string());
            post_input.push(crf.to_string());
            FinalQuality::Crf(crf)
        }
        QualityDefault::Modifier(default_modifier) => {
            let modifier = overrides.modifier.unwrap_or(default_modifier);
            let target_kbps = clamp_bitrate_kbps(probe.bitrate_kbps(), modifier);
            post_input.push("-b:v".to_string());
            post_input.push(format!("{target_kbps}k"));
            FinalQuality::BitrateKbps(target_kbps)
        }
    };

    // Container-specific stream mapping.
    match container {
        OutputContainer::Mkv => {
            post_input.extend(into_vec!["-map", "0", "-c:a", "copy", "-c:s", "copy"]);
        }
        OutputContainer::Mp4 => {
            post_input.extend(into_vec!["-map", "0:v:0", "-map", "0:a?", "-c:a", "aac"]);
            tracing::info!(path = ?probe.path, "dropping subtitle tracks for mp4 output");
        }
    }

    ResolvedArgs {
        pre_input,
        post_input,
        used_software_decode: sw_decode,
        final_quality,
    }
}
