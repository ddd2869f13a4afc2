//! The preset catalogue: static templates, plus the two records derived per
//! codec once the encoder registry has run detection.

#[cfg(test)]
mod tests;

use crate::backend::{EncoderBackend, TargetCodec};
use crate::registry::{EncoderRegistry, QualityDefault};

/// A row of the static catalogue, independent of which backend this machine
/// actually has for its codec.
#[derive(Debug, Clone, Copy)]
pub struct PresetTemplate {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub codec: TargetCodec,
    pub max_height: u32,
    pub is_smart_shrink: bool,
    /// Consulted by the worker loop before VMAF analysis runs; see the
    /// "skip if already in target codec" open question.
    pub skip_if_target_codec: bool,
}

const CATALOGUE: &[PresetTemplate] = &[
    PresetTemplate {
        id: "compress-hevc",
        name: "Compress (HEVC)",
        description: "Re-encode to HEVC at a fixed quality using the detected backend.",
        codec: TargetCodec::Hevc,
        max_height: 0,
        is_smart_shrink: false,
        skip_if_target_codec: true,
    },
    PresetTemplate {
        id: "compress-av1",
        name: "Compress (AV1)",
        description: "Re-encode to AV1 at a fixed quality using the detected backend.",
        codec: TargetCodec::Av1,
        max_height: 0,
        is_smart_shrink: false,
        skip_if_target_codec: true,
    },
    PresetTemplate {
        id: "smartshrink-hevc",
        name: "SmartShrink (HEVC)",
        description: "Re-encode to HEVC, choosing the most-compressed quality that meets a VMAF target.",
        codec: TargetCodec::Hevc,
        max_height: 0,
        is_smart_shrink: true,
        skip_if_target_codec: true,
    },
    PresetTemplate {
        id: "smartshrink-av1",
        name: "SmartShrink (AV1)",
        description: "Re-encode to AV1, choosing the most-compressed quality that meets a VMAF target.",
        codec: TargetCodec::Av1,
        max_height: 0,
        is_smart_shrink: true,
        skip_if_target_codec: true,
    },
    PresetTemplate {
        id: "mobile-hevc",
        name: "Mobile (HEVC, 1080p cap)",
        description: "Re-encode to HEVC, downscaling sources taller than 1080p.",
        codec: TargetCodec::Hevc,
        max_height: 1080,
        is_smart_shrink: false,
        skip_if_target_codec: false,
    },
];

/// A preset bound to the backend the registry actually detected for its codec;
/// the "two derived records" the data model refers to, generalized to one per
/// catalogue entry rather than exactly two.
#[derive(Debug, Clone, Copy)]
pub struct Preset {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub codec: TargetCodec,
    pub backend: EncoderBackend,
    pub max_height: u32,
    pub is_smart_shrink: bool,
    pub skip_if_target_codec: bool,
    pub default_quality: QualityDefault,
}

impl Preset {
    fn bind(template: &PresetTemplate, registry: &EncoderRegistry) -> Self {
        let backend = registry.preferred_backend(template.codec);
        Self {
            id: template.id,
            name: template.name,
            description: template.description,
            codec: template.codec,
            backend,
            max_height: template.max_height,
            is_smart_shrink: template.is_smart_shrink,
            skip_if_target_codec: template.skip_if_target_codec,
            default_quality: registry.default_quality(template.codec, backend),
        }
    }

    /// Rebinds this preset to run in software, used when the source's stream
    /// profile is unsafe to hardware-decode on the detected backend.
    pub fn rebind_to_software(&self, registry: &EncoderRegistry) -> Self {
        Self {
            backend: EncoderBackend::Software,
            default_quality: registry.default_quality(self.codec, EncoderBackend::Software),
            ..*self
        }
    }
}

/// The full catalogue, bound to `registry`'s detected backends.
pub fn catalogue(registry: &EncoderRegistry) -> Vec<Preset> {
    CATALOGUE.iter().map(|t| Preset::bind(t, registry)).collect()
}

/// Looks up one preset by id, bound to `registry`.
pub fn find(id: &str, registry: &EncoderRegistry) -> Option<Preset> {
    CATALOGUE
        .iter()
        .find(|t| t.id == id)
        .map(|t| Preset::bind(t, registry))
}
