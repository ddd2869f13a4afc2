//! Encoder backend catalogue, capability detection, and the preset resolver.
//!
//! Nothing here runs a transcode; this crate only decides *what arguments* a
//! transcode should run with, keeping argument composition separate from
//! subprocess plumbing.

pub mod backend;
pub mod preset;
pub mod process;
pub mod registry;
pub mod resolver;
mod util;

pub use backend::{EncoderBackend, TargetCodec};
pub use preset::{catalogue, find, Preset, PresetTemplate};
pub use registry::{EncoderRegistry, QualityDefault};
pub use resolver::{
    clamp_bitrate_kbps, quality_flag, requires_software_decode, resolve, FinalQuality, HdrPolicy,
    QualityOverrides, ResolvedArgs, MAX_BITRATE_KBPS, MIN_BITRATE_KBPS,
};
