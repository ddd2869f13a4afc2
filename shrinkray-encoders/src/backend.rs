//! The set of encoder backends the resolver knows how to target.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EncoderBackend {
    Software,
    VideoToolbox,
    Nvenc,
    Qsv,
    Vaapi,
}

impl EncoderBackend {
    /// VideoToolbox has no CRF knob; everything else takes a CRF/CQ/QP scalar.
    pub fn is_bitrate_based(self) -> bool {
        matches!(self, Self::VideoToolbox)
    }

    pub fn is_hardware(self) -> bool {
        !matches!(self, Self::Software)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum TargetCodec {
    Hevc,
    Av1,
}
