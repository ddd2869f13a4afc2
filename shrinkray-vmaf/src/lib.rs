//! VMAF-guided quality search for SmartShrink presets: sample extraction,
//! trial encoding, libvmaf scoring, and the bracketed interpolated search that
//! ties them together.

pub mod analyzer;
pub mod sample;
pub mod scoring;
pub mod search;
pub mod statistics;

pub use analyzer::{analyze, AnalysisError, AnalysisOutcome, AnalysisRequest};
pub use search::{Quality, QualitySpace, SearchError, SearchResult};
