//! Leaf crate wrapping the two external subprocess contracts the engine talks to:
//! the probe binary (`ffprobe`-shaped JSON metadata) and the encoder binary
//! (`ffmpeg`-shaped progress-on-stdout transcoding).
//!
//! Nothing in this crate knows about jobs, queues, or presets — it only knows how
//! to run a process and parse what comes back, keeping subprocess plumbing
//! separate from orchestration.

pub mod probe;
pub mod process;
pub mod transcoder;

pub use probe::{ColorTransfer, ProbeError, ProbeProvider, ProbeResult, FfprobeProvider};
pub use transcoder::{
    CancelHandle, Transcoder, TranscodeError, TranscodeOutcome, TranscodeProgress,
};
