//! Reference sample extraction: short stream-copied clips pulled from fixed
//! positions of the source, used as the VMAF search's scoring references.


use std::path::{Path, PathBuf};
use std::time::Duration;

use shrinkray_ffmpeg::process::run_with_deadline;
use thiserror::Error;

/// How long each extracted sample clip runs.
pub const SAMPLE_CLIP_DURATION: Duration = Duration::from_secs(10);
const EXTRACTION_DEADLINE: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum SampleError {
    #[error("failed to spawn sample extraction: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("sample extraction exited with {status}: {stderr}")]
    NonZeroExit { status: String, stderr: String },
}

/// The fractional positions (of total duration) samples are pulled from.
/// Short sources get a single sample at the midpoint; longer ones get three,
/// so a single unrepresentative scene doesn't drive the whole search.
pub fn sample_positions(duration: Duration) -> &'static [f64] {
    if duration < Duration::from_secs(60) {
        &[0.50]
    } else {
        &[0.25, 0.50, 0.75]
    }
}

/// A short extracted clip, tied to the lifetime of one analysis. Callers
/// delete the owning directory when the analysis finishes, successfully or not.
#[derive(Debug, Clone)]
pub struct Sample {
    pub path: PathBuf,
}

/// Extracts one sample clip by stream copy at `position` (a fraction in
/// `[0, 1]` of `duration`), writing it to `dest`.
pub fn extract_sample(
    ffmpeg_binary: &Path,
    source: &Path,
    duration: Duration,
    position: f64,
    dest: &Path,
) -> Result<Sample, SampleError> {
    let offset = duration.mul_f64(position.clamp(0.0, 1.0));
    let args: Vec<std::ffi::OsString> = vec![
        "-y".into(),
        "-ss".into(),
        format!("{:.3}", offset.as_secs_f64()).into(),
        "-i".into(),
        source.into(),
        "-t".into(),
        format!("{:.3}", SAMPLE_CLIP_DURATION.as_secs_f64()).into(),
        "-c".into(),
        "copy".into(),
        dest.into(),
    ];

    let output = run_with_deadline(ffmpeg_binary.as_os_str(), args, EXTRACTION_DEADLINE)?;
    if !output.status.success() {
        return Err(SampleError::NonZeroExit {
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    Ok(Sample { path: dest.to_path_buf() })
}

/// Extracts every sample position for `source` into `dir`, which the caller
/// owns and is responsible for cleaning up (a `tempfile::TempDir` in practice).
pub fn extract_all(
    ffmpeg_binary: &Path,
    source: &Path,
    duration: Duration,
    dir: &Path,
) -> Result<Vec<Sample>, SampleError> {
    sample_positions(duration)
        .iter()
        .enumerate()
        .map(|(i, position)| {
            let dest = dir.join(format!("sample_{i}.mkv"));
            extract_sample(ffmpeg_binary, source, duration, *position, &dest)
        })
        .collect()
}
