//! Ties sample extraction, trial encoding, and scoring together behind the
//! bracketed interpolated search, producing the quality setting a SmartShrink
//! job's transcode should run with.

use std::path::{Path, PathBuf};
use std::time::Duration;

use shrinkray_config::TonemapAlgorithm;
use shrinkray_encoders::{clamp_bitrate_kbps, quality_flag, registry::encoder_name, EncoderBackend, TargetCodec};
use shrinkray_ffmpeg::process::run_with_deadline_low_priority;
use thiserror::Error;
use tracing::{debug, info};

use crate::sample::{extract_all, Sample, SampleError};
use crate::scoring::{score_pair, vmaf_thread_cap, ScoreError, TonemapSpec};
use crate::search::{search, Quality, QualitySpace, SearchError, SearchResult};

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Sample(#[from] SampleError),
    #[error(transparent)]
    Score(#[from] ScoreError),
    #[error(transparent)]
    Search(#[from] SearchError),
    #[error("failed to create analysis temp directory: {0}")]
    TempDir(std::io::Error),
    #[error("trial encode failed: {0}")]
    TrialEncode(std::io::Error),
}

/// What a successful analysis hands back to the worker loop.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOutcome {
    pub quality: Quality,
    pub score: f64,
    pub trial_count: u32,
}

/// Everything the analyzer needs that isn't the source file itself.
pub struct AnalysisRequest<'a> {
    pub source: &'a Path,
    pub duration: Duration,
    pub is_hdr: bool,
    pub codec: TargetCodec,
    pub backend: EncoderBackend,
    pub space: QualitySpace,
    pub threshold: f64,
    pub ffmpeg_binary: &'a Path,
    pub tonemap_hdr: bool,
    pub tonemap_algorithm: TonemapAlgorithm,
    pub vmaf_model: Option<&'a Path>,
    /// Source bitrate, used to turn a `Quality::Modifier` trial point into a
    /// concrete target bitrate the same way a real job would.
    pub source_bitrate_kbps: u64,
}

fn trial_encode(
    ffmpeg_binary: &Path,
    sample: &Path,
    dest: &Path,
    codec: TargetCodec,
    backend: EncoderBackend,
    quality: Quality,
    source_bitrate_kbps: u64,
) -> Result<(), AnalysisError> {
    // Decoder/filter threads are capped the same way the scoring pass caps
    // libvmaf's threads, so several concurrent searches share the CPU rather
    // than each trial encode claiming every core.
    let threads = vmaf_thread_cap();
    let mut args: Vec<std::ffi::OsString> = vec![
        "-y".into(),
        "-loglevel".into(),
        "error".into(),
        "-threads".into(),
        threads.to_string().into(),
        "-i".into(),
        sample.into(),
        "-c:v".into(),
        encoder_name(codec, backend).into(),
        "-threads".into(),
        threads.to_string().into(),
    ];

    match quality {
        Quality::Crf(crf) => {
            args.push(quality_flag(backend).into());
            args.push(crf.to_string().into());
        }
        Quality::Modifier(modifier) => {
            // Bitrate-based backends are clamped the same way a real job's
            // resolved args would be; the search only ever runs this path for
            // VideoToolbox-backed presets.
            let target_kbps = clamp_bitrate_kbps(source_bitrate_kbps, modifier);
            args.push("-b:v".into());
            args.push(format!("{target_kbps}k").into());
        }
    }
    args.push("-an".into());
    args.push(dest.into());

    // Trial encodes run at reduced OS scheduling priority: they're throwaway
    // work competing with a real job's transcode on the same box.
    let output = run_with_deadline_low_priority(ffmpeg_binary.as_os_str(), args, Duration::from_secs(120))
        .map_err(AnalysisError::TrialEncode)?;
    if !output.status.success() {
        return Err(AnalysisError::TrialEncode(std::io::Error::new(
            std::io::ErrorKind::Other,
            String::from_utf8_lossy(&output.stderr).into_owned(),
        )));
    }
    Ok(())
}

/// Runs one trial: encode every sample at `quality`, score each against its
/// reference, and aggregate. Returns the aggregated score.
fn run_trial(
    request: &AnalysisRequest<'_>,
    samples: &[Sample],
    work_dir: &Path,
    trial_index: u32,
    quality: Quality,
) -> Result<f64, AnalysisError> {
    let tonemap = (request.is_hdr && request.tonemap_hdr).then_some(TonemapSpec {
        algorithm: request.tonemap_algorithm,
    });

    let mut scores = Vec::with_capacity(samples.len());
    for (i, sample) in samples.iter().enumerate() {
        let encoded = work_dir.join(format!("trial_{trial_index}_sample_{i}.mkv"));
        trial_encode(
            request.ffmpeg_binary,
            &sample.path,
            &encoded,
            request.codec,
            request.backend,
            quality,
            request.source_bitrate_kbps,
        )?;

        let log_path = work_dir.join(format!("trial_{trial_index}_sample_{i}.vmaf.json"));
        let score = score_pair(
            request.ffmpeg_binary,
            &encoded,
            &sample.path,
            &log_path,
            request.vmaf_model,
            tonemap,
        )?;
        scores.push(score);
        let _ = std::fs::remove_file(&encoded);
        let _ = std::fs::remove_file(&log_path);
    }

    let aggregated = crate::statistics::aggregate(&scores);
    debug!(trial_index, ?quality, aggregated, "vmaf trial scored");
    Ok(aggregated)
}

/// Runs the full analysis: extracts samples into a scratch directory (cleaned
/// up on every exit path, success or failure) and drives the search.
pub fn analyze(request: AnalysisRequest) -> Result<Option<AnalysisOutcome>, AnalysisError> {
    let work_dir = tempfile::tempdir().map_err(AnalysisError::TempDir)?;

    let samples = extract_all(request.ffmpeg_binary, request.source, request.duration, work_dir.path())?;

    let mut trial_index = 0u32;
    let result = search(request.space, request.threshold, |quality| {
        trial_index += 1;
        run_trial(&request, &samples, work_dir.path(), trial_index, quality)
            .map_err(|e| SearchError::Trial(e.to_string()))
    })?;

    match result {
        SearchResult::Impossible => {
            info!(path = ?request.source, "vmaf search found no quality meeting the threshold");
            Ok(None)
        }
        SearchResult::Found(outcome) => Ok(Some(AnalysisOutcome {
            quality: outcome.quality,
            score: outcome.score,
            trial_count: outcome.trial_count,
        })),
    }
}
