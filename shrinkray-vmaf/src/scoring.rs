//! Invokes `ffmpeg`'s `libvmaf` filter to score one (distorted, reference)
//! sample pair, with symmetric HDR tonemapping on both legs when applicable.


use std::path::Path;
use std::thread::available_parallelism;
use std::time::Duration;

use serde::Deserialize;
use shrinkray_config::TonemapAlgorithm;
use shrinkray_ffmpeg::process::run_with_deadline;
use thiserror::Error;

const SCORE_DEADLINE: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("failed to spawn libvmaf: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("libvmaf exited with {status}: {stderr}")]
    NonZeroExit { status: String, stderr: String },
    #[error("failed to read libvmaf log at {path}: {source}")]
    ReadLog {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse libvmaf log: {0}")]
    ParseLog(#[from] serde_json::Error),
}

/// Decoder/filter thread cap applied to every libvmaf invocation, so several
/// concurrent searches share the CPU instead of each claiming every core.
pub fn vmaf_thread_cap() -> usize {
    let cores = available_parallelism().map(|n| n.get()).unwrap_or(1);
    cores.div_ceil(2).max(1)
}

/// When set, both legs of the scoring graph apply the identical tonemap
/// sequence before libvmaf, since libvmaf itself is only validated on SDR
/// content.
#[derive(Debug, Clone, Copy)]
pub struct TonemapSpec {
    pub algorithm: TonemapAlgorithm,
}

fn tonemap_chain(spec: TonemapSpec) -> String {
    format!(
        "zscale=t=linear:npl=100,format=gbrpf32le,zscale=p=bt709,tonemap={}:desat=0,zscale=t=bt709:m=bt709:r=tv,format=yuv420p,",
        spec.algorithm
    )
}

#[derive(Debug, Deserialize)]
struct VmafLog {
    pooled_metrics: PooledMetrics,
}

#[derive(Debug, Deserialize)]
struct PooledMetrics {
    vmaf: PooledVmaf,
}

#[derive(Debug, Deserialize)]
struct PooledVmaf {
    mean: f64,
}

/// Scores `distorted` against `reference`, returning the pooled mean VMAF
/// score across every frame. When `tonemap` is set, the identical tonemap
/// chain runs on both legs before the comparison.
pub fn score_pair(
    ffmpeg_binary: &Path,
    distorted: &Path,
    reference: &Path,
    log_path: &Path,
    model: Option<&Path>,
    tonemap: Option<TonemapSpec>,
) -> Result<f64, ScoreError> {
    let threads = vmaf_thread_cap();
    let chain = tonemap.map(tonemap_chain).unwrap_or_default();

    let model_clause = model
        .map(|p| format!(":model_path={}", p.display()))
        .unwrap_or_default();

    let filter = format!(
        "[0:v]{chain}setpts=PTS-STARTPTS[distorted];[1:v]{chain}setpts=PTS-STARTPTS[ref];\
         [distorted][ref]libvmaf=log_fmt=json:log_path={}:n_threads={threads}{model_clause}",
        log_path.display(),
    );

    let args: Vec<std::ffi::OsString> = vec![
        "-nostdin".into(),
        "-loglevel".into(),
        "error".into(),
        "-i".into(),
        distorted.into(),
        "-i".into(),
        reference.into(),
        "-filter_complex".into(),
        filter.into(),
        "-f".into(),
        "null".into(),
        "-".into(),
    ];

    let output = run_with_deadline(ffmpeg_binary.as_os_str(), args, SCORE_DEADLINE)?;
    if !output.status.success() {
        return Err(ScoreError::NonZeroExit {
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    let text = std::fs::read_to_string(log_path)
        .map_err(|source| ScoreError::ReadLog { path: log_path.to_path_buf(), source })?;
    let parsed: VmafLog = serde_json::from_str(&text)?;
    Ok(parsed.pooled_metrics.vmaf.mean)
}
