//! The job record and the monotonically increasing id scheme the queue and
//! the "at-most-one-runner" property depend on.

#[cfg(test)]
mod tests;

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

/// A time-sortable id: millisecond timestamp in the high bits, a per-process
/// sequence counter in the low bits so two jobs submitted in the same
/// millisecond still order strictly by creation. Formatted as zero-padded hex
/// so lexicographic and numeric order agree, the way the queue snapshot's
/// on-disk representation wants to sort with a plain string comparison.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

static SEQUENCE: AtomicU32 = AtomicU32::new(0);

impl JobId {
    /// Generates a new id guaranteed to sort after every id generated earlier
    /// by this process.
    pub fn new() -> Self {
        let millis = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        let seq = SEQUENCE.fetch_add(1, Ordering::SeqCst);
        Self(format!("{millis:016x}-{seq:08x}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lets a caller outside the queue (a CLI argument, a transport layer's path
/// parameter) address a job by the same id string it was handed back in a
/// `Job` record, without going through [`JobId::new`].
impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Status-transition closure: one-way, terminal states never transition out.
/// `Running -> Pending` is the one exception, used only by the pool's
/// pause/resize machinery to requeue a job whose worker was reclaimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Complete,
    Failed,
    Cancelled,
    Skipped,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Cancelled | Self::Skipped)
    }
}

/// Live transcode progress, updated in place while a job is `running`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobProgress {
    pub percent: f64,
    pub speed: f64,
    pub eta: Option<Duration>,
    pub current_output_size: u64,
}

/// Sizes and wall time once a job reaches a terminal state with output to report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub input_size: u64,
    pub output_size: u64,
    pub wall_time: Option<Duration>,
}

/// Facts about the source and the resolved encode, fixed once the job starts
/// running and kept for the lifetime of the record (used by the UI and by
/// `retry`, which re-probes rather than trusting these).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobOrigin {
    pub source_codec: String,
    pub source_bitrate_kbps: u64,
    pub source_width: u32,
    pub source_height: u32,
    pub encoder_backend: Option<String>,
    pub is_hardware: bool,
    pub final_quality: Option<FinalQuality>,
    pub vmaf_score: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FinalQuality {
    Crf(u8),
    BitrateKbps(u32),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobTimestamps {
    pub created: Option<SystemTime>,
    pub started: Option<SystemTime>,
    pub completed: Option<SystemTime>,
}

/// One file's journey through the pipeline: probe → encode → finalize →
/// validate. Mutated only by the queue (never directly by a worker), so every
/// mutation can be persisted and fanned out to subscribers in one place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub preset_id: String,
    pub status: JobStatus,
    pub progress: JobProgress,
    pub result: JobResult,
    pub origin: JobOrigin,
    pub error: Option<String>,
    pub timestamps: JobTimestamps,
    /// Unknown fields round-trip untouched across snapshot schema changes,
    /// the same compatibility rule the config document uses.
    #[serde(default, flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Job {
    pub fn new(input_path: PathBuf, output_path: PathBuf, preset_id: impl Into<String>) -> Self {
        Self {
            id: JobId::new(),
            input_path,
            output_path,
            preset_id: preset_id.into(),
            status: JobStatus::Pending,
            progress: JobProgress::default(),
            result: JobResult::default(),
            origin: JobOrigin::default(),
            error: None,
            timestamps: JobTimestamps {
                created: Some(SystemTime::now()),
                ..Default::default()
            },
            extra: serde_json::Map::new(),
        }
    }
}
