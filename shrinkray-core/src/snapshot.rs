//! Crash-safe persistence of the queue's job list. Every mutation rewrites
//! the whole file; the write is always temp-file-then-rename so a reader
//! never observes a torn write, the same discipline the finalizer uses for
//! swapping media files.

#[cfg(test)]
mod tests;

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::{Job, JobStatus};

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to read snapshot at {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse snapshot at {path}: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },
    #[error("failed to write snapshot temp file: {0}")]
    Write(#[from] io::Error),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SnapshotFile {
    jobs: Vec<Job>,
    #[serde(default, flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

/// Loads the job list from `path`. A missing file is treated as an empty
/// queue (first run), not an error.
///
/// Per the crash-recovery rule, any job still `Running` is demoted to
/// `Pending`: finding one at startup is evidence the previous process died
/// mid-encode, not that the job itself failed.
pub fn load(path: &Path) -> Result<Vec<Job>, SnapshotError> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let text = std::fs::read_to_string(path).map_err(|source| SnapshotError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut file: SnapshotFile = serde_json::from_str(&text).map_err(|source| SnapshotError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    for job in &mut file.jobs {
        if job.status == JobStatus::Running {
            tracing::warn!(id = %job.id, "found running job at startup, demoting to pending");
            job.status = JobStatus::Pending;
        }
    }

    Ok(file.jobs)
}

/// Atomically rewrites `path` with the full job list: write to a sibling
/// temp file, then rename over the target. Rename is atomic on the same
/// filesystem, which a sibling temp file in the same directory guarantees.
pub fn save(path: &Path, jobs: &[Job]) -> Result<(), SnapshotError> {
    let file = SnapshotFile {
        jobs: jobs.to_vec(),
        extra: serde_json::Map::new(),
    };
    let text = serde_json::to_string_pretty(&file).expect("job snapshot is always serializable");

    let tmp_path = tmp_path_for(path);
    std::fs::write(&tmp_path, text)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "queue.json".into());
    name.push(".tmp");
    path.with_file_name(name)
}
