//! Atomically installs a successful transcode's output at the source path.
//! Always copy-then-delete, never rename, since the temp output and the
//! final destination can live on different filesystems.


use std::path::{Path, PathBuf};
use std::time::SystemTime;

use filetime::FileTime;
use shrinkray_config::OriginalHandling;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FinalizeError {
    #[error("failed to remove original at {path}: {source}")]
    RemoveOriginal { path: PathBuf, source: std::io::Error },
    #[error("failed to rename original to .old at {path}: {source}")]
    RenameToOld { path: PathBuf, source: std::io::Error },
    #[error("failed to copy temp output to {path}: {source}")]
    Copy { path: PathBuf, source: std::io::Error },
    #[error("failed to remove temp output at {path}: {source}")]
    RemoveTemp { path: PathBuf, source: std::io::Error },
    #[error("failed to read source metadata at {path}: {source}")]
    Metadata { path: PathBuf, source: std::io::Error },
    #[error("no savings: output is larger than the input and keep_larger_files is disabled")]
    NoSavings,
}

/// Where the final file lands: same directory as the source, same basename,
/// extension driven by the configured output container.
pub fn final_path(input: &Path, container_extension: &str) -> PathBuf {
    let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("output");
    input.with_file_name(format!("{stem}.{container_extension}"))
}

fn copy_preserving_mtime(temp: &Path, dest: &Path, mtime: FileTime) -> Result<(), FinalizeError> {
    std::fs::copy(temp, dest).map_err(|source| FinalizeError::Copy {
        path: dest.to_path_buf(),
        source,
    })?;
    // Best-effort: a library scanner caring about "newly added" files is a
    // nice-to-have, not a correctness requirement, so a failure here doesn't
    // fail the finalize.
    if let Err(err) = filetime::set_file_mtime(dest, mtime) {
        tracing::warn!(?dest, %err, "failed to preserve mtime on finalized output");
    }
    Ok(())
}

/// Runs the finalize step for one job: checks the savings policy against
/// `temp_output`'s own size *before* touching the original, then swaps
/// `temp_output` into place at `final_path` under `policy`.
///
/// The savings check runs first, not after the swap: checking post-hoc would
/// mean a `Replace`-mode job that loses the check has already deleted the
/// only copy of the original with nothing to restore it from. Checking the
/// temp file's size up front means a rejected job never touches the original
/// at all.
///
/// On `Keep`, a failed copy restores the original from `<original>.old`
/// before returning the error, so a failed finalize never leaves the library
/// without either file.
pub fn finalize(
    original: &Path,
    temp_output: &Path,
    final_path: &Path,
    policy: OriginalHandling,
    input_size: u64,
    keep_larger_files: bool,
) -> Result<(), FinalizeError> {
    let metadata = original.metadata().map_err(|source| FinalizeError::Metadata {
        path: original.to_path_buf(),
        source,
    })?;
    let mtime = FileTime::from_last_modification_time(&metadata);

    let output_size = temp_output.metadata().map(|m| m.len()).unwrap_or(0);
    if output_size > input_size && !keep_larger_files {
        let _ = std::fs::remove_file(temp_output);
        return Err(FinalizeError::NoSavings);
    }

    match policy {
        OriginalHandling::Replace => {
            std::fs::remove_file(original).map_err(|source| FinalizeError::RemoveOriginal {
                path: original.to_path_buf(),
                source,
            })?;
            copy_preserving_mtime(temp_output, final_path, mtime)?;
        }
        OriginalHandling::Keep => {
            let old_path = old_path_for(original);
            std::fs::rename(original, &old_path).map_err(|source| FinalizeError::RenameToOld {
                path: original.to_path_buf(),
                source,
            })?;

            if let Err(err) = copy_preserving_mtime(temp_output, final_path, mtime) {
                // Restore the original before surfacing the failure.
                let _ = std::fs::rename(&old_path, original);
                return Err(err);
            }

            // Successful save: drop the `.old` backup, we're committing to
            // the new file.
            let _ = std::fs::remove_file(old_path);
        }
    }

    let _ = std::fs::remove_file(temp_output);
    Ok(())
}

fn old_path_for(original: &Path) -> PathBuf {
    let mut name = original.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".old");
    original.with_file_name(name)
}

/// Used by callers that want to stamp a completed job with "now" without
/// importing `std::time` directly; kept here since finalize is the module
/// that cares most about wall-clock timing around the swap.
pub fn now() -> SystemTime {
    SystemTime::now()
}
