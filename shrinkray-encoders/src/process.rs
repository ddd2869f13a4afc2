//! One-shot startup probing of the configured encoder binary.

use std::path::Path;

/// Runs `binary -hide_banner -encoders` and returns its stdout as text.
///
/// A plain synchronous `Command::output()` call: this runs exactly once at
/// startup, so there is no need for the tokio machinery the per-job
/// subprocess calls use elsewhere in this workspace.
pub fn run_ffmpeg_encoders(binary: &Path) -> std::io::Result<String> {
    let output = std::process::Command::new(binary)
        .args(["-hide_banner", "-encoders"])
        .output()?;
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
