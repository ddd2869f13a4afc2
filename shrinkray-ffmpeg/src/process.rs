//! Small shared helpers for spawning the probe/encoder subprocesses.
//!
//! Each call gets its own single-threaded tokio runtime rather than requiring
//! the whole engine to run under a shared multi-threaded one, since every
//! worker is already its own OS thread.

use std::ffi::OsStr;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

/// Runs `binary args..` to completion with stdout/stderr captured, enforcing
/// `deadline` as a wall-clock timeout. Used for probe invocations, which are
/// bounded at roughly 30 seconds.
pub fn run_with_deadline<I, S>(
    binary: &OsStr,
    args: I,
    deadline: Duration,
) -> std::io::Result<std::process::Output>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    run_with_deadline_inner(binary, args, deadline, false)
}

/// Same as [`run_with_deadline`], but renices the child to the lowest
/// scheduling priority before exec. Used by VMAF trial encodes so a
/// quality search sharing the box with a real job doesn't starve it.
pub fn run_with_deadline_low_priority<I, S>(
    binary: &OsStr,
    args: I,
    deadline: Duration,
) -> std::io::Result<std::process::Output>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    run_with_deadline_inner(binary, args, deadline, true)
}

fn run_with_deadline_inner<I, S>(
    binary: &OsStr,
    args: I,
    deadline: Duration,
    lower_priority: bool,
) -> std::io::Result<std::process::Output>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .enable_io()
        .build()?;

    rt.block_on(async {
        let mut cmd = Command::new(binary);
        cmd.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());
        if lower_priority {
            renice_on_spawn(&mut cmd);
        }
        let child = cmd.spawn()?;

        match tokio::time::timeout(deadline, child.wait_with_output()).await {
            Ok(result) => result,
            Err(_) => Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("subprocess exceeded deadline of {deadline:?}"),
            )),
        }
    })
}

/// Lowest-priority niceness a trial-encode child process runs at.
#[cfg(unix)]
const TRIAL_NICE_LEVEL: i32 = 15;

#[cfg(unix)]
fn renice_on_spawn(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    // Safety: `libc::nice` only touches the calling (post-fork, pre-exec)
    // process's own scheduling priority; it allocates nothing and cannot
    // observe partially-initialized parent state.
    unsafe {
        cmd.pre_exec(|| {
            let _ = libc::nice(TRIAL_NICE_LEVEL);
            Ok(())
        });
    }
}

#[cfg(not(unix))]
fn renice_on_spawn(_cmd: &mut Command) {}

/// Keeps only the last `n` non-empty lines of `text`, used to build the short
/// stderr tail surfaced on job failure.
pub fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}
