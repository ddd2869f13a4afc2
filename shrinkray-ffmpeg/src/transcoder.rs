//! Runs one encoder subprocess and turns its `-progress pipe:1` stream into
//! typed progress frames.

#[cfg(test)]
mod tests;

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::process::tail_lines;

/// Shared handle used to ask an in-flight transcode to stop. Closing it
/// terminates the subprocess and the caller observes [`TranscodeError::Cancelled`].
#[derive(Clone)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelHandle {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    async fn wait(&self) {
        if self.is_cancelled() {
            return;
        }
        self.notify.notified().await;
    }
}

/// One parsed `-progress` frame, plus the percent/ETA derived from it.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeProgress {
    pub frame: u64,
    pub fps: f64,
    pub total_size: u64,
    pub out_time: Duration,
    pub bitrate_kbps: f64,
    pub speed: f64,
    pub percent: f64,
    pub eta: Option<Duration>,
}

impl TranscodeProgress {
    fn from_fields(fields: &ProgressFields, expected_duration: Duration) -> Self {
        let out_time = fields.out_time_us.map(Duration::from_micros).unwrap_or_default();
        let speed = fields.speed.unwrap_or(0.0);

        let percent = if expected_duration.as_secs_f64() > 0.0 {
            (out_time.as_secs_f64() / expected_duration.as_secs_f64() * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        };

        let eta = if speed > 0.0 {
            let remaining = (expected_duration.as_secs_f64() - out_time.as_secs_f64()).max(0.0);
            Some(Duration::from_secs_f64(remaining / speed))
        } else {
            None
        };

        Self {
            frame: fields.frame.unwrap_or(0),
            fps: fields.fps.unwrap_or(0.0),
            total_size: fields.total_size.unwrap_or(0),
            out_time,
            bitrate_kbps: fields.bitrate_kbps.unwrap_or(0.0),
            speed,
            percent,
            eta,
        }
    }
}

#[derive(Default)]
struct ProgressFields {
    frame: Option<u64>,
    fps: Option<f64>,
    total_size: Option<u64>,
    out_time_us: Option<u64>,
    bitrate_kbps: Option<f64>,
    speed: Option<f64>,
}

impl ProgressFields {
    fn set(&mut self, key: &str, value: &str) {
        match key {
            "frame" => self.frame = value.parse().ok(),
            "fps" => self.fps = value.parse().ok(),
            "total_size" => self.total_size = value.parse().ok(),
            "out_time_us" => self.out_time_us = value.parse().ok(),
            "bitrate" => self.bitrate_kbps = value.trim_end_matches("kbits/s").parse().ok(),
            "speed" => self.speed = value.trim_end_matches('x').trim().parse().ok(),
            _ => {}
        }
    }
}

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("failed to spawn encoder process: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("encoder exited with {exit_status}: {stderr_tail}")]
    EncoderCrash {
        exit_status: String,
        stderr_tail: String,
    },
    #[error("transcode cancelled")]
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct TranscodeOutcome {
    pub output_size: u64,
    pub wall_time: Duration,
}

/// Runs one `ffmpeg`-shaped encoder invocation end to end.
pub struct Transcoder {
    binary: PathBuf,
}

impl Transcoder {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into() }
    }

    /// Spawns `binary pre_args.. -i input post_args.. -y -progress pipe:1 -nostats output`,
    /// streaming progress into `progress_tx` (lossy; only the final frame is
    /// guaranteed delivery) and honoring `cancel`.
    pub fn run(
        &self,
        input: &Path,
        output: &Path,
        pre_input_args: &[OsString],
        post_input_args: &[OsString],
        expected_duration: Duration,
        cancel: CancelHandle,
        progress_tx: crossbeam_channel::Sender<TranscodeProgress>,
    ) -> Result<TranscodeOutcome, TranscodeError> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_io()
            .enable_time()
            .build()?;

        let started = Instant::now();
        let result = rt.block_on(self.run_async(
            input,
            output,
            pre_input_args,
            post_input_args,
            expected_duration,
            cancel,
            progress_tx,
        ));

        match result {
            Ok(()) => Ok(TranscodeOutcome {
                output_size: output.metadata().map(|m| m.len()).unwrap_or(0),
                wall_time: started.elapsed(),
            }),
            Err(e) => {
                let _ = std::fs::remove_file(output);
                Err(e)
            }
        }
    }

    async fn run_async(
        &self,
        input: &Path,
        output: &Path,
        pre_input_args: &[OsString],
        post_input_args: &[OsString],
        expected_duration: Duration,
        cancel: CancelHandle,
        progress_tx: crossbeam_channel::Sender<TranscodeProgress>,
    ) -> Result<(), TranscodeError> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(pre_input_args)
            .arg("-i")
            .arg(input)
            .args(post_input_args)
            .args(["-y", "-progress", "pipe:1", "-nostats"])
            .arg(output)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn()?;
        let stdout = child.stdout.take().expect("stdout was piped");
        let stderr = child.stderr.take().expect("stderr was piped");

        let mut stdout_lines = BufReader::new(stdout).lines();
        let mut stderr_lines = BufReader::new(stderr).lines();
        let mut stderr_buf = String::new();
        let mut fields = ProgressFields::default();

        loop {
            tokio::select! {
                biased;

                _ = cancel.wait() => {
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                    return Err(TranscodeError::Cancelled);
                }

                line = stderr_lines.next_line() => {
                    match line {
                        Ok(Some(l)) => {
                            stderr_buf.push_str(&l);
                            stderr_buf.push('\n');
                        }
                        _ => {}
                    }
                }

                line = stdout_lines.next_line() => {
                    match line {
                        Ok(Some(l)) => {
                            if let Some((key, value)) = l.split_once('=') {
                                let key = key.trim();
                                let value = value.trim();
                                if key == "progress" {
                                    let frame = TranscodeProgress::from_fields(&fields, expected_duration);
                                    let is_end = value == "end";
                                    if is_end {
                                        if progress_tx.send(frame).is_err() {
                                            debug!("progress receiver gone, final frame undelivered");
                                        }
                                        break;
                                    } else if progress_tx.try_send(frame).is_err() {
                                        // Lossy by design: the only consumer is a live UI.
                                    }
                                } else {
                                    fields.set(key, value);
                                }
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            warn!("error reading encoder stdout: {e}");
                            break;
                        }
                    }
                }
            }
        }

        // Drain any remaining stderr after the progress stream naturally ends.
        while let Ok(Some(l)) = stderr_lines.next_line().await {
            stderr_buf.push_str(&l);
            stderr_buf.push('\n');
        }

        let status = child.wait().await?;
        if !status.success() {
            return Err(TranscodeError::EncoderCrash {
                exit_status: status.to_string(),
                stderr_tail: tail_lines(&stderr_buf, 5),
            });
        }

        Ok(())
    }
}
