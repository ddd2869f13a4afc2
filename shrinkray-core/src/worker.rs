//! The bounded worker pool: claims pending jobs, drives each through
//! probe -> (VMAF analysis) -> resolve -> transcode -> finalize, and owns
//! pause/resume, dynamic resize, and the schedule gate.

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::ffi::OsString;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex as StdMutex};
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use shrinkray_config::{Config, OutputContainer, MAX_WORKERS, MIN_WORKERS};
use shrinkray_encoders::backend::TargetCodec;
use shrinkray_encoders::registry::QualityDefault;
use shrinkray_encoders::{resolve, EncoderRegistry, HdrPolicy, QualityOverrides};
use shrinkray_ffmpeg::probe::ProbeProvider;
use shrinkray_ffmpeg::transcoder::{CancelHandle, TranscodeError, Transcoder};
use shrinkray_notify::NotificationSink;
use shrinkray_vmaf::search::{Quality, QualitySpace};
use shrinkray_vmaf::{analyze, AnalysisRequest};
use tracing::{debug, error, info, warn};

use crate::finalize;
use crate::job::{FinalQuality, Job, JobId, JobOrigin, JobResult, JobStatus};
use crate::notify_gate::NotificationGate;
use crate::queue::{temp_output_path, JobQueue};

/// How a running job's cancellation should resolve once observed: a user
/// cancel is terminal, a pool-driven one (resize/pause/shutdown) returns the
/// job to `pending` so it runs again later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CancelReason {
    UserCancel,
    Requeue,
}

/// A plain condvar doorbell: wakes idle worker loops on submit/resume/resize
/// instead of busy-polling. Using `std::sync` rather than `parking_lot` here
/// since `Condvar::wait_timeout` is the operation that matters and the stdlib
/// shape is the natural fit for it.
struct Doorbell {
    mutex: StdMutex<()>,
    condvar: Condvar,
}

impl Doorbell {
    fn new() -> Self {
        Self {
            mutex: StdMutex::new(()),
            condvar: Condvar::new(),
        }
    }

    fn ring(&self) {
        let _guard = self.mutex.lock().unwrap_or_else(|e| e.into_inner());
        self.condvar.notify_all();
    }

    fn wait_timeout(&self, timeout: Duration) {
        let guard = self.mutex.lock().unwrap_or_else(|e| e.into_inner());
        let _ = self.condvar.wait_timeout(guard, timeout);
    }
}

const POLL_INTERVAL: Duration = Duration::from_millis(500);

struct Shared {
    queue: Arc<JobQueue>,
    registry: Arc<EncoderRegistry>,
    probe: Arc<dyn ProbeProvider>,
    notify_sink: Arc<dyn NotificationSink>,
    notify_gate: NotificationGate,
    config: Mutex<Config>,
    shutdown: AtomicBool,
    doorbell: Doorbell,
    /// Cancellation handles for jobs currently being transcoded, keyed by id.
    running_cancels: Mutex<HashMap<JobId, CancelHandle>>,
    /// Why a running job's handle was (or should be) fired, recorded
    /// separately from the handle itself so a pool-driven cancel and a
    /// user cancel are told apart once the worker observes the exit.
    cancel_reasons: Mutex<HashMap<JobId, CancelReason>>,
}

impl Shared {
    fn in_schedule_window(&self) -> bool {
        use chrono::Timelike;
        let hour = chrono::Local::now().hour() as u8;
        self.config.lock().schedule.contains_hour(hour)
    }

    fn fire_cancel(&self, id: &JobId, reason: CancelReason) -> bool {
        self.cancel_reasons.lock().insert(id.clone(), reason);
        if let Some(handle) = self.running_cancels.lock().get(id) {
            handle.cancel();
            true
        } else {
            false
        }
    }

    fn maybe_fire_notification(&self) {
        let (running, pending) = self.queue.active_counts();
        // `should_fire` must still be called unconditionally even when
        // notifications are off, so the armed/was_active edge detector stays
        // in sync with the queue and doesn't fire a stale notification the
        // moment the setting is turned back on.
        let fire = self.notify_gate.should_fire(running, pending);
        if fire && self.config.lock().notify_on_complete {
            if let Err(err) = self.notify_sink.notify_all_done("shrinkray: queue is empty, every job finished") {
                warn!(%err, "failed to send all-done notification");
            }
        }
    }
}

struct WorkerHandle {
    retire: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

/// Owns every worker thread and the process-wide state they share. One
/// instance per running engine.
pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<WorkerHandle>>,
}

impl WorkerPool {
    pub fn new(
        queue: Arc<JobQueue>,
        registry: Arc<EncoderRegistry>,
        probe: Arc<dyn ProbeProvider>,
        notify_sink: Arc<dyn NotificationSink>,
        config: Config,
    ) -> Self {
        let worker_count = config.workers;
        let shared = Arc::new(Shared {
            queue,
            registry,
            probe,
            notify_sink,
            notify_gate: NotificationGate::new(),
            config: Mutex::new(config),
            shutdown: AtomicBool::new(false),
            doorbell: Doorbell::new(),
            running_cancels: Mutex::new(HashMap::new()),
            cancel_reasons: Mutex::new(HashMap::new()),
        });

        let mut workers = Vec::with_capacity(worker_count as usize);
        for _ in 0..worker_count {
            workers.push(Self::spawn_worker(Arc::clone(&shared)));
        }

        Self {
            shared,
            workers: Mutex::new(workers),
        }
    }

    fn spawn_worker(shared: Arc<Shared>) -> WorkerHandle {
        let retire = Arc::new(AtomicBool::new(false));
        let worker_retire = Arc::clone(&retire);
        let join = std::thread::spawn(move || worker_loop(shared, worker_retire));
        WorkerHandle { retire, join }
    }

    /// Wakes any worker blocked in its idle wait. Callers ring this after
    /// admitting jobs, unpausing, or growing the pool.
    pub fn notify_work_available(&self) {
        self.shared.doorbell.ring();
    }

    /// Re-arms the notification gate; called by the submission path whenever
    /// a job is admitted.
    pub fn on_job_admitted(&self) {
        self.shared.notify_gate.on_job_admitted();
    }

    pub fn config(&self) -> Config {
        self.shared.config.lock().clone()
    }

    pub fn update_config(&self, config: Config) {
        let desired_workers = config.workers;
        *self.shared.config.lock() = config;
        self.set_worker_count(desired_workers);
        self.shared.doorbell.ring();
    }

    /// Cancels job `id` regardless of where it sits in the pipeline: a
    /// pending job is cancelled directly in the queue; a running job has its
    /// handle fired and resolves to terminal `Cancelled` once the worker
    /// observes it.
    pub fn cancel_job(&self, id: &JobId) -> Option<Job> {
        match self.shared.queue.get(id)?.status {
            JobStatus::Pending => self.shared.queue.cancel(id),
            JobStatus::Running => {
                self.shared.fire_cancel(id, CancelReason::UserCancel);
                self.shared.queue.get(id)
            }
            _ => self.shared.queue.get(id),
        }
    }

    /// Sets the pool's worker-thread count, growing or shrinking live.
    /// Shrinking cancels the newest running jobs first (sorted by id
    /// descending) and requeues them to `pending` rather than terminating
    /// them, then retires that many worker threads.
    pub fn set_worker_count(&self, desired: u8) {
        let desired = desired.clamp(MIN_WORKERS, MAX_WORKERS) as usize;
        let mut workers = self.workers.lock();
        let current = workers.len();

        if desired > current {
            for _ in current..desired {
                workers.push(Self::spawn_worker(Arc::clone(&self.shared)));
            }
            self.shared.doorbell.ring();
        } else if desired < current {
            let to_stop = current - desired;
            self.requeue_newest_running(to_stop);
            for _ in 0..to_stop {
                if let Some(handle) = workers.pop() {
                    handle.retire.store(true, Ordering::SeqCst);
                }
            }
            drop(workers);
            self.shared.doorbell.ring();
        }
    }

    fn requeue_newest_running(&self, count: usize) {
        let mut running: Vec<Job> = self
            .shared
            .queue
            .get_all()
            .into_iter()
            .filter(|j| j.status == JobStatus::Running)
            .collect();
        running.sort_by(|a, b| b.id.cmp(&a.id));
        for job in running.into_iter().take(count) {
            self.shared.fire_cancel(&job.id, CancelReason::Requeue);
        }
    }

    /// Sets the queue's paused flag and requeues every currently running job
    /// to `pending`. Workers themselves keep running; they simply re-enter
    /// their idle wait until [`Self::resume`] is called.
    pub fn pause(&self) {
        self.shared.queue.set_paused(true);
        let ids: Vec<JobId> = self
            .shared
            .queue
            .get_all()
            .into_iter()
            .filter(|j| j.status == JobStatus::Running)
            .map(|j| j.id)
            .collect();
        for id in ids {
            self.shared.fire_cancel(&id, CancelReason::Requeue);
        }
    }

    pub fn resume(&self) {
        self.shared.queue.set_paused(false);
        self.shared.doorbell.ring();
    }

    /// Cancels every running job (requeued, not terminated) and stops every
    /// worker thread. Pending jobs are left untouched for the next run.
    ///
    /// Takes `&self` rather than consuming the pool so an `Arc<WorkerPool>`
    /// shared with a submission thread can still be shut down; calling it
    /// twice is a harmless no-op the second time since the worker list is
    /// already empty.
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        let ids: Vec<JobId> = self
            .shared
            .queue
            .get_all()
            .into_iter()
            .filter(|j| j.status == JobStatus::Running)
            .map(|j| j.id)
            .collect();
        for id in ids {
            self.shared.fire_cancel(&id, CancelReason::Requeue);
        }
        self.shared.doorbell.ring();
        let handles = std::mem::take(&mut *self.workers.lock());
        for handle in handles {
            handle.retire.store(true, Ordering::SeqCst);
            let _ = handle.join.join();
        }
    }
}

fn container_extension(container: OutputContainer) -> String {
    container.to_string()
}

fn codec_matches(codec: TargetCodec, probe_codec: &str) -> bool {
    let probe_codec = probe_codec.to_ascii_lowercase();
    match codec {
        TargetCodec::Hevc => probe_codec == "hevc" || probe_codec == "h265",
        TargetCodec::Av1 => probe_codec == "av1",
    }
}

fn quality_space_for(default: QualityDefault, codec: TargetCodec) -> QualitySpace {
    match default {
        QualityDefault::Crf(_) => {
            let (min, max) = match codec {
                TargetCodec::Hevc => (
                    shrinkray_config::MIN_QUALITY_HEVC as u32,
                    shrinkray_config::MAX_QUALITY_HEVC as u32,
                ),
                TargetCodec::Av1 => (
                    shrinkray_config::MIN_QUALITY_AV1 as u32,
                    shrinkray_config::MAX_QUALITY_AV1 as u32,
                ),
            };
            QualitySpace::Crf { min, max }
        }
        QualityDefault::Modifier(_) => QualitySpace::Modifier {
            min_mod: shrinkray_config::MIN_SEARCH_MODIFIER,
            max_mod: shrinkray_config::MAX_SEARCH_MODIFIER,
        },
    }
}

/// What a fully-run `process_job` decided; the caller applies the matching
/// queue transition.
enum Outcome {
    Complete { output_size: u64, wall_time: Duration, final_path: std::path::PathBuf },
    Skipped,
    Failed(String),
    Cancelled,
}

fn worker_loop(shared: Arc<Shared>, retire: Arc<AtomicBool>) {
    loop {
        if shared.shutdown.load(Ordering::SeqCst) || retire.load(Ordering::SeqCst) {
            return;
        }

        if shared.queue.is_paused() || !shared.in_schedule_window() {
            shared.doorbell.wait_timeout(POLL_INTERVAL);
            continue;
        }

        let Some(job) = shared.queue.claim_next_pending() else {
            shared.doorbell.wait_timeout(POLL_INTERVAL);
            continue;
        };

        process_job(&shared, job);
    }
}

fn process_job(shared: &Shared, mut job: Job) {
    let cancel = CancelHandle::new();
    shared.running_cancels.lock().insert(job.id.clone(), cancel.clone());

    let outcome = run_job(shared, &mut job, &cancel);

    shared.running_cancels.lock().remove(&job.id);
    let reason = shared.cancel_reasons.lock().remove(&job.id).unwrap_or(CancelReason::UserCancel);

    match outcome {
        Outcome::Complete { output_size, wall_time, final_path } => {
            job.status = JobStatus::Complete;
            job.output_path = final_path;
            job.result = JobResult {
                input_size: job.result.input_size,
                output_size,
                wall_time: Some(wall_time),
            };
            job.timestamps.completed = Some(SystemTime::now());
            shared.queue.update(job);
            shared.notify_gate.on_job_terminal();
        }
        Outcome::Skipped => {
            job.status = JobStatus::Skipped;
            job.timestamps.completed = Some(SystemTime::now());
            shared.queue.update(job);
            shared.notify_gate.on_job_terminal();
        }
        Outcome::Failed(message) => {
            warn!(job_id = %job.id, %message, "job failed");
            job.status = JobStatus::Failed;
            job.error = Some(message);
            job.timestamps.completed = Some(SystemTime::now());
            shared.queue.update(job);
            shared.notify_gate.on_job_terminal();
        }
        Outcome::Cancelled => match reason {
            CancelReason::UserCancel => {
                job.status = JobStatus::Cancelled;
                job.timestamps.completed = Some(SystemTime::now());
                shared.queue.update(job);
                shared.notify_gate.on_job_terminal();
            }
            CancelReason::Requeue => {
                shared.queue.requeue_to_pending(&job.id);
            }
        },
    }

    shared.maybe_fire_notification();
}

/// Runs the full per-job pipeline up to (but not including) recording the
/// outcome on the job record, which the caller owns.
fn run_job(shared: &Shared, job: &mut Job, cancel: &CancelHandle) -> Outcome {
    let probe = match shared.probe.probe(&job.input_path) {
        Ok(p) => p,
        Err(err) => return Outcome::Failed(format!("probe failed: {err}")),
    };

    let preset = match shrinkray_encoders::find(&job.preset_id, shared.registry.as_ref()) {
        Some(p) => p,
        None => return Outcome::Failed(format!("unknown preset {:?}", job.preset_id)),
    };

    if preset.skip_if_target_codec && codec_matches(preset.codec, &probe.video_codec) {
        info!(job_id = %job.id, "source already in target codec, skipping");
        return Outcome::Skipped;
    }

    let config = shared.config.lock().clone();
    let hdr = HdrPolicy {
        tonemap: config.tonemap_hdr,
        algorithm: config.tonemap_algorithm,
    };

    let mut vmaf_score = None;
    let quality_overrides = if preset.is_smart_shrink {
        let space = quality_space_for(preset.default_quality, preset.codec);
        let request = AnalysisRequest {
            source: &job.input_path,
            duration: probe.duration,
            is_hdr: probe.is_hdr(),
            codec: preset.codec,
            backend: preset.backend,
            space,
            threshold: config.smart_shrink_vmaf_target,
            ffmpeg_binary: &config.encoder_binary,
            tonemap_hdr: config.tonemap_hdr,
            tonemap_algorithm: config.tonemap_algorithm,
            vmaf_model: None,
            source_bitrate_kbps: probe.bitrate_kbps(),
        };

        match analyze(request) {
            Ok(None) => {
                info!(job_id = %job.id, "vmaf search found no quality meeting the target, skipping");
                job.error = Some("already optimized".to_string());
                return Outcome::Skipped;
            }
            Ok(Some(found)) => {
                vmaf_score = Some(found.score);
                debug!(job_id = %job.id, trials = found.trial_count, score = found.score, "vmaf search converged");
                match found.quality {
                    Quality::Crf(crf) => match preset.codec {
                        TargetCodec::Hevc => QualityOverrides {
                            hevc_crf: Some(crf as u8),
                            ..Default::default()
                        },
                        TargetCodec::Av1 => QualityOverrides {
                            av1_crf: Some(crf as u8),
                            ..Default::default()
                        },
                    },
                    Quality::Modifier(modifier) => QualityOverrides {
                        modifier: Some(modifier),
                        ..Default::default()
                    },
                }
            }
            Err(err) => return Outcome::Failed(format!("vmaf analysis failed: {err}")),
        }
    } else {
        QualityOverrides {
            hevc_crf: Some(config.quality_hevc),
            av1_crf: Some(config.quality_av1),
            modifier: None,
        }
    };

    if cancel.is_cancelled() {
        return Outcome::Cancelled;
    }

    let resolved = resolve(&preset, &probe, &quality_overrides, &hdr, config.output_format, false);

    job.origin = JobOrigin {
        source_codec: probe.video_codec.clone(),
        source_bitrate_kbps: probe.bitrate_kbps(),
        source_width: probe.width,
        source_height: probe.height,
        encoder_backend: Some(preset.backend.to_string()),
        is_hardware: preset.backend.is_hardware() && !resolved.used_software_decode,
        final_quality: Some(match resolved.final_quality {
            shrinkray_encoders::FinalQuality::Crf(c) => FinalQuality::Crf(c as u8),
            shrinkray_encoders::FinalQuality::BitrateKbps(b) => FinalQuality::BitrateKbps(b),
        }),
        vmaf_score,
    };
    job.result.input_size = probe.size;

    let extension = container_extension(config.output_format);
    let temp_output = temp_output_path(&job.input_path, &extension);
    let final_path = finalize::final_path(&job.input_path, &extension);

    let pre_input: Vec<OsString> = resolved.pre_input.into_iter().map(OsString::from).collect();
    let post_input: Vec<OsString> = resolved.post_input.into_iter().map(OsString::from).collect();

    let (progress_tx, progress_rx) = crossbeam_channel::bounded(32);
    let progress_queue = Arc::clone(&shared.queue);
    let progress_job = job.clone();
    let progress_thread = std::thread::spawn(move || {
        for frame in progress_rx.iter() {
            let mut updated = progress_job.clone();
            updated.progress = crate::job::JobProgress {
                percent: frame.percent,
                speed: frame.speed,
                eta: frame.eta,
                current_output_size: frame.total_size,
            };
            progress_queue.update(updated);
        }
    });

    let transcoder = Transcoder::new(config.encoder_binary.clone());
    let result = transcoder.run(
        &job.input_path,
        &temp_output,
        &pre_input,
        &post_input,
        probe.duration,
        cancel.clone(),
        progress_tx,
    );
    let _ = progress_thread.join();

    match result {
        Ok(outcome) => match finalize::finalize(
            &job.input_path,
            &temp_output,
            &final_path,
            config.original_handling,
            probe.size,
            config.keep_larger_files,
        ) {
            Ok(()) => {
                shared.probe.invalidate(&job.input_path);
                Outcome::Complete {
                    output_size: outcome.output_size,
                    wall_time: outcome.wall_time,
                    final_path,
                }
            }
            Err(err) => {
                // `finalize` already removes the temp file on the "no
                // savings" path; on every other failure the temp output may
                // still be sitting next to the source, so clean it up here too.
                let _ = std::fs::remove_file(&temp_output);
                Outcome::Failed(err.to_string())
            }
        },
        Err(TranscodeError::Cancelled) => {
            let _ = std::fs::remove_file(&temp_output);
            Outcome::Cancelled
        }
        Err(err) => {
            let _ = std::fs::remove_file(&temp_output);
            error!(job_id = %job.id, %err, "transcode failed");
            Outcome::Failed(err.to_string())
        }
    }
}

