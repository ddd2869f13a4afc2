//! The orchestration engine root: wires the queue, worker pool, encoder
//! registry, probe provider, and notification sink into the single `Engine`
//! facade the control API is built on.
//!
//! A thin, cheaply-cloneable handle in front of the state that actually does
//! the work: constructing one validates and initializes every collaborator
//! up front, and every field behind it is an `Arc`.

pub mod event;
pub mod finalize;
pub mod job;
pub mod notify_gate;
pub mod queue;
pub mod snapshot;
pub mod worker;

use std::path::PathBuf;
use std::sync::Arc;

use crossbeam_channel::Receiver;
use shrinkray_config::{Config, ConfigUpdate};
use shrinkray_encoders::{catalogue, find, EncoderRegistry, Preset};
use shrinkray_ffmpeg::probe::{FfprobeProvider, ProbeProvider};
use shrinkray_notify::{NotificationSink, NullSink, PushoverSink};
use thiserror::Error;
use tracing::warn;

pub use event::{IngestProgress, QueueEvent, QueueStats, SubscriberId};
pub use job::{Job, JobId, JobOrigin, JobProgress, JobResult, JobStatus, JobTimestamps};
pub use queue::{temp_output_path, JobQueue};
pub use worker::WorkerPool;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown preset {0:?}")]
    UnknownPreset(String),
    #[error("failed to load queue snapshot: {0}")]
    Snapshot(#[from] snapshot::SnapshotError),
    #[error("job {0} is not in a retryable state")]
    NotRetryable(JobId),
}

/// Owns every long-lived piece of the running engine: the persisted queue,
/// the worker pool, the detected encoder registry, and the probe provider.
/// Cloning an `Engine` is cheap — every field is an `Arc` — so a transport
/// layer can hand out copies freely without a `Mutex` wrapping the whole
/// thing.
#[derive(Clone)]
pub struct Engine {
    queue: Arc<JobQueue>,
    pool: Arc<WorkerPool>,
    registry: Arc<EncoderRegistry>,
    probe: Arc<dyn ProbeProvider>,
}

impl Engine {
    /// Detects encoder capabilities, restores the job queue from
    /// `snapshot_path` (crash-recovery demotion applied per [`snapshot::load`]),
    /// and spawns the worker pool's threads. Detection failure is not fatal:
    /// the registry falls back to software-only rather than refusing to start.
    pub fn new(config: Config, snapshot_path: PathBuf) -> Result<Self, EngineError> {
        let registry = match EncoderRegistry::detect(&config.encoder_binary) {
            Ok(registry) => registry,
            Err(err) => {
                warn!(%err, "encoder capability detection failed, falling back to software-only");
                EncoderRegistry::software_only()
            }
        };
        let registry = Arc::new(registry);

        let probe: Arc<dyn ProbeProvider> = Arc::new(FfprobeProvider::new(config.probe_binary.clone()));

        let notify_sink: Arc<dyn NotificationSink> = if config.notification.is_configured() {
            Arc::new(PushoverSink::new(config.notification.clone()))
        } else {
            Arc::new(NullSink)
        };

        let queue = Arc::new(JobQueue::load_or_new(snapshot_path)?);

        let pool = Arc::new(WorkerPool::new(
            Arc::clone(&queue),
            Arc::clone(&registry),
            Arc::clone(&probe),
            notify_sink,
            config,
        ));

        Ok(Self { queue, pool, registry, probe })
    }

    /// The preset catalogue bound to this engine's detected backends.
    pub fn presets(&self) -> Vec<Preset> {
        catalogue(&self.registry)
    }

    /// Admits a batch of paths under one preset. Returns as soon as the
    /// preset id is validated; the paths themselves are probed and queued on
    /// a background thread, emitting `Progress` events as they go, so a large
    /// directory submission never blocks the caller. A path that fails to
    /// probe is skipped rather than admitted as a job doomed to fail later.
    pub fn submit(&self, paths: Vec<PathBuf>, preset_id: impl Into<String>) -> Result<(), EngineError> {
        let preset_id = preset_id.into();
        if find(&preset_id, &self.registry).is_none() {
            return Err(EngineError::UnknownPreset(preset_id));
        }

        let queue = Arc::clone(&self.queue);
        let probe = Arc::clone(&self.probe);
        let pool = Arc::clone(&self.pool);
        let container = pool.config().output_format.to_string();

        std::thread::spawn(move || {
            let total = paths.len();
            for (index, path) in paths.into_iter().enumerate() {
                if let Err(err) = probe.probe(&path) {
                    warn!(?path, %err, "skipping unprobeable path during ingestion");
                    queue.broadcast_progress(index + 1, total);
                    continue;
                }
                let output_path = temp_output_path(&path, &container);
                queue.add(path, output_path, &preset_id);
                pool.on_job_admitted();
                queue.broadcast_progress(index + 1, total);
            }
            pool.notify_work_available();
        });

        Ok(())
    }

    pub fn list(&self) -> Vec<Job> {
        self.queue.get_all()
    }

    pub fn get(&self, id: &JobId) -> Option<Job> {
        self.queue.get(id)
    }

    /// Cancels `id` wherever it sits in the pipeline.
    pub fn cancel(&self, id: &JobId) -> Option<Job> {
        self.pool.cancel_job(id)
    }

    /// Re-probes the source and creates a fresh `pending` job with the same
    /// preset; the old record is removed once the new one exists, so a
    /// subscriber never observes a window with neither. Only a terminal job
    /// can be retried.
    pub fn retry(&self, id: &JobId) -> Result<Job, EngineError> {
        let old = self.queue.get(id).ok_or_else(|| EngineError::NotRetryable(id.clone()))?;
        if !old.status.is_terminal() {
            return Err(EngineError::NotRetryable(id.clone()));
        }

        self.probe.invalidate(&old.input_path);
        let container = self.pool.config().output_format.to_string();
        let output_path = temp_output_path(&old.input_path, &container);
        let fresh = self.queue.add(old.input_path.clone(), output_path, &old.preset_id);
        self.queue.remove(id);
        self.pool.on_job_admitted();
        self.pool.notify_work_available();
        Ok(fresh)
    }

    /// Drops every job matching `status_filter` (or every terminal job if
    /// `None`); running jobs are never cleared.
    pub fn clear(&self, status_filter: Option<JobStatus>) -> usize {
        self.queue.clear(status_filter)
    }

    pub fn pause_queue(&self) {
        self.pool.pause();
    }

    pub fn resume_queue(&self) {
        self.pool.resume();
    }

    /// Registers a new subscriber; the first event on the returned channel is
    /// always an `Init` reconciliation snapshot.
    pub fn subscribe(&self) -> (SubscriberId, Receiver<QueueEvent>) {
        self.queue.subscribe()
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        self.queue.unsubscribe(id);
    }

    pub fn stats(&self) -> QueueStats {
        self.queue.stats()
    }

    pub fn config(&self) -> Config {
        self.pool.config()
    }

    /// Applies a patch and re-coerces bounds, then propagates the result to
    /// the worker pool (which resizes live if `workers` changed) and returns
    /// the effective document.
    pub fn update_config(&self, patch: ConfigUpdate) -> Config {
        let mut config = self.pool.config();
        config.apply_update(patch);
        self.pool.update_config(config.clone());
        config
    }

    /// Cancels every running job back to `pending` and stops every worker
    /// thread; pending jobs are left in the queue for the next run to pick
    /// back up. Safe to call more than once.
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }
}
