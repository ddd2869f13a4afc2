//! The persisted, ordered job queue and its pub/sub event fanout.
//!
//! All mutations are serialized by one `parking_lot::Mutex`: the lock is
//! expected to be uncontended outside of submission bursts, so a plain mutex
//! (rather than a lock-free structure) keeps the invariants easy to state and
//! check.

#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::event::{IngestProgress, QueueEvent, QueueStats, Subscriber, SubscriberId, SUBSCRIBER_CHANNEL_CAPACITY};
use crate::job::{Job, JobId, JobStatus};
use crate::snapshot;

struct Inner {
    jobs: Vec<Job>,
    subscribers: Vec<Subscriber>,
    next_subscriber_id: SubscriberId,
    paused: bool,
    snapshot_path: Option<PathBuf>,
}

/// Process-wide job queue singleton. Owns the snapshot file path and every
/// subscriber's outbound channel.
pub struct JobQueue {
    inner: Mutex<Inner>,
}

impl JobQueue {
    /// Builds an empty queue with no snapshot persistence (tests, or a
    /// caller that wires persistence itself).
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                jobs: Vec::new(),
                subscribers: Vec::new(),
                next_subscriber_id: 0,
                paused: false,
                snapshot_path: None,
            }),
        }
    }

    /// Loads prior state from `snapshot_path` (crash-recovery rule applied by
    /// [`snapshot::load`]) and binds the path for subsequent saves.
    pub fn load_or_new(snapshot_path: PathBuf) -> Result<Self, snapshot::SnapshotError> {
        let jobs = snapshot::load(&snapshot_path)?;
        Ok(Self {
            inner: Mutex::new(Inner {
                jobs,
                subscribers: Vec::new(),
                next_subscriber_id: 0,
                paused: false,
                snapshot_path: Some(snapshot_path),
            }),
        })
    }

    fn persist(inner: &Inner) {
        if let Some(path) = &inner.snapshot_path {
            if let Err(err) = snapshot::save(path, &inner.jobs) {
                // Snapshot failures are logged, not propagated: in-memory state
                // stays authoritative for this process's lifetime.
                tracing::error!(%err, "failed to persist queue snapshot");
            }
        }
    }

    fn broadcast(inner: &Inner, event: QueueEvent) {
        for subscriber in &inner.subscribers {
            subscriber.send(event.clone());
        }
    }

    fn stats_of(jobs: &[Job]) -> QueueStats {
        let mut stats = QueueStats::default();
        for job in jobs {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Complete => stats.complete += 1,
                JobStatus::Failed => stats.failed += 1,
                JobStatus::Cancelled => stats.cancelled += 1,
                JobStatus::Skipped => stats.skipped += 1,
            }
        }
        stats
    }

    /// Admits one job for `input_path` at `preset_id`, with `output_path`
    /// already resolved by the caller (the temp path convention lives in the
    /// worker pool, which knows the configured container).
    pub fn add(&self, input_path: PathBuf, output_path: PathBuf, preset_id: &str) -> Job {
        let job = Job::new(input_path, output_path, preset_id);
        let mut inner = self.inner.lock();
        inner.jobs.push(job.clone());
        Self::persist(&inner);
        Self::broadcast(&inner, QueueEvent::JobAdded { job: job.clone() });
        job
    }

    /// Admits every `(input_path, output_path)` pair under one preset,
    /// reporting ingestion progress to subscribers as it goes.
    pub fn add_multiple(&self, paths: Vec<(PathBuf, PathBuf)>, preset_id: &str) -> Vec<Job> {
        let total = paths.len();
        let mut added = Vec::with_capacity(total);
        for (probed, (input_path, output_path)) in paths.into_iter().enumerate() {
            added.push(self.add(input_path, output_path, preset_id));
            self.broadcast_progress(probed + 1, total);
        }
        added
    }

    pub fn get_all(&self) -> Vec<Job> {
        self.inner.lock().jobs.clone()
    }

    pub fn get(&self, id: &JobId) -> Option<Job> {
        self.inner.lock().jobs.iter().find(|j| &j.id == id).cloned()
    }

    /// Claims the oldest `Pending` job, transitioning it to `Running`.
    /// Jobs are stored creation-ordered, so the first match is the oldest.
    pub fn claim_next_pending(&self) -> Option<Job> {
        let mut inner = self.inner.lock();
        if inner.paused {
            return None;
        }
        let job = inner.jobs.iter_mut().find(|j| j.status == JobStatus::Pending)?;
        job.status = JobStatus::Running;
        job.timestamps.started = Some(std::time::SystemTime::now());
        let job = job.clone();
        Self::persist(&inner);
        Self::broadcast(&inner, QueueEvent::JobUpdated { job: job.clone() });
        Some(job)
    }

    /// Overwrites a job's full record (the worker's mechanism for reporting
    /// progress and terminal results) and emits `JobUpdated`. The caller must
    /// have obtained the record via [`Self::get`] or [`Self::claim_next_pending`]
    /// so `id` always exists.
    pub fn update(&self, updated: Job) {
        let mut inner = self.inner.lock();
        if let Some(slot) = inner.jobs.iter_mut().find(|j| j.id == updated.id) {
            *slot = updated.clone();
        }
        Self::persist(&inner);
        Self::broadcast(&inner, QueueEvent::JobUpdated { job: updated });
    }

    /// Cancels `id`. A pending job is cancelled in place with no subprocess
    /// involved; a running job only has its status flipped here — the worker
    /// pool is responsible for observing the cancellation handle and tearing
    /// down the subprocess.
    pub fn cancel(&self, id: &JobId) -> Option<Job> {
        let mut inner = self.inner.lock();
        let job = inner.jobs.iter_mut().find(|j| &j.id == id)?;
        if job.status.is_terminal() {
            return Some(job.clone());
        }
        job.status = JobStatus::Cancelled;
        job.timestamps.completed = Some(std::time::SystemTime::now());
        let job = job.clone();
        Self::persist(&inner);
        Self::broadcast(&inner, QueueEvent::JobUpdated { job: job.clone() });
        Some(job)
    }

    /// Returns a running (or pending) job to `Pending`, clearing its progress
    /// and start timestamp. Unlike [`Self::cancel`] this is not terminal: it
    /// backs pause/resume, dynamic worker-count shrinkage and shutdown, all of
    /// which expect the job to be picked back up rather than abandoned.
    pub fn requeue_to_pending(&self, id: &JobId) -> Option<Job> {
        let mut inner = self.inner.lock();
        let job = inner.jobs.iter_mut().find(|j| &j.id == id)?;
        if job.status.is_terminal() {
            return Some(job.clone());
        }
        job.status = JobStatus::Pending;
        job.progress = crate::job::JobProgress::default();
        job.timestamps.started = None;
        let job = job.clone();
        Self::persist(&inner);
        Self::broadcast(&inner, QueueEvent::JobUpdated { job: job.clone() });
        Some(job)
    }

    /// Removes a job outright regardless of status (used by `retry` to drop
    /// the old failed record once a fresh job has been created).
    pub fn remove(&self, id: &JobId) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.jobs.len();
        inner.jobs.retain(|j| &j.id != id);
        let removed = inner.jobs.len() != before;
        if removed {
            Self::persist(&inner);
            Self::broadcast(&inner, QueueEvent::JobRemoved { id: id.clone() });
        }
        removed
    }

    /// Drops every job matching `status_filter` (or every terminal job if
    /// `None`). Running jobs are never cleared.
    pub fn clear(&self, status_filter: Option<JobStatus>) -> usize {
        let mut inner = self.inner.lock();
        let mut removed_ids = Vec::new();
        inner.jobs.retain(|j| {
            if j.status == JobStatus::Running {
                return true;
            }
            let matches = match status_filter {
                Some(status) => j.status == status,
                None => j.status.is_terminal(),
            };
            if matches {
                removed_ids.push(j.id.clone());
                false
            } else {
                true
            }
        });
        Self::persist(&inner);
        for id in &removed_ids {
            Self::broadcast(&inner, QueueEvent::JobRemoved { id: id.clone() });
        }
        removed_ids.len()
    }

    pub fn stats(&self) -> QueueStats {
        Self::stats_of(&self.inner.lock().jobs)
    }

    /// `(running, pending)` counts, the pair the notification gate watches.
    pub fn active_counts(&self) -> (usize, usize) {
        let inner = self.inner.lock();
        let running = inner.jobs.iter().filter(|j| j.status == JobStatus::Running).count();
        let pending = inner.jobs.iter().filter(|j| j.status == JobStatus::Pending).count();
        (running, pending)
    }

    pub fn set_paused(&self, paused: bool) {
        self.inner.lock().paused = paused;
    }

    pub fn is_paused(&self) -> bool {
        self.inner.lock().paused
    }

    pub fn broadcast_progress(&self, probed: usize, total: usize) {
        let inner = self.inner.lock();
        Self::broadcast(&inner, QueueEvent::Progress(IngestProgress { probed, total }));
    }

    /// Registers a new subscriber and returns its id plus the receiving half
    /// of its channel. The caller immediately gets an `Init` event on the
    /// channel so it never has to special-case "first connect".
    pub fn subscribe(&self) -> (SubscriberId, crossbeam_channel::Receiver<QueueEvent>) {
        let mut inner = self.inner.lock();
        let id = inner.next_subscriber_id;
        inner.next_subscriber_id += 1;

        let (tx, rx) = crossbeam_channel::bounded(SUBSCRIBER_CHANNEL_CAPACITY);
        let init = QueueEvent::Init {
            jobs: inner.jobs.clone(),
            stats: Self::stats_of(&inner.jobs),
        };
        let _ = tx.try_send(init);
        inner.subscribers.push(Subscriber { id, sender: tx });
        (id, rx)
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        self.inner.lock().subscribers.retain(|s| s.id != id);
    }

    /// Invalidates nothing itself; convenience used by the worker after a
    /// successful finalize, so probe-cache invalidation and the job-complete
    /// event share one call site in the caller.
    pub fn input_path_of(&self, id: &JobId) -> Option<PathBuf> {
        self.get(id).map(|j| j.input_path)
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds the temp output path convention:
/// `<basename>.shrinkray.tmp.<ext>` alongside the source file.
pub fn temp_output_path(input: &Path, container_extension: &str) -> PathBuf {
    let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("output");
    input.with_file_name(format!("{stem}.shrinkray.tmp.{container_extension}"))
}
