use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use shrinkray_config::Config;
use shrinkray_encoders::backend::TargetCodec;
use shrinkray_encoders::registry::QualityDefault;
use shrinkray_encoders::EncoderRegistry;
use shrinkray_ffmpeg::probe::{ColorTransfer, ProbeError, ProbeProvider, ProbeResult};
use shrinkray_notify::NullSink;

use super::*;
use crate::job::JobStatus;
use crate::queue::JobQueue;

fn sample_probe(path: &Path, video_codec: &str) -> ProbeResult {
    ProbeResult {
        path: path.to_path_buf(),
        size: 1_000_000,
        duration: Duration::from_secs(60),
        video_codec: video_codec.to_string(),
        width: 1920,
        height: 1080,
        bit_depth: 8,
        bit_rate: 4_000_000,
        color_transfer: ColorTransfer::Sdr,
        profile: "main".to_string(),
    }
}

/// Always reports `video_codec` after an optional `delay`, regardless of path.
/// Gives tests a deterministic window in which a job is observably `Running`
/// before `probe()` returns, without needing a real `ffprobe` invocation.
struct FakeProbe {
    video_codec: &'static str,
    delay: Duration,
}

impl ProbeProvider for FakeProbe {
    fn probe(&self, path: &Path) -> Result<ProbeResult, ProbeError> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        Ok(sample_probe(path, self.video_codec))
    }

    fn invalidate(&self, _path: &Path) {}
}

/// A stand-in encoder binary that writes `contents` to its output argument
/// (always last) and reports `progress=end`, mirroring the shape
/// `shrinkray-ffmpeg`'s own transcoder tests use for a fake `ffmpeg`.
fn write_fake_encoder(dir: &Path, contents: &[u8]) -> PathBuf {
    let script = dir.join("fake_encoder.sh");
    let body = format!(
        "#!/bin/sh\necho 'progress=end'\neval \"out=\\$$#\"\nprintf '%s' '{}' > \"$out\"\nexit 0\n",
        String::from_utf8_lossy(contents)
    );
    std::fs::write(&script, body).unwrap();
    let mut perms = std::fs::metadata(&script).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&script, &perms).unwrap();
    script
}

fn wait_until(deadline: Duration, mut predicate: impl FnMut() -> bool) {
    let end = Instant::now() + deadline;
    loop {
        if predicate() {
            return;
        }
        assert!(Instant::now() < end, "condition never became true within {deadline:?}");
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn codec_matches_recognizes_hevc_aliases_but_not_other_codecs() {
    assert!(codec_matches(TargetCodec::Hevc, "hevc"));
    assert!(codec_matches(TargetCodec::Hevc, "H265"));
    assert!(!codec_matches(TargetCodec::Hevc, "h264"));
    assert!(codec_matches(TargetCodec::Av1, "av1"));
    assert!(!codec_matches(TargetCodec::Av1, "hevc"));
}

#[test]
fn quality_space_mirrors_the_registrys_quality_default_shape() {
    match quality_space_for(QualityDefault::Crf(26), TargetCodec::Hevc) {
        QualitySpace::Crf { min, max } => {
            assert_eq!(min, shrinkray_config::MIN_QUALITY_HEVC as u32);
            assert_eq!(max, shrinkray_config::MAX_QUALITY_HEVC as u32);
        }
        other => panic!("expected a CRF space, got {other:?}"),
    }
    match quality_space_for(QualityDefault::Crf(32), TargetCodec::Av1) {
        QualitySpace::Crf { min, max } => {
            assert_eq!(min, shrinkray_config::MIN_QUALITY_AV1 as u32);
            assert_eq!(max, shrinkray_config::MAX_QUALITY_AV1 as u32);
        }
        other => panic!("expected a CRF space, got {other:?}"),
    }
    match quality_space_for(QualityDefault::Modifier(0.35), TargetCodec::Hevc) {
        QualitySpace::Modifier { min_mod, max_mod } => {
            assert_eq!(min_mod, shrinkray_config::MIN_SEARCH_MODIFIER);
            assert_eq!(max_mod, shrinkray_config::MAX_SEARCH_MODIFIER);
        }
        other => panic!("expected a modifier space, got {other:?}"),
    }
}

#[test]
fn container_extension_is_the_lowercase_display_form() {
    assert_eq!(container_extension(shrinkray_config::OutputContainer::Mkv), "mkv");
    assert_eq!(container_extension(shrinkray_config::OutputContainer::Mp4), "mp4");
}

#[test]
fn doorbell_wakes_a_waiting_thread_well_before_its_timeout() {
    let doorbell = Arc::new(Doorbell::new());
    let waiter = Arc::clone(&doorbell);
    let started = Instant::now();
    let handle = std::thread::spawn(move || waiter.wait_timeout(Duration::from_secs(5)));

    std::thread::sleep(Duration::from_millis(30));
    doorbell.ring();
    handle.join().unwrap();

    assert!(started.elapsed() < Duration::from_secs(1));
}

#[test]
fn a_job_already_in_its_target_codec_is_skipped_without_transcoding() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("movie.mkv");
    std::fs::write(&input, b"source bytes").unwrap();

    let queue = Arc::new(JobQueue::new());
    let job = queue.add(input.clone(), input.clone(), "compress-hevc");

    let registry = Arc::new(EncoderRegistry::software_only());
    let probe = Arc::new(FakeProbe { video_codec: "hevc", delay: Duration::ZERO });
    let notify = Arc::new(NullSink);
    let mut config = Config::default();
    config.workers = 1;
    // Points at a binary that would fail loudly if ever invoked, proving the
    // skip path never reaches the transcoder.
    config.encoder_binary = PathBuf::from("/nonexistent/ffmpeg-should-not-run");

    let pool = WorkerPool::new(Arc::clone(&queue), registry, probe, notify, config);
    wait_until(Duration::from_secs(2), || {
        queue.get(&job.id).unwrap().status == JobStatus::Skipped
    });

    pool.shutdown();
}

#[test]
fn a_completed_transcode_replaces_the_source_and_records_sizes() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("movie.mkv");
    std::fs::write(&input, vec![0u8; 64]).unwrap();
    let encoder = write_fake_encoder(dir.path(), b"a small transcoded file");

    let queue = Arc::new(JobQueue::new());
    let job = queue.add(input.clone(), input.clone(), "compress-hevc");

    let registry = Arc::new(EncoderRegistry::software_only());
    let probe = Arc::new(FakeProbe { video_codec: "h264", delay: Duration::ZERO });
    let notify = Arc::new(NullSink);
    let mut config = Config::default();
    config.workers = 1;
    config.encoder_binary = encoder;
    config.keep_larger_files = true;

    let pool = WorkerPool::new(Arc::clone(&queue), registry, probe, notify, config);
    wait_until(Duration::from_secs(5), || {
        queue.get(&job.id).unwrap().status.is_terminal()
    });

    let finished = queue.get(&job.id).unwrap();
    assert_eq!(finished.status, JobStatus::Complete, "{:?}", finished.error);
    assert_eq!(finished.output_path, crate::finalize::final_path(&input, "mkv"));
    assert!(finished.output_path.exists());
    assert_eq!(finished.result.output_size, b"a small transcoded file".len() as u64);
    assert_eq!(finished.origin.source_codec, "h264");

    pool.shutdown();
}

#[test]
fn cancelling_a_running_job_ends_it_as_cancelled_rather_than_requeued() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("movie.mkv");
    std::fs::write(&input, b"source bytes").unwrap();

    let queue = Arc::new(JobQueue::new());
    let job = queue.add(input.clone(), input.clone(), "compress-hevc");

    let registry = Arc::new(EncoderRegistry::software_only());
    // A slow, non-matching probe: the job stays "Running" for the delay,
    // giving the test a window to cancel before the cancellation checkpoint
    // (just after quality resolution, before any subprocess would be spawned).
    let probe = Arc::new(FakeProbe { video_codec: "h264", delay: Duration::from_millis(300) });
    let notify = Arc::new(NullSink);
    let mut config = Config::default();
    config.workers = 1;
    config.encoder_binary = PathBuf::from("/nonexistent/ffmpeg-should-not-run");

    let pool = WorkerPool::new(Arc::clone(&queue), registry, probe, notify, config);
    wait_until(Duration::from_secs(1), || {
        queue.get(&job.id).unwrap().status == JobStatus::Running
    });

    pool.cancel_job(&job.id);

    wait_until(Duration::from_secs(2), || {
        queue.get(&job.id).unwrap().status.is_terminal()
    });
    assert_eq!(queue.get(&job.id).unwrap().status, JobStatus::Cancelled);

    pool.shutdown();
}

#[test]
fn pausing_the_pool_requeues_running_jobs_to_pending_instead_of_cancelling() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("movie.mkv");
    std::fs::write(&input, b"source bytes").unwrap();

    let queue = Arc::new(JobQueue::new());
    let job = queue.add(input.clone(), input.clone(), "compress-hevc");

    let registry = Arc::new(EncoderRegistry::software_only());
    let probe = Arc::new(FakeProbe { video_codec: "h264", delay: Duration::from_millis(300) });
    let notify = Arc::new(NullSink);
    let mut config = Config::default();
    config.workers = 1;
    config.encoder_binary = PathBuf::from("/nonexistent/ffmpeg-should-not-run");

    let pool = WorkerPool::new(Arc::clone(&queue), registry, probe, notify, config);
    wait_until(Duration::from_secs(1), || {
        queue.get(&job.id).unwrap().status == JobStatus::Running
    });

    pool.pause();

    wait_until(Duration::from_secs(2), || {
        queue.get(&job.id).unwrap().status == JobStatus::Pending
    });
    // Paused, so it stays pending rather than being reclaimed immediately.
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(queue.get(&job.id).unwrap().status, JobStatus::Pending);

    pool.resume();
    wait_until(Duration::from_secs(2), || {
        queue.get(&job.id).unwrap().status == JobStatus::Running
    });

    pool.shutdown();
}

#[test]
fn shrinking_worker_count_requeues_the_newest_running_jobs_first() {
    let dir = tempfile::tempdir().unwrap();
    let older_path = dir.path().join("older.mkv");
    let newer_path = dir.path().join("newer.mkv");
    std::fs::write(&older_path, b"older").unwrap();
    std::fs::write(&newer_path, b"newer").unwrap();

    let queue = Arc::new(JobQueue::new());
    let older = queue.add(older_path.clone(), older_path, "compress-hevc");
    let newer = queue.add(newer_path.clone(), newer_path, "compress-hevc");
    assert!(older.id < newer.id);

    let registry = Arc::new(EncoderRegistry::software_only());
    let probe = Arc::new(FakeProbe { video_codec: "h264", delay: Duration::from_millis(400) });
    let notify = Arc::new(NullSink);
    let mut config = Config::default();
    config.workers = 2;
    config.encoder_binary = PathBuf::from("/nonexistent/ffmpeg-should-not-run");

    let pool = WorkerPool::new(Arc::clone(&queue), registry, probe, notify, config);
    wait_until(Duration::from_secs(1), || {
        queue.get(&older.id).unwrap().status == JobStatus::Running
            && queue.get(&newer.id).unwrap().status == JobStatus::Running
    });

    pool.set_worker_count(1);

    wait_until(Duration::from_secs(2), || {
        queue.get(&newer.id).unwrap().status == JobStatus::Pending
    });
    assert_eq!(
        queue.get(&older.id).unwrap().status,
        JobStatus::Running,
        "the older job should be left running when shrinking by one"
    );

    pool.shutdown();
}

#[test]
fn schedule_window_blocks_claims_outside_the_configured_hours() {
    use chrono::Timelike;

    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("movie.mkv");
    std::fs::write(&input, b"source bytes").unwrap();

    let queue = Arc::new(JobQueue::new());
    let job = queue.add(input.clone(), input, "compress-hevc");

    let registry = Arc::new(EncoderRegistry::software_only());
    let probe = Arc::new(FakeProbe { video_codec: "h264", delay: Duration::ZERO });
    let notify = Arc::new(NullSink);
    let mut config = Config::default();
    config.workers = 1;
    config.encoder_binary = PathBuf::from("/nonexistent/ffmpeg-should-not-run");

    // A one-hour window that excludes the current hour, so the job must stay
    // pending until the test widens it back open.
    let current_hour = chrono::Local::now().hour() as u8;
    config.schedule.enabled = true;
    config.schedule.start_hour = (current_hour + 1) % 24;
    config.schedule.end_hour = (current_hour + 2) % 24;

    let pool = WorkerPool::new(Arc::clone(&queue), registry, probe, notify, config.clone());
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(queue.get(&job.id).unwrap().status, JobStatus::Pending, "outside the window, nothing should be claimed");

    config.schedule.enabled = false;
    pool.update_config(config);

    wait_until(Duration::from_secs(2), || {
        queue.get(&job.id).unwrap().status != JobStatus::Pending
    });

    pool.shutdown();
}
