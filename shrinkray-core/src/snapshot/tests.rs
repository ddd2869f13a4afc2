use std::path::PathBuf;

use super::*;
use crate::job::Job;

fn sample_job() -> Job {
    Job::new(PathBuf::from("/in.mkv"), PathBuf::from("/in.shrinkray.tmp.mkv"), "compress-hevc")
}

#[test]
fn load_missing_file_is_an_empty_queue() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.json");
    assert_eq!(load(&path).unwrap(), Vec::new());
}

#[test]
fn save_then_load_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.json");

    let mut job = sample_job();
    job.status = JobStatus::Complete;
    save(&path, &[job.clone()]).unwrap();

    let loaded = load(&path).unwrap();
    assert_eq!(loaded, vec![job]);
}

#[test]
fn running_jobs_are_demoted_to_pending_on_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.json");

    let mut job = sample_job();
    job.status = JobStatus::Running;
    save(&path, &[job]).unwrap();

    let loaded = load(&path).unwrap();
    assert_eq!(loaded[0].status, JobStatus::Pending);
}

#[test]
fn unknown_fields_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.json");

    // Simulate a newer schema writing a field this version doesn't know about.
    let text = serde_json::json!({
        "jobs": [],
        "schema_version": 7
    });
    std::fs::write(&path, text.to_string()).unwrap();

    let jobs = load(&path).unwrap();
    assert!(jobs.is_empty());
}

#[test]
fn write_is_atomic_via_temp_then_rename() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.json");
    save(&path, &[sample_job()]).unwrap();
    assert!(path.exists());
    assert!(!tmp_path_for(&path).exists(), "temp file must not survive a successful save");
}
