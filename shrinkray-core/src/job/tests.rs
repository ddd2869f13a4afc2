use super::*;

#[test]
fn ids_strictly_increase_with_creation_order() {
    let mut ids: Vec<JobId> = (0..50).map(|_| JobId::new()).collect();
    let sorted = {
        let mut s = ids.clone();
        s.sort();
        s
    };
    assert_eq!(ids, sorted, "ids must already be in creation order");

    // Also true under natural string ordering, since the queue snapshot
    // compares ids as plain strings.
    ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    assert_eq!(ids, sorted);
}

#[test]
fn terminal_statuses_are_closed() {
    for status in [
        JobStatus::Complete,
        JobStatus::Failed,
        JobStatus::Cancelled,
        JobStatus::Skipped,
    ] {
        assert!(status.is_terminal());
    }
    assert!(!JobStatus::Pending.is_terminal());
    assert!(!JobStatus::Running.is_terminal());
}

#[test]
fn new_job_starts_pending_with_a_created_timestamp() {
    let job = Job::new("/in.mkv".into(), "/in.shrinkray.tmp.mkv".into(), "compress-hevc");
    assert_eq!(job.status, JobStatus::Pending);
    assert!(job.timestamps.created.is_some());
    assert!(job.timestamps.started.is_none());
}

#[test]
fn job_round_trips_through_json_preserving_unknown_fields() {
    let mut job = Job::new("/in.mkv".into(), "/in.shrinkray.tmp.mkv".into(), "compress-hevc");
    job.extra.insert("future_field".into(), serde_json::json!(42));

    let text = serde_json::to_string(&job).unwrap();
    let restored: Job = serde_json::from_str(&text).unwrap();
    assert_eq!(restored.extra.get("future_field"), Some(&serde_json::json!(42)));
    assert_eq!(restored.id, job.id);
}
