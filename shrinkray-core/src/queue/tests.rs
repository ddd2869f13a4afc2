use std::path::PathBuf;

use super::*;

fn paths(name: &str) -> (PathBuf, PathBuf) {
    (PathBuf::from(format!("/lib/{name}.mkv")), temp_output_path(&PathBuf::from(format!("/lib/{name}.mkv")), "mkv"))
}

#[test]
fn temp_output_path_follows_the_documented_convention() {
    let path = temp_output_path(Path::new("/lib/movie.mkv"), "mkv");
    assert_eq!(path, PathBuf::from("/lib/movie.shrinkray.tmp.mkv"));
}

#[test]
fn claim_next_pending_returns_jobs_in_creation_order() {
    let queue = JobQueue::new();
    let (a_in, a_out) = paths("a");
    let (b_in, b_out) = paths("b");
    let a = queue.add(a_in, a_out, "compress-hevc");
    let b = queue.add(b_in, b_out, "compress-hevc");

    let first = queue.claim_next_pending().unwrap();
    assert_eq!(first.id, a.id);
    let second = queue.claim_next_pending().unwrap();
    assert_eq!(second.id, b.id);
    assert!(queue.claim_next_pending().is_none());
}

#[test]
fn claim_marks_running_and_only_one_claim_per_job() {
    let queue = JobQueue::new();
    let (i, o) = paths("a");
    queue.add(i, o, "compress-hevc");
    let claimed = queue.claim_next_pending().unwrap();
    assert_eq!(claimed.status, JobStatus::Running);
    assert!(queue.claim_next_pending().is_none(), "no second pending job to claim");
}

#[test]
fn cancel_pending_job_transitions_without_running() {
    let queue = JobQueue::new();
    let (i, o) = paths("a");
    let job = queue.add(i, o, "compress-hevc");
    let cancelled = queue.cancel(&job.id).unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);
}

#[test]
fn cancel_is_idempotent_on_a_terminal_job() {
    let queue = JobQueue::new();
    let (i, o) = paths("a");
    let job = queue.add(i, o, "compress-hevc");
    queue.cancel(&job.id);
    let again = queue.cancel(&job.id).unwrap();
    assert_eq!(again.status, JobStatus::Cancelled);
}

#[test]
fn requeue_to_pending_resets_a_running_job_without_terminating_it() {
    let queue = JobQueue::new();
    let (i, o) = paths("a");
    let job = queue.add(i, o, "compress-hevc");
    queue.claim_next_pending();

    let requeued = queue.requeue_to_pending(&job.id).unwrap();
    assert_eq!(requeued.status, JobStatus::Pending);
    assert!(requeued.timestamps.started.is_none());

    // The job is claimable again, unlike a cancelled job.
    let reclaimed = queue.claim_next_pending().unwrap();
    assert_eq!(reclaimed.id, job.id);
}

#[test]
fn requeue_to_pending_is_a_no_op_on_a_terminal_job() {
    let queue = JobQueue::new();
    let (i, o) = paths("a");
    let job = queue.add(i, o, "compress-hevc");
    queue.cancel(&job.id);

    let result = queue.requeue_to_pending(&job.id).unwrap();
    assert_eq!(result.status, JobStatus::Cancelled, "terminal jobs never leave their terminal state");
}

#[test]
fn clear_never_removes_running_jobs() {
    let queue = JobQueue::new();
    let (i, o) = paths("a");
    queue.add(i, o, "compress-hevc");
    queue.claim_next_pending();
    let removed = queue.clear(None);
    assert_eq!(removed, 0);
    assert_eq!(queue.stats().running, 1);
}

#[test]
fn clear_with_status_filter_only_removes_matching() {
    let queue = JobQueue::new();
    let (i1, o1) = paths("a");
    let (i2, o2) = paths("b");
    let a = queue.add(i1, o1, "compress-hevc");
    queue.add(i2, o2, "compress-hevc");
    queue.cancel(&a.id);

    let removed = queue.clear(Some(JobStatus::Cancelled));
    assert_eq!(removed, 1);
    assert_eq!(queue.stats().pending, 1);
}

#[test]
fn subscriber_receives_init_then_subsequent_events() {
    let queue = JobQueue::new();
    let (_id, rx) = queue.subscribe();
    match rx.try_recv().unwrap() {
        QueueEvent::Init { jobs, .. } => assert!(jobs.is_empty()),
        other => panic!("expected Init, got {other:?}"),
    }

    let (i, o) = paths("a");
    queue.add(i, o, "compress-hevc");
    match rx.try_recv().unwrap() {
        QueueEvent::JobAdded { .. } => {}
        other => panic!("expected JobAdded, got {other:?}"),
    }
}

#[test]
fn unsubscribed_subscriber_stops_receiving_events() {
    let queue = JobQueue::new();
    let (id, rx) = queue.subscribe();
    let _ = rx.try_recv(); // drain Init
    queue.unsubscribe(id);

    let (i, o) = paths("a");
    queue.add(i, o, "compress-hevc");
    assert!(rx.try_recv().is_err());
}

#[test]
fn snapshot_round_trip_preserves_state_modulo_crash_recovery() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot_path = dir.path().join("queue.json");

    let queue = JobQueue::load_or_new(snapshot_path.clone()).unwrap();
    let (i1, o1) = paths("a");
    let (i2, o2) = paths("b");
    queue.add(i1, o1, "compress-hevc");
    let running = queue.add(i2, o2, "compress-hevc");
    queue.claim_next_pending(); // claims "a"
    let _ = running; // "b" stays pending

    let reloaded = JobQueue::load_or_new(snapshot_path).unwrap();
    let jobs = reloaded.get_all();
    assert_eq!(jobs.len(), 2);
    // The job that was running at save time comes back pending.
    assert!(jobs.iter().all(|j| j.status == JobStatus::Pending));
}

#[test]
fn at_most_one_runner_holds_the_same_job() {
    let queue = JobQueue::new();
    let (i, o) = paths("a");
    queue.add(i, o, "compress-hevc");

    let claims: Vec<_> = (0..4).filter_map(|_| queue.claim_next_pending()).collect();
    assert_eq!(claims.len(), 1, "only one claim should ever succeed for a single pending job");
}
