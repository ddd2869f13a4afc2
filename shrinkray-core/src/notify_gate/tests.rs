use super::*;

#[test]
fn does_not_fire_before_any_job_finishes() {
    let gate = NotificationGate::new();
    gate.on_job_admitted();
    assert!(!gate.should_fire(0, 0), "no job has finished yet, even though the queue is quiescent");
}

#[test]
fn fires_once_on_the_falling_edge_after_a_job_finishes() {
    let gate = NotificationGate::new();
    gate.on_job_admitted();
    assert!(!gate.should_fire(1, 0), "still active: one job running");
    gate.on_job_terminal();
    assert!(gate.should_fire(0, 0), "queue just became quiescent with a finished job");
    assert!(!gate.should_fire(0, 0), "must not fire twice for the same edge");
}

#[test]
fn rearms_when_a_new_job_is_admitted() {
    let gate = NotificationGate::new();
    gate.on_job_admitted();
    gate.on_job_terminal();
    assert!(gate.should_fire(0, 0));

    gate.on_job_admitted();
    assert!(!gate.should_fire(1, 0));
    gate.on_job_terminal();
    assert!(gate.should_fire(0, 0), "must fire again for the new batch");
}

#[test]
fn concurrent_terminal_reports_only_fire_once() {
    let gate = NotificationGate::new();
    gate.on_job_admitted();
    gate.on_job_terminal();
    gate.on_job_terminal();

    let fires = (0..8).filter(|_| gate.should_fire(0, 0)).count();
    assert_eq!(fires, 1);
}
