use super::*;

#[test]
fn percent_and_eta_are_derived_from_out_time_and_speed() {
    let mut fields = ProgressFields::default();
    fields.set("out_time_us", "50000000"); // 50s
    fields.set("speed", "2.5x");
    let progress = TranscodeProgress::from_fields(&fields, Duration::from_secs(100));

    assert!((progress.percent - 50.0).abs() < 1e-9);
    assert_eq!(progress.speed, 2.5);
    let eta = progress.eta.expect("speed > 0 implies an eta");
    assert!((eta.as_secs_f64() - 20.0).abs() < 1e-6);
}

#[test]
fn percent_clamps_to_100_when_out_time_overshoots_duration() {
    let mut fields = ProgressFields::default();
    fields.set("out_time_us", "120000000");
    let progress = TranscodeProgress::from_fields(&fields, Duration::from_secs(100));
    assert_eq!(progress.percent, 100.0);
}

#[test]
fn zero_speed_yields_no_eta() {
    let fields = ProgressFields::default();
    let progress = TranscodeProgress::from_fields(&fields, Duration::from_secs(100));
    assert_eq!(progress.eta, None);
    assert_eq!(progress.percent, 0.0);
}

#[test]
fn bitrate_and_speed_suffixes_are_stripped() {
    let mut fields = ProgressFields::default();
    fields.set("bitrate", "4521.3kbits/s");
    fields.set("speed", "1.02x");
    assert_eq!(fields.bitrate_kbps, Some(4521.3));
    assert_eq!(fields.speed, Some(1.02));
}

#[test]
fn unknown_progress_keys_are_ignored() {
    let mut fields = ProgressFields::default();
    fields.set("stream_0_0_q", "23.0");
    assert_eq!(fields.frame, None);
    assert_eq!(fields.fps, None);
}

#[test]
fn cancel_handle_starts_uncancelled() {
    let handle = CancelHandle::new();
    assert!(!handle.is_cancelled());
    handle.cancel();
    assert!(handle.is_cancelled());
}

#[test]
fn cancelling_a_run_removes_partial_output_and_returns_cancelled() {
    // A stand-in encoder binary that ignores every argument ffmpeg would be
    // given (-i, -progress pipe:1, ...) and just outlives the cancel signal.
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("fake_encoder.sh");
    std::fs::write(&script, "#!/bin/sh\nsleep 5\n").unwrap();
    let mut perms = std::fs::metadata(&script).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&script, &perms).unwrap();

    let output = dir.path().join("out.mkv");
    std::fs::write(&output, b"partial").unwrap();

    let transcoder = Transcoder::new(script);
    let cancel = CancelHandle::new();
    let cancel_clone = cancel.clone();
    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        cancel_clone.cancel();
    });

    let (tx, _rx) = crossbeam_channel::unbounded();
    let result = transcoder.run(
        Path::new("/dev/null"),
        &output,
        &[],
        &[],
        Duration::from_secs(1),
        cancel,
        tx,
    );

    assert!(matches!(result, Err(TranscodeError::Cancelled)));
    assert!(!output.exists());
}
