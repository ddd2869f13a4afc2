use super::*;

#[test]
fn defaults_are_already_in_bounds() {
    let mut cfg = Config::default();
    let before = cfg.clone();
    cfg.coerce_bounds();
    assert_eq!(cfg, before);
}

#[test]
fn worker_count_coerces_to_bounds() {
    let mut cfg = Config::default();
    cfg.workers = 99;
    cfg.coerce_bounds();
    assert_eq!(cfg.workers, MAX_WORKERS);

    cfg.workers = 0;
    cfg.coerce_bounds();
    assert_eq!(cfg.workers, MIN_WORKERS);
}

#[test]
fn quality_coerces_to_bounds() {
    let mut cfg = Config::default();
    cfg.quality_hevc = 255;
    cfg.quality_av1 = 0;
    cfg.coerce_bounds();
    assert_eq!(cfg.quality_hevc, MAX_QUALITY_HEVC);
    assert_eq!(cfg.quality_av1, MIN_QUALITY_AV1);
}

#[test]
fn unknown_tonemap_algorithm_falls_back_to_hable() {
    assert_eq!(
        TonemapAlgorithm::from_str("not-a-real-algorithm").unwrap(),
        TonemapAlgorithm::Hable
    );
    assert_eq!(TonemapAlgorithm::from_str("bt2390").unwrap(), TonemapAlgorithm::Bt2390);
}

#[test]
fn schedule_window_handles_midnight_wrap() {
    let window = ScheduleWindow {
        enabled: true,
        start_hour: 22,
        end_hour: 6,
    };
    assert!(window.contains_hour(23));
    assert!(window.contains_hour(2));
    assert!(!window.contains_hour(12));
}

#[test]
fn schedule_window_disabled_is_always_open() {
    let window = ScheduleWindow {
        enabled: false,
        start_hour: 9,
        end_hour: 17,
    };
    assert!(window.contains_hour(3));
}

#[test]
fn config_update_patches_only_named_fields() {
    let mut cfg = Config::default();
    cfg.apply_update(ConfigUpdate {
        workers: Some(4),
        ..Default::default()
    });
    assert_eq!(cfg.workers, 4);
    assert_eq!(cfg.quality_hevc, 26);
}

#[test]
fn unknown_fields_round_trip_through_extra() {
    let json = serde_json::json!({
        "workers": 2,
        "original_handling": "replace",
        "keep_larger_files": false,
        "quality_hevc": 26,
        "quality_av1": 35,
        "schedule": {"enabled": false, "start_hour": 0, "end_hour": 24},
        "output_format": "mkv",
        "tonemap_hdr": true,
        "tonemap_algorithm": "hable",
        "notify_on_complete": false,
        "notification": {"user_key": null, "app_token": null},
        "encoder_binary": "ffmpeg",
        "probe_binary": "ffprobe",
        "future_field_from_a_newer_release": 42,
    });
    let cfg: Config = serde_json::from_value(json).unwrap();
    assert_eq!(
        cfg.extra.get("future_field_from_a_newer_release"),
        Some(&serde_json::json!(42))
    );
    let round_tripped = serde_json::to_value(&cfg).unwrap();
    assert_eq!(
        round_tripped.get("future_field_from_a_newer_release"),
        Some(&serde_json::json!(42))
    );
}
