use super::*;

fn linear_scorer(q: Quality) -> f64 {
    match q {
        Quality::Crf(c) => 100.0 - c as f64,
        Quality::Modifier(m) => m as f64 * 100.0,
    }
}

#[test]
fn best_quality_extreme_failing_threshold_is_impossible() {
    let space = QualitySpace::Crf { min: 0, max: 63 };
    let result = search(space, 999.0, |q| Ok(linear_scorer(q))).unwrap();
    assert_eq!(result, SearchResult::Impossible);
}

#[test]
fn most_compressed_extreme_meeting_threshold_returns_immediately() {
    let space = QualitySpace::Crf { min: 0, max: 10 };
    let mut calls = 0;
    let result = search(space, 10.0, |q| {
        calls += 1;
        Ok(linear_scorer(q))
    })
    .unwrap();
    assert_eq!(calls, 2);
    match result {
        SearchResult::Found(outcome) => assert_eq!(outcome.quality, Quality::Crf(10)),
        other => panic!("expected Found, got {other:?}"),
    }
}

#[test]
fn search_monotonicity_oracle() {
    let space = QualitySpace::Crf { min: 0, max: 63 };
    let threshold = 80.0;
    let result = search(space, threshold, |q| Ok(linear_scorer(q))).unwrap();

    let optimal_crf = 20u32; // largest crf with (100 - crf) >= 80
    match result {
        SearchResult::Found(outcome) => {
            let Quality::Crf(found) = outcome.quality else { panic!("expected Crf quality") };
            assert!(
                found.abs_diff(optimal_crf) <= 1,
                "expected crf within 1 of {optimal_crf}, got {found}"
            );
            assert!(outcome.score >= threshold);
        }
        other => panic!("expected Found, got {other:?}"),
    }
}

#[test]
fn search_terminates_within_six_trial_calls_regardless_of_inputs() {
    let space = QualitySpace::Crf { min: 0, max: 63 };
    for threshold in [10.0, 50.0, 80.0, 95.0, 99.9] {
        let mut calls = 0;
        let _ = search(space, threshold, |q| {
            calls += 1;
            Ok(linear_scorer(q))
        })
        .unwrap();
        assert!(calls <= 6, "threshold {threshold} used {calls} calls");
    }
}

#[test]
fn modifier_space_searches_toward_the_lowest_qualifying_modifier() {
    let space = QualitySpace::Modifier { min_mod: 0.1, max_mod: 0.5 };
    let result = search(space, 30.0, |q| Ok(linear_scorer(q))).unwrap();
    match result {
        SearchResult::Found(outcome) => {
            let Quality::Modifier(m) = outcome.quality else { panic!("expected Modifier quality") };
            assert!((0.1..=0.5).contains(&m));
            assert!(outcome.score >= 30.0 - 1e-6);
        }
        other => panic!("expected Found, got {other:?}"),
    }
}

#[test]
fn non_monotonic_scores_fall_back_to_midpoint_without_panicking() {
    let space = QualitySpace::Crf { min: 0, max: 63 };
    // A deliberately noisy scorer: same score everywhere after the extremes,
    // which makes the interpolation denominator non-positive.
    let result = search(space, 50.0, |q| match q {
        Quality::Crf(0) => Ok(90.0),
        Quality::Crf(63) => Ok(10.0),
        _ => Ok(40.0),
    });
    assert!(result.is_ok());
}
