use super::*;

#[test]
fn single_sample_is_itself() {
    assert_eq!(aggregate(&[91.5]), 91.5);
}

#[test]
fn two_samples_average() {
    assert_eq!(aggregate(&[90.0, 94.0]), 92.0);
}

#[test]
fn three_or_more_samples_drop_min_and_max() {
    assert_eq!(aggregate(&[80.0, 90.0, 95.0]), 90.0);
    assert_eq!(aggregate(&[80.0, 90.0, 92.0, 95.0]), 91.0);
}

#[test]
#[should_panic]
fn empty_scores_panics() {
    aggregate(&[]);
}
