//! Aggregation of per-sample VMAF scores into a single number the search can
//! compare against its threshold.

#[cfg(test)]
mod tests;

use std::cmp::Ordering;

/// Arithmetic mean for one or two samples; trimmed mean (drop the lowest and
/// highest score) for three or more, per the pinned Open Question resolution.
pub fn aggregate(scores: &[f64]) -> f64 {
    assert!(!scores.is_empty(), "aggregate called with no scores");

    if scores.len() <= 2 {
        scores.iter().sum::<f64>() / scores.len() as f64
    } else {
        let mut sorted = scores.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        let trimmed = &sorted[1..sorted.len() - 1];
        trimmed.iter().sum::<f64>() / trimmed.len() as f64
    }
}
