//! The bracketed interpolated search: finds the most-compressed quality
//! setting whose trial-encode VMAF score still meets a threshold, in at most
//! six trial-encoder calls.

#[cfg(test)]
mod tests;

use thiserror::Error;

/// A concrete quality value to hand to a trial encode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Quality {
    Crf(u32),
    Modifier(f32),
}

/// The two shapes a search space can take, per the backend's quality knob.
#[derive(Debug, Clone, Copy)]
pub enum QualitySpace {
    /// Integer CRF/CQ/QP range; lower is better quality.
    Crf { min: u32, max: u32 },
    /// Bitrate modifier range; higher is better quality.
    Modifier { min_mod: f32, max_mod: f32 },
}

const MIN_MODIFIER_RANGE: f64 = 0.05;
const TIGHT_CRF_POINTS: f64 = 3.0;

impl QualitySpace {
    /// Maps a normalized compression coordinate (0 = best quality, 1 = most
    /// compressed) to a concrete quality value in this space.
    fn quality_at(&self, x: f64) -> Quality {
        match *self {
            Self::Crf { min, max } => {
                let value = min as f64 + x * (max as f64 - min as f64);
                Quality::Crf(value.round().clamp(min as f64, max as f64) as u32)
            }
            Self::Modifier { min_mod, max_mod } => {
                let value = max_mod as f64 - x * (max_mod as f64 - min_mod as f64);
                Quality::Modifier(value.clamp(min_mod as f64, max_mod as f64) as f32)
            }
        }
    }

    fn is_tight(&self, x_lo: f64, x_hi: f64) -> bool {
        match *self {
            Self::Crf { min, max } => (x_hi - x_lo) * (max as f64 - min as f64) <= TIGHT_CRF_POINTS,
            Self::Modifier { min_mod, max_mod } => {
                (x_hi - x_lo) * (max_mod as f64 - min_mod as f64) <= 3.0 * MIN_MODIFIER_RANGE
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("trial encode failed: {0}")]
    Trial(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub quality: Quality,
    pub score: f64,
    pub trial_count: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchResult {
    Found(SearchOutcome),
    /// The best-quality extreme still fails the threshold.
    Impossible,
}

const MAX_ITERATIONS: u32 = 4;

/// Runs the search. `trial` encodes at the given quality and returns the
/// aggregated VMAF score; it is called at most `2 + MAX_ITERATIONS` times.
pub fn search(
    space: QualitySpace,
    threshold: f64,
    mut trial: impl FnMut(Quality) -> Result<f64, SearchError>,
) -> Result<SearchResult, SearchError> {
    let mut trial_count = 0u32;
    let mut call = |x: f64| -> Result<f64, SearchError> {
        trial_count += 1;
        trial(space.quality_at(x))
    };

    let best_quality_score = call(0.0)?;
    if best_quality_score < threshold {
        return Ok(SearchResult::Impossible);
    }

    let most_compressed_score = call(1.0)?;
    if most_compressed_score >= threshold {
        return Ok(SearchResult::Found(SearchOutcome {
            quality: space.quality_at(1.0),
            score: most_compressed_score,
            trial_count,
        }));
    }

    // Invariant from here on: b (better bound) always meets the threshold,
    // w (worse bound) always fails it.
    let mut b_x = 0.0f64;
    let mut b_score = best_quality_score;
    let mut w_x = 1.0f64;
    let mut w_score = most_compressed_score;

    for iter in 1..=MAX_ITERATIONS {
        let raw_candidate = if iter == 1 {
            0.8
        } else {
            let denom = b_score - w_score;
            if denom <= 0.0 {
                (b_x + w_x) / 2.0
            } else {
                w_x + (threshold - w_score) / denom * (b_x - w_x)
            }
        };

        let lo = b_x.min(w_x);
        let hi = b_x.max(w_x);
        let eps = ((hi - lo) * 0.01).clamp(0.0, (hi - lo) / 2.0);
        let candidate_x = raw_candidate.clamp(lo + eps, hi - eps);

        let score = call(candidate_x)?;
        if score >= threshold {
            b_x = candidate_x;
            b_score = score;
        } else {
            w_x = candidate_x;
            w_score = score;
        }

        let tolerance = 0.5 + 0.5 * (iter as f64 - 1.0);
        if space.is_tight(b_x.min(w_x), b_x.max(w_x)) && (b_score - threshold) <= tolerance {
            break;
        }
    }

    Ok(SearchResult::Found(SearchOutcome {
        quality: space.quality_at(b_x),
        score: b_score,
        trial_count,
    }))
}
