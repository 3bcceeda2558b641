//! Percentile-based isovalue selection.

use thiserror::Error;

/// Percentile used when a request does not name one.
pub const DEFAULT_PERCENTILE: f64 = 99.5;

#[derive(Debug, Error, PartialEq)]
pub enum ThresholdError {
    #[error("Percentile must lie strictly between 0 and 100, got {0}")]
    InvalidPercentile(f64),

    #[error("Cannot take a percentile of an empty sample set")]
    Empty,
}

/// Reject NaN and values outside the open interval (0, 100).
pub fn validate_percentile(percentile: f64) -> Result<f64, ThresholdError> {
    if percentile > 0.0 && percentile < 100.0 {
        Ok(percentile)
    } else {
        Err(ThresholdError::InvalidPercentile(percentile))
    }
}

/// Value below or at which `percentile` percent of `samples` fall.
///
/// The rank `p / 100 * (n - 1)` is located between two order statistics and
/// the result is linearly interpolated between them. Order statistics are
/// found by selection on a private copy, so the input is left untouched and
/// no full sort is needed.
pub fn percentile(samples: &[i32], percentile: f64) -> Result<f64, ThresholdError> {
    let percentile = validate_percentile(percentile)?;
    if samples.is_empty() {
        return Err(ThresholdError::Empty);
    }

    let rank = percentile / 100.0 * (samples.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let fraction = rank - lower as f64;

    let mut scratch = samples.to_vec();
    let (_, &mut below, above) = scratch.select_nth_unstable(lower);
    // Everything after the pivot is >= it; the next order statistic is the
    // smallest of those.
    let above = above.iter().copied().min().unwrap_or(below);

    Ok(lerp(f64::from(below), f64::from(above), fraction))
}

/// Linear interpolation evaluated from the nearer endpoint, which keeps the
/// result exact at both ends and monotonic in between.
fn lerp(a: f64, b: f64, t: f64) -> f64 {
    let diff = b - a;
    if t >= 0.5 {
        b - diff * (1.0 - t)
    } else {
        a + diff * t
    }
}
