//! Waveform Primitives
//!
//! ## Overview
//!
//! Small, allocation-free functions that turn a sampled response curve into
//! the handful of numbers the rest of the crate reasons about:
//!
//! - [`classify_shape`]: fall / rise / step / noise
//! - [`peak_index`] and [`crossing_index`]: where the curve starts falling and
//!   where it passes one RC time constant (37 % of the peak)
//! - [`nrmse`]: repeatability and match distance between two fingerprints
//! - [`fall_time_us`] and [`pearson_coefficient`]: compact fingerprint
//!   features for the database
//! - [`relative_deviation_pct`]: the percentage deviation every drift score
//!   and database distance is built from
//!
//! ## Shape Classification
//!
//! A genuine sensor discharging through its load produces a curve that falls
//! monotonically from its peak. The classifier looks at three things:
//!
//! ```text
//! range  = max - min                  ≤ noise floor     → Noise
//! jump   = largest |x[i+1] - x[i]|    ≥ step fraction   → Step (if monotonic)
//! trend  = fraction of monotonic steps and first-vs-last sample
//!          falling ≥ threshold, first > last           → Fall
//!          rising  ≥ threshold, last > first           → Rise
//!          otherwise                                   → Noise
//! ```
//!
//! Steps within the noise floor count toward both directions, so a fall
//! curve whose tail has flattened out is still a fall.

use libm::{fabsf, sqrtf};

use crate::constants::fallcurve::FINGERPRINT_LENGTH;
use crate::errors::{VerifyError, VerifyResult};

/// One sampled fall curve
pub type Fingerprint = [u32; FINGERPRINT_LENGTH];

/// Shape class of a sampled response curve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Shape {
    /// Monotonic decay from a peak
    Fall,
    /// Monotonic increase
    Rise,
    /// Single abrupt transition between two flat levels
    Step,
    /// No usable structure
    Noise,
}

/// Parameters for [`classify_shape`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeCriteria {
    /// Minimum fraction of monotonic steps for a fall or rise
    pub shape_threshold: f32,
    /// Variation treated as flat (ADC counts)
    pub noise_floor: u32,
    /// Single-step jump, as a fraction of range, that marks a step
    pub step_jump_fraction: f32,
}

/// Classify the shape of a sampled curve
pub fn classify_shape(samples: &[u32], criteria: &ShapeCriteria) -> Shape {
    if samples.len() < 2 {
        return Shape::Noise;
    }

    let (min, max) = min_max(samples);
    let range = max - min;
    if range <= criteria.noise_floor {
        return Shape::Noise;
    }

    let tolerance = criteria.noise_floor as u64;
    let steps = samples.len() - 1;
    let mut falling = 0usize;
    let mut rising = 0usize;
    let mut largest_jump = 0u32;

    for pair in samples.windows(2) {
        let (prev, next) = (pair[0] as u64, pair[1] as u64);
        if next <= prev + tolerance {
            falling += 1;
        }
        if next + tolerance >= prev {
            rising += 1;
        }
        largest_jump = largest_jump.max(pair[0].abs_diff(pair[1]));
    }

    let falling_fraction = falling as f32 / steps as f32;
    let rising_fraction = rising as f32 / steps as f32;
    let monotonic = falling_fraction >= criteria.shape_threshold || rising_fraction >= criteria.shape_threshold;

    if largest_jump as f32 >= criteria.step_jump_fraction * range as f32 {
        return if monotonic { Shape::Step } else { Shape::Noise };
    }

    let first = samples[0];
    let last = samples[samples.len() - 1];

    if falling_fraction >= criteria.shape_threshold && first > last.saturating_add(criteria.noise_floor) {
        Shape::Fall
    } else if rising_fraction >= criteria.shape_threshold && last > first.saturating_add(criteria.noise_floor) {
        Shape::Rise
    } else {
        Shape::Noise
    }
}

/// Index of the first maximum sample
pub fn peak_index(samples: &[u32]) -> usize {
    let mut best = 0;
    for (i, &value) in samples.iter().enumerate() {
        if value > samples[best] {
            best = i;
        }
    }
    best
}

/// First index at or after the peak whose sample is at most `fraction` of the peak
///
/// `None` when the curve never decays that far inside the window.
pub fn crossing_index(samples: &[u32], fraction: f32) -> Option<usize> {
    if samples.is_empty() {
        return None;
    }
    let peak = peak_index(samples);
    let threshold = samples[peak] as f32 * fraction;

    samples[peak..]
        .iter()
        .position(|&value| value as f32 <= threshold)
        .map(|offset| peak + offset)
}

/// Normalized root-mean-square error of `test` against `reference`
///
/// Normalized by the reference range (at least one count), so identical
/// curves score 0 and a curve that is off by its own amplitude scores ~1.
pub fn nrmse(reference: &[u32], test: &[u32]) -> f32 {
    let len = reference.len().min(test.len());
    if len == 0 {
        return 0.0;
    }

    let mut sum_sq = 0.0f32;
    for (&r, &t) in reference.iter().zip(test.iter()) {
        let diff = r as f32 - t as f32;
        sum_sq += diff * diff;
    }
    let rmse = sqrtf(sum_sq / len as f32);

    let (min, max) = min_max(&reference[..len]);
    let range = (max - min).max(1);
    rmse / range as f32
}

/// Time from the peak to the 37 % crossing (µs)
///
/// `None` when the curve never crosses or the frequency is zero.
pub fn fall_time_us(samples: &[u32], sampling_frequency: u32, fraction: f32) -> Option<u32> {
    if sampling_frequency == 0 {
        return None;
    }
    let crossing = crossing_index(samples, fraction)?;
    let intervals = (crossing - peak_index(samples)) as u64;
    Some((intervals * 1_000_000 / sampling_frequency as u64) as u32)
}

/// Pearson correlation between the samples and their index
///
/// Strongly negative for a fall curve, strongly positive for a rise, and
/// zero for a flat curve.
pub fn pearson_coefficient(samples: &[u32]) -> f32 {
    let n = samples.len();
    if n < 2 {
        return 0.0;
    }

    let mean_x = (n - 1) as f32 / 2.0;
    let mean_y = samples.iter().map(|&v| v as f32).sum::<f32>() / n as f32;

    let mut cov = 0.0f32;
    let mut var_x = 0.0f32;
    let mut var_y = 0.0f32;
    for (i, &value) in samples.iter().enumerate() {
        let dx = i as f32 - mean_x;
        let dy = value as f32 - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_y == 0.0 {
        return 0.0;
    }
    cov / sqrtf(var_x * var_y)
}

/// Absolute deviation of `under_test` from `saved`, in percent of `saved`
///
/// A zero `saved` value makes the ratio meaningless and is rejected rather
/// than turned into infinity.
pub fn relative_deviation_pct(under_test: f32, saved: f32, field: &'static str) -> VerifyResult<f32> {
    if saved == 0.0 || !saved.is_finite() || !under_test.is_finite() {
        return Err(VerifyError::UndefinedDrift { field });
    }
    Ok(fabsf((under_test - saved) / saved) * 100.0)
}

fn min_max(samples: &[u32]) -> (u32, u32) {
    samples
        .iter()
        .fold((u32::MAX, u32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)))
}
