//! Adaptive Sampling-Frequency Calibration
//!
//! ## Problem
//!
//! A sensor's fall curve only identifies it when the 100-sample window is
//! sampled fast enough to resolve the decay and slow enough to contain it.
//! Nothing about the sensor is known up front, so the frequency is found by
//! search:
//!
//! ```text
//!            ┌──────────────────────────────────────────────┐
//!            ▼                                              │
//!   sample at f ──► classify ──► Fall ──► Undershoot: f = 5f / ln(peak/tail)
//!                      │                  Overshoot:  f = i37·f / (N - P/2)
//!                      │                  Target:     f unchanged
//!                      ├──────► Rise ──► after Step: bisect, else f = max
//!                      ├──────► Step ──► after Rise: bisect, else f = min
//!                      └──────► Noise ─► retry ladder max, mid, min, stop
//!                                            │
//!                     clamp f into [min, max]
//!                                            │
//!             f equals the frequency just sampled? ── no ──┘
//!                          │ yes
//!                          ▼
//!      repeatable (NRMSE < threshold) or noise ─► terminate on shape
//!      otherwise                               ─► Repeatability
//! ```
//!
//! The search is an explicit loop capped at `max_iterations` and polls a
//! [`CancelToken`] once per pass.
//!
//! ## Confidence
//!
//! | Terminal status                | dedicated timer | software delays |
//! |--------------------------------|-----------------|-----------------|
//! | success                        | 100             | 100             |
//! | rise / step / repeatability    | 100             | 50              |
//! | noise / timeout / cancelled    | 0               | 0               |

use core::sync::atomic::{AtomicBool, Ordering};

use libm::logf;

use crate::config::CalibrationConfig;
use crate::constants::fallcurve::{FALL_CROSSING_FRACTION, FINGERPRINT_LENGTH};
use crate::errors::{VerifyError, VerifyResult};
use crate::hal::{DelayUs, FingerprintSampler};
use crate::signal::{classify_shape, crossing_index, nrmse, peak_index, Fingerprint, Shape};

/// Cooperative cancellation flag for a running calibration
///
/// Shared by reference between the calibrating task and whoever may abort
/// it. Checked once per search iteration.
#[derive(Debug, Default)]
pub struct CancelToken {
    cancelled: AtomicBool,
}

impl CancelToken {
    /// Fresh, not cancelled
    pub const fn new() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
        }
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Clear a previous request so the token can be reused
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::Release);
    }
}

/// Where the 37 % crossing of a fall curve sits in the window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallPosition {
    /// Curve never reaches 37 % of its peak
    Undershoot,
    /// Crossing lands too early, the tail is wasted
    Overshoot,
    /// Crossing lands in the trailing precision band
    Target,
}

/// Locate the 37 % crossing of a fall curve relative to the precision band
///
/// Overshoot when more than `precision_threshold` samples follow the
/// crossing index.
pub fn fall_position(fingerprint: &[u32], precision_threshold: usize) -> FallPosition {
    match crossing_index(fingerprint, FALL_CROSSING_FRACTION) {
        None => FallPosition::Undershoot,
        Some(index) if fingerprint.len() - index > precision_threshold => FallPosition::Overshoot,
        Some(_) => FallPosition::Target,
    }
}

/// Result of one calibration run
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationOutcome {
    /// Frequency the sensor operates at from now on (Hz)
    pub sampling_frequency: u32,
    /// Terminal status of the search
    pub status: Result<(), VerifyError>,
    /// 0, 50 or 100
    pub confidence: u8,
    /// Last fingerprint sampled
    pub fingerprint: Fingerprint,
    /// Search iterations executed
    pub iterations: u16,
    /// Shape of the last fingerprint, if one was sampled
    pub shape: Option<Shape>,
}

impl CalibrationOutcome {
    /// Whether the search converged on a repeatable fall curve
    pub fn is_success(&self) -> bool {
        self.status.is_ok()
    }
}

/// Confidence metric for a terminal calibration status
pub fn confidence_for(status: &Result<(), VerifyError>, dedicated_timer: bool) -> u8 {
    match status {
        Ok(()) => 100,
        Err(VerifyError::NoisyFunction | VerifyError::CalibrationTimeout { .. } | VerifyError::Cancelled) => 0,
        Err(_) if dedicated_timer => 100,
        Err(_) => 50,
    }
}

struct PreviousSample {
    fingerprint: Fingerprint,
    frequency: u32,
    shape: Shape,
}

/// Run the sampling-frequency search
///
/// An unusable frequency window is rejected up front with
/// [`VerifyError::InvalidConfig`]. Sampler and delay errors abort the search
/// and are returned as `Err`; every other termination, including shape
/// failures, is reported in the [`CalibrationOutcome`].
pub fn calibrate<S, D>(
    sampler: &mut S,
    delay: &mut D,
    config: &CalibrationConfig,
    cancel: Option<&CancelToken>,
) -> VerifyResult<CalibrationOutcome>
where
    S: FingerprintSampler,
    D: DelayUs,
{
    config.validate()?;
    let criteria = config.shape_criteria();
    let mut frequency = config.clamp_frequency(config.starting_frequency);
    let mut fingerprint: Fingerprint = [0; FINGERPRINT_LENGTH];
    let mut previous: Option<PreviousSample> = None;
    let mut last_shape = None;
    let mut noise_retries = 0u8;
    let mut iterations = 0u16;

    let status = loop {
        if cancel.map_or(false, CancelToken::is_cancelled) {
            break Err(VerifyError::Cancelled);
        }
        if iterations >= config.max_iterations {
            break Err(VerifyError::CalibrationTimeout { iterations });
        }
        if iterations > 0 && config.retry_delay_us > 0 {
            delay.delay_us(config.retry_delay_us);
        }
        iterations += 1;

        sampler.sample_fingerprint(frequency, &mut fingerprint)?;
        let shape = classify_shape(&fingerprint, &criteria);
        last_shape = Some(shape);
        let previous_shape = previous.as_ref().map(|p| p.shape);
        let previous_frequency = previous.as_ref().map(|p| p.frequency);

        let next = match shape {
            Shape::Fall => match fall_position(&fingerprint, config.precision_threshold) {
                FallPosition::Undershoot => undershoot_frequency(&fingerprint, frequency, config),
                FallPosition::Overshoot => overshoot_frequency(&fingerprint, frequency, config),
                FallPosition::Target => frequency,
            },
            Shape::Rise => match (previous_shape, previous_frequency) {
                (Some(Shape::Step), Some(prev)) => midpoint(frequency, prev),
                _ => config.max_frequency,
            },
            Shape::Step => match (previous_shape, previous_frequency) {
                (Some(Shape::Rise), Some(prev)) => midpoint(frequency, prev),
                _ => config.min_frequency,
            },
            Shape::Noise => {
                noise_retries = noise_retries.saturating_add(1);
                match noise_retries {
                    1 => config.max_frequency,
                    2 => config.mid_frequency(),
                    3 => config.min_frequency,
                    _ => frequency,
                }
            }
        };
        let next = config.clamp_frequency(next);

        vt_debug!(
            "calibration pass {}: {:?} at {} Hz, next {} Hz",
            iterations,
            shape,
            frequency,
            next
        );

        if next == frequency {
            if let Some(prev) = previous.as_ref() {
                let distance = nrmse(&prev.fingerprint, &fingerprint);
                if distance < config.repeatability_threshold || shape == Shape::Noise {
                    break match shape {
                        Shape::Fall => Ok(()),
                        Shape::Rise => Err(VerifyError::RisingFunction),
                        Shape::Step => Err(VerifyError::StepFunction),
                        Shape::Noise => Err(VerifyError::NoisyFunction),
                    };
                }
                break Err(VerifyError::Repeatability { nrmse: distance });
            }
        }

        previous = Some(PreviousSample {
            fingerprint,
            frequency,
            shape,
        });
        frequency = next;
    };

    let confidence = confidence_for(&status, delay.has_dedicated_timer());

    match status {
        Ok(()) => {
            vt_info!("calibrated at {} Hz after {} passes", frequency, iterations);
        }
        Err(VerifyError::NoisyFunction) => {
            vt_warn!("no usable response at {} Hz, check the sensor connection", frequency);
        }
        Err(_err) => {
            vt_info!("calibrated at {} Hz with {} (confidence {})", frequency, _err, confidence);
        }
    }

    if config.settle_delay_us > 0 {
        delay.delay_us(config.settle_delay_us);
    }

    Ok(CalibrationOutcome {
        sampling_frequency: frequency,
        status,
        confidence,
        fingerprint,
        iterations,
        shape: last_shape,
    })
}

fn undershoot_frequency(fingerprint: &Fingerprint, frequency: u32, config: &CalibrationConfig) -> u32 {
    let peak = fingerprint[peak_index(fingerprint)] as f32;
    let tail = fingerprint[FINGERPRINT_LENGTH - 1] as f32;
    let decay = logf(peak / tail);

    if !decay.is_finite() || decay <= 0.0 {
        return config.max_frequency;
    }
    let next = 5.0 * frequency as f32 / decay;
    if next >= u32::MAX as f32 {
        config.max_frequency
    } else {
        next as u32
    }
}

fn overshoot_frequency(fingerprint: &Fingerprint, frequency: u32, config: &CalibrationConfig) -> u32 {
    let Some(index) = crossing_index(fingerprint, FALL_CROSSING_FRACTION) else {
        return frequency;
    };
    let window = FINGERPRINT_LENGTH.saturating_sub(config.precision_threshold / 2).max(1);
    (index as u64 * frequency as u64 / window as u64) as u32
}

fn midpoint(a: u32, b: u32) -> u32 {
    ((a as u64 + b as u64) / 2) as u32
}
