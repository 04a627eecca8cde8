//! Tunable parameters
//!
//! Every threshold the calibration search, the template database and the
//! current-sense engine consult lives here instead of in the algorithms. The
//! defaults come from [`constants`](crate::constants); deployments with
//! unusual sensors override individual fields or start from a preset.
//!
//! With the `serde` feature the structs can be loaded from the device's
//! provisioning document; missing fields keep their defaults.
//!
//! ```rust
//! use verisense_core::config::CalibrationConfig;
//!
//! let config = CalibrationConfig {
//!     starting_frequency: 2000,
//!     ..CalibrationConfig::quick()
//! };
//! assert_eq!(config.max_frequency, 20_000);
//! assert_eq!(config.settle_delay_us, 0);
//! ```

use crate::constants::{currentsense, fallcurve};
use crate::errors::{VerifyError, VerifyResult};
use crate::signal::ShapeCriteria;

/// Parameters of the fall-curve sampling-frequency search
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CalibrationConfig {
    /// Frequency the first fingerprint is sampled at (Hz)
    pub starting_frequency: u32,

    /// Lowest frequency the search may settle on (Hz)
    pub min_frequency: u32,

    /// Highest frequency the search may settle on (Hz)
    pub max_frequency: u32,

    /// Trailing samples the 37 % crossing may land in and still be on target
    pub precision_threshold: usize,

    /// NRMSE below which consecutive fingerprints count as repeatable
    pub repeatability_threshold: f32,

    /// Minimum fraction of monotonic steps for a fall or rise
    pub shape_threshold: f32,

    /// Variation (ADC counts) treated as flat
    pub noise_floor: u32,

    /// Single-step jump, as a fraction of range, that marks a step curve
    pub step_jump_fraction: f32,

    /// Iteration ceiling for the search
    pub max_iterations: u16,

    /// Pause between search iterations (µs)
    pub retry_delay_us: u32,

    /// Pause after the search finishes (µs)
    pub settle_delay_us: u32,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            starting_frequency: fallcurve::STARTING_FREQUENCY,
            min_frequency: fallcurve::MINIMUM_FREQUENCY,
            max_frequency: fallcurve::MAXIMUM_FREQUENCY,
            precision_threshold: fallcurve::PRECISION_THRESHOLD,
            repeatability_threshold: fallcurve::REPEATABILITY_THRESHOLD,
            shape_threshold: fallcurve::SHAPE_THRESHOLD,
            noise_floor: fallcurve::NOISE_FLOOR_COUNTS,
            step_jump_fraction: fallcurve::STEP_JUMP_FRACTION,
            max_iterations: fallcurve::MAX_CALIBRATION_ITERATIONS,
            retry_delay_us: 0,
            settle_delay_us: fallcurve::SETTLE_DELAY_US,
        }
    }
}

impl CalibrationConfig {
    /// Create a config with a custom frequency window
    pub fn new_with_limits(min_frequency: u32, max_frequency: u32) -> Self {
        // Swapped bounds are a provisioning typo, not a request for an empty window
        let (min, max) = if min_frequency > max_frequency {
            (max_frequency, min_frequency)
        } else {
            (min_frequency, max_frequency)
        };
        let min = min.max(1);

        Self {
            starting_frequency: fallcurve::STARTING_FREQUENCY.clamp(min, max.max(min)),
            min_frequency: min,
            max_frequency: max.max(min),
            ..Self::default()
        }
    }

    /// No settle or retry pauses, for bench fixtures and host-side replays
    pub fn quick() -> Self {
        Self {
            settle_delay_us: 0,
            retry_delay_us: 0,
            ..Self::default()
        }
    }

    /// Midpoint of the frequency window
    pub fn mid_frequency(&self) -> u32 {
        ((self.min_frequency as u64 + self.max_frequency as u64) / 2) as u32
    }

    /// Clamp a candidate frequency into the configured window
    ///
    /// Never panics; an inverted window resolves to `max_frequency`, which
    /// [`validate`](Self::validate) rejects before a search starts.
    pub fn clamp_frequency(&self, frequency: u32) -> u32 {
        frequency.max(self.min_frequency).min(self.max_frequency)
    }

    /// Check the frequency window before a search uses it
    ///
    /// Deserialized configs bypass [`new_with_limits`](Self::new_with_limits),
    /// so a document carrying only `min_frequency` can end up above the
    /// default maximum.
    pub fn validate(&self) -> VerifyResult<()> {
        if self.min_frequency == 0 {
            return Err(VerifyError::InvalidConfig { field: "min_frequency" });
        }
        if self.min_frequency > self.max_frequency {
            return Err(VerifyError::InvalidConfig { field: "max_frequency" });
        }
        Ok(())
    }

    /// Shape classification parameters
    pub fn shape_criteria(&self) -> ShapeCriteria {
        ShapeCriteria {
            shape_threshold: self.shape_threshold,
            noise_floor: self.noise_floor,
            step_jump_fraction: self.step_jump_fraction,
        }
    }
}

/// Distance limits for the template database nearest-match search
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MatchThresholds {
    /// Maximum NRMSE between fingerprints
    pub repeatability_threshold: f32,

    /// Maximum fall-time difference (%)
    pub fall_time_threshold: f32,

    /// Maximum Pearson-coefficient difference (%)
    pub pearson_coefficient_threshold: f32,
}

impl Default for MatchThresholds {
    fn default() -> Self {
        Self {
            repeatability_threshold: fallcurve::REPEATABILITY_THRESHOLD,
            fall_time_threshold: fallcurve::FALL_TIME_THRESHOLD,
            pearson_coefficient_threshold: fallcurve::PEARSON_COEFFICIENT_THRESHOLD,
        }
    }
}

impl MatchThresholds {
    /// Halved tolerances for sites with several near-identical sensors
    pub fn strict() -> Self {
        let default = Self::default();
        Self {
            repeatability_threshold: default.repeatability_threshold / 2.0,
            fall_time_threshold: default.fall_time_threshold / 2.0,
            pearson_coefficient_threshold: default.pearson_coefficient_threshold / 2.0,
        }
    }
}

/// Parameters of the current-sense signature engine
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CurrentSenseConfig {
    /// First rung of the candidate sampling-frequency ladder (Hz)
    pub max_sampling_frequency: f32,

    /// Ladder stops before dropping under this frequency (Hz)
    pub min_sampling_frequency: f32,

    /// Ratio between consecutive ladder rungs
    pub frequency_ladder_ratio: f32,

    /// Full periods a buffer needs to count as a repeating signature
    pub min_signature_periods: usize,

    /// Minimum peak-to-trough contrast of a signature
    pub min_signature_amplitude: f32,

    /// Drift (%) at which the sensor is reported faulty
    pub drift_threshold: f32,

    /// Bound on the wait for the acquisition producer (ms)
    pub collection_timeout_ms: u32,
}

impl Default for CurrentSenseConfig {
    fn default() -> Self {
        Self {
            max_sampling_frequency: currentsense::MAX_SAMPLING_FREQUENCY,
            min_sampling_frequency: currentsense::MIN_SAMPLING_FREQUENCY,
            frequency_ladder_ratio: currentsense::FREQUENCY_LADDER_RATIO,
            min_signature_periods: currentsense::MIN_SIGNATURE_PERIODS,
            min_signature_amplitude: currentsense::MIN_SIGNATURE_AMPLITUDE,
            drift_threshold: currentsense::DRIFT_THRESHOLD,
            collection_timeout_ms: currentsense::COLLECTION_TIMEOUT_MS,
        }
    }
}
