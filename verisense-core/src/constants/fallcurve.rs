//! Fall-Curve Calibration and Template Database Limits
//!
//! Defaults for the adaptive sampling-frequency search and the fingerprint
//! database. Every threshold here is only a default: the values flow through
//! [`CalibrationConfig`](crate::config::CalibrationConfig) and
//! [`MatchThresholds`](crate::config::MatchThresholds) so deployments can
//! retune them against reference hardware traces.

// ===== FINGERPRINT GEOMETRY =====

/// Samples in one captured fall curve.
///
/// 100 samples × 4 bytes = 400 bytes per fingerprint, which keeps a full
/// database of ten fingerprints under 4.1 KB.
pub const FINGERPRINT_LENGTH: usize = 100;

/// Fraction of the peak amplitude that marks one RC time constant.
///
/// A discharging capacitor reaches 1/e ≈ 36.8 % of its starting voltage
/// after one time constant; 37 % is the classic rounded value.
pub const FALL_CROSSING_FRACTION: f32 = 0.37;

// ===== SEARCH THRESHOLDS =====

/// Minimum fraction of monotonic sample-to-sample steps for a curve to be
/// classified as a fall or rise.
pub const SHAPE_THRESHOLD: f32 = 0.85;

/// Number of trailing samples the 37 % crossing may land in without being
/// treated as an overshoot.
pub const PRECISION_THRESHOLD: usize = 20;

/// NRMSE below which two fingerprints count as the same waveform.
pub const REPEATABILITY_THRESHOLD: f32 = 0.3;

/// Sampling frequency the search starts from (Hz).
pub const STARTING_FREQUENCY: u32 = 5000;

/// Upper bound for the search (Hz).
pub const MAXIMUM_FREQUENCY: u32 = 20000;

/// Lower bound for the search (Hz).
pub const MINIMUM_FREQUENCY: u32 = 1;

/// Ceiling on search iterations before giving up with a timeout.
///
/// Converging runs on reference sensors finish in fewer than ten
/// iterations; a Rise/Step oscillation bisects the interval on every pass,
/// so 32 iterations exhaust a 20 kHz range many times over.
pub const MAX_CALIBRATION_ITERATIONS: u16 = 32;

/// Settle time after a calibration run (µs).
///
/// Gives the sensor's capacitor time to recharge before the next reading.
pub const SETTLE_DELAY_US: u32 = 1_000_000;

/// Sample-to-sample variation (ADC counts) below which a curve is flat noise.
pub const NOISE_FLOOR_COUNTS: u32 = 8;

/// Fraction of the total range that a single step must exceed for the curve
/// to be classified as a step.
pub const STEP_JUMP_FRACTION: f32 = 0.5;

// ===== DATABASE =====

/// Entries per database table.
pub const DB_CAPACITY: usize = 10;

/// Maximum relative fall-time difference (%) for a match.
pub const FALL_TIME_THRESHOLD: f32 = 10.0;

/// Maximum relative Pearson-coefficient difference (%) for a match.
pub const PEARSON_COEFFICIENT_THRESHOLD: f32 = 10.0;

/// Marker word written ahead of a persisted database image.
pub const DATABASE_MAGIC: u32 = 0x5654_4442; // "VTDB"
