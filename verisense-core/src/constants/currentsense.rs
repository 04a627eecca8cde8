//! Current-Sense Signature Limits
//!
//! Buffer geometry and default tolerances for the current-draw signature
//! engine.

/// Upper bound of the repeating-signature list and of each flattened array.
///
/// The store operation rejects once `count + 1 >= MAX_SIGNATURES`, so at
/// most `MAX_SIGNATURES - 1` feature vectors are ever held.
pub const MAX_SIGNATURES: usize = 10;

/// Samples captured per raw signature buffer.
pub const SAMPLE_LENGTH: usize = 100;

/// Highest sampling frequency the candidate ladder starts from (Hz).
pub const MAX_SAMPLING_FREQUENCY: f32 = 10_000.0;

/// Lowest sampling frequency the candidate ladder may reach (Hz).
pub const MIN_SAMPLING_FREQUENCY: f32 = 10.0;

/// Ratio between consecutive candidate sampling frequencies.
pub const FREQUENCY_LADDER_RATIO: f32 = 4.0;

/// Full periods a buffer must contain before its waveform counts as a
/// repeating signature.
pub const MIN_SIGNATURE_PERIODS: usize = 2;

/// Minimum peak-to-trough contrast (in current units) of a signature.
pub const MIN_SIGNATURE_AMPLITUDE: f32 = 0.01;

/// Drift (%) at or above which a sensor is reported faulty.
pub const DRIFT_THRESHOLD: f32 = 30.0;

/// How long `signature_process` waits for the producer (ms).
pub const COLLECTION_TIMEOUT_MS: u32 = 2_000;

/// Template confidence for a repeating-signature template.
pub const CONFIDENCE_REPEATING: u8 = 100;

/// Template confidence for a non-repeating template with on/off contrast.
pub const CONFIDENCE_NON_REPEATING: u8 = 50;

// ===== FLATTENED SNAPSHOT =====

/// Characters reserved for one number in the flattened snapshot.
pub const NUMBER_WIDTH: usize = 16;

/// Decimal places written for each number.
pub const NUMBER_PRECISION: usize = 4;

/// Sentinel written for a value that has not been captured.
pub const DATA_NOT_AVAILABLE: f32 = -1.0;

/// Marker word in front of a persisted flattened snapshot.
pub const SNAPSHOT_MAGIC: u32 = 0x5654_5353; // "VTSS"
