//! Error Types for Sensor Fingerprinting and Verification
//!
//! ## Design Philosophy
//!
//! The error system follows the same rules as the rest of the crate, which has
//! to run on microcontrollers with a few tens of KB of RAM:
//!
//! 1. **Small Size**: every variant carries at most two machine words, so the
//!    enum can be returned from the acquisition hot path without cost.
//!
//! 2. **No Heap Allocation**: messages are `&'static str`, never `String`.
//!
//! 3. **Copy Semantics**: errors are `Copy` so they can be stored in outcome
//!    structs (see [`CalibrationOutcome`](crate::fallcurve::CalibrationOutcome))
//!    and logged after being returned.
//!
//! ## Error Categories
//!
//! ### Platform
//! - `Generic`, `InvalidHandle`, `Lock`, `WaitTimeout`, `Busy`
//! - `FlashAddress`, `FlashSize`: persistence collaborator range errors
//!
//! ### Calibration
//! - `Repeatability`: frequency stabilized but the waveform did not repeat
//! - `RisingFunction`, `StepFunction`, `NoisyFunction`: terminal curve shape
//!   was not a fall curve
//! - `CalibrationTimeout`, `Cancelled`: the search was cut short
//!
//! ### Template storage
//! - `Capacity`, `Index`, `NotAvailable`, `TemplateMismatch`
//! - `UndefinedDrift`: a drift score would divide by a zero saved value
//! - `Codec`: the flattened snapshot could not be parsed
//! - `UnidentifiedSensor`: nothing in the database matched
//!
//! ## Handling Strategy
//!
//! Calibration shape errors are not fatal. They are reported inside the
//! calibration outcome together with a confidence score, and callers branch
//! on the confidence:
//!
//! ```rust
//! use verisense_core::VerifyError;
//!
//! fn describe(err: VerifyError) -> &'static str {
//!     match err {
//!         VerifyError::NoisyFunction => "no sensor response, check wiring",
//!         VerifyError::RisingFunction | VerifyError::StepFunction => "fingerprint usable but not unique",
//!         VerifyError::Capacity { .. } => "database full",
//!         _ => "see logs",
//!     }
//! }
//! assert_eq!(describe(VerifyError::NoisyFunction), "no sensor response, check wiring");
//! ```

use thiserror_no_std::Error;

/// Result type for verification operations
pub type VerifyResult<T> = Result<T, VerifyError>;

/// Verification errors - kept small for embedded use
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum VerifyError {
    /// Unspecified failure reported by a collaborator
    #[error("Operation failed: {reason}")]
    Generic {
        reason: &'static str,
    },

    /// A sensor or peripheral handle was missing or invalid
    #[error("Invalid handle")]
    InvalidHandle,

    /// Shared state lock was poisoned
    #[error("Lock failure")]
    Lock,

    /// No stored template matched the sensor under test
    #[error("Sensor could not be identified")]
    UnidentifiedSensor,

    /// Blocking wait exceeded its deadline
    #[error("Wait timed out after {waited_ms} ms")]
    WaitTimeout {
        /// Time spent waiting before giving up
        waited_ms: u32,
    },

    /// A signature cycle is already in flight
    #[error("Signature cycle already in progress")]
    Busy,

    /// Producer answered a request from a cycle that is no longer current
    #[error("Stale acquisition request from cycle {cycle}")]
    StaleRequest {
        /// Cycle the request was issued for
        cycle: u32,
    },

    /// Sampling frequency stabilized but consecutive fingerprints differ
    #[error("Fingerprint not repeatable (nrmse {nrmse})")]
    Repeatability {
        /// NRMSE between the last two fingerprints
        nrmse: f32,
    },

    /// Calibration terminated on a rising curve
    #[error("Rising function detected")]
    RisingFunction,

    /// Calibration terminated on a step curve
    #[error("Step function detected")]
    StepFunction,

    /// Calibration terminated on noise
    #[error("Noisy function detected")]
    NoisyFunction,

    /// Calibration search hit its iteration ceiling
    #[error("Calibration did not converge within {iterations} iterations")]
    CalibrationTimeout {
        /// Iterations executed
        iterations: u16,
    },

    /// Calibration was aborted through its cancellation token
    #[error("Calibration cancelled")]
    Cancelled,

    /// Fixed-capacity store is full
    #[error("Capacity {capacity} exhausted")]
    Capacity {
        /// Maximum number of entries the store accepts
        capacity: usize,
    },

    /// Index outside the occupied range
    #[error("Index {index} out of range (count {count})")]
    Index {
        /// Requested index
        index: usize,
        /// Occupied entries
        count: usize,
    },

    /// Requested template field has not been captured yet
    #[error("{field} not available")]
    NotAvailable {
        field: &'static str,
    },

    /// Template holds the other signature variant
    #[error("Template is not a {expected} template")]
    TemplateMismatch {
        expected: &'static str,
    },

    /// Drift against a zero saved value is undefined
    #[error("Drift undefined for zero reference in {field}")]
    UndefinedDrift {
        field: &'static str,
    },

    /// Configuration value outside its usable range
    #[error("Invalid configuration: {field}")]
    InvalidConfig {
        field: &'static str,
    },

    /// Flattened snapshot field could not be encoded or parsed
    #[error("Malformed flattened field {field}")]
    Codec {
        field: &'static str,
    },

    /// Flash address outside the device map
    #[error("Flash address {address:#x} out of range")]
    FlashAddress {
        address: u32,
    },

    /// Flash access runs past the end of the device map
    #[error("Flash access of {words} words at {address:#x} out of range")]
    FlashSize {
        address: u32,
        words: u32,
    },
}

impl VerifyError {
    /// Shape-class failures that still leave a usable sampling frequency
    pub fn is_shape_error(&self) -> bool {
        matches!(
            self,
            Self::RisingFunction | Self::StepFunction | Self::NoisyFunction | Self::Repeatability { .. }
        )
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for VerifyError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::Generic { reason } => defmt::write!(fmt, "Failed: {}", reason),
            Self::InvalidHandle => defmt::write!(fmt, "Invalid handle"),
            Self::Lock => defmt::write!(fmt, "Lock failure"),
            Self::UnidentifiedSensor => defmt::write!(fmt, "Unidentified sensor"),
            Self::WaitTimeout { waited_ms } => defmt::write!(fmt, "Wait timeout {} ms", waited_ms),
            Self::Busy => defmt::write!(fmt, "Busy"),
            Self::StaleRequest { cycle } => defmt::write!(fmt, "Stale request (cycle {})", cycle),
            Self::Repeatability { nrmse } => defmt::write!(fmt, "Not repeatable ({})", nrmse),
            Self::RisingFunction => defmt::write!(fmt, "Rising function"),
            Self::StepFunction => defmt::write!(fmt, "Step function"),
            Self::NoisyFunction => defmt::write!(fmt, "Noisy function"),
            Self::CalibrationTimeout { iterations } => {
                defmt::write!(fmt, "No convergence in {} iterations", iterations)
            }
            Self::Cancelled => defmt::write!(fmt, "Cancelled"),
            Self::Capacity { capacity } => defmt::write!(fmt, "Capacity {} exhausted", capacity),
            Self::Index { index, count } => defmt::write!(fmt, "Index {} >= {}", index, count),
            Self::NotAvailable { field } => defmt::write!(fmt, "{} not available", field),
            Self::TemplateMismatch { expected } => defmt::write!(fmt, "Not a {} template", expected),
            Self::UndefinedDrift { field } => defmt::write!(fmt, "Undefined drift in {}", field),
            Self::InvalidConfig { field } => defmt::write!(fmt, "Invalid config {}", field),
            Self::Codec { field } => defmt::write!(fmt, "Malformed {}", field),
            Self::FlashAddress { address } => defmt::write!(fmt, "Flash address {:x}", address),
            Self::FlashSize { address, words } => {
                defmt::write!(fmt, "Flash {} words at {:x}", words, address)
            }
        }
    }
}
