//! Constants for Verisense Core
//!
//! Centralized numeric defaults used throughout the crate. Thresholds are
//! exposed through the [`config`](crate::config) structs; these constants
//! only seed their `Default` implementations and size the fixed-capacity
//! stores.
//!
//! ## Organization
//!
//! - **Fall curve**: fingerprint geometry, search thresholds, database sizes
//! - **Current sense**: signature buffer geometry, drift tolerances, snapshot
//!   encoding

/// Fall-curve calibration and fingerprint database limits.
pub mod fallcurve;

/// Current-sense signature engine limits.
pub mod currentsense;

pub use fallcurve::{
    FINGERPRINT_LENGTH, DB_CAPACITY, PRECISION_THRESHOLD, REPEATABILITY_THRESHOLD,
    STARTING_FREQUENCY, MAXIMUM_FREQUENCY, MINIMUM_FREQUENCY,
};

pub use currentsense::{MAX_SIGNATURES, SAMPLE_LENGTH, NUMBER_WIDTH};
