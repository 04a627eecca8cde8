//! Verified telemetry core
//!
//! Sensor fingerprinting for edge devices: decides whether the sensor
//! producing a reading is the one that was installed, and whether it still
//! behaves the way it did when it was installed.
//!
//! Two independent techniques:
//!
//! - **Fall curve** ([`fallcurve`]): the discharge curve of a sensor after
//!   its supply pin drops. Calibration searches for the sampling frequency
//!   that captures the whole curve; the template database identifies a part
//!   by nearest match.
//! - **Current sense** ([`currentsense`]): the supply-current waveform while
//!   the sensor runs. The engine learns a template once and scores drift
//!   against it on every cycle.
//!
//! Key constraints:
//! - `no_std` capable, fixed-capacity storage only
//! - Hardware reached through [`hal`] traits
//! - Blocking acquisition and the current-sense engine need `std`
//!
//! ```no_run
//! use verisense_core::{calibrate, CalibrationConfig, Fingerprint, FingerprintSampler, NoDelay, VerifyResult};
//!
//! struct Adc;
//!
//! impl FingerprintSampler for Adc {
//!     fn sample_fingerprint(&mut self, _f: u32, fp: &mut Fingerprint) -> VerifyResult<()> {
//!         fp.fill(0);
//!         Ok(())
//!     }
//! }
//!
//! let outcome = calibrate(&mut Adc, &mut NoDelay, &CalibrationConfig::default(), None)?;
//! if outcome.confidence < 50 {
//!     // Fingerprint not usable for identification
//! }
//! # Ok::<(), verisense_core::VerifyError>(())
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]
#![warn(missing_docs)]

#[macro_use]
mod macros;

pub mod config;
pub mod constants;
pub mod currentsense;
pub mod errors;
pub mod fallcurve;
pub mod flatten;
pub mod hal;
pub mod signal;

// Public API
pub use config::{CalibrationConfig, CurrentSenseConfig, MatchThresholds};
pub use errors::{VerifyError, VerifyResult};
pub use fallcurve::{
    calibrate, CalibrationOutcome, CancelToken, FallCurveSensor, Identification, SensorId, TemplateDatabase,
};
pub use flatten::FlattenedDatabase;
pub use hal::{CurrentSample, CurrentSampleSource, DelayUs, FingerprintSampler, FlashStorage, MemoryFlash, NoDelay};
pub use signal::{Fingerprint, Shape};

#[cfg(feature = "std")]
pub use currentsense::{CurrentSenseSensor, DatabaseReport, Mode};
#[cfg(feature = "std")]
pub use hal::StdDelay;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_exists() {
        assert!(!VERSION.is_empty());
    }
}
