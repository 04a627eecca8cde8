//! Fall-curve fingerprinting
//!
//! A sensor powered from a GPIO pin keeps discharging for a few milliseconds
//! after the pin drops. The shape of that discharge depends on the sensor's
//! input capacitance and resistance, so it identifies the physical part.
//!
//! - [`calibration`]: find the sampling frequency that captures the curve
//! - [`database`]: store fingerprints and match new ones against them
//! - [`sensor`]: one sensor's collaborators and operating frequency

pub mod calibration;
pub mod database;
pub mod sensor;

pub use calibration::{calibrate, confidence_for, fall_position, CalibrationOutcome, CancelToken, FallPosition};
pub use database::{FallTimeEntry, FingerprintEntry, Identification, PearsonEntry, SensorId, TemplateDatabase};
pub use sensor::FallCurveSensor;
