//! Fall-curve sensor handle
//!
//! Owns the sampler and delay collaborators for one physical sensor and
//! remembers the operating frequency found by calibration.

use heapless::String;

use super::calibration::{calibrate, CalibrationOutcome, CancelToken};
use super::database::{Identification, SensorId, TemplateDatabase};
use crate::config::CalibrationConfig;
use crate::constants::fallcurve::FINGERPRINT_LENGTH;
use crate::errors::{VerifyError, VerifyResult};
use crate::hal::{DelayUs, FingerprintSampler};
use crate::signal::{peak_index, Fingerprint};

/// Maximum length of a sensor name
pub const SENSOR_NAME_LENGTH: usize = 32;

/// One fall-curve sensor
pub struct FallCurveSensor<S, D> {
    name: String<SENSOR_NAME_LENGTH>,
    sampler: S,
    delay: D,
    sampling_frequency: Option<u32>,
    confidence: u8,
}

impl<S, D> FallCurveSensor<S, D>
where
    S: FingerprintSampler,
    D: DelayUs,
{
    /// Wrap the collaborators of one sensor
    ///
    /// Names longer than [`SENSOR_NAME_LENGTH`] are truncated.
    pub fn new(name: &str, sampler: S, delay: D) -> Self {
        let mut owned = String::new();
        for c in name.chars() {
            if owned.push(c).is_err() {
                break;
            }
        }

        Self {
            name: owned,
            sampler,
            delay,
            sampling_frequency: None,
            confidence: 0,
        }
    }

    /// Sensor name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Operating frequency, once calibrated
    pub fn sampling_frequency(&self) -> Option<u32> {
        self.sampling_frequency
    }

    /// Confidence of the last calibration
    pub fn confidence(&self) -> u8 {
        self.confidence
    }

    /// Search for the operating frequency and adopt it
    pub fn calibrate(
        &mut self,
        config: &CalibrationConfig,
        cancel: Option<&CancelToken>,
    ) -> VerifyResult<CalibrationOutcome> {
        vt_info!("calibrating {}", self.name.as_str());
        let outcome = calibrate(&mut self.sampler, &mut self.delay, config, cancel)?;
        self.sampling_frequency = Some(outcome.sampling_frequency);
        self.confidence = outcome.confidence;
        Ok(outcome)
    }

    /// Capture one fingerprint at the operating frequency
    pub fn read_fingerprint(&mut self) -> VerifyResult<Fingerprint> {
        let frequency = self.calibrated_frequency()?;
        let mut fingerprint = [0u32; FINGERPRINT_LENGTH];
        self.sampler.sample_fingerprint(frequency, &mut fingerprint)?;
        Ok(fingerprint)
    }

    /// Raw reading: the peak of one fingerprint
    pub fn read_value(&mut self) -> VerifyResult<u32> {
        let fingerprint = self.read_fingerprint()?;
        Ok(fingerprint[peak_index(&fingerprint)])
    }

    /// Identify the sensor currently connected
    pub fn read_status(&mut self, database: &TemplateDatabase) -> VerifyResult<Identification> {
        let frequency = self.calibrated_frequency()?;
        let fingerprint = self.read_fingerprint()?;
        let identification = database.identify(&fingerprint, frequency);

        if identification == Identification::Unidentified {
            vt_warn!("{} does not match any stored template", self.name.as_str());
        }
        Ok(identification)
    }

    /// Store the current fingerprint and its features under `sensor_id`
    pub fn register(&mut self, database: &mut TemplateDatabase, sensor_id: SensorId) -> VerifyResult<()> {
        let frequency = self.calibrated_frequency()?;
        let fingerprint = self.read_fingerprint()?;
        database.store_fingerprint_with_features(&fingerprint, frequency, sensor_id)
    }

    /// Release the collaborators
    pub fn into_parts(self) -> (S, D) {
        (self.sampler, self.delay)
    }

    fn calibrated_frequency(&self) -> VerifyResult<u32> {
        self.sampling_frequency
            .ok_or(VerifyError::NotAvailable { field: "sampling_frequency" })
    }
}
