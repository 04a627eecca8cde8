//! Current-sense signature engine
//!
//! One engine per sensor. It drives the acquisition handshake, turns the
//! collected buffers into a template while calibrating, and scores drift
//! against that template afterwards.
//!
//! ```text
//!   Calibrate ──┐
//!               ├─ signature_read / signature_process ─► RuntimeEvaluate
//!   Recalibrate ┘                                            │
//!        ▲                                                   │ signature_read /
//!        └──────────────── recalibrate() ◄───────────────────┘ signature_process
//! ```

use std::time::Duration;

use super::acquisition::{AcquisitionPlan, CollectedSignatures, RawSignatureReader, SignatureProducer};
use super::drift::{evaluate_status, template_drift, SensorStatus, StatusReport};
use super::features::{
    candidate_sampling_frequencies, extract_average_current, extract_feature_vector, extract_offset_current,
    lowest_frequency_buffer,
};
use super::template::{SignatureDatabase, SignatureTemplate, TemplateKind};
use crate::config::CurrentSenseConfig;
use crate::constants::currentsense::SNAPSHOT_MAGIC;
use crate::errors::{VerifyError, VerifyResult};
use crate::flatten::{FlattenedDatabase, FLATTENED_WORDS};
use crate::hal::FlashStorage;

/// What the next processed cycle is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Mode {
    /// Derive the first template
    Calibrate,
    /// Replace the template, logging how far it moved
    Recalibrate,
    /// Score the cycle against the template
    RuntimeEvaluate,
}

/// Snapshot handed to the telemetry layer
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseReport {
    /// Template in its flattened form
    pub flattened: FlattenedDatabase,
    /// Whether the template changed since the previous fetch
    pub db_updated: bool,
    /// Confidence of the template
    pub confidence: u8,
}

/// Current-sense verification for one sensor
pub struct CurrentSenseSensor {
    config: CurrentSenseConfig,
    mode: Mode,
    database: SignatureDatabase,
    reader: RawSignatureReader,
    report: StatusReport,
    confidence: u8,
    cycle_in_flight: bool,
}

impl CurrentSenseSensor {
    /// Uncalibrated engine
    pub fn new(config: CurrentSenseConfig) -> Self {
        Self {
            config,
            mode: Mode::Calibrate,
            database: SignatureDatabase::new(),
            reader: RawSignatureReader::new(),
            report: unverified(),
            confidence: 0,
            cycle_in_flight: false,
        }
    }

    /// Handle for the sampling context
    pub fn producer(&self) -> SignatureProducer {
        self.reader.producer()
    }

    /// Current mode
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Active configuration
    pub fn config(&self) -> &CurrentSenseConfig {
        &self.config
    }

    /// Template confidence
    pub fn confidence(&self) -> u8 {
        self.confidence
    }

    /// Stored template
    pub fn database(&self) -> &SignatureDatabase {
        &self.database
    }

    /// Direct access to the template store
    pub fn database_mut(&mut self) -> &mut SignatureDatabase {
        &mut self.database
    }

    /// Derive a template from the next processed cycle
    pub fn calibrate(&mut self) {
        vt_info!("current-sense calibration requested");
        self.mode = Mode::Calibrate;
    }

    /// Replace the template with the next processed cycle
    pub fn recalibrate(&mut self) {
        vt_info!("current-sense recalibration requested");
        self.mode = Mode::Recalibrate;
    }

    /// Result of the last runtime evaluation
    pub fn fetch_status(&self) -> StatusReport {
        self.report
    }

    /// Start one signature cycle
    ///
    /// Runtime evaluation samples at the stored frequencies; calibration
    /// walks the candidate ladder. Fails with [`VerifyError::Busy`] until the
    /// previous cycle has been processed.
    pub fn signature_read(&mut self) -> VerifyResult<()> {
        if self.cycle_in_flight {
            return Err(VerifyError::Busy);
        }

        let repeating_frequencies = match self.mode {
            Mode::RuntimeEvaluate => self.database.repeating_sampling_frequencies(),
            Mode::Calibrate | Mode::Recalibrate => candidate_sampling_frequencies(&self.config),
        };
        let plan = AcquisitionPlan {
            repeating_frequencies,
            non_repeating_frequency: self.config.min_sampling_frequency,
        };

        self.reader.begin(&plan)?;
        self.cycle_in_flight = true;
        Ok(())
    }

    /// Finish the cycle started by [`signature_read`](Self::signature_read)
    ///
    /// Stops the non-repeating capture, waits up to `collection_timeout_ms`
    /// for the producer, then evaluates or calibrates depending on the mode.
    /// A timed-out cycle is dropped.
    pub fn signature_process(&mut self) -> VerifyResult<StatusReport> {
        if !self.cycle_in_flight {
            return Err(VerifyError::NotAvailable {
                field: "signature cycle",
            });
        }

        let timeout = Duration::from_millis(u64::from(self.config.collection_timeout_ms));
        let collected = self
            .reader
            .request_non_repeating_stop()
            .and_then(|()| self.reader.wait_collected(timeout));
        self.cycle_in_flight = false;

        let collected = match collected {
            Ok(collected) => collected,
            Err(err) => {
                vt_error!("signature cycle dropped: {}", err);
                self.reader.abort()?;
                return Err(err);
            }
        };

        match self.mode {
            Mode::RuntimeEvaluate => {
                self.report = evaluate_status(
                    self.database.template(),
                    collected.repeating(),
                    collected.non_repeating(),
                    &self.config,
                );
                vt_info!(
                    "runtime evaluation: {:?}, drift {}%",
                    self.report.status,
                    self.report.drift
                );
            }
            Mode::Calibrate | Mode::Recalibrate => self.adopt_template(&collected)?,
        }
        Ok(self.report)
    }

    fn adopt_template(&mut self, collected: &CollectedSignatures) -> VerifyResult<()> {
        let fresh = derive_template(collected, &self.config)?;

        if self.mode == Mode::Recalibrate {
            match template_drift(fresh.template(), self.database.template()) {
                Some(_drift) => {
                    vt_info!("recalibration moved the template by {}%", _drift);
                }
                None => {
                    vt_info!("recalibration changed the template kind");
                }
            }
        }

        self.database = fresh;
        self.confidence = self.database.template().confidence();
        self.report = unverified();
        self.mode = Mode::RuntimeEvaluate;

        vt_info!(
            "calibrated {:?} template, confidence {}",
            self.database.template().kind(),
            self.confidence
        );
        Ok(())
    }

    /// Adopt a template received from the telemetry layer
    pub fn database_sync(&mut self, flattened: &FlattenedDatabase) -> VerifyResult<()> {
        let template = flattened.to_template()?;
        self.confidence = template.confidence();
        self.mode = match template {
            SignatureTemplate::Uncalibrated => Mode::Calibrate,
            _ => Mode::RuntimeEvaluate,
        };
        self.database.replace_template(template);
        self.report = unverified();
        Ok(())
    }

    /// Flattened template for the telemetry layer
    ///
    /// Clears the updated flag.
    pub fn database_fetch(&mut self) -> VerifyResult<DatabaseReport> {
        let flattened = FlattenedDatabase::from_template(self.database.template())?;
        Ok(DatabaseReport {
            flattened,
            db_updated: self.database.take_updated(),
            confidence: self.confidence,
        })
    }

    /// Words [`persist`](Self::persist) occupies
    pub const PERSISTED_WORDS: usize = 1 + FLATTENED_WORDS;

    /// Write the flattened template to flash at `address`
    pub fn persist<F: FlashStorage>(&self, flash: &mut F, address: u32) -> VerifyResult<()> {
        let words = FlattenedDatabase::from_template(self.database.template())?.to_words();

        flash.erase(address, Self::PERSISTED_WORDS as u32)?;
        flash.write(address, &[SNAPSHOT_MAGIC])?;
        flash.write(address + 4, &words)?;

        vt_debug!("persisted current-sense template at {:#x}", address);
        Ok(())
    }

    /// Load a template written by [`persist`](Self::persist)
    ///
    /// `Ok(false)` when no snapshot is stored at `address`.
    pub fn restore<F: FlashStorage>(&mut self, flash: &mut F, address: u32) -> VerifyResult<bool> {
        let mut magic = [0u32; 1];
        flash.read(address, &mut magic)?;
        if magic[0] != SNAPSHOT_MAGIC {
            vt_debug!("no current-sense template at {:#x}", address);
            return Ok(false);
        }

        let mut words = [0u32; FLATTENED_WORDS];
        flash.read(address + 4, &mut words)?;
        self.database_sync(&FlattenedDatabase::from_words(&words)?)?;
        Ok(true)
    }
}

fn unverified() -> StatusReport {
    StatusReport {
        status: SensorStatus::Unverified,
        drift: 0,
    }
}

/// Build a template from one calibration cycle
///
/// Any repeating signature makes a repeating template; otherwise the
/// non-repeating averages are used.
fn derive_template(collected: &CollectedSignatures, config: &CurrentSenseConfig) -> VerifyResult<SignatureDatabase> {
    let mut database = SignatureDatabase::new();

    for buffer in collected.repeating() {
        if let Some(vector) = extract_feature_vector(buffer, config) {
            database.store_repeating_signature_feature_vector(vector)?;
        }
    }

    if database.template().kind() == TemplateKind::Repeating {
        if let Some(offset) = lowest_frequency_buffer(collected.repeating()).and_then(|b| extract_offset_current(b, config)) {
            database.update_repeating_offset_current(offset);
        }
        return Ok(database);
    }

    let average = extract_average_current(collected.non_repeating(), config).ok_or(VerifyError::NotAvailable {
        field: "average_current",
    })?;
    database.update_non_repeating_average_current(average);
    Ok(database)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::currentsense::SAMPLE_LENGTH;
    use crate::currentsense::acquisition::{fill_from_source, AcquisitionRequest};
    use crate::hal::{CurrentSample, CurrentSampleSource, MemoryFlash};

    // Period fixed in samples, so every rung sees the same waveform
    struct SquareSource {
        n: usize,
        low: f32,
        high: f32,
    }

    impl CurrentSampleSource for SquareSource {
        fn read_sample(&mut self, sampling_frequency: f32) -> VerifyResult<CurrentSample> {
            let value = if self.n % 10 < 3 { self.high } else { self.low };
            self.n += 1;
            Ok(CurrentSample {
                value,
                sampling_frequency,
            })
        }
    }

    // One pulse every SAMPLE_LENGTH samples
    struct PulseSource {
        n: usize,
    }

    impl CurrentSampleSource for PulseSource {
        fn read_sample(&mut self, sampling_frequency: f32) -> VerifyResult<CurrentSample> {
            let phase = self.n % SAMPLE_LENGTH;
            self.n += 1;
            Ok(CurrentSample {
                value: if (20..30).contains(&phase) { 4.0 } else { 1.0 },
                sampling_frequency,
            })
        }
    }

    fn quick_config() -> CurrentSenseConfig {
        CurrentSenseConfig {
            collection_timeout_ms: 50,
            ..CurrentSenseConfig::default()
        }
    }

    // Single-threaded: the non-repeating capture ends when its buffer fills
    fn run_cycle<S: CurrentSampleSource>(sensor: &mut CurrentSenseSensor, source: &mut S) -> StatusReport {
        sensor.signature_read().unwrap();
        let producer = sensor.producer();
        loop {
            let request = fill_from_source(&producer, source, Duration::from_millis(10)).unwrap();
            if matches!(request, AcquisitionRequest::NonRepeating { .. }) {
                break;
            }
        }
        sensor.signature_process().unwrap()
    }

    #[test]
    fn calibrate_then_evaluate_repeating() {
        let mut sensor = CurrentSenseSensor::new(quick_config());
        let mut source = SquareSource { n: 0, low: 0.1, high: 0.5 };

        let report = run_cycle(&mut sensor, &mut source);
        assert_eq!(report.status, SensorStatus::Unverified);
        assert_eq!(sensor.mode(), Mode::RuntimeEvaluate);
        assert_eq!(sensor.confidence(), 100);
        assert_eq!(sensor.database().repeating_sampling_frequencies().len(), 5);

        let report = run_cycle(&mut sensor, &mut source);
        assert_eq!(report, StatusReport { status: SensorStatus::Working, drift: 0 });
        assert_eq!(sensor.fetch_status(), report);
    }

    #[test]
    fn flat_current_after_calibration_is_faulty() {
        let mut sensor = CurrentSenseSensor::new(quick_config());
        run_cycle(&mut sensor, &mut SquareSource { n: 0, low: 0.1, high: 0.5 });

        let report = run_cycle(&mut sensor, &mut SquareSource { n: 0, low: 0.2, high: 0.2 });
        assert_eq!(report.status, SensorStatus::Faulty);
    }

    #[test]
    fn pulse_calibrates_non_repeating() {
        let mut sensor = CurrentSenseSensor::new(quick_config());
        run_cycle(&mut sensor, &mut PulseSource { n: 0 });

        assert_eq!(sensor.database().template().kind(), TemplateKind::NonRepeating);
        assert_eq!(sensor.confidence(), 50);
        let average = sensor.database().fetch_non_repeating_average_current().unwrap();
        assert_eq!((average.on, average.off), (4.0, 1.0));
    }

    #[test]
    fn second_read_is_busy() {
        let mut sensor = CurrentSenseSensor::new(quick_config());
        sensor.signature_read().unwrap();
        assert_eq!(sensor.signature_read(), Err(VerifyError::Busy));
    }

    #[test]
    fn process_without_producer_times_out_and_recovers() {
        let mut sensor = CurrentSenseSensor::new(quick_config());
        sensor.signature_read().unwrap();
        assert!(matches!(
            sensor.signature_process(),
            Err(VerifyError::WaitTimeout { .. })
        ));
        assert_eq!(sensor.mode(), Mode::Calibrate);
        sensor.signature_read().unwrap();
    }

    #[test]
    fn fetch_clears_updated_flag() {
        let mut sensor = CurrentSenseSensor::new(quick_config());
        run_cycle(&mut sensor, &mut SquareSource { n: 0, low: 0.1, high: 0.5 });

        let first = sensor.database_fetch().unwrap();
        assert!(first.db_updated);
        assert_eq!(first.confidence, 100);
        assert!(!sensor.database_fetch().unwrap().db_updated);
    }

    #[test]
    fn sync_adopts_remote_template() {
        let mut calibrated = CurrentSenseSensor::new(quick_config());
        run_cycle(&mut calibrated, &mut SquareSource { n: 0, low: 0.1, high: 0.5 });
        let snapshot = calibrated.database_fetch().unwrap().flattened;

        let mut fresh = CurrentSenseSensor::new(quick_config());
        fresh.database_sync(&snapshot).unwrap();
        assert_eq!(fresh.mode(), Mode::RuntimeEvaluate);
        assert_eq!(fresh.confidence(), 100);
        assert!(!fresh.database().is_updated());

        let report = run_cycle(&mut fresh, &mut SquareSource { n: 0, low: 0.1, high: 0.5 });
        assert_eq!(report.status, SensorStatus::Working);
    }

    #[test]
    fn persist_and_restore() {
        const BASE: u32 = 0x0800_0000;
        let mut flash = MemoryFlash::<{ CurrentSenseSensor::PERSISTED_WORDS }>::new(BASE);

        let mut sensor = CurrentSenseSensor::new(quick_config());
        assert!(!sensor.restore(&mut flash, BASE).unwrap());

        run_cycle(&mut sensor, &mut PulseSource { n: 0 });
        sensor.persist(&mut flash, BASE).unwrap();

        let mut restored = CurrentSenseSensor::new(quick_config());
        assert!(restored.restore(&mut flash, BASE).unwrap());
        assert_eq!(restored.database().template(), sensor.database().template());
        assert_eq!(restored.confidence(), 50);
    }

    #[test]
    fn recalibration_replaces_template() {
        let mut sensor = CurrentSenseSensor::new(quick_config());
        run_cycle(&mut sensor, &mut SquareSource { n: 0, low: 0.1, high: 0.5 });

        sensor.recalibrate();
        run_cycle(&mut sensor, &mut PulseSource { n: 0 });
        assert_eq!(sensor.mode(), Mode::RuntimeEvaluate);
        assert_eq!(sensor.database().template().kind(), TemplateKind::NonRepeating);
    }
}
