//! Integration tests for the current-sense signature engine
//!
//! The producer runs on its own thread, as the ADC context would, while the
//! test thread plays the application task calling read/process.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use verisense_core::{
    currentsense::{fill_from_source, SensorStatus, SignatureProducer, StatusReport, TemplateKind},
    CurrentSampleSource, CurrentSenseConfig, CurrentSenseSensor, FlattenedDatabase, MemoryFlash, Mode, VerifyError,
};

use common::{
    generators::{BurstCurrent, SquareCurrent},
    FLASH_BASE,
};

/// Producer thread serving requests until told to stop
struct AdcThread {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl AdcThread {
    fn spawn<S: CurrentSampleSource + Send + 'static>(producer: SignatureProducer, mut source: S) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let handle = thread::spawn(move || {
            while flag.load(Ordering::Relaxed) {
                match fill_from_source(&producer, &mut source, Duration::from_millis(20)) {
                    // A stale request only means the cycle was dropped under us
                    Ok(_) | Err(VerifyError::WaitTimeout { .. }) | Err(VerifyError::StaleRequest { .. }) => {}
                    Err(err) => panic!("producer failed: {}", err),
                }
            }
        });
        Self {
            running,
            handle: Some(handle),
        }
    }
}

impl Drop for AdcThread {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn config() -> CurrentSenseConfig {
    CurrentSenseConfig {
        collection_timeout_ms: 1_000,
        ..CurrentSenseConfig::default()
    }
}

// Application task: start a cycle, let the load run, then process
fn cycle(sensor: &mut CurrentSenseSensor) -> StatusReport {
    sensor.signature_read().unwrap();
    thread::sleep(Duration::from_millis(50));
    sensor.signature_process().unwrap()
}

#[test]
fn periodic_load_lifecycle() {
    let mut sensor = CurrentSenseSensor::new(config());
    assert_eq!(sensor.mode(), Mode::Calibrate);
    assert_eq!(sensor.fetch_status().status, SensorStatus::Unverified);

    {
        let _adc = AdcThread::spawn(sensor.producer(), SquareCurrent::new(0.1, 0.5));
        cycle(&mut sensor);
        assert_eq!(sensor.mode(), Mode::RuntimeEvaluate);
        assert_eq!(sensor.database().template().kind(), TemplateKind::Repeating);
        assert_eq!(sensor.confidence(), 100);

        let report = cycle(&mut sensor);
        assert_eq!(report.status, SensorStatus::Working);
        assert_eq!(report.drift, 0);
    }

    // Slightly heavier load: same shape, small drift
    {
        let _adc = AdcThread::spawn(sensor.producer(), SquareCurrent::new(0.1, 0.6));
        let report = cycle(&mut sensor);
        assert_eq!(report.status, SensorStatus::Working);
        assert!(report.drift <= 5, "drift {}", report.drift);
    }

    // Raised idle current and halved contrast
    {
        let _adc = AdcThread::spawn(sensor.producer(), SquareCurrent::new(0.3, 0.5));
        let report = cycle(&mut sensor);
        assert_eq!(report.status, SensorStatus::Faulty);
        assert!((45..=50).contains(&report.drift), "drift {}", report.drift);
        assert_eq!(sensor.fetch_status(), report);
    }
}

#[test]
fn aperiodic_load_uses_average_current() {
    let mut sensor = CurrentSenseSensor::new(config());
    let _adc = AdcThread::spawn(sensor.producer(), BurstCurrent::new(1.0, 4.0));

    cycle(&mut sensor);
    assert_eq!(sensor.database().template().kind(), TemplateKind::NonRepeating);
    assert_eq!(sensor.confidence(), 50);

    let report = cycle(&mut sensor);
    assert_eq!(report.status, SensorStatus::Working);
}

#[test]
fn process_without_read_is_rejected() {
    let mut sensor = CurrentSenseSensor::new(config());
    assert_eq!(
        sensor.signature_process(),
        Err(VerifyError::NotAvailable {
            field: "signature cycle"
        })
    );
}

#[test]
fn template_travels_between_devices() {
    let mut origin = CurrentSenseSensor::new(config());
    {
        let _adc = AdcThread::spawn(origin.producer(), SquareCurrent::new(0.1, 0.5));
        cycle(&mut origin);
    }

    let report = origin.database_fetch().unwrap();
    assert!(report.db_updated);
    assert_eq!(report.confidence, 100);
    assert!(!origin.database_fetch().unwrap().db_updated);

    // Transport as JSON, then install on a second device
    let json = serde_json::to_string(&report.flattened).unwrap();
    let received: FlattenedDatabase = serde_json::from_str(&json).unwrap();

    let mut replica = CurrentSenseSensor::new(config());
    replica.database_sync(&received).unwrap();
    assert_eq!(replica.mode(), Mode::RuntimeEvaluate);
    assert_eq!(replica.confidence(), 100);

    let _adc = AdcThread::spawn(replica.producer(), SquareCurrent::new(0.1, 0.5));
    assert_eq!(cycle(&mut replica).status, SensorStatus::Working);
}

#[test]
fn recalibration_survives_reboot() {
    let mut flash = MemoryFlash::<{ CurrentSenseSensor::PERSISTED_WORDS }>::new(FLASH_BASE);
    let mut sensor = CurrentSenseSensor::new(config());
    {
        let _adc = AdcThread::spawn(sensor.producer(), SquareCurrent::new(0.1, 0.5));
        cycle(&mut sensor);
    }

    sensor.recalibrate();
    assert_eq!(sensor.mode(), Mode::Recalibrate);
    {
        let _adc = AdcThread::spawn(sensor.producer(), BurstCurrent::new(1.0, 4.0));
        cycle(&mut sensor);
    }
    sensor.persist(&mut flash, FLASH_BASE).unwrap();

    let mut rebooted = CurrentSenseSensor::new(config());
    assert!(rebooted.restore(&mut flash, FLASH_BASE).unwrap());
    assert_eq!(rebooted.database().template(), sensor.database().template());
    assert_eq!(rebooted.database().template().kind(), TemplateKind::NonRepeating);
}
