//! Property tests for calibration bounds, drift and the template store

mod common;

use proptest::prelude::*;

use verisense_core::{
    calibrate,
    currentsense::{
        drift::{average_current_drift, feature_vector_drift, offset_current_drift},
        AverageCurrent, FeatureVector, SignatureDatabase, SignatureTemplate,
    },
    fallcurve::confidence_for,
    CalibrationConfig, FlattenedDatabase, NoDelay, VerifyError,
};

use common::generators::{DischargeSampler, RisingSampler};

fn frequency_window() -> impl Strategy<Value = (u32, u32)> {
    prop_oneof![
        (1u32..25_000, 1u32..25_000),
        (1u32..25_000).prop_map(|f| (f, f)),
        (0u32..2, 0u32..25_000),
    ]
}

fn feature_vector() -> impl Strategy<Value = FeatureVector> {
    (1.0f32..10_000.0, 0.01f32..5_000.0, 0.01f32..1.0, 0.01f32..1.0).prop_map(
        |(sampling_frequency, signature_frequency, relative_current_draw, duty_cycle)| FeatureVector {
            sampling_frequency,
            signature_frequency,
            relative_current_draw,
            duty_cycle,
        },
    )
}

fn verify_error() -> impl Strategy<Value = VerifyError> {
    prop_oneof![
        Just(VerifyError::RisingFunction),
        Just(VerifyError::StepFunction),
        Just(VerifyError::NoisyFunction),
        Just(VerifyError::Cancelled),
        (0.0f32..2.0).prop_map(|nrmse| VerifyError::Repeatability { nrmse }),
        any::<u16>().prop_map(|iterations| VerifyError::CalibrationTimeout { iterations }),
    ]
}

proptest! {
    #[test]
    fn clamped_frequency_stays_in_window(a in 0u32..50_000, b in 0u32..50_000, f in any::<u32>()) {
        let config = CalibrationConfig::new_with_limits(a, b);
        let clamped = config.clamp_frequency(f);
        prop_assert!(config.min_frequency <= clamped && clamped <= config.max_frequency);
        prop_assert!(config.min_frequency <= config.starting_frequency);
        prop_assert!(config.starting_frequency <= config.max_frequency);
    }

    #[test]
    fn calibration_settles_inside_window(
        (min, max) in frequency_window(),
        start in 1u32..30_000,
        time_scale in 1_000.0f32..5_000_000.0,
        amplitude in 50.0f32..4095.0,
        rising in any::<bool>(),
    ) {
        let config = CalibrationConfig {
            starting_frequency: start,
            min_frequency: min,
            max_frequency: max,
            ..CalibrationConfig::quick()
        };

        let result = if rising {
            calibrate(&mut RisingSampler, &mut NoDelay, &config, None)
        } else {
            let mut sampler = DischargeSampler { amplitude, ..DischargeSampler::new(time_scale) };
            calibrate(&mut sampler, &mut NoDelay, &config, None)
        };

        if min == 0 || min > max {
            prop_assert!(matches!(result, Err(VerifyError::InvalidConfig { .. })), "expected InvalidConfig, got {:?}", result);
        } else {
            let outcome = result.map_err(|e| TestCaseError::fail(format!("{}", e)))?;
            prop_assert!(min <= outcome.sampling_frequency && outcome.sampling_frequency <= max);
            prop_assert!(outcome.iterations <= config.max_iterations);
        }
    }

    #[test]
    fn confidence_is_one_of_three_levels(err in verify_error(), ok in any::<bool>(), timer in any::<bool>()) {
        let status = if ok { Ok(()) } else { Err(err) };
        prop_assert!(matches!(confidence_for(&status, timer), 0 | 50 | 100));
    }

    #[test]
    fn unchanged_measurement_has_zero_drift(v in feature_vector(), on in 0.01f32..100.0, off in 0.01f32..100.0) {
        prop_assert_eq!(feature_vector_drift(&v, &v).unwrap(), 0.0);
        prop_assert_eq!(offset_current_drift(off, off).unwrap(), 0.0);
        let avg = AverageCurrent { on, off };
        prop_assert_eq!(average_current_drift(&avg, &avg).unwrap(), 0.0);
    }

    #[test]
    fn store_never_exceeds_capacity(vectors in prop::collection::vec(feature_vector(), 0..20)) {
        let mut db = SignatureDatabase::new();
        for (i, v) in vectors.iter().enumerate() {
            let result = db.store_repeating_signature_feature_vector(*v);
            prop_assert_eq!(result.is_ok(), i < 9);
        }
        for (i, v) in vectors.iter().take(9).enumerate() {
            prop_assert_eq!(db.fetch_repeating_signature_feature_vector(i).unwrap(), *v);
        }
        if !vectors.is_empty() {
            let stored = vectors.len().min(9);
            prop_assert_eq!(
                db.fetch_repeating_signature_feature_vector(stored),
                Err(VerifyError::Index { index: stored, count: stored })
            );
        }
    }

    #[test]
    fn snapshot_keeps_four_decimals(vectors in prop::collection::vec(feature_vector(), 1..9)) {
        let mut db = SignatureDatabase::new();
        for v in &vectors {
            db.store_repeating_signature_feature_vector(*v).unwrap();
        }

        let flat = FlattenedDatabase::from_template(db.template()).unwrap();
        let parsed = FlattenedDatabase::from_bytes(&flat.to_bytes()).unwrap().to_template().unwrap();
        let SignatureTemplate::Repeating(parsed) = parsed else {
            return Err(TestCaseError::fail("template kind changed"));
        };

        prop_assert_eq!(parsed.signatures.len(), vectors.len());
        for (got, want) in parsed.signatures.iter().zip(&vectors) {
            prop_assert!((got.signature_frequency - want.signature_frequency).abs() <= 1e-3);
            prop_assert!((got.duty_cycle - want.duty_cycle).abs() <= 1e-4);
            prop_assert!((got.relative_current_draw - want.relative_current_draw).abs() <= 1e-4);
        }
    }
}
