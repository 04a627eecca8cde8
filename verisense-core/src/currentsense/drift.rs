//! Drift scoring
//!
//! Drift is the percentage a live measurement deviates from its stored
//! counterpart. The three component formulas:
//!
//! ```text
//! feature vector  (|Δf/f| + |Δduty/duty| + |Δdraw/draw|) / 3 · 100
//! offset current  |Δoffset/offset| · 100
//! average current (|Δon/on| + |Δoff/off|) / 2 · 100
//! ```
//!
//! A zero saved value leaves the ratio undefined; the formulas return
//! [`VerifyError::UndefinedDrift`](crate::errors::VerifyError::UndefinedDrift)
//! instead of an infinite drift.
//!
//! [`evaluate_status`] averages the component drifts of one signature
//! cycle into a single 0–100 score and a [`SensorStatus`].

use super::features::{
    extract_average_current, extract_feature_vector, extract_offset_current, lowest_frequency_buffer,
    RawSignatureBuffer,
};
use super::template::{AverageCurrent, FeatureVector, SignatureTemplate};
use crate::config::CurrentSenseConfig;
use crate::errors::VerifyResult;
use crate::signal::relative_deviation_pct;

/// Drift charged for a stored component that was not observed at all
pub const MISSING_COMPONENT_DRIFT: f32 = 100.0;

/// Verification verdict for a current-sense sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SensorStatus {
    /// No template to compare against
    #[default]
    Unverified,
    /// Drift below threshold
    Working,
    /// Drift at or above threshold
    Faulty,
}

/// Drift of a repeating feature vector
pub fn feature_vector_drift(under_test: &FeatureVector, saved: &FeatureVector) -> VerifyResult<f32> {
    let frequency = relative_deviation_pct(
        under_test.signature_frequency,
        saved.signature_frequency,
        "signature_frequency",
    )?;
    let duty = relative_deviation_pct(under_test.duty_cycle, saved.duty_cycle, "duty_cycle")?;
    let draw = relative_deviation_pct(
        under_test.relative_current_draw,
        saved.relative_current_draw,
        "relative_current_draw",
    )?;

    let drift = (frequency + duty + draw) / 3.0;
    vt_debug!("feature vector drift {}", drift);
    Ok(drift)
}

/// Drift of the repeating offset current
pub fn offset_current_drift(under_test: f32, saved: f32) -> VerifyResult<f32> {
    let drift = relative_deviation_pct(under_test, saved, "offset_current")?;
    vt_debug!("offset current drift {}", drift);
    Ok(drift)
}

/// Drift of the non-repeating average currents
pub fn average_current_drift(under_test: &AverageCurrent, saved: &AverageCurrent) -> VerifyResult<f32> {
    let on = relative_deviation_pct(under_test.on, saved.on, "average_current_on")?;
    let off = relative_deviation_pct(under_test.off, saved.off, "average_current_off")?;

    let drift = (on + off) / 2.0;
    vt_debug!("average current drift {}", drift);
    Ok(drift)
}

/// Outcome of one runtime evaluation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusReport {
    /// Verdict
    pub status: SensorStatus,
    /// Rounded drift, 0–100
    pub drift: u8,
}

#[derive(Default)]
struct DriftAccumulator {
    total: f32,
    components: u32,
}

impl DriftAccumulator {
    fn add(&mut self, drift: VerifyResult<f32>) {
        let drift = drift.unwrap_or_else(|_err| {
            vt_warn!("drift undefined ({}), counting component as missing", _err);
            MISSING_COMPONENT_DRIFT
        });
        self.total += drift;
        self.components += 1;
    }

    fn missing(&mut self) {
        self.total += MISSING_COMPONENT_DRIFT;
        self.components += 1;
    }

    fn mean(&self) -> Option<f32> {
        (self.components > 0).then(|| self.total / self.components as f32)
    }
}

/// Compare one cycle's raw signatures against the stored template
///
/// `repeating` must hold the buffers captured at the template's stored
/// sampling frequencies, in the same order.
pub fn evaluate_status(
    template: &SignatureTemplate,
    repeating: &[RawSignatureBuffer],
    non_repeating: &RawSignatureBuffer,
    config: &CurrentSenseConfig,
) -> StatusReport {
    let mut drift = DriftAccumulator::default();

    match template {
        SignatureTemplate::Uncalibrated => {
            return StatusReport {
                status: SensorStatus::Unverified,
                drift: 0,
            };
        }
        SignatureTemplate::Repeating(saved) => {
            for (index, saved_vector) in saved.signatures.iter().enumerate() {
                match repeating.get(index).and_then(|b| extract_feature_vector(b, config)) {
                    Some(observed) => drift.add(feature_vector_drift(&observed, saved_vector)),
                    None => drift.missing(),
                }
            }
            if let Some(saved_offset) = saved.offset {
                let observed = lowest_frequency_buffer(repeating).and_then(|b| extract_offset_current(b, config));
                match observed {
                    Some(observed) => drift.add(offset_current_drift(observed.offset_current, saved_offset.offset_current)),
                    None => drift.missing(),
                }
            }
        }
        SignatureTemplate::NonRepeating(saved) => {
            if let Some(saved_average) = saved.average {
                match extract_average_current(non_repeating, config) {
                    Some(observed) => drift.add(average_current_drift(&observed, &saved_average)),
                    None => drift.missing(),
                }
            }
        }
    }

    let Some(mean) = drift.mean() else {
        return StatusReport {
            status: SensorStatus::Unverified,
            drift: 0,
        };
    };

    let clamped = mean.clamp(0.0, 100.0);
    let status = if clamped < config.drift_threshold {
        SensorStatus::Working
    } else {
        SensorStatus::Faulty
    };

    StatusReport {
        status,
        drift: libm::roundf(clamped) as u8,
    }
}

/// Drift between two templates of the same kind
///
/// `None` when the kinds differ or nothing comparable is stored.
pub fn template_drift(current: &SignatureTemplate, saved: &SignatureTemplate) -> Option<f32> {
    let mut drift = DriftAccumulator::default();

    match (current, saved) {
        (SignatureTemplate::Repeating(current), SignatureTemplate::Repeating(saved)) => {
            for (observed, stored) in current.signatures.iter().zip(saved.signatures.iter()) {
                drift.add(feature_vector_drift(observed, stored));
            }
            if let (Some(observed), Some(stored)) = (current.offset, saved.offset) {
                drift.add(offset_current_drift(observed.offset_current, stored.offset_current));
            }
        }
        (SignatureTemplate::NonRepeating(current), SignatureTemplate::NonRepeating(saved)) => {
            if let (Some(observed), Some(stored)) = (current.average, saved.average) {
                drift.add(average_current_drift(&observed, &stored));
            }
        }
        _ => return None,
    }

    drift.mean()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::currentsense::SAMPLE_LENGTH;
    use crate::errors::VerifyError;
    use crate::currentsense::template::{NonRepeatingTemplate, OffsetCurrent, RepeatingTemplate};

    fn vector() -> FeatureVector {
        FeatureVector {
            sampling_frequency: 1000.0,
            signature_frequency: 100.0,
            relative_current_draw: 0.8,
            duty_cycle: 0.3,
        }
    }

    fn square(sampling_frequency: f32, low: f32, high: f32) -> RawSignatureBuffer {
        let mut samples = [low; SAMPLE_LENGTH];
        for (i, slot) in samples.iter_mut().enumerate() {
            if i % 10 < 3 {
                *slot = high;
            }
        }
        RawSignatureBuffer::from_samples(sampling_frequency, &samples)
    }

    #[test]
    fn identical_values_have_zero_drift() {
        assert_eq!(feature_vector_drift(&vector(), &vector()).unwrap(), 0.0);
        assert_eq!(offset_current_drift(0.2, 0.2).unwrap(), 0.0);
        let avg = AverageCurrent { on: 4.0, off: 1.0 };
        assert_eq!(average_current_drift(&avg, &avg).unwrap(), 0.0);
    }

    #[test]
    fn average_current_example() {
        let drift = average_current_drift(
            &AverageCurrent { on: 11.0, off: 9.0 },
            &AverageCurrent { on: 10.0, off: 10.0 },
        )
        .unwrap();
        assert!((drift - 10.0).abs() < 1e-4);
    }

    #[test]
    fn zero_saved_value_is_an_error() {
        let mut saved = vector();
        saved.duty_cycle = 0.0;
        assert_eq!(
            feature_vector_drift(&vector(), &saved),
            Err(VerifyError::UndefinedDrift { field: "duty_cycle" })
        );
        assert!(offset_current_drift(1.0, 0.0).is_err());
    }

    #[test]
    fn matching_cycle_is_working() {
        let mut template = RepeatingTemplate::default();
        template.signatures.push(vector()).unwrap();
        template.offset = Some(OffsetCurrent {
            lowest_sample_frequency: 1000.0,
            offset_current: 0.1,
        });
        let template = SignatureTemplate::Repeating(template);

        let buffers = [square(1000.0, 0.1, 0.5)];
        let report = evaluate_status(&template, &buffers, &RawSignatureBuffer::new(10.0), &CurrentSenseConfig::default());
        assert_eq!(report, StatusReport { status: SensorStatus::Working, drift: 0 });
    }

    #[test]
    fn missing_signature_is_faulty() {
        let mut template = RepeatingTemplate::default();
        template.signatures.push(vector()).unwrap();
        let template = SignatureTemplate::Repeating(template);

        let flat = [RawSignatureBuffer::from_samples(1000.0, &[0.3; SAMPLE_LENGTH])];
        let report = evaluate_status(&template, &flat, &RawSignatureBuffer::new(10.0), &CurrentSenseConfig::default());
        assert_eq!(report, StatusReport { status: SensorStatus::Faulty, drift: 100 });
    }

    #[test]
    fn uncalibrated_is_unverified() {
        let report = evaluate_status(
            &SignatureTemplate::Uncalibrated,
            &[],
            &RawSignatureBuffer::new(10.0),
            &CurrentSenseConfig::default(),
        );
        assert_eq!(report.status, SensorStatus::Unverified);
    }

    #[test]
    fn template_drift_needs_same_kind() {
        let a = SignatureTemplate::NonRepeating(NonRepeatingTemplate {
            average: Some(AverageCurrent { on: 10.0, off: 10.0 }),
        });
        let b = SignatureTemplate::NonRepeating(NonRepeatingTemplate {
            average: Some(AverageCurrent { on: 11.0, off: 9.0 }),
        });
        assert!((template_drift(&b, &a).unwrap() - 10.0).abs() < 1e-4);
        assert_eq!(template_drift(&a, &SignatureTemplate::Uncalibrated), None);
    }
}
