//! Feature extraction from raw current signatures
//!
//! ## Candidate Frequencies
//!
//! Without a template the engine does not know how fast the sensor's
//! current waveform repeats, so it samples a geometric ladder of
//! frequencies and keeps whichever rungs show a periodic waveform:
//!
//! ```text
//! 10 kHz → 2.5 kHz → 625 Hz → 156 Hz → 39 Hz    (ratio 4, floor 10 Hz)
//! ```
//!
//! ## Repeating Signature
//!
//! The buffer is split at the midpoint between its lowest and highest
//! sample. Each low→high crossing is a rising edge:
//!
//! ```text
//!  high ┐   ┌───┐   ┌───┐   ┌───
//!       │   │   │   │   │   │
//!  low  └───┘   └───┘   └───┘
//!           ^edge   ^edge   ^edge
//!
//! signature_frequency   = fs · (edges - 1) / (last_edge - first_edge)
//! duty_cycle            = high samples / samples, over whole periods
//! relative_current_draw = (mean_high - mean_low) / mean_high
//! ```
//!
//! A buffer whose contrast is below `min_signature_amplitude`, or that
//! holds fewer than `min_signature_periods` whole periods, has no signature
//! at that frequency.

use heapless::Vec;

use super::template::{AverageCurrent, FeatureVector, OffsetCurrent};
use crate::config::CurrentSenseConfig;
use crate::constants::currentsense::{MAX_SIGNATURES, SAMPLE_LENGTH};

/// Samples captured at one sampling frequency
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawSignatureBuffer {
    /// Frequency the samples were actually captured at (Hz)
    pub sampling_frequency: f32,
    /// Captured current values
    pub samples: Vec<f32, SAMPLE_LENGTH>,
}

impl RawSignatureBuffer {
    /// Empty buffer for `sampling_frequency`
    pub fn new(sampling_frequency: f32) -> Self {
        Self {
            sampling_frequency,
            samples: Vec::new(),
        }
    }

    /// Buffer from existing samples, truncated to [`SAMPLE_LENGTH`]
    pub fn from_samples(sampling_frequency: f32, samples: &[f32]) -> Self {
        let len = samples.len().min(SAMPLE_LENGTH);
        let mut buffer = Self::new(sampling_frequency);
        // Cannot fail after truncation
        let _ = buffer.samples.extend_from_slice(&samples[..len]);
        buffer
    }

    /// Whether the buffer holds [`SAMPLE_LENGTH`] samples
    pub fn is_full(&self) -> bool {
        self.samples.is_full()
    }
}

/// Geometric ladder of candidate sampling frequencies
pub fn candidate_sampling_frequencies(config: &CurrentSenseConfig) -> Vec<f32, MAX_SIGNATURES> {
    let mut frequencies = Vec::new();
    let mut frequency = config.max_sampling_frequency;

    while frequency >= config.min_sampling_frequency && frequencies.len() < MAX_SIGNATURES - 1 {
        if frequencies.push(frequency).is_err() {
            break;
        }
        if config.frequency_ladder_ratio <= 1.0 {
            break;
        }
        frequency /= config.frequency_ladder_ratio;
    }
    frequencies
}

struct Levels {
    threshold: f32,
    contrast: f32,
}

fn levels(samples: &[f32]) -> Option<Levels> {
    if samples.is_empty() {
        return None;
    }
    let (min, max) = samples
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    Some(Levels {
        threshold: (min + max) / 2.0,
        contrast: max - min,
    })
}

fn mean(values: impl Iterator<Item = f32>) -> Option<f32> {
    let (sum, count) = values.fold((0.0f32, 0usize), |(s, n), v| (s + v, n + 1));
    (count > 0).then(|| sum / count as f32)
}

/// Feature vector of a repeating signature, if the buffer holds one
pub fn extract_feature_vector(buffer: &RawSignatureBuffer, config: &CurrentSenseConfig) -> Option<FeatureVector> {
    let samples = &buffer.samples[..];
    let Levels { threshold, contrast } = levels(samples)?;
    if contrast < config.min_signature_amplitude || buffer.sampling_frequency <= 0.0 {
        return None;
    }

    let mut first_edge = None;
    let mut last_edge = 0usize;
    let mut edges = 0usize;
    for (i, pair) in samples.windows(2).enumerate() {
        if pair[0] <= threshold && pair[1] > threshold {
            first_edge.get_or_insert(i + 1);
            last_edge = i + 1;
            edges += 1;
        }
    }

    let first_edge = first_edge?;
    let periods = edges.saturating_sub(1);
    if periods < config.min_signature_periods.max(1) {
        return None;
    }

    let span = &samples[first_edge..last_edge];
    let high_samples = span.iter().filter(|&&v| v > threshold).count();
    let high = mean(span.iter().copied().filter(|&v| v > threshold))?;
    let low = mean(span.iter().copied().filter(|&v| v <= threshold))?;
    if high <= 0.0 {
        return None;
    }

    Some(FeatureVector {
        sampling_frequency: buffer.sampling_frequency,
        signature_frequency: buffer.sampling_frequency * periods as f32 / span.len() as f32,
        relative_current_draw: (high - low) / high,
        duty_cycle: high_samples as f32 / span.len() as f32,
    })
}

/// Idle current from the lowest-frequency repeating buffer
///
/// Mean of the samples at or below the midpoint, or of every sample when
/// the buffer shows no contrast.
pub fn extract_offset_current(buffer: &RawSignatureBuffer, config: &CurrentSenseConfig) -> Option<OffsetCurrent> {
    let Levels { threshold, contrast } = levels(&buffer.samples)?;
    let offset_current = if contrast < config.min_signature_amplitude {
        mean(buffer.samples.iter().copied())?
    } else {
        mean(buffer.samples.iter().copied().filter(|&v| v <= threshold))?
    };

    Some(OffsetCurrent {
        lowest_sample_frequency: buffer.sampling_frequency,
        offset_current,
    })
}

/// Average on/off current of a non-repeating capture
///
/// Both levels equal the overall mean when the capture shows no contrast.
pub fn extract_average_current(buffer: &RawSignatureBuffer, config: &CurrentSenseConfig) -> Option<AverageCurrent> {
    let Levels { threshold, contrast } = levels(&buffer.samples)?;
    if contrast < config.min_signature_amplitude {
        let overall = mean(buffer.samples.iter().copied())?;
        return Some(AverageCurrent { on: overall, off: overall });
    }

    Some(AverageCurrent {
        on: mean(buffer.samples.iter().copied().filter(|&v| v > threshold))?,
        off: mean(buffer.samples.iter().copied().filter(|&v| v <= threshold))?,
    })
}

/// Buffer with the lowest sampling frequency
pub fn lowest_frequency_buffer(buffers: &[RawSignatureBuffer]) -> Option<&RawSignatureBuffer> {
    buffers
        .iter()
        .filter(|b| !b.samples.is_empty())
        .min_by(|a, b| a.sampling_frequency.total_cmp(&b.sampling_frequency))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(period: usize, high_samples: usize, low: f32, high: f32) -> RawSignatureBuffer {
        let mut buffer = RawSignatureBuffer::new(1000.0);
        for i in 0..SAMPLE_LENGTH {
            let value = if i % period < high_samples { high } else { low };
            buffer.samples.push(value).unwrap();
        }
        buffer
    }

    #[test]
    fn default_ladder() {
        let ladder = candidate_sampling_frequencies(&CurrentSenseConfig::default());
        assert_eq!(&ladder[..], &[10_000.0, 2500.0, 625.0, 156.25, 39.0625]);
    }

    #[test]
    fn ladder_is_capped() {
        let config = CurrentSenseConfig {
            frequency_ladder_ratio: 1.1,
            ..CurrentSenseConfig::default()
        };
        assert_eq!(candidate_sampling_frequencies(&config).len(), MAX_SIGNATURES - 1);

        let flat = CurrentSenseConfig {
            frequency_ladder_ratio: 1.0,
            ..CurrentSenseConfig::default()
        };
        assert_eq!(candidate_sampling_frequencies(&flat).len(), 1);
    }

    #[test]
    fn square_wave_features() {
        // 10-sample period at 1 kHz, 3 samples high
        let features = extract_feature_vector(&square(10, 3, 0.1, 0.5), &CurrentSenseConfig::default()).unwrap();

        assert_eq!(features.sampling_frequency, 1000.0);
        assert!((features.signature_frequency - 100.0).abs() < 1e-3);
        assert!((features.duty_cycle - 0.3).abs() < 1e-6);
        assert!((features.relative_current_draw - 0.8).abs() < 1e-6);
    }

    #[test]
    fn too_few_periods_is_not_a_signature() {
        // One rising edge inside the buffer
        let features = extract_feature_vector(&square(80, 40, 0.1, 0.5), &CurrentSenseConfig::default());
        assert_eq!(features, None);
    }

    #[test]
    fn flat_buffer_has_no_signature() {
        let flat = RawSignatureBuffer::from_samples(1000.0, &[0.2; SAMPLE_LENGTH]);
        let config = CurrentSenseConfig::default();

        assert_eq!(extract_feature_vector(&flat, &config), None);
        assert_eq!(
            extract_average_current(&flat, &config),
            Some(AverageCurrent { on: 0.2, off: 0.2 })
        );
        assert_eq!(extract_offset_current(&flat, &config).unwrap().offset_current, 0.2);
    }

    #[test]
    fn average_current_splits_levels() {
        let avg = extract_average_current(&square(25, 5, 1.0, 9.0), &CurrentSenseConfig::default()).unwrap();
        assert_eq!(avg, AverageCurrent { on: 9.0, off: 1.0 });
        assert!(extract_average_current(&RawSignatureBuffer::new(10.0), &CurrentSenseConfig::default()).is_none());
    }

    #[test]
    fn lowest_buffer_wins() {
        let buffers = [
            RawSignatureBuffer::from_samples(2500.0, &[1.0]),
            RawSignatureBuffer::from_samples(39.0, &[2.0]),
            RawSignatureBuffer::new(10.0),
        ];
        assert_eq!(lowest_frequency_buffer(&buffers).unwrap().sampling_frequency, 39.0);
    }
}
