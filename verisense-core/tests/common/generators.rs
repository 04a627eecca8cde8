//! Synthetic sensors
//!
//! Fall-curve samplers stretch their capture window with the requested
//! sampling value, the way the reference boards derive the per-sample wait
//! from it. Current sources keep their waveform period fixed in samples so
//! every rung of the candidate ladder sees the same signature.

use verisense_core::{
    CurrentSample, CurrentSampleSource, DelayUs, Fingerprint, FingerprintSampler, VerifyError, VerifyResult,
};

/// RC discharge: `amplitude · exp(-i · f / time_scale)`
#[derive(Debug, Clone, Copy)]
pub struct DischargeSampler {
    pub amplitude: f32,
    pub time_scale: f32,
    pub captures: u32,
}

impl DischargeSampler {
    pub fn new(time_scale: f32) -> Self {
        Self {
            amplitude: 4000.0,
            time_scale,
            captures: 0,
        }
    }
}

impl FingerprintSampler for DischargeSampler {
    fn sample_fingerprint(&mut self, sampling_frequency: u32, fingerprint: &mut Fingerprint) -> VerifyResult<()> {
        self.captures += 1;
        for (i, slot) in fingerprint.iter_mut().enumerate() {
            let exponent = -(i as f32) * sampling_frequency as f32 / self.time_scale;
            *slot = (self.amplitude * libm::expf(exponent)) as u32;
        }
        Ok(())
    }
}

/// Sensor whose output climbs after power-off (pull-up fitted)
#[derive(Debug, Clone, Copy, Default)]
pub struct RisingSampler;

impl FingerprintSampler for RisingSampler {
    fn sample_fingerprint(&mut self, _sampling_frequency: u32, fingerprint: &mut Fingerprint) -> VerifyResult<()> {
        for (i, slot) in fingerprint.iter_mut().enumerate() {
            *slot = 100 + i as u32 * 20;
        }
        Ok(())
    }
}

/// ADC that fails after a number of captures
#[derive(Debug, Clone, Copy)]
pub struct FlakySampler {
    pub inner: DischargeSampler,
    pub fail_after: u32,
}

impl FingerprintSampler for FlakySampler {
    fn sample_fingerprint(&mut self, sampling_frequency: u32, fingerprint: &mut Fingerprint) -> VerifyResult<()> {
        if self.inner.captures >= self.fail_after {
            return Err(VerifyError::Generic { reason: "adc overrun" });
        }
        self.inner.sample_fingerprint(sampling_frequency, fingerprint)
    }
}

/// Delay backed by a hardware timer, recording the time requested
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordingTimer {
    pub waited_us: u64,
}

impl DelayUs for RecordingTimer {
    fn delay_us(&mut self, us: u32) {
        self.waited_us += us as u64;
    }

    fn has_dedicated_timer(&self) -> bool {
        true
    }
}

/// Periodic load: `high` for `on_samples` of every `period` samples
#[derive(Debug, Clone, Copy)]
pub struct SquareCurrent {
    pub low: f32,
    pub high: f32,
    pub period: usize,
    pub on_samples: usize,
    n: usize,
}

impl SquareCurrent {
    pub fn new(low: f32, high: f32) -> Self {
        Self {
            low,
            high,
            period: 10,
            on_samples: 3,
            n: 0,
        }
    }
}

impl CurrentSampleSource for SquareCurrent {
    fn read_sample(&mut self, sampling_frequency: f32) -> VerifyResult<CurrentSample> {
        let value = if self.n % self.period < self.on_samples {
            self.high
        } else {
            self.low
        };
        self.n += 1;
        Ok(CurrentSample {
            value,
            sampling_frequency,
        })
    }
}

/// Aperiodic load: a single burst every `every` samples
#[derive(Debug, Clone, Copy)]
pub struct BurstCurrent {
    pub idle: f32,
    pub active: f32,
    pub every: usize,
    n: usize,
}

impl BurstCurrent {
    pub fn new(idle: f32, active: f32) -> Self {
        Self {
            idle,
            active,
            every: 100,
            n: 0,
        }
    }
}

impl CurrentSampleSource for BurstCurrent {
    fn read_sample(&mut self, sampling_frequency: f32) -> VerifyResult<CurrentSample> {
        let phase = self.n % self.every;
        self.n += 1;
        Ok(CurrentSample {
            value: if (20..30).contains(&phase) { self.active } else { self.idle },
            sampling_frequency,
        })
    }
}
