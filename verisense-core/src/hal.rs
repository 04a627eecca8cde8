//! Hardware collaborator interfaces
//!
//! The core never touches registers. ADC sampling, timed delays and flash
//! access reach it through the traits below, implemented by the board
//! support layer. Errors raised by these collaborators are propagated
//! verbatim; retry policy belongs to the implementation, not to the core.
//!
//! Two host-side implementations ship with the crate: [`MemoryFlash`], a
//! word-addressed flash image in RAM, and [`StdDelay`] (with `std`).

use crate::errors::{VerifyError, VerifyResult};
use crate::signal::Fingerprint;

/// Captures one fall-curve fingerprint
///
/// The calibration search scales `sampling_frequency` by the ratio it wants
/// the capture window to grow or shrink by, so an implementation must map a
/// larger value to a proportionally longer window (the reference boards use
/// it to derive the per-sample wait).
pub trait FingerprintSampler {
    /// Fill `fingerprint` with one response curve sampled at `sampling_frequency` Hz
    fn sample_fingerprint(&mut self, sampling_frequency: u32, fingerprint: &mut Fingerprint) -> VerifyResult<()>;
}

/// Blocking delay source
pub trait DelayUs {
    /// Block for `us` microseconds
    fn delay_us(&mut self, us: u32);

    /// Whether delays come from a dedicated hardware timer.
    ///
    /// Software-timed delays jitter enough that a non-fall calibration result
    /// is not guaranteed to be unique.
    fn has_dedicated_timer(&self) -> bool {
        false
    }
}

/// One ADC reading as delivered by the acquisition layer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurrentSample {
    /// Converted reading
    pub value: f32,
    /// Sampling frequency the ADC actually achieved (Hz)
    pub sampling_frequency: f32,
}

/// Current-draw sample source used by the acquisition producer
pub trait CurrentSampleSource {
    /// Read the next sample at `sampling_frequency` Hz
    fn read_sample(&mut self, sampling_frequency: f32) -> VerifyResult<CurrentSample>;
}

/// Word-addressed persistent storage
///
/// Addresses are byte addresses and must be word aligned; lengths are in
/// 32-bit words. Each call is atomic from the core's point of view.
pub trait FlashStorage {
    /// Erase `words` words starting at `address`
    fn erase(&mut self, address: u32, words: u32) -> VerifyResult<()>;

    /// Program `data` starting at `address`
    fn write(&mut self, address: u32, data: &[u32]) -> VerifyResult<()>;

    /// Read `data.len()` words starting at `address`
    fn read(&mut self, address: u32, data: &mut [u32]) -> VerifyResult<()>;
}

/// Delay that returns immediately
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

impl DelayUs for NoDelay {
    fn delay_us(&mut self, _us: u32) {}
}

/// Thread-sleep delay for hosted targets
#[cfg(feature = "std")]
#[derive(Debug, Clone, Copy, Default)]
pub struct StdDelay;

#[cfg(feature = "std")]
impl DelayUs for StdDelay {
    fn delay_us(&mut self, us: u32) {
        std::thread::sleep(std::time::Duration::from_micros(us as u64));
    }
}

/// Erased flash word value
pub const ERASED_WORD: u32 = 0xFFFF_FFFF;

/// Flash image held in RAM
///
/// Mirrors a single contiguous flash region starting at `base`. Useful for
/// tests, simulators and devices that stage templates before committing
/// them.
#[derive(Clone)]
pub struct MemoryFlash<const WORDS: usize> {
    base: u32,
    words: [u32; WORDS],
}

impl<const WORDS: usize> MemoryFlash<WORDS> {
    /// Create an erased region starting at byte address `base`
    pub const fn new(base: u32) -> Self {
        Self {
            base,
            words: [ERASED_WORD; WORDS],
        }
    }

    /// First byte address of the region
    pub fn base(&self) -> u32 {
        self.base
    }

    /// Region size in words
    pub const fn capacity_words(&self) -> usize {
        WORDS
    }

    fn offset(&self, address: u32, words: usize) -> VerifyResult<usize> {
        let end = self.base as u64 + (WORDS as u64) * 4;
        if address < self.base || address as u64 >= end || address % 4 != 0 {
            return Err(VerifyError::FlashAddress { address });
        }
        if address as u64 + (words as u64) * 4 > end {
            return Err(VerifyError::FlashSize {
                address,
                words: words as u32,
            });
        }
        Ok(((address - self.base) / 4) as usize)
    }
}

impl<const WORDS: usize> FlashStorage for MemoryFlash<WORDS> {
    fn erase(&mut self, address: u32, words: u32) -> VerifyResult<()> {
        let start = self.offset(address, words as usize)?;
        self.words[start..start + words as usize].fill(ERASED_WORD);
        Ok(())
    }

    fn write(&mut self, address: u32, data: &[u32]) -> VerifyResult<()> {
        let start = self.offset(address, data.len())?;
        self.words[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read(&mut self, address: u32, data: &mut [u32]) -> VerifyResult<()> {
        let start = self.offset(address, data.len())?;
        data.copy_from_slice(&self.words[start..start + data.len()]);
        Ok(())
    }
}
