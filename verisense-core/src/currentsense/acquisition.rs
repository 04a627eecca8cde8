//! Raw Signature Acquisition Handshake
//!
//! ## Overview
//!
//! Samples are produced by a timer- or interrupt-driven context and consumed
//! by the application task that drives the signature cycle. The two meet in
//! a [`RawSignatureReader`]:
//!
//! ```text
//!  consumer (engine)                     producer (ADC context)
//!  ─────────────────                     ──────────────────────
//!  begin(plan) ─────────────────────────► next_request()
//!                                          Repeating { cycle, index, f }
//!                                            complete_repeating(cycle, index, ...)
//!                                          NonRepeating { cycle, f }
//!                                            push_non_repeating(cycle, ...) ... Stop
//!  request_non_repeating_stop() ────────►  (acknowledged on next call)
//!  wait_collected(timeout) ◄──────────── all repeating filled
//!                                        + non-repeating stopped
//! ```
//!
//! ## State
//!
//! ```text
//! repeating:      Idle ─► Collecting ─► Filled
//! non-repeating:  Idle ─► Collecting ─► StopRequested ─► Stopped
//!                                   └──────────────────► Stopped (buffer full)
//! ```
//!
//! The buffers never leave the shared state until both machines have
//! finished; the consumer only ever sees them inside a
//! [`CollectedSignatures`] handed out by [`RawSignatureReader::try_collect`]
//! or [`RawSignatureReader::wait_collected`].
//!
//! Every [`begin`](RawSignatureReader::begin) opens a new cycle number and
//! each request carries it. A producer still holding a request from an
//! aborted cycle gets [`VerifyError::StaleRequest`] instead of writing into
//! the new one, and a repeating slot can only be completed after
//! [`next_request`](SignatureProducer::next_request) has handed it out.
//!
//! Waiting is a condition variable with a deadline. An expired deadline is
//! reported as [`VerifyError::WaitTimeout`], a poisoned lock as
//! [`VerifyError::Lock`].

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use heapless::Vec;

use super::features::RawSignatureBuffer;
use crate::constants::currentsense::{MAX_SIGNATURES, SAMPLE_LENGTH};
use crate::errors::{VerifyError, VerifyResult};
use crate::hal::{CurrentSample, CurrentSampleSource};

/// Frequencies one signature cycle should capture at
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AcquisitionPlan {
    /// One repeating buffer per entry
    pub repeating_frequencies: Vec<f32, MAX_SIGNATURES>,
    /// Rate for the free-running non-repeating capture
    pub non_repeating_frequency: f32,
}

/// Work handed to the producer
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AcquisitionRequest {
    /// Fill repeating buffer `index` at `sampling_frequency`
    Repeating {
        /// Cycle the request belongs to
        cycle: u32,
        /// Slot in the plan
        index: usize,
        /// Requested rate (Hz)
        sampling_frequency: f32,
    },
    /// Stream samples into the non-repeating buffer until told to stop
    NonRepeating {
        /// Cycle the request belongs to
        cycle: u32,
        /// Requested rate (Hz)
        sampling_frequency: f32,
    },
}

impl AcquisitionRequest {
    /// Cycle the request belongs to
    pub fn cycle(&self) -> u32 {
        match *self {
            Self::Repeating { cycle, .. } | Self::NonRepeating { cycle, .. } => cycle,
        }
    }
}

/// Whether the producer should keep streaming non-repeating samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    /// Keep pushing
    Continue,
    /// Buffer full or stop requested
    Stop,
}

/// Buffers of one finished signature cycle
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CollectedSignatures {
    repeating: Vec<RawSignatureBuffer, MAX_SIGNATURES>,
    non_repeating: RawSignatureBuffer,
}

impl CollectedSignatures {
    /// Repeating buffers in plan order
    pub fn repeating(&self) -> &[RawSignatureBuffer] {
        &self.repeating
    }

    /// The non-repeating capture
    pub fn non_repeating(&self) -> &RawSignatureBuffer {
        &self.non_repeating
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RepeatingState {
    Idle,
    Collecting,
    Filled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NonRepeatingState {
    Idle,
    Collecting,
    StopRequested,
    Stopped,
}

#[derive(Debug)]
struct ReaderState {
    cycle: u32,
    repeating_state: RepeatingState,
    non_repeating_state: NonRepeatingState,
    repeating: Vec<RawSignatureBuffer, MAX_SIGNATURES>,
    filled: Vec<bool, MAX_SIGNATURES>,
    next_repeating: usize,
    non_repeating: RawSignatureBuffer,
    non_repeating_requested: bool,
}

impl ReaderState {
    fn idle(cycle: u32) -> Self {
        Self {
            cycle,
            repeating_state: RepeatingState::Idle,
            non_repeating_state: NonRepeatingState::Idle,
            repeating: Vec::new(),
            filled: Vec::new(),
            next_repeating: 0,
            non_repeating: RawSignatureBuffer::default(),
            non_repeating_requested: false,
        }
    }

    fn in_flight(&self) -> bool {
        self.repeating_state != RepeatingState::Idle || self.non_repeating_state != NonRepeatingState::Idle
    }

    fn ready(&self) -> bool {
        self.repeating_state == RepeatingState::Filled && self.non_repeating_state == NonRepeatingState::Stopped
    }

    fn take(&mut self) -> CollectedSignatures {
        let finished = core::mem::replace(self, Self::idle(self.cycle));
        CollectedSignatures {
            repeating: finished.repeating,
            non_repeating: finished.non_repeating,
        }
    }

    fn check_cycle(&self, cycle: u32) -> VerifyResult<()> {
        if cycle == self.cycle && self.in_flight() {
            Ok(())
        } else {
            Err(VerifyError::StaleRequest { cycle })
        }
    }

    // Producer side only
    fn acknowledge_stop(&mut self) -> bool {
        if self.non_repeating_state == NonRepeatingState::StopRequested {
            self.non_repeating_state = NonRepeatingState::Stopped;
            true
        } else {
            false
        }
    }

    fn pending_request(&mut self) -> Option<AcquisitionRequest> {
        if self.repeating_state == RepeatingState::Collecting && self.next_repeating < self.repeating.len() {
            let index = self.next_repeating;
            self.next_repeating += 1;
            return Some(AcquisitionRequest::Repeating {
                cycle: self.cycle,
                index,
                sampling_frequency: self.repeating[index].sampling_frequency,
            });
        }
        if self.non_repeating_state == NonRepeatingState::Collecting && !self.non_repeating_requested {
            self.non_repeating_requested = true;
            return Some(AcquisitionRequest::NonRepeating {
                cycle: self.cycle,
                sampling_frequency: self.non_repeating.sampling_frequency,
            });
        }
        None
    }
}

struct Shared {
    state: Mutex<ReaderState>,
    changed: Condvar,
}

impl Shared {
    fn lock(&self) -> VerifyResult<MutexGuard<'_, ReaderState>> {
        self.state.lock().map_err(|_| VerifyError::Lock)
    }
}

/// Consumer end of the acquisition handshake
pub struct RawSignatureReader {
    shared: Arc<Shared>,
}

impl Default for RawSignatureReader {
    fn default() -> Self {
        Self::new()
    }
}

impl RawSignatureReader {
    /// Idle reader
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ReaderState::idle(0)),
                changed: Condvar::new(),
            }),
        }
    }

    /// Producer handle sharing this reader's state
    pub fn producer(&self) -> SignatureProducer {
        SignatureProducer {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Start a signature cycle
    ///
    /// Fails with [`VerifyError::Busy`] while a previous cycle has not been
    /// collected or aborted.
    pub fn begin(&self, plan: &AcquisitionPlan) -> VerifyResult<()> {
        let mut state = self.shared.lock()?;
        if state.in_flight() {
            return Err(VerifyError::Busy);
        }

        let cycle = state.cycle.wrapping_add(1);
        *state = ReaderState::idle(cycle);
        for &frequency in &plan.repeating_frequencies {
            let _ = state.repeating.push(RawSignatureBuffer::new(frequency));
            let _ = state.filled.push(false);
        }
        state.repeating_state = if state.repeating.is_empty() {
            RepeatingState::Filled
        } else {
            RepeatingState::Collecting
        };
        state.non_repeating = RawSignatureBuffer::new(plan.non_repeating_frequency);
        state.non_repeating_state = NonRepeatingState::Collecting;
        drop(state);

        vt_debug!(
            "signature cycle {} started: {} repeating buffers",
            cycle,
            plan.repeating_frequencies.len()
        );
        self.shared.changed.notify_all();
        Ok(())
    }

    /// Ask the producer to stop streaming the non-repeating capture
    pub fn request_non_repeating_stop(&self) -> VerifyResult<()> {
        let mut state = self.shared.lock()?;
        if state.non_repeating_state == NonRepeatingState::Collecting {
            state.non_repeating_state = NonRepeatingState::StopRequested;
            drop(state);
            self.shared.changed.notify_all();
        }
        Ok(())
    }

    /// Take the buffers if the cycle has finished
    pub fn try_collect(&self) -> nb::Result<CollectedSignatures, VerifyError> {
        let mut state = self.shared.lock().map_err(nb::Error::Other)?;
        if !state.in_flight() {
            return Err(nb::Error::Other(VerifyError::NotAvailable {
                field: "signature cycle",
            }));
        }
        if state.ready() {
            Ok(state.take())
        } else {
            Err(nb::Error::WouldBlock)
        }
    }

    /// Block until the cycle has finished, at most `timeout`
    pub fn wait_collected(&self, timeout: Duration) -> VerifyResult<CollectedSignatures> {
        let started = Instant::now();
        let state = self.shared.lock()?;
        if !state.in_flight() {
            return Err(VerifyError::NotAvailable {
                field: "signature cycle",
            });
        }

        let (mut state, _) = self
            .shared
            .changed
            .wait_timeout_while(state, timeout, |s| !s.ready())
            .map_err(|_| VerifyError::Lock)?;

        if !state.ready() {
            let waited_ms = started.elapsed().as_millis().min(u32::MAX as u128) as u32;
            vt_warn!("signature collection timed out after {} ms", waited_ms);
            return Err(VerifyError::WaitTimeout { waited_ms });
        }
        Ok(state.take())
    }

    /// Drop an unfinished cycle and return to idle
    pub fn abort(&self) -> VerifyResult<()> {
        let mut state = self.shared.lock()?;
        let cycle = state.cycle;
        *state = ReaderState::idle(cycle);
        drop(state);
        self.shared.changed.notify_all();
        Ok(())
    }
}

/// Producer end of the acquisition handshake
pub struct SignatureProducer {
    shared: Arc<Shared>,
}

impl SignatureProducer {
    /// Wait, at most `timeout`, for the next piece of work
    ///
    /// Also acknowledges a pending non-repeating stop request.
    pub fn next_request(&self, timeout: Duration) -> VerifyResult<AcquisitionRequest> {
        let started = Instant::now();
        let mut state = self.shared.lock()?;

        loop {
            if state.acknowledge_stop() {
                self.shared.changed.notify_all();
            }
            if let Some(request) = state.pending_request() {
                return Ok(request);
            }

            let remaining = timeout.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                let waited_ms = started.elapsed().as_millis().min(u32::MAX as u128) as u32;
                return Err(VerifyError::WaitTimeout { waited_ms });
            }
            let (next, _) = self
                .shared
                .changed
                .wait_timeout(state, remaining)
                .map_err(|_| VerifyError::Lock)?;
            state = next;
        }
    }

    /// Deliver repeating buffer `index` of `cycle`
    ///
    /// Only slots already handed out by [`next_request`](Self::next_request)
    /// in the current cycle are accepted; anything else is
    /// [`VerifyError::StaleRequest`] or [`VerifyError::Index`]. Samples past
    /// [`SAMPLE_LENGTH`] are dropped.
    pub fn complete_repeating(
        &self,
        cycle: u32,
        index: usize,
        samples: &[f32],
        achieved_frequency: f32,
    ) -> VerifyResult<()> {
        let mut state = self.shared.lock()?;
        state.check_cycle(cycle)?;
        if state.repeating_state != RepeatingState::Collecting {
            return Err(VerifyError::NotAvailable {
                field: "repeating collection",
            });
        }
        let issued = state.next_repeating;
        if index >= issued {
            return Err(VerifyError::Index { index, count: issued });
        }

        state.repeating[index] = RawSignatureBuffer::from_samples(achieved_frequency, samples);
        state.filled[index] = true;

        if state.filled.iter().all(|&f| f) {
            state.repeating_state = RepeatingState::Filled;
            drop(state);
            self.shared.changed.notify_all();
        }
        Ok(())
    }

    /// Append one non-repeating sample to `cycle`
    ///
    /// Fails with [`VerifyError::StaleRequest`] once `cycle` has been aborted
    /// or collected.
    pub fn push_non_repeating(&self, cycle: u32, sample: CurrentSample) -> VerifyResult<Collection> {
        let mut state = self.shared.lock()?;
        state.check_cycle(cycle)?;
        if !state.non_repeating_requested {
            return Err(VerifyError::NotAvailable {
                field: "non-repeating request",
            });
        }

        let collection = match state.non_repeating_state {
            NonRepeatingState::Collecting => {
                state.non_repeating.sampling_frequency = sample.sampling_frequency;
                if state.non_repeating.samples.push(sample.value).is_err() || state.non_repeating.is_full() {
                    state.non_repeating_state = NonRepeatingState::Stopped;
                    Collection::Stop
                } else {
                    return Ok(Collection::Continue);
                }
            }
            NonRepeatingState::StopRequested => {
                state.non_repeating_state = NonRepeatingState::Stopped;
                Collection::Stop
            }
            NonRepeatingState::Idle | NonRepeatingState::Stopped => return Ok(Collection::Stop),
        };

        drop(state);
        self.shared.changed.notify_all();
        Ok(collection)
    }
}

/// Serve one request from a sample source
///
/// Repeating requests read [`SAMPLE_LENGTH`] samples; non-repeating requests
/// stream until the reader says stop.
pub fn fill_from_source<S: CurrentSampleSource>(
    producer: &SignatureProducer,
    source: &mut S,
    timeout: Duration,
) -> VerifyResult<AcquisitionRequest> {
    let request = producer.next_request(timeout)?;

    match request {
        AcquisitionRequest::Repeating {
            cycle,
            index,
            sampling_frequency,
        } => {
            let mut samples = [0.0f32; SAMPLE_LENGTH];
            let mut achieved = sampling_frequency;
            for slot in samples.iter_mut() {
                let sample = source.read_sample(sampling_frequency)?;
                *slot = sample.value;
                achieved = sample.sampling_frequency;
            }
            producer.complete_repeating(cycle, index, &samples, achieved)?;
        }
        AcquisitionRequest::NonRepeating {
            cycle,
            sampling_frequency,
        } => loop {
            let sample = source.read_sample(sampling_frequency)?;
            if producer.push_non_repeating(cycle, sample)? == Collection::Stop {
                break;
            }
        },
    }

    Ok(request)
}
