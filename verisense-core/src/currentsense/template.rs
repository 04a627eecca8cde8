//! Current-sense signature templates
//!
//! A sensor's learned current-draw behavior is either a set of repeating
//! signatures (one feature vector per sampling frequency that showed a
//! periodic waveform, plus the idle offset current) or, when nothing
//! repeats, the average on/off current of a free-running capture.
//!
//! ```text
//! SignatureTemplate
//! ├── Uncalibrated
//! ├── Repeating ──── signatures: [FeatureVector; ≤ MAX_SIGNATURES - 1]
//! │                  offset:     Option<OffsetCurrent>
//! └── NonRepeating ─ average:    Option<AverageCurrent>
//! ```
//!
//! Reads go through [`SignatureDatabase`], which fails with an error rather
//! than returning zeros for anything that was never captured.

use heapless::Vec;

use crate::constants::currentsense::MAX_SIGNATURES;
use crate::errors::{VerifyError, VerifyResult};

/// Features of one repeating current signature
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FeatureVector {
    /// Frequency the raw signature was sampled at (Hz)
    pub sampling_frequency: f32,
    /// Repetition frequency of the waveform (Hz)
    pub signature_frequency: f32,
    /// `(high - low) / high` current draw
    pub relative_current_draw: f32,
    /// Fraction of a period spent in the high state
    pub duty_cycle: f32,
}

/// Idle current measured alongside the repeating signatures
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OffsetCurrent {
    /// Sampling frequency of the buffer the offset came from (Hz)
    pub lowest_sample_frequency: f32,
    /// Mean low-state current
    pub offset_current: f32,
}

/// Average on/off current of a non-repeating signature
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AverageCurrent {
    /// Mean current while active
    pub on: f32,
    /// Mean current while idle
    pub off: f32,
}

impl AverageCurrent {
    /// Whether the capture distinguished an active and an idle level
    pub fn has_contrast(&self) -> bool {
        self.on != self.off
    }
}

/// Repeating-signature template
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RepeatingTemplate {
    /// Stored feature vectors, in sampling-frequency order of capture
    pub signatures: Vec<FeatureVector, MAX_SIGNATURES>,
    /// Offset current, once measured
    pub offset: Option<OffsetCurrent>,
}

/// Non-repeating-signature template
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NonRepeatingTemplate {
    /// Average currents, once measured
    pub average: Option<AverageCurrent>,
}

/// Numeric template type tag used by the flattened snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TemplateKind {
    /// Nothing learned yet
    Uncalibrated = 0,
    /// Average on/off current
    NonRepeating = 1,
    /// Feature vectors
    Repeating = 2,
}

impl TemplateKind {
    /// Decode a snapshot tag
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Uncalibrated),
            1 => Some(Self::NonRepeating),
            2 => Some(Self::Repeating),
            _ => None,
        }
    }
}

/// Learned current-draw template
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SignatureTemplate {
    /// Nothing learned yet
    #[default]
    Uncalibrated,
    /// Periodic waveform features
    Repeating(RepeatingTemplate),
    /// Average on/off current
    NonRepeating(NonRepeatingTemplate),
}

impl SignatureTemplate {
    /// Variant tag
    pub fn kind(&self) -> TemplateKind {
        match self {
            Self::Uncalibrated => TemplateKind::Uncalibrated,
            Self::NonRepeating(_) => TemplateKind::NonRepeating,
            Self::Repeating(_) => TemplateKind::Repeating,
        }
    }

    /// Confidence a freshly derived template deserves
    pub fn confidence(&self) -> u8 {
        use crate::constants::currentsense::{CONFIDENCE_NON_REPEATING, CONFIDENCE_REPEATING};

        match self {
            Self::Repeating(t) if !t.signatures.is_empty() => CONFIDENCE_REPEATING,
            Self::NonRepeating(NonRepeatingTemplate { average: Some(avg) }) if avg.has_contrast() => {
                CONFIDENCE_NON_REPEATING
            }
            _ => 0,
        }
    }
}

/// One sensor's template plus its "changed since last fetch" flag
#[derive(Debug, Clone, Default)]
pub struct SignatureDatabase {
    template: SignatureTemplate,
    updated: bool,
}

impl SignatureDatabase {
    /// Empty, uncalibrated
    pub fn new() -> Self {
        Self::default()
    }

    /// Current template
    pub fn template(&self) -> &SignatureTemplate {
        &self.template
    }

    /// Whether the template changed since the flag was last taken
    pub fn is_updated(&self) -> bool {
        self.updated
    }

    /// Read and clear the updated flag
    pub fn take_updated(&mut self) -> bool {
        core::mem::take(&mut self.updated)
    }

    /// Replace the whole template without marking it updated
    ///
    /// Used when the template comes from outside (snapshot sync, flash), where
    /// the caller already holds the same values.
    pub fn replace_template(&mut self, template: SignatureTemplate) {
        self.template = template;
        self.updated = false;
    }

    /// Forget everything
    pub fn reset(&mut self) {
        self.template = SignatureTemplate::Uncalibrated;
    }

    /// Append a repeating feature vector
    ///
    /// Switches the template to repeating. Rejected without mutation once
    /// `count + 1 >= MAX_SIGNATURES`.
    pub fn store_repeating_signature_feature_vector(&mut self, vector: FeatureVector) -> VerifyResult<()> {
        let count = match &self.template {
            SignatureTemplate::Repeating(t) => t.signatures.len(),
            _ => 0,
        };
        if count + 1 >= MAX_SIGNATURES {
            return Err(VerifyError::Capacity {
                capacity: MAX_SIGNATURES - 1,
            });
        }

        self.with_repeating(|template| template.signatures.push(vector))
            .map_err(|_| VerifyError::Capacity {
                capacity: MAX_SIGNATURES - 1,
            })?;
        self.updated = true;

        vt_debug!("{} repeating signatures stored", count + 1);
        Ok(())
    }

    /// Overwrite the offset current
    pub fn update_repeating_offset_current(&mut self, offset: OffsetCurrent) {
        self.with_repeating(|template| template.offset = Some(offset));
        self.updated = true;
    }

    /// Overwrite the non-repeating average current
    pub fn update_non_repeating_average_current(&mut self, average: AverageCurrent) {
        self.template = SignatureTemplate::NonRepeating(NonRepeatingTemplate {
            average: Some(average),
        });
        self.updated = true;
    }

    /// Stored feature vector at `index`
    pub fn fetch_repeating_signature_feature_vector(&self, index: usize) -> VerifyResult<FeatureVector> {
        let template = self.repeating()?;
        if template.signatures.is_empty() {
            return Err(VerifyError::NotAvailable {
                field: "repeating_signatures",
            });
        }
        template.signatures.get(index).copied().ok_or(VerifyError::Index {
            index,
            count: template.signatures.len(),
        })
    }

    /// Stored offset current
    pub fn fetch_repeating_offset_current(&self) -> VerifyResult<OffsetCurrent> {
        self.repeating()?
            .offset
            .ok_or(VerifyError::NotAvailable { field: "offset_current" })
    }

    /// Stored average on/off current
    pub fn fetch_non_repeating_average_current(&self) -> VerifyResult<AverageCurrent> {
        match &self.template {
            SignatureTemplate::NonRepeating(t) => t.average.ok_or(VerifyError::NotAvailable {
                field: "average_current",
            }),
            _ => Err(VerifyError::TemplateMismatch {
                expected: "non-repeating",
            }),
        }
    }

    /// Sampling frequencies of the stored repeating signatures
    ///
    /// Empty unless the template is repeating.
    pub fn repeating_sampling_frequencies(&self) -> Vec<f32, MAX_SIGNATURES> {
        match &self.template {
            SignatureTemplate::Repeating(t) => t.signatures.iter().map(|v| v.sampling_frequency).collect(),
            _ => Vec::new(),
        }
    }

    fn repeating(&self) -> VerifyResult<&RepeatingTemplate> {
        match &self.template {
            SignatureTemplate::Repeating(t) => Ok(t),
            _ => Err(VerifyError::TemplateMismatch { expected: "repeating" }),
        }
    }

    // Any other variant is replaced by an empty repeating template first
    fn with_repeating<R>(&mut self, update: impl FnOnce(&mut RepeatingTemplate) -> R) -> R {
        let mut template = match core::mem::take(&mut self.template) {
            SignatureTemplate::Repeating(t) => t,
            _ => RepeatingTemplate::default(),
        };
        let result = update(&mut template);
        self.template = SignatureTemplate::Repeating(template);
        result
    }
}
