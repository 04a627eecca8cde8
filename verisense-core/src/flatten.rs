//! Flattened template snapshot
//!
//! The telemetry layer exchanges a current-sense template as a flat record
//! of fixed-width ASCII decimals, one per field:
//!
//! ```text
//! field                      count   example
//! template_type              1       "2"
//! avg_curr_on / avg_curr_off 2       "12.5000"
//! num_signatures             1       "3"
//! offset_current             1       "0.1000"
//! lowest_sample_frequency    1       "39.0625"
//! sampling_frequency[]       10      "10000.0000" | "-1.0000"
//! signature_frequency[]      10
//! relative_current_draw[]    10
//! duty_cycle[]               10
//! ```
//!
//! Every number is written with [`NUMBER_PRECISION`] decimals and must fit
//! in [`NUMBER_WIDTH`] − 1 characters. Fields that hold nothing carry the
//! [`DATA_NOT_AVAILABLE`] sentinel. A measured current that would print as
//! the sentinel cannot be told apart from a missing one, so flattening
//! refuses it with [`VerifyError::Codec`].
//!
//! The byte form concatenates the fields in the order above, each NUL-padded
//! to [`NUMBER_WIDTH`] bytes. The word form packs those bytes little-endian
//! into `u32`s for the flash collaborator.

use core::fmt::Write;

use heapless::String;

use crate::constants::currentsense::{DATA_NOT_AVAILABLE, MAX_SIGNATURES, NUMBER_PRECISION, NUMBER_WIDTH};
use crate::currentsense::template::{
    AverageCurrent, FeatureVector, NonRepeatingTemplate, OffsetCurrent, RepeatingTemplate, SignatureTemplate,
    TemplateKind,
};
use crate::errors::{VerifyError, VerifyResult};

/// One fixed-width field
pub type FlatField = String<NUMBER_WIDTH>;

const SCALAR_FIELDS: usize = 6;
const ARRAY_FIELDS: usize = 4;

/// Number of fields in a snapshot
pub const FLATTENED_FIELDS: usize = SCALAR_FIELDS + ARRAY_FIELDS * MAX_SIGNATURES;

/// Bytes in the byte form
pub const FLATTENED_BYTES: usize = FLATTENED_FIELDS * NUMBER_WIDTH;

/// Words in the word form
pub const FLATTENED_WORDS: usize = FLATTENED_BYTES / 4;

/// Template as fixed-width decimal strings
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FlattenedDatabase {
    /// [`TemplateKind`] tag
    pub template_type: FlatField,
    /// Non-repeating average on current
    pub avg_curr_on: FlatField,
    /// Non-repeating average off current
    pub avg_curr_off: FlatField,
    /// Stored repeating signatures
    pub num_signatures: FlatField,
    /// Repeating offset current
    pub offset_current: FlatField,
    /// Frequency the offset current was measured at
    pub lowest_sample_frequency: FlatField,
    /// Per-signature sampling frequency
    pub sampling_frequency: [FlatField; MAX_SIGNATURES],
    /// Per-signature waveform frequency
    pub signature_frequency: [FlatField; MAX_SIGNATURES],
    /// Per-signature relative current draw
    pub relative_current_draw: [FlatField; MAX_SIGNATURES],
    /// Per-signature duty cycle
    pub duty_cycle: [FlatField; MAX_SIGNATURES],
}

impl Default for FlattenedDatabase {
    /// Snapshot of an uncalibrated template
    fn default() -> Self {
        Self {
            template_type: integer(TemplateKind::Uncalibrated as u32),
            avg_curr_on: sentinel(),
            avg_curr_off: sentinel(),
            num_signatures: integer(0),
            offset_current: sentinel(),
            lowest_sample_frequency: sentinel(),
            sampling_frequency: core::array::from_fn(|_| sentinel()),
            signature_frequency: core::array::from_fn(|_| sentinel()),
            relative_current_draw: core::array::from_fn(|_| sentinel()),
            duty_cycle: core::array::from_fn(|_| sentinel()),
        }
    }
}

fn sentinel() -> FlatField {
    // The sentinel always fits
    number(DATA_NOT_AVAILABLE, "sentinel").unwrap_or_default()
}

fn integer(value: u32) -> FlatField {
    let mut field = FlatField::new();
    // At most ten digits
    let _ = write!(field, "{}", value);
    field
}

fn number(value: f32, field: &'static str) -> VerifyResult<FlatField> {
    if !value.is_finite() {
        return Err(VerifyError::Codec { field });
    }
    let mut out = FlatField::new();
    write!(out, "{:.*}", NUMBER_PRECISION, value).map_err(|_| VerifyError::Codec { field })?;
    if out.len() >= NUMBER_WIDTH {
        return Err(VerifyError::Codec { field });
    }
    Ok(out)
}

fn optional(value: Option<f32>, field: &'static str) -> VerifyResult<FlatField> {
    number(value.unwrap_or(DATA_NOT_AVAILABLE), field)
}

// Present values must not read back as absent
fn measured(value: Option<f32>, field: &'static str) -> VerifyResult<FlatField> {
    let Some(value) = value else {
        return Ok(sentinel());
    };
    let out = number(value, field)?;
    if out == sentinel() {
        return Err(VerifyError::Codec { field });
    }
    Ok(out)
}

fn parse(text: &str, field: &'static str) -> VerifyResult<f32> {
    let value: f32 = text.trim().parse().map_err(|_| VerifyError::Codec { field })?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(VerifyError::Codec { field })
    }
}

fn parse_optional(text: &str, field: &'static str) -> VerifyResult<Option<f32>> {
    let value = parse(text, field)?;
    Ok((value != DATA_NOT_AVAILABLE).then_some(value))
}

fn parse_count(text: &str, field: &'static str) -> VerifyResult<usize> {
    let value = parse(text, field)?;
    if value < 0.0 || libm::roundf(value) != value {
        return Err(VerifyError::Codec { field });
    }
    Ok(value as usize)
}

impl FlattenedDatabase {
    /// Flatten a template
    ///
    /// Fails with [`VerifyError::Codec`] when a value does not fit the field
    /// width or a measured current collides with the absent sentinel.
    pub fn from_template(template: &SignatureTemplate) -> VerifyResult<Self> {
        let mut flat = Self {
            template_type: integer(template.kind() as u32),
            ..Self::default()
        };

        match template {
            SignatureTemplate::Uncalibrated => {}
            SignatureTemplate::NonRepeating(t) => {
                flat.avg_curr_on = measured(t.average.map(|a| a.on), "avg_curr_on")?;
                flat.avg_curr_off = measured(t.average.map(|a| a.off), "avg_curr_off")?;
            }
            SignatureTemplate::Repeating(t) => {
                flat.num_signatures = integer(t.signatures.len() as u32);
                flat.offset_current = measured(t.offset.map(|o| o.offset_current), "offset_current")?;
                flat.lowest_sample_frequency = optional(
                    t.offset.map(|o| o.lowest_sample_frequency),
                    "lowest_sample_frequency",
                )?;
                for (i, vector) in t.signatures.iter().enumerate() {
                    flat.sampling_frequency[i] = number(vector.sampling_frequency, "sampling_frequency")?;
                    flat.signature_frequency[i] = number(vector.signature_frequency, "signature_frequency")?;
                    flat.relative_current_draw[i] =
                        number(vector.relative_current_draw, "relative_current_draw")?;
                    flat.duty_cycle[i] = number(vector.duty_cycle, "duty_cycle")?;
                }
            }
        }
        Ok(flat)
    }

    /// Parse back into a template
    pub fn to_template(&self) -> VerifyResult<SignatureTemplate> {
        let tag = parse_count(&self.template_type, "template_type")?;
        let kind = u8::try_from(tag)
            .ok()
            .and_then(TemplateKind::from_tag)
            .ok_or(VerifyError::Codec { field: "template_type" })?;

        match kind {
            TemplateKind::Uncalibrated => Ok(SignatureTemplate::Uncalibrated),
            TemplateKind::NonRepeating => {
                let on = parse_optional(&self.avg_curr_on, "avg_curr_on")?;
                let off = parse_optional(&self.avg_curr_off, "avg_curr_off")?;
                let average = match (on, off) {
                    (Some(on), Some(off)) => Some(AverageCurrent { on, off }),
                    _ => None,
                };
                Ok(SignatureTemplate::NonRepeating(NonRepeatingTemplate { average }))
            }
            TemplateKind::Repeating => {
                let count = parse_count(&self.num_signatures, "num_signatures")?;
                if count >= MAX_SIGNATURES {
                    return Err(VerifyError::Codec { field: "num_signatures" });
                }

                let mut template = RepeatingTemplate::default();
                for i in 0..count {
                    let vector = FeatureVector {
                        sampling_frequency: parse(&self.sampling_frequency[i], "sampling_frequency")?,
                        signature_frequency: parse(&self.signature_frequency[i], "signature_frequency")?,
                        relative_current_draw: parse(&self.relative_current_draw[i], "relative_current_draw")?,
                        duty_cycle: parse(&self.duty_cycle[i], "duty_cycle")?,
                    };
                    template
                        .signatures
                        .push(vector)
                        .map_err(|_| VerifyError::Codec { field: "num_signatures" })?;
                }

                let offset = parse_optional(&self.offset_current, "offset_current")?;
                let lowest = parse_optional(&self.lowest_sample_frequency, "lowest_sample_frequency")?;
                template.offset = offset.map(|offset_current| OffsetCurrent {
                    lowest_sample_frequency: lowest.unwrap_or(DATA_NOT_AVAILABLE),
                    offset_current,
                });
                Ok(SignatureTemplate::Repeating(template))
            }
        }
    }

    fn fields(&self) -> impl Iterator<Item = &FlatField> {
        [
            &self.template_type,
            &self.avg_curr_on,
            &self.avg_curr_off,
            &self.num_signatures,
            &self.offset_current,
            &self.lowest_sample_frequency,
        ]
        .into_iter()
        .chain(self.sampling_frequency.iter())
        .chain(self.signature_frequency.iter())
        .chain(self.relative_current_draw.iter())
        .chain(self.duty_cycle.iter())
    }

    fn fields_mut(&mut self) -> impl Iterator<Item = &mut FlatField> {
        [
            &mut self.template_type,
            &mut self.avg_curr_on,
            &mut self.avg_curr_off,
            &mut self.num_signatures,
            &mut self.offset_current,
            &mut self.lowest_sample_frequency,
        ]
        .into_iter()
        .chain(self.sampling_frequency.iter_mut())
        .chain(self.signature_frequency.iter_mut())
        .chain(self.relative_current_draw.iter_mut())
        .chain(self.duty_cycle.iter_mut())
    }

    /// NUL-padded byte form
    pub fn to_bytes(&self) -> [u8; FLATTENED_BYTES] {
        let mut bytes = [0u8; FLATTENED_BYTES];
        for (chunk, field) in bytes.chunks_exact_mut(NUMBER_WIDTH).zip(self.fields()) {
            let text = field.as_bytes();
            let len = text.len().min(NUMBER_WIDTH - 1);
            chunk[..len].copy_from_slice(&text[..len]);
        }
        bytes
    }

    /// Parse the byte form
    ///
    /// Only the field layout is checked here; values are validated by
    /// [`FlattenedDatabase::to_template`].
    pub fn from_bytes(bytes: &[u8]) -> VerifyResult<Self> {
        if bytes.len() != FLATTENED_BYTES {
            return Err(VerifyError::Codec { field: "snapshot" });
        }

        let mut flat = Self::default();
        for (chunk, field) in bytes.chunks_exact(NUMBER_WIDTH).zip(flat.fields_mut()) {
            let end = chunk.iter().position(|&b| b == 0).unwrap_or(NUMBER_WIDTH);
            let text = core::str::from_utf8(&chunk[..end]).map_err(|_| VerifyError::Codec { field: "snapshot" })?;
            field.clear();
            field
                .push_str(text)
                .map_err(|_| VerifyError::Codec { field: "snapshot" })?;
        }
        Ok(flat)
    }

    /// Little-endian word form for flash
    pub fn to_words(&self) -> [u32; FLATTENED_WORDS] {
        let bytes = self.to_bytes();
        let mut words = [0u32; FLATTENED_WORDS];
        for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(4)) {
            *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        words
    }

    /// Parse the word form
    pub fn from_words(words: &[u32]) -> VerifyResult<Self> {
        if words.len() != FLATTENED_WORDS {
            return Err(VerifyError::Codec { field: "snapshot" });
        }
        let mut bytes = [0u8; FLATTENED_BYTES];
        for (chunk, word) in bytes.chunks_exact_mut(4).zip(words) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        Self::from_bytes(&bytes)
    }
}
