//! Fingerprint Template Database
//!
//! Three fixed-capacity tables keyed by sensor id:
//!
//! | table        | entry                                   | match metric              |
//! |--------------|-----------------------------------------|---------------------------|
//! | fingerprints | 100-sample curve + sampling frequency   | NRMSE                     |
//! | fall times   | peak to 37 % crossing (µs)              | relative difference (%)   |
//! | Pearson      | curve/index correlation                 | relative difference (%)   |
//!
//! Tables are append-only until cleared. A nearest-match search returns the
//! entry with the smallest distance strictly below the table's threshold;
//! on an exact tie the earlier entry wins.
//!
//! ## Flash Image
//!
//! [`TemplateDatabase::save`] writes a fixed-layout image of
//! [`TemplateDatabase::IMAGE_WORDS`] words:
//!
//! ```text
//! [magic] [n_fp] n_fp slots × (100 samples, frequency, id)
//!                [n_ft] slots × (fall time, id)
//!                [n_pc] slots × (coefficient bits, id)
//! ```
//!
//! Every slot is reserved whether occupied or not, so an image can be
//! located without parsing.

use heapless::Vec;

use crate::config::MatchThresholds;
use crate::constants::fallcurve::{DATABASE_MAGIC, DB_CAPACITY, FALL_CROSSING_FRACTION, FINGERPRINT_LENGTH};
use crate::errors::{VerifyError, VerifyResult};
use crate::hal::FlashStorage;
use crate::signal::{fall_time_us, nrmse, pearson_coefficient, relative_deviation_pct, Fingerprint};

/// Identifier the application assigns to a physical sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SensorId(pub u8);

/// Outcome of a nearest-match search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identification {
    /// Closest entry within threshold
    Identified(SensorId),
    /// Nothing within threshold
    Unidentified,
}

impl Identification {
    /// Matched sensor, if any
    pub fn sensor_id(self) -> Option<SensorId> {
        match self {
            Self::Identified(id) => Some(id),
            Self::Unidentified => None,
        }
    }

    /// Convert into a result, failing with [`VerifyError::UnidentifiedSensor`]
    pub fn into_result(self) -> VerifyResult<SensorId> {
        self.sensor_id().ok_or(VerifyError::UnidentifiedSensor)
    }
}

/// Stored fall curve
#[derive(Debug, Clone, PartialEq)]
pub struct FingerprintEntry {
    /// Sampled curve
    pub fingerprint: Fingerprint,
    /// Frequency it was sampled at (Hz)
    pub sampling_frequency: u32,
    /// Owner
    pub sensor_id: SensorId,
}

/// Stored fall time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FallTimeEntry {
    /// Peak to 37 % crossing (µs)
    pub fall_time_us: u32,
    /// Owner
    pub sensor_id: SensorId,
}

/// Stored Pearson coefficient
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PearsonEntry {
    /// Correlation between the curve and its sample index
    pub coefficient: f32,
    /// Owner
    pub sensor_id: SensorId,
}

/// Fixed-capacity fingerprint, fall-time and Pearson tables
#[derive(Debug, Clone)]
pub struct TemplateDatabase {
    fingerprints: Vec<FingerprintEntry, DB_CAPACITY>,
    fall_times: Vec<FallTimeEntry, DB_CAPACITY>,
    pearson: Vec<PearsonEntry, DB_CAPACITY>,
    thresholds: MatchThresholds,
}

impl Default for TemplateDatabase {
    fn default() -> Self {
        Self::new(MatchThresholds::default())
    }
}

const FINGERPRINT_SLOT_WORDS: usize = FINGERPRINT_LENGTH + 2;
const SCALAR_SLOT_WORDS: usize = 2;

impl TemplateDatabase {
    /// Words occupied by a saved image
    pub const IMAGE_WORDS: usize =
        1 + (1 + DB_CAPACITY * FINGERPRINT_SLOT_WORDS) + 2 * (1 + DB_CAPACITY * SCALAR_SLOT_WORDS);

    /// Empty database with the given match thresholds
    pub fn new(thresholds: MatchThresholds) -> Self {
        Self {
            fingerprints: Vec::new(),
            fall_times: Vec::new(),
            pearson: Vec::new(),
            thresholds,
        }
    }

    /// Thresholds used by the match searches
    pub fn thresholds(&self) -> &MatchThresholds {
        &self.thresholds
    }

    // ===== FINGERPRINTS =====

    /// Append a fingerprint
    pub fn store_fingerprint(
        &mut self,
        fingerprint: &Fingerprint,
        sampling_frequency: u32,
        sensor_id: SensorId,
    ) -> VerifyResult<()> {
        self.fingerprints
            .push(FingerprintEntry {
                fingerprint: *fingerprint,
                sampling_frequency,
                sensor_id,
            })
            .map_err(|_| VerifyError::Capacity { capacity: DB_CAPACITY })
    }

    /// Entry at `index`
    pub fn fetch_fingerprint(&self, index: usize) -> VerifyResult<&FingerprintEntry> {
        fetch(&self.fingerprints, index)
    }

    /// Stored fingerprints
    pub fn fingerprint_count(&self) -> usize {
        self.fingerprints.len()
    }

    /// Drop every fingerprint
    pub fn clear_fingerprints(&mut self) {
        self.fingerprints.clear();
    }

    /// Closest stored fingerprint by NRMSE
    pub fn match_fingerprint(&self, fingerprint: &Fingerprint) -> Identification {
        nearest(
            self.fingerprints
                .iter()
                .map(|entry| (nrmse(&entry.fingerprint, fingerprint), entry.sensor_id)),
            self.thresholds.repeatability_threshold,
        )
    }

    // ===== FALL TIMES =====

    /// Append a fall time
    pub fn store_fall_time(&mut self, fall_time_us: u32, sensor_id: SensorId) -> VerifyResult<()> {
        self.fall_times
            .push(FallTimeEntry { fall_time_us, sensor_id })
            .map_err(|_| VerifyError::Capacity { capacity: DB_CAPACITY })
    }

    /// Entry at `index`
    pub fn fetch_fall_time(&self, index: usize) -> VerifyResult<&FallTimeEntry> {
        fetch(&self.fall_times, index)
    }

    /// Stored fall times
    pub fn fall_time_count(&self) -> usize {
        self.fall_times.len()
    }

    /// Drop every fall time
    pub fn clear_fall_times(&mut self) {
        self.fall_times.clear();
    }

    /// Closest stored fall time by relative difference
    pub fn match_fall_time(&self, fall_time_us: u32) -> Identification {
        nearest(
            self.fall_times.iter().filter_map(|entry| {
                relative_deviation_pct(fall_time_us as f32, entry.fall_time_us as f32, "fall_time")
                    .ok()
                    .map(|pct| (pct, entry.sensor_id))
            }),
            self.thresholds.fall_time_threshold,
        )
    }

    // ===== PEARSON COEFFICIENTS =====

    /// Append a Pearson coefficient
    pub fn store_pearson_coefficient(&mut self, coefficient: f32, sensor_id: SensorId) -> VerifyResult<()> {
        self.pearson
            .push(PearsonEntry { coefficient, sensor_id })
            .map_err(|_| VerifyError::Capacity { capacity: DB_CAPACITY })
    }

    /// Entry at `index`
    pub fn fetch_pearson_coefficient(&self, index: usize) -> VerifyResult<&PearsonEntry> {
        fetch(&self.pearson, index)
    }

    /// Stored coefficients
    pub fn pearson_coefficient_count(&self) -> usize {
        self.pearson.len()
    }

    /// Drop every coefficient
    pub fn clear_pearson_coefficients(&mut self) {
        self.pearson.clear();
    }

    /// Closest stored coefficient by relative difference
    pub fn match_pearson_coefficient(&self, coefficient: f32) -> Identification {
        nearest(
            self.pearson.iter().filter_map(|entry| {
                relative_deviation_pct(coefficient, entry.coefficient, "pearson_coefficient")
                    .ok()
                    .map(|pct| (pct, entry.sensor_id))
            }),
            self.thresholds.pearson_coefficient_threshold,
        )
    }

    // ===== COMBINED =====

    /// Store a fingerprint together with its fall time and Pearson coefficient
    ///
    /// All three tables must have room; nothing is stored otherwise. A curve
    /// without a 37 % crossing is stored with a zero fall time.
    pub fn store_fingerprint_with_features(
        &mut self,
        fingerprint: &Fingerprint,
        sampling_frequency: u32,
        sensor_id: SensorId,
    ) -> VerifyResult<()> {
        if self.fingerprints.is_full() || self.fall_times.is_full() || self.pearson.is_full() {
            return Err(VerifyError::Capacity { capacity: DB_CAPACITY });
        }

        let fall_time = fall_time_us(fingerprint, sampling_frequency, FALL_CROSSING_FRACTION).unwrap_or(0);
        self.store_fingerprint(fingerprint, sampling_frequency, sensor_id)?;
        self.store_fall_time(fall_time, sensor_id)?;
        self.store_pearson_coefficient(pearson_coefficient(fingerprint), sensor_id)?;

        vt_debug!("stored sensor {} (fall time {} us)", sensor_id.0, fall_time);
        Ok(())
    }

    /// Identify the sensor that produced `fingerprint`
    ///
    /// Fall time and Pearson coefficient are tried first and must agree on
    /// the same sensor. Otherwise the full-curve NRMSE match decides.
    pub fn identify(&self, fingerprint: &Fingerprint, sampling_frequency: u32) -> Identification {
        if !self.fall_times.is_empty() && !self.pearson.is_empty() {
            if let Some(fall_time) = fall_time_us(fingerprint, sampling_frequency, FALL_CROSSING_FRACTION) {
                let by_fall_time = self.match_fall_time(fall_time);
                let by_pearson = self.match_pearson_coefficient(pearson_coefficient(fingerprint));

                if let (Identification::Identified(a), Identification::Identified(b)) = (by_fall_time, by_pearson) {
                    if a == b {
                        return by_fall_time;
                    }
                    vt_debug!("feature matches disagree ({} vs {})", a.0, b.0);
                }
            }
        }

        self.match_fingerprint(fingerprint)
    }

    /// Empty every table
    pub fn clear_all(&mut self) {
        self.clear_fingerprints();
        self.clear_fall_times();
        self.clear_pearson_coefficients();
    }

    // ===== PERSISTENCE =====

    /// Write the database image at `address`
    pub fn save<F: FlashStorage>(&self, flash: &mut F, address: u32) -> VerifyResult<()> {
        flash.erase(address, Self::IMAGE_WORDS as u32)?;

        let mut cursor = address;
        flash.write(cursor, &[DATABASE_MAGIC, self.fingerprints.len() as u32])?;
        cursor += 8;

        for entry in &self.fingerprints {
            flash.write(cursor, &entry.fingerprint)?;
            flash.write(
                cursor + (FINGERPRINT_LENGTH as u32) * 4,
                &[entry.sampling_frequency, entry.sensor_id.0 as u32],
            )?;
            cursor += (FINGERPRINT_SLOT_WORDS as u32) * 4;
        }
        cursor = address + 8 + (DB_CAPACITY * FINGERPRINT_SLOT_WORDS) as u32 * 4;

        cursor = write_scalar_table(
            flash,
            cursor,
            self.fall_times.iter().map(|e| [e.fall_time_us, e.sensor_id.0 as u32]),
            self.fall_times.len(),
        )?;
        write_scalar_table(
            flash,
            cursor,
            self.pearson.iter().map(|e| [e.coefficient.to_bits(), e.sensor_id.0 as u32]),
            self.pearson.len(),
        )?;

        vt_info!(
            "saved {} fingerprints to flash at {:#x}",
            self.fingerprints.len(),
            address
        );
        Ok(())
    }

    /// Replace the tables with the image at `address`
    ///
    /// Returns `false` and leaves the database empty when no image is
    /// present. A flash or decode error part way through leaves the current
    /// tables untouched.
    pub fn load<F: FlashStorage>(&mut self, flash: &mut F, address: u32) -> VerifyResult<bool> {
        let mut header = [0u32; 2];
        flash.read(address, &mut header)?;
        if header[0] != DATABASE_MAGIC {
            vt_info!("no template database at {:#x}", address);
            self.clear_all();
            return Ok(false);
        }

        let mut loaded = Self::new(self.thresholds);

        let count = checked_count(header[1], "fingerprint_count")?;
        let mut cursor = address + 8;
        for _ in 0..count {
            let mut fingerprint = [0u32; FINGERPRINT_LENGTH];
            let mut tail = [0u32; 2];
            flash.read(cursor, &mut fingerprint)?;
            flash.read(cursor + (FINGERPRINT_LENGTH as u32) * 4, &mut tail)?;
            loaded.store_fingerprint(&fingerprint, tail[0], sensor_id_word(tail[1])?)?;
            cursor += (FINGERPRINT_SLOT_WORDS as u32) * 4;
        }
        cursor = address + 8 + (DB_CAPACITY * FINGERPRINT_SLOT_WORDS) as u32 * 4;

        cursor = read_scalar_table(flash, cursor, "fall_time_count", |[value, id]| {
            loaded.store_fall_time(value, sensor_id_word(id)?)
        })?;
        read_scalar_table(flash, cursor, "pearson_count", |[bits, id]| {
            loaded.store_pearson_coefficient(f32::from_bits(bits), sensor_id_word(id)?)
        })?;

        *self = loaded;
        vt_info!("loaded {} fingerprints from {:#x}", count, address);
        Ok(true)
    }
}

fn fetch<T>(table: &[T], index: usize) -> VerifyResult<&T> {
    table.get(index).ok_or(VerifyError::Index {
        index,
        count: table.len(),
    })
}

fn nearest(candidates: impl Iterator<Item = (f32, SensorId)>, threshold: f32) -> Identification {
    let mut best: Option<(f32, SensorId)> = None;
    for (distance, id) in candidates {
        if !(distance < threshold) {
            continue;
        }
        if best.map_or(true, |(d, _)| distance < d) {
            best = Some((distance, id));
        }
    }
    best.map_or(Identification::Unidentified, |(_, id)| Identification::Identified(id))
}

fn checked_count(word: u32, field: &'static str) -> VerifyResult<usize> {
    let count = word as usize;
    if count > DB_CAPACITY {
        return Err(VerifyError::Codec { field });
    }
    Ok(count)
}

fn sensor_id_word(word: u32) -> VerifyResult<SensorId> {
    u8::try_from(word)
        .map(SensorId)
        .map_err(|_| VerifyError::Codec { field: "sensor_id" })
}

fn write_scalar_table<F: FlashStorage>(
    flash: &mut F,
    address: u32,
    entries: impl Iterator<Item = [u32; SCALAR_SLOT_WORDS]>,
    count: usize,
) -> VerifyResult<u32> {
    flash.write(address, &[count as u32])?;
    let mut cursor = address + 4;
    for words in entries {
        flash.write(cursor, &words)?;
        cursor += (SCALAR_SLOT_WORDS as u32) * 4;
    }
    Ok(address + 4 + (DB_CAPACITY * SCALAR_SLOT_WORDS) as u32 * 4)
}

fn read_scalar_table<F: FlashStorage>(
    flash: &mut F,
    address: u32,
    field: &'static str,
    mut store: impl FnMut([u32; SCALAR_SLOT_WORDS]) -> VerifyResult<()>,
) -> VerifyResult<u32> {
    let mut count = [0u32];
    flash.read(address, &mut count)?;
    let count = checked_count(count[0], field)?;

    let mut cursor = address + 4;
    for _ in 0..count {
        let mut words = [0u32; SCALAR_SLOT_WORDS];
        flash.read(cursor, &mut words)?;
        store(words)?;
        cursor += (SCALAR_SLOT_WORDS as u32) * 4;
    }
    Ok(address + 4 + (DB_CAPACITY * SCALAR_SLOT_WORDS) as u32 * 4)
}
