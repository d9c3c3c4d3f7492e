//! Binary record codec.
//!
//! Pattern record (little endian words):
//!
//! ```text
//! word 0      header: 0xA5 << 24 | flags << 16 | length << 8 | id
//! word 1      root note, 3 pad bytes
//! word 2..98  one word per step, one cell byte per slot
//! word 98     checksum of words 0..98
//! ```
//!
//! Settings record: header `0xC5 << 24 | version`, two field words and a
//! checksum.

use std::io::Cursor;

use binrw::{binrw, BinRead, BinWrite};
use zk_ir::{
    Cell, ClockSettings, Pattern, Settings, Step, SystemFlags, CELL_EMPTY, MAX_PATTERNS,
    MAX_STEPS, NOTES_PER_STEP,
};

use crate::error::{RecordError, StoreError};
use crate::layout::{ERASED_WORD, WORD_SIZE};

/// Top byte of a pattern record header.
pub const PATTERN_MAGIC: u8 = 0xA5;

/// Top byte of a settings record header.
pub const SETTINGS_MAGIC: u8 = 0xC5;

/// Settings layout version.
pub const SETTINGS_VERSION: u8 = 1;

const CHECKSUM_SEED: u32 = 0x5A17_C0DE;

/// Checksum of a record's leading words.
pub fn checksum(words: &[u32]) -> u32 {
    words
        .iter()
        .fold(CHECKSUM_SEED, |acc, w| acc.rotate_left(5) ^ w)
}

#[binrw]
#[brw(little)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatternRecord {
    pub header: u32,
    #[brw(pad_after = 3)]
    pub root: u8,
    pub steps: [[u8; NOTES_PER_STEP]; MAX_STEPS],
    pub checksum: u32,
}

impl PatternRecord {
    /// Encoded size in words.
    pub const WORDS: usize = 3 + MAX_STEPS;

    pub fn from_pattern(pattern: &Pattern) -> Self {
        let mut steps = [[CELL_EMPTY; NOTES_PER_STEP]; MAX_STEPS];
        for (raw, step) in steps.iter_mut().zip(pattern.steps()) {
            for (byte, cell) in raw.iter_mut().zip(step.cells()) {
                *byte = cell.to_raw();
            }
        }
        let header = (PATTERN_MAGIC as u32) << 24
            | (pattern.flags as u32) << 16
            | (pattern.len() as u32) << 8
            | pattern.id as u32;
        let mut record = Self {
            header,
            root: pattern.root,
            steps,
            checksum: 0,
        };
        record.checksum = record.expected_checksum();
        record
    }

    pub fn id(&self) -> u8 {
        self.header as u8
    }

    pub fn length(&self) -> u8 {
        (self.header >> 8) as u8
    }

    pub fn flags(&self) -> u8 {
        (self.header >> 16) as u8
    }

    pub fn magic(&self) -> u8 {
        (self.header >> 24) as u8
    }

    fn expected_checksum(&self) -> u32 {
        let mut words = Vec::with_capacity(Self::WORDS - 1);
        words.push(self.header);
        words.push(self.root as u32);
        words.extend(self.steps.iter().map(|s| u32::from_le_bytes(*s)));
        checksum(&words)
    }

    /// Validate the record as the stored copy of pattern `expected_id`.
    pub fn to_pattern(&self, expected_id: u8) -> Result<Pattern, RecordError> {
        if self.header == ERASED_WORD || self.header == 0 {
            return Err(RecordError::Empty);
        }
        if self.magic() != PATTERN_MAGIC {
            return Err(RecordError::BadMagic(self.magic()));
        }
        if self.id() != expected_id || self.id() as usize >= MAX_PATTERNS {
            return Err(RecordError::WrongId {
                expected: expected_id,
                found: self.id(),
            });
        }
        let length = self.length() as usize;
        if length == 0 || length > MAX_STEPS {
            return Err(RecordError::BadLength(self.length()));
        }
        if self.checksum != self.expected_checksum() {
            return Err(RecordError::Checksum);
        }
        let mut steps = [Step::EMPTY; MAX_STEPS];
        for (i, (step, raw)) in steps.iter_mut().zip(self.steps.iter()).take(length).enumerate() {
            let mut cells = [Cell::Empty; NOTES_PER_STEP];
            for (cell, &value) in cells.iter_mut().zip(raw.iter()) {
                *cell = Cell::from_raw(value).ok_or(RecordError::BadCell { step: i, value })?;
            }
            *step = Step::from_cells(cells);
        }
        Pattern::from_steps(self.id(), self.root, self.flags(), &steps[..length])
            .ok_or(RecordError::BadLength(self.length()))
    }
}

#[binrw]
#[brw(little)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SettingsRecord {
    pub header: u32,
    pub midi_channel: u8,
    pub system: u8,
    pub tuning_trim: i8,
    pub bend_range: u8,
    #[brw(pad_after = 1)]
    pub midi_divisor: u8,
    pub timeout_ms: u16,
    pub checksum: u32,
}

impl SettingsRecord {
    /// Encoded size in words.
    pub const WORDS: usize = 4;

    pub fn from_settings(settings: &Settings) -> Self {
        let mut record = Self {
            header: (SETTINGS_MAGIC as u32) << 24 | SETTINGS_VERSION as u32,
            midi_channel: settings.midi_channel,
            system: settings.system.bits(),
            tuning_trim: settings.tuning_trim,
            bend_range: settings.bend_range,
            midi_divisor: settings.clock.midi_divisor,
            timeout_ms: settings.clock.timeout_ms,
            checksum: 0,
        };
        record.checksum = record.expected_checksum();
        record
    }

    fn expected_checksum(&self) -> u32 {
        let fields = u32::from_le_bytes([
            self.midi_channel,
            self.system,
            self.tuning_trim as u8,
            self.bend_range,
        ]);
        let clock = self.midi_divisor as u32 | (self.timeout_ms as u32) << 16;
        checksum(&[self.header, fields, clock])
    }

    pub fn to_settings(&self) -> Result<Settings, RecordError> {
        if self.header == ERASED_WORD || self.header == 0 {
            return Err(RecordError::Empty);
        }
        let magic = (self.header >> 24) as u8;
        if magic != SETTINGS_MAGIC || self.header as u8 != SETTINGS_VERSION {
            return Err(RecordError::BadMagic(magic));
        }
        if self.checksum != self.expected_checksum() {
            return Err(RecordError::Checksum);
        }
        Ok(Settings {
            midi_channel: self.midi_channel,
            system: SystemFlags::from_bits_truncate(self.system),
            tuning_trim: self.tuning_trim,
            bend_range: self.bend_range,
            clock: ClockSettings {
                midi_divisor: self.midi_divisor,
                timeout_ms: self.timeout_ms,
            },
        }
        .sanitized())
    }
}

fn bytes_to_words(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks(WORD_SIZE as usize)
        .map(|c| {
            let mut word = [0u8; 4];
            word[..c.len()].copy_from_slice(c);
            u32::from_le_bytes(word)
        })
        .collect()
}

fn words_to_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

macro_rules! word_codec {
    ($record:ty) => {
        impl $record {
            /// Encode into flash words.
            pub fn to_words(&self) -> Result<Vec<u32>, StoreError> {
                let mut cursor = Cursor::new(Vec::new());
                self.write(&mut cursor)?;
                Ok(bytes_to_words(&cursor.into_inner()))
            }

            /// Decode from flash words.
            pub fn from_words(words: &[u32]) -> Result<Self, RecordError> {
                let mut cursor = Cursor::new(words_to_bytes(words));
                Self::read(&mut cursor).map_err(|e| RecordError::Unreadable(e.to_string()))
            }
        }
    };
}

word_codec!(PatternRecord);
word_codec!(SettingsRecord);

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pattern() -> Pattern {
        let mut chord = Step::EMPTY;
        chord.insert(60);
        chord.insert(64);
        Pattern::from_steps(5, 60, 0x02, &[chord, Step::TIE, Step::note(67), Step::EMPTY])
            .unwrap()
    }

    #[test]
    fn pattern_record_layout() {
        let record = PatternRecord::from_pattern(&sample_pattern());
        let words = record.to_words().unwrap();
        assert_eq!(words.len(), PatternRecord::WORDS);
        assert_eq!(words[0], 0xA502_0405);
        assert_eq!(words[1], 60);
        assert_eq!(words[2], u32::from_le_bytes([60, 64, 0x80, 0x80]));
        assert_eq!(words[3], 0x8181_8181);
        assert_eq!(words[6], 0x8080_8080);
        assert_eq!(words[PatternRecord::WORDS - 1], checksum(&words[..PatternRecord::WORDS - 1]));
    }

    #[test]
    fn pattern_record_decodes() {
        let pattern = sample_pattern();
        let words = PatternRecord::from_pattern(&pattern).to_words().unwrap();
        let record = PatternRecord::from_words(&words).unwrap();
        assert_eq!(record.to_pattern(5), Ok(pattern));
    }

    #[test]
    fn corrupt_records_are_rejected() {
        let record = PatternRecord::from_pattern(&sample_pattern());
        assert!(matches!(record.to_pattern(4), Err(RecordError::WrongId { .. })));

        let mut bad = record.clone();
        bad.steps[1][2] = 0x90;
        bad.checksum = bad.expected_checksum();
        assert_eq!(bad.to_pattern(5), Err(RecordError::BadCell { step: 1, value: 0x90 }));

        let mut torn = record.clone();
        torn.checksum = ERASED_WORD;
        assert_eq!(torn.to_pattern(5), Err(RecordError::Checksum));

        let mut long = record;
        long.header = (long.header & !0xFF00) | (97 << 8);
        assert_eq!(long.to_pattern(5), Err(RecordError::BadLength(97)));
    }

    #[test]
    fn erased_and_zero_headers_are_empty() {
        let mut record = PatternRecord::from_pattern(&sample_pattern());
        record.header = ERASED_WORD;
        assert_eq!(record.to_pattern(5), Err(RecordError::Empty));
        record.header = 0;
        assert_eq!(record.to_pattern(5), Err(RecordError::Empty));
    }

    #[test]
    fn settings_record_layout() {
        let settings = Settings {
            midi_channel: 9,
            system: SystemFlags::GLIDE | SystemFlags::TRACK,
            tuning_trim: -3,
            bend_range: 12,
            clock: ClockSettings {
                midi_divisor: 6,
                timeout_ms: 2000,
            },
        };
        let words = SettingsRecord::from_settings(&settings).to_words().unwrap();
        assert_eq!(words.len(), SettingsRecord::WORDS);
        assert_eq!(words[0], 0xC500_0001);
        assert_eq!(words[1], u32::from_le_bytes([9, 0x0C, 0xFD, 12]));
        assert_eq!(words[2], 6 | 2000 << 16);
        let record = SettingsRecord::from_words(&words).unwrap();
        assert_eq!(record.to_settings(), Ok(settings));
    }
}
