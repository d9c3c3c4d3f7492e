//! Append-style pattern store with page rotation.
//!
//! Each pattern owns one page of [`RECORDS_PER_PAGE`] record slots. A save
//! goes to the first slot whose header is still erased; when none is left
//! the page is erased, verified, and the record written to slot 0. Load
//! keeps the newest valid slot. The header goes down first and the
//! checksum last, so a torn write is discarded on the next load.

use zk_ir::{Pattern, PatternBank, Settings, MAX_PATTERNS};

use crate::error::{RecordError, Result, StoreError};
use crate::flash::FlashStorage;
use crate::layout::{
    pattern_page, record_addr, ERASED_WORD, PAGE_SIZE, RECORDS_PER_PAGE, SETTINGS_PAGE, WORD_SIZE,
};
use crate::record::{PatternRecord, SettingsRecord};

/// Pattern and settings persistence on top of raw flash.
pub struct PatternStore<F: FlashStorage> {
    flash: F,
    poisoned: bool,
}

impl<F: FlashStorage> PatternStore<F> {
    pub fn new(flash: F) -> Self {
        Self {
            flash,
            poisoned: false,
        }
    }

    pub fn flash(&self) -> &F {
        &self.flash
    }

    pub fn into_flash(self) -> F {
        self.flash
    }

    /// True after an erase failed. The store refuses further writes.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Newest valid stored copy of pattern `id`.
    pub fn load_pattern(&self, id: u8) -> Option<Pattern> {
        if id as usize >= MAX_PATTERNS {
            return None;
        }
        let page = pattern_page(id);
        let mut newest = None;
        for slot in 0..RECORDS_PER_PAGE {
            let addr = record_addr(page, slot);
            match self.read_pattern_record(addr, id) {
                Ok(pattern) => newest = Some(pattern),
                Err(RecordError::Empty) => {}
                Err(err) => log::warn!("pattern {} slot {}: discarded ({})", id, slot, err),
            }
        }
        newest
    }

    /// Append `pattern` to its page, rotating the page when full.
    pub fn save(&mut self, pattern: &Pattern) -> Result<()> {
        if self.poisoned {
            return Err(StoreError::Poisoned);
        }
        if pattern.id as usize >= MAX_PATTERNS {
            return Err(StoreError::BadPatternId(pattern.id));
        }
        let words = PatternRecord::from_pattern(pattern).to_words()?;
        let page = pattern_page(pattern.id);
        let addr = match self.free_slot(page)? {
            Some(slot) => record_addr(page, slot),
            None => {
                log::info!("pattern {}: page full, erasing {:#06x}", pattern.id, page);
                self.erase_verified(page)?;
                record_addr(page, 0)
            }
        };
        self.write_record(addr, &words)?;
        log::debug!("pattern {} written at {:#06x}", pattern.id, addr);
        Ok(())
    }

    /// Stored settings, if a valid record exists.
    pub fn read_settings(&self) -> Option<Settings> {
        let words = self.read_words(SETTINGS_PAGE, SettingsRecord::WORDS).ok()?;
        let result = SettingsRecord::from_words(&words).and_then(|r| r.to_settings());
        match result {
            Ok(settings) => Some(settings),
            Err(RecordError::Empty) => None,
            Err(err) => {
                log::warn!("settings record discarded ({})", err);
                None
            }
        }
    }

    /// Rewrite the settings page unless it already holds `settings`.
    /// Returns whether anything was written.
    pub fn write_settings(&mut self, settings: &Settings) -> Result<bool> {
        if self.read_settings().as_ref() == Some(settings) {
            return Ok(false);
        }
        if self.poisoned {
            return Err(StoreError::Poisoned);
        }
        let words = SettingsRecord::from_settings(settings).to_words()?;
        self.erase_verified(SETTINGS_PAGE)?;
        self.write_record(SETTINGS_PAGE, &words)?;
        Ok(true)
    }

    fn read_pattern_record(&self, addr: u32, id: u8) -> std::result::Result<Pattern, RecordError> {
        let header = self
            .flash
            .read_word(addr)
            .map_err(|e| RecordError::Unreadable(e.to_string()))?;
        if header == ERASED_WORD || header == 0 {
            return Err(RecordError::Empty);
        }
        let words = self
            .read_words(addr, PatternRecord::WORDS)
            .map_err(|e| RecordError::Unreadable(e.to_string()))?;
        PatternRecord::from_words(&words)?.to_pattern(id)
    }

    fn read_words(&self, addr: u32, count: usize) -> Result<Vec<u32>> {
        (0..count as u32)
            .map(|i| Ok(self.flash.read_word(addr + i * WORD_SIZE)?))
            .collect()
    }

    fn free_slot(&self, page: u32) -> Result<Option<u32>> {
        for slot in 0..RECORDS_PER_PAGE {
            if self.flash.read_word(record_addr(page, slot))? == ERASED_WORD {
                return Ok(Some(slot));
            }
        }
        Ok(None)
    }

    /// Header first, checksum last.
    fn write_record(&mut self, addr: u32, words: &[u32]) -> Result<()> {
        for (i, word) in words.iter().enumerate() {
            self.flash.write_word(addr + i as u32 * WORD_SIZE, *word)?;
        }
        Ok(())
    }

    fn erase_verified(&mut self, page: u32) -> Result<()> {
        if let Err(err) = self.flash.erase_page(page) {
            self.poison(page);
            return Err(err.into());
        }
        for i in 0..PAGE_SIZE / WORD_SIZE {
            if self.flash.read_word(page + i * WORD_SIZE)? != ERASED_WORD {
                self.poison(page);
                return Err(StoreError::EraseVerify { page });
            }
        }
        Ok(())
    }

    fn poison(&mut self, page: u32) {
        log::error!("erase of page {:#06x} failed; store disabled", page);
        self.poisoned = true;
    }
}

impl<F: FlashStorage> PatternBank for PatternStore<F> {
    type Error = StoreError;

    fn load_patterns(&mut self, patterns: &mut [Pattern]) -> usize {
        let mut loaded = 0;
        for (id, slot) in patterns.iter_mut().enumerate().take(MAX_PATTERNS) {
            if let Some(pattern) = self.load_pattern(id as u8) {
                *slot = pattern;
                loaded += 1;
            }
        }
        loaded
    }

    fn save_pattern(&mut self, pattern: &Pattern) -> Result<()> {
        self.save(pattern)
    }

    fn load_settings(&mut self) -> Option<Settings> {
        self.read_settings()
    }

    fn save_settings(&mut self, settings: &Settings) -> Result<bool> {
        self.write_settings(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flash::MemoryFlash;
    use zk_ir::{Step, SystemFlags};

    fn pattern(id: u8, notes: &[u8]) -> Pattern {
        let steps: Vec<Step> = notes.iter().map(|&n| Step::note(n)).collect();
        Pattern::from_steps(id, notes[0], 0, &steps).unwrap()
    }

    #[test]
    fn empty_flash_loads_nothing() {
        let mut store = PatternStore::new(MemoryFlash::new());
        let mut patterns: Vec<Pattern> = (0..16).map(Pattern::new).collect();
        assert_eq!(store.load_patterns(&mut patterns), 0);
        assert_eq!(patterns[3], Pattern::new(3));
        assert_eq!(store.load_settings(), None);
    }

    #[test]
    fn saves_append_to_free_slots() {
        let mut store = PatternStore::new(MemoryFlash::new());
        store.save(&pattern(2, &[60])).unwrap();
        store.save(&pattern(2, &[62])).unwrap();
        let page = pattern_page(2);
        assert_ne!(store.flash().read_word(record_addr(page, 1)), Ok(ERASED_WORD));
        assert_eq!(store.flash().read_word(record_addr(page, 2)), Ok(ERASED_WORD));
        assert_eq!(store.load_pattern(2), Some(pattern(2, &[62])));
        assert_eq!(store.flash().erase_count(), 0);
    }

    #[test]
    fn torn_write_keeps_previous_copy() {
        let mut store = PatternStore::new(MemoryFlash::new());
        store.save(&pattern(1, &[60, 61])).unwrap();
        store.save(&pattern(1, &[70, 71])).unwrap();
        let mut flash = store.into_flash();
        // drop the checksum of the newest record
        let checksum_addr = record_addr(pattern_page(1), 1) + (PatternRecord::WORDS as u32 - 1) * 4;
        flash.corrupt_word(checksum_addr, ERASED_WORD);
        let store = PatternStore::new(flash);
        assert_eq!(store.load_pattern(1), Some(pattern(1, &[60, 61])));
    }

    #[test]
    fn zero_header_is_skipped() {
        let mut store = PatternStore::new(MemoryFlash::new());
        store.save(&pattern(0, &[50])).unwrap();
        let mut flash = store.into_flash();
        flash.corrupt_word(pattern_page(0), 0);
        let store = PatternStore::new(flash);
        assert_eq!(store.load_pattern(0), None);
    }

    #[test]
    fn settings_compare_before_write() {
        let mut store = PatternStore::new(MemoryFlash::new());
        let settings = Settings {
            midi_channel: 4,
            system: SystemFlags::RETRIGGER,
            ..Settings::default()
        };
        assert_eq!(store.save_settings(&settings).unwrap(), true);
        assert_eq!(store.flash().erase_count(), 1);
        assert_eq!(store.save_settings(&settings).unwrap(), false);
        assert_eq!(store.flash().erase_count(), 1);
        assert_eq!(store.load_settings(), Some(settings));
    }

    #[test]
    fn erase_failure_poisons_store() {
        let mut store = PatternStore::new(MemoryFlash::new());
        for n in 0..RECORDS_PER_PAGE as u8 {
            store.save(&pattern(3, &[40 + n])).unwrap();
        }
        let mut flash = store.into_flash();
        flash.fail_next_erase();
        let mut store = PatternStore::new(flash);
        assert!(matches!(
            store.save(&pattern(3, &[90])),
            Err(StoreError::Flash(_))
        ));
        assert!(store.is_poisoned());
        assert!(matches!(store.save(&pattern(4, &[90])), Err(StoreError::Poisoned)));
        // earlier records are untouched
        assert_eq!(store.load_pattern(3), Some(pattern(3, &[43])));
    }

    #[test]
    fn failed_verify_poisons_store() {
        let mut flash = MemoryFlash::new();
        flash.stick_word(SETTINGS_PAGE + 64, 0);
        let mut store = PatternStore::new(flash);
        assert!(matches!(
            store.save_settings(&Settings::default()),
            Err(StoreError::EraseVerify { .. })
        ));
        assert!(store.is_poisoned());
    }

    #[test]
    fn out_of_range_id_is_rejected() {
        let mut store = PatternStore::new(MemoryFlash::new());
        let mut p = Pattern::new(0);
        p.id = 16;
        assert!(matches!(store.save(&p), Err(StoreError::BadPatternId(16))));
    }
}
