//! Page rotation and recovery behavior of the pattern store.

use zk_ir::{Pattern, PatternBank, Step, MAX_PATTERNS};
use zk_store::layout::{pattern_page, record_addr, ERASED_WORD, RECORDS_PER_PAGE};
use zk_store::{FlashStorage, MemoryFlash, PatternStore, StoreError};

fn pattern(id: u8, notes: &[u8]) -> Pattern {
    let steps: Vec<Step> = notes.iter().map(|&n| Step::note(n)).collect();
    Pattern::from_steps(id, notes[0], 0, &steps)
        .unwrap_or_else(|| panic!("bad test pattern {}", id))
}

#[test]
fn fifth_save_rotates_the_page_once() {
    let mut store = PatternStore::new(MemoryFlash::new());
    for n in 0..=RECORDS_PER_PAGE as u8 {
        store.save_pattern(&pattern(7, &[60 + n, 48])).unwrap();
    }
    assert_eq!(store.flash().erase_count(), 1);

    // the rotated page holds only the newest record
    let page = pattern_page(7);
    assert_ne!(store.flash().read_word(record_addr(page, 0)), Ok(ERASED_WORD));
    assert_eq!(store.flash().read_word(record_addr(page, 1)), Ok(ERASED_WORD));
    assert_eq!(store.load_pattern(7), Some(pattern(7, &[64, 48])));
}

#[test]
fn every_pattern_survives_a_reload() {
    let mut store = PatternStore::new(MemoryFlash::new());
    let saved: Vec<Pattern> = (0..MAX_PATTERNS as u8)
        .map(|id| {
            let mut steps = vec![Step::note(40 + id), Step::TIE, Step::EMPTY];
            steps[0].insert(52 + id);
            Pattern::from_steps(id, 40, id, &steps).unwrap()
        })
        .collect();
    for p in &saved {
        store.save_pattern(p).unwrap();
    }

    let image = store.into_flash().to_image();
    let mut reloaded = PatternStore::new(MemoryFlash::from_image(&image));
    let mut patterns: Vec<Pattern> = (0..MAX_PATTERNS as u8).map(Pattern::new).collect();
    assert_eq!(reloaded.load_patterns(&mut patterns), MAX_PATTERNS);
    assert_eq!(patterns, saved);
}

#[test]
fn torn_write_after_rotation_falls_back_to_defaults() {
    let mut store = PatternStore::new(MemoryFlash::new());
    for n in 0..=RECORDS_PER_PAGE as u8 {
        store.save_pattern(&pattern(2, &[50 + n])).unwrap();
    }
    let mut flash = store.into_flash();
    // power lost before the checksum of the only record landed
    let record = record_addr(pattern_page(2), 0);
    let checksum = record + 98 * 4;
    flash.corrupt_word(checksum, ERASED_WORD);

    let mut store = PatternStore::new(flash);
    let mut patterns: Vec<Pattern> = (0..MAX_PATTERNS as u8).map(Pattern::new).collect();
    assert_eq!(store.load_patterns(&mut patterns), 0);
    assert_eq!(patterns[2], Pattern::new(2));

    // the torn slot is not free, so the next save appends after it
    store.save_pattern(&pattern(2, &[70])).unwrap();
    assert_eq!(store.load_pattern(2), Some(pattern(2, &[70])));
    assert_eq!(store.flash().erase_count(), 1);
}

#[test]
fn poisoned_store_keeps_what_it_had() {
    let mut flash = MemoryFlash::new();
    {
        let mut store = PatternStore::new(&mut flash);
        for n in 0..RECORDS_PER_PAGE as u8 {
            store.save_pattern(&pattern(0, &[30 + n])).unwrap();
        }
    }
    flash.fail_next_erase();
    let mut store = PatternStore::new(&mut flash);
    assert!(store.save_pattern(&pattern(0, &[99])).is_err());
    assert!(matches!(
        store.save_pattern(&pattern(1, &[99])),
        Err(StoreError::Poisoned)
    ));
    assert_eq!(store.load_pattern(0), Some(pattern(0, &[33])));
    assert_eq!(store.load_pattern(1), None);
}
